//! ASCII wire protocol of the servo controller.
//!
//! One frame per servo: `#<ID>D<tenths>\r`, where the angle is transmitted
//! in tenths of a degree as an unsigned integer (`#1D900\r` commands servo 1
//! to 90.0°). Frames for one motion are concatenated in fixed order, base
//! first, gripper last. A `T<ms>` suffix may be appended per servo to
//! request a timed, smoothed move instead of an instantaneous jump.
//! `STOP\r` halts all servos immediately.

use crate::errors::ArmError;
use crate::joints::{Gripper, Joint, JointAngles, GRIPPER_SERVO_ID, JOINT_COUNT};
use std::time::Duration;

/// A validated motion ready for encoding: target angles plus an optional
/// move time per positioned joint.
#[derive(Debug, Clone, PartialEq)]
pub struct MotionCommand {
    pub joints: JointAngles,
    /// Requested move time per joint, in transmission order.
    pub move_time: [Option<Duration>; JOINT_COUNT],
    /// Servo angle for the gripper, if the gripper should move. Resolved
    /// from the symbolic open/closed state before encoding.
    pub gripper_angle: Option<f64>,
}

impl MotionCommand {
    /// Motion with no move-time suffixes and no gripper change.
    pub fn instant(joints: JointAngles) -> Self {
        MotionCommand {
            joints,
            move_time: [None; JOINT_COUNT],
            gripper_angle: None,
        }
    }

    /// Motion with the same move time requested for every joint.
    pub fn timed(joints: JointAngles, duration: Duration) -> Self {
        MotionCommand {
            joints,
            move_time: [Some(duration); JOINT_COUNT],
            gripper_angle: None,
        }
    }

    /// Attaches a gripper move, resolving open/closed against the
    /// configured end-stop angles.
    pub fn with_gripper(mut self, open_angle: f64, closed_angle: f64) -> Self {
        self.gripper_angle = Some(match self.joints.gripper {
            Gripper::Open => open_angle,
            Gripper::Closed => closed_angle,
            Gripper::At(angle) => angle,
        });
        self
    }

    /// The longest requested move time, used as the settle duration after
    /// which the arm is considered stationary again.
    pub fn settle_time(&self) -> Duration {
        self.move_time
            .iter()
            .flatten()
            .max()
            .copied()
            .unwrap_or(Duration::ZERO)
    }
}

/// Encodes a motion command into wire bytes.
///
/// Encoding is deterministic: the same command always produces the same
/// bytes. Angles are rounded to the nearest tenth of a degree. The format
/// carries unsigned angles only, so a negative or non-finite angle fails
/// rather than transmitting a wrong position.
pub fn encode(command: &MotionCommand) -> Result<Vec<u8>, ArmError> {
    let mut out = Vec::with_capacity(12 * (JOINT_COUNT + 1));
    let angles = command.joints.as_array();
    for (i, joint) in Joint::ALL.iter().enumerate() {
        push_frame(
            &mut out,
            joint.servo_id(),
            angles[i],
            command.move_time[i],
        )?;
    }
    if let Some(angle) = command.gripper_angle {
        push_frame(&mut out, GRIPPER_SERVO_ID, angle, None)?;
    }
    Ok(out)
}

/// The emergency halt frame.
pub fn encode_stop() -> &'static [u8] {
    b"STOP\r"
}

fn push_frame(
    out: &mut Vec<u8>,
    servo_id: u8,
    angle: f64,
    move_time: Option<Duration>,
) -> Result<(), ArmError> {
    if !angle.is_finite() || angle < 0.0 {
        return Err(ArmError::InvalidPose(format!(
            "servo {} angle {}° cannot be encoded",
            servo_id, angle
        )));
    }
    let tenths = (angle * 10.0).round() as u32;
    out.extend_from_slice(format!("#{}D{}", servo_id, tenths).as_bytes());
    if let Some(t) = move_time {
        out.extend_from_slice(format!("T{}", t.as_millis()).as_bytes());
    }
    out.push(b'\r');
    Ok(())
}
