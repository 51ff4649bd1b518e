//! Joint angle sets and the servo channel mapping.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Number of positioned joints (the gripper is commanded separately).
pub const JOINT_COUNT: usize = 5;

/// The five positioned joints, in wire transmission order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Joint {
    Base,
    Shoulder,
    Elbow,
    WristPitch,
    WristRoll,
}

impl Joint {
    /// All joints in transmission order (base first).
    pub const ALL: [Joint; JOINT_COUNT] = [
        Joint::Base,
        Joint::Shoulder,
        Joint::Elbow,
        Joint::WristPitch,
        Joint::WristRoll,
    ];

    /// Servo channel on the controller board. The gripper occupies
    /// channel [`GRIPPER_SERVO_ID`] after the wrist-roll servo.
    pub fn servo_id(&self) -> u8 {
        match self {
            Joint::Base => 1,
            Joint::Shoulder => 2,
            Joint::Elbow => 3,
            Joint::WristPitch => 4,
            Joint::WristRoll => 5,
        }
    }
}

impl fmt::Display for Joint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Joint::Base => "base",
            Joint::Shoulder => "shoulder",
            Joint::Elbow => "elbow",
            Joint::WristPitch => "wrist_pitch",
            Joint::WristRoll => "wrist_roll",
        };
        write!(f, "{}", name)
    }
}

/// Servo channel of the gripper.
pub const GRIPPER_SERVO_ID: u8 = 6;

/// Commanded state of the gripper.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Gripper {
    Open,
    Closed,
    /// Explicit servo angle in degrees.
    At(f64),
}

/// An ordered set of joint angles in servo-space degrees, plus the gripper.
///
/// Shoulder is measured from horizontal. The elbow angle is the interior
/// angle between upper arm and forearm for the elbow-up configuration and
/// its 360° reflex for elbow-down, so the two branches are distinguishable.
/// Wrist-pitch is the servo angle that makes the end-effector pitch
/// absolute (see [`crate::kinematics`]).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct JointAngles {
    pub base: f64,
    pub shoulder: f64,
    pub elbow: f64,
    pub wrist_pitch: f64,
    pub wrist_roll: f64,
    pub gripper: Gripper,
}

impl JointAngles {
    /// Neutral home pose: every servo centered, gripper open.
    pub fn home() -> Self {
        JointAngles {
            base: 90.0,
            shoulder: 90.0,
            elbow: 90.0,
            wrist_pitch: 90.0,
            wrist_roll: 90.0,
            gripper: Gripper::Open,
        }
    }

    /// Angles of the positioned joints in transmission order.
    pub fn as_array(&self) -> [f64; JOINT_COUNT] {
        [
            self.base,
            self.shoulder,
            self.elbow,
            self.wrist_pitch,
            self.wrist_roll,
        ]
    }

    /// Rebuild from an array in transmission order, keeping the gripper.
    pub fn with_array(&self, angles: [f64; JOINT_COUNT]) -> Self {
        JointAngles {
            base: angles[0],
            shoulder: angles[1],
            elbow: angles[2],
            wrist_pitch: angles[3],
            wrist_roll: angles[4],
            gripper: self.gripper,
        }
    }

    /// Angle of one joint.
    pub fn angle(&self, joint: Joint) -> f64 {
        match joint {
            Joint::Base => self.base,
            Joint::Shoulder => self.shoulder,
            Joint::Elbow => self.elbow,
            Joint::WristPitch => self.wrist_pitch,
            Joint::WristRoll => self.wrist_roll,
        }
    }

    /// True when every positioned joint angle is finite.
    pub fn is_finite(&self) -> bool {
        self.as_array().iter().all(|a| a.is_finite())
    }
}
