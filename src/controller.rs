//! Request facade tying the pipeline together.
//!
//! A request enters as a pixel or world-frame target (or a symbolic action)
//! and flows through calibration, the base-frame transform, the inverse
//! solver and the safety validator before the commander transmits it. Each
//! stage either produces the next representation or fails with the
//! stage-specific [`ArmError`]; nothing past a failed stage runs.
//!
//! The commander is guarded by a mutex that is only ever `try_lock`ed for
//! motion: while one request is in flight, further requests fail fast with
//! [`ArmError::Busy`] instead of queueing, so a command computed against an
//! outdated arm state is never executed late. An emergency stop is the one
//! exception; it cancels the in-flight acknowledgment wait and takes the
//! lock as soon as the holder backs out.

use crate::arm_state::{ArmSnapshot, ArmState};
use crate::calibration::{CalibrationParams, CalibrationStore};
use crate::commander::{CommanderConfig, MotionCommander, ServoLink};
use crate::errors::{ArmError, JointClamp};
use crate::frame::{BaseFrame, Pose3D};
use crate::geometry::ArmGeometry;
use crate::joints::{Gripper, JointAngles};
use crate::kinematics::ArmKinematics;
use crate::safety::{SafetyLimits, SafetyValidator};
use crate::wire::MotionCommand;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, info};

/// Where a motion target is expressed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TargetPose {
    /// Camera pixel, mapped through the installed calibration. The depth
    /// hint overrides the working-plane height when the object height is
    /// known.
    Pixel {
        u: f64,
        v: f64,
        depth_hint: Option<f64>,
    },
    /// Already in the world frame.
    World(Pose3D),
}

/// Commands that do not involve solving for a pose.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolicAction {
    OpenGripper,
    CloseGripper,
    /// Drive every joint to its 90° home position.
    Home,
    /// Halt all servos immediately; faults the commander.
    EmergencyStop,
}

/// One request against the arm.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ArmRequest {
    Target {
        pose: TargetPose,
        /// Requested move time; `None` commands an instantaneous jump.
        duration: Option<Duration>,
    },
    Action(SymbolicAction),
}

/// What a completed request did: the transmitted joint set and any clamp
/// adjustments the validator applied on the way.
#[derive(Debug, Clone, PartialEq)]
pub struct MoveReport {
    pub joints: JointAngles,
    pub clamps: Vec<JointClamp>,
}

/// Gripper end-stop servo angles and the move time used for symbolic
/// actions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControllerConfig {
    pub gripper_open_angle: f64,
    pub gripper_closed_angle: f64,
    /// Move time for home and gripper actions.
    pub action_move_time_ms: u64,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        ControllerConfig {
            gripper_open_angle: 150.0,
            gripper_closed_angle: 30.0,
            action_move_time_ms: 1500,
        }
    }
}

/// Owns every pipeline stage for one arm.
pub struct ArmController {
    calibration: Mutex<CalibrationStore>,
    base_frame: BaseFrame,
    kinematics: ArmKinematics,
    validator: SafetyValidator,
    commander: Mutex<MotionCommander>,
    state: Arc<ArmState>,
    cancel: Arc<AtomicBool>,
    config: ControllerConfig,
}

impl ArmController {
    /// Assembles the pipeline over the given link. The arm is assumed to
    /// start at its home position; drive it there physically before issuing
    /// motion, or call [`reset`](Self::reset) with the true position.
    pub fn new(
        geometry: ArmGeometry,
        limits: SafetyLimits,
        base_frame: BaseFrame,
        link: Box<dyn ServoLink>,
        commander_config: CommanderConfig,
        config: ControllerConfig,
    ) -> Self {
        let state = Arc::new(ArmState::new(JointAngles::home()));
        let commander = MotionCommander::new(link, commander_config, Arc::clone(&state));
        let cancel = commander.shutdown_handle();
        ArmController {
            calibration: Mutex::new(CalibrationStore::new()),
            base_frame,
            kinematics: ArmKinematics::new(geometry),
            validator: SafetyValidator::new(limits, geometry),
            commander: Mutex::new(commander),
            state,
            cancel,
            config,
        }
    }

    /// Installs camera calibration, replacing any previous one.
    pub fn calibrate(&self, params: CalibrationParams) -> Result<(), ArmError> {
        self.calibration
            .lock()
            .map_err(|_| ArmError::Calibration("calibration store poisoned".to_string()))?
            .install(params)
    }

    /// The last confirmed arm state.
    pub fn snapshot(&self) -> ArmSnapshot {
        self.state.snapshot()
    }

    /// Clears a fault after the arm has been physically re-homed to
    /// `known_position`.
    pub fn reset(&self, known_position: JointAngles) -> Result<(), ArmError> {
        let mut commander = self
            .commander
            .lock()
            .map_err(|_| ArmError::Link("commander lock poisoned".to_string()))?;
        commander.reset(known_position);
        Ok(())
    }

    /// Runs one request through the pipeline.
    pub fn dispatch(&self, request: ArmRequest) -> Result<MoveReport, ArmError> {
        match request {
            ArmRequest::Target { pose, duration } => self.move_to(pose, duration),
            ArmRequest::Action(SymbolicAction::EmergencyStop) => self.emergency_stop(),
            ArmRequest::Action(action) => self.perform(action),
        }
    }

    fn move_to(
        &self,
        target: TargetPose,
        duration: Option<Duration>,
    ) -> Result<MoveReport, ArmError> {
        let world = self.resolve_target(target)?;
        let in_base = self.base_frame.to_arm_base(&world)?;
        debug!(
            x = in_base.position.x,
            y = in_base.position.y,
            z = in_base.position.z,
            "target in arm-base frame"
        );

        let current = self.state.snapshot().joints;
        let candidate = self.kinematics.inverse(&in_base, Some(&current))?;
        let validated = self.validator.validate(&candidate)?;

        let command = match duration {
            Some(d) => MotionCommand::timed(validated.joints, d),
            None => MotionCommand::instant(validated.joints),
        };
        self.transmit(command)?;
        info!(
            base = validated.joints.base,
            shoulder = validated.joints.shoulder,
            elbow = validated.joints.elbow,
            "motion dispatched"
        );
        Ok(MoveReport {
            joints: validated.joints,
            clamps: validated.clamps,
        })
    }

    fn perform(&self, action: SymbolicAction) -> Result<MoveReport, ArmError> {
        let move_time = Duration::from_millis(self.config.action_move_time_ms);
        let mut joints = self.state.snapshot().joints;
        match action {
            SymbolicAction::OpenGripper => joints.gripper = Gripper::Open,
            SymbolicAction::CloseGripper => joints.gripper = Gripper::Closed,
            SymbolicAction::Home => joints = JointAngles::home(),
            SymbolicAction::EmergencyStop => unreachable!("handled in dispatch"),
        }
        let validated = self.validator.validate(&joints)?;
        let command = MotionCommand::timed(validated.joints, move_time).with_gripper(
            self.config.gripper_open_angle,
            self.config.gripper_closed_angle,
        );
        self.transmit(command)?;
        Ok(MoveReport {
            joints: validated.joints,
            clamps: validated.clamps,
        })
    }

    fn emergency_stop(&self) -> Result<MoveReport, ArmError> {
        // Abort any acknowledgment wait currently holding the lock, then
        // take over. The flag is cleared afterwards so a later reset starts
        // clean.
        self.cancel.store(true, Ordering::Relaxed);
        let stop_result = match self.commander.lock() {
            Ok(mut commander) => commander.emergency_stop(),
            Err(_) => Err(ArmError::Link("commander lock poisoned".to_string())),
        };
        self.cancel.store(false, Ordering::Relaxed);
        stop_result?;
        Ok(MoveReport {
            joints: self.state.snapshot().joints,
            clamps: Vec::new(),
        })
    }

    fn resolve_target(&self, target: TargetPose) -> Result<Pose3D, ArmError> {
        match target {
            TargetPose::Pixel { u, v, depth_hint } => self
                .calibration
                .lock()
                .map_err(|_| ArmError::Calibration("calibration store poisoned".to_string()))?
                .pixel_to_world((u, v), depth_hint),
            TargetPose::World(pose) => Ok(pose),
        }
    }

    /// Hands a command to the commander without queueing.
    fn transmit(&self, command: MotionCommand) -> Result<(), ArmError> {
        let mut commander = match self.commander.try_lock() {
            Ok(guard) => guard,
            Err(std::sync::TryLockError::WouldBlock) => return Err(ArmError::Busy),
            Err(std::sync::TryLockError::Poisoned(_)) => {
                return Err(ArmError::Link("commander lock poisoned".to_string()))
            }
        };
        commander.send(&command)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commander::AckPolicy;
    use std::sync::Mutex as StdMutex;
    use std::time::Duration;

    /// Link that acknowledges everything instantly and records traffic.
    struct EagerLink {
        sent: Arc<StdMutex<Vec<Vec<u8>>>>,
    }

    impl ServoLink for EagerLink {
        fn transmit(&mut self, bytes: &[u8]) -> Result<(), ArmError> {
            self.sent.lock().unwrap().push(bytes.to_vec());
            Ok(())
        }

        fn receive(&mut self, _timeout: Duration) -> Result<Vec<u8>, ArmError> {
            Ok(b"OK".to_vec())
        }
    }

    fn controller() -> (ArmController, Arc<StdMutex<Vec<Vec<u8>>>>) {
        let sent = Arc::new(StdMutex::new(Vec::new()));
        let link = EagerLink {
            sent: Arc::clone(&sent),
        };
        let geometry = ArmGeometry::al5d();
        let limits = SafetyLimits::al5d(&geometry);
        let commander_config = CommanderConfig {
            max_retries: 0,
            ack_timeout_ms: 5,
            backoff_multiplier: 1.0,
            ack: AckPolicy::Token(b"OK".to_vec()),
        };
        let controller = ArmController::new(
            geometry,
            limits,
            BaseFrame::identity(),
            Box::new(link),
            commander_config,
            ControllerConfig::default(),
        );
        (controller, sent)
    }

    #[test]
    fn world_target_reaches_the_wire() {
        let (controller, sent) = controller();
        let report = controller
            .dispatch(ArmRequest::Target {
                pose: TargetPose::World(Pose3D::at(200.0, 0.0, 150.0)),
                duration: None,
            })
            .unwrap();
        assert!(report.joints.is_finite());
        assert_eq!(sent.lock().unwrap().len(), 1);
        assert_eq!(controller.snapshot().joints, report.joints);
    }

    #[test]
    fn pixel_target_without_calibration_fails() {
        let (controller, sent) = controller();
        let result = controller.dispatch(ArmRequest::Target {
            pose: TargetPose::Pixel {
                u: 320.0,
                v: 240.0,
                depth_hint: None,
            },
            duration: None,
        });
        assert!(matches!(result, Err(ArmError::Calibration(_))));
        // A failed stage must not transmit anything.
        assert!(sent.lock().unwrap().is_empty());
    }

    #[test]
    fn unreachable_target_transmits_nothing() {
        let (controller, sent) = controller();
        let result = controller.dispatch(ArmRequest::Target {
            pose: TargetPose::World(Pose3D::at(2000.0, 0.0, 100.0)),
            duration: None,
        });
        assert!(matches!(result, Err(ArmError::Unreachable { .. })));
        assert!(sent.lock().unwrap().is_empty());
        assert_eq!(controller.snapshot().joints, JointAngles::home());
    }

    #[test]
    fn gripper_actions_only_move_the_gripper_servo() {
        let (controller, sent) = controller();
        let report = controller
            .dispatch(ArmRequest::Action(SymbolicAction::CloseGripper))
            .unwrap();
        assert_eq!(report.joints.gripper, Gripper::Closed);
        let text = String::from_utf8(sent.lock().unwrap()[0].clone()).unwrap();
        // Positioned joints stay at home, gripper frame commands the
        // configured closed angle (30.0° = 300 tenths).
        assert!(text.contains("#6D300"));
        assert_eq!(controller.snapshot().joints.gripper, Gripper::Closed);
    }

    #[test]
    fn home_action_returns_all_joints_to_ninety() {
        let (controller, _) = controller();
        controller
            .dispatch(ArmRequest::Target {
                pose: TargetPose::World(Pose3D::at(180.0, 80.0, 120.0)),
                duration: None,
            })
            .unwrap();
        let report = controller
            .dispatch(ArmRequest::Action(SymbolicAction::Home))
            .unwrap();
        assert_eq!(report.joints, JointAngles::home());
        assert_eq!(controller.snapshot().joints, JointAngles::home());
    }

    #[test]
    fn emergency_stop_faults_until_reset() {
        let (controller, sent) = controller();
        controller
            .dispatch(ArmRequest::Action(SymbolicAction::EmergencyStop))
            .unwrap();
        assert!(sent
            .lock()
            .unwrap()
            .iter()
            .any(|frame| frame == b"STOP\r"));
        assert!(controller.snapshot().stale);

        let result = controller.dispatch(ArmRequest::Target {
            pose: TargetPose::World(Pose3D::at(200.0, 0.0, 150.0)),
            duration: None,
        });
        assert!(matches!(result, Err(ArmError::Faulted)));

        controller.reset(JointAngles::home()).unwrap();
        assert!(!controller.snapshot().stale);
        controller
            .dispatch(ArmRequest::Target {
                pose: TargetPose::World(Pose3D::at(200.0, 0.0, 150.0)),
                duration: None,
            })
            .unwrap();
    }

    #[test]
    fn solved_motion_respects_duration_request() {
        let (controller, sent) = controller();
        controller
            .dispatch(ArmRequest::Target {
                pose: TargetPose::World(Pose3D::at(200.0, 0.0, 150.0)),
                duration: Some(Duration::from_millis(1200)),
            })
            .unwrap();
        let text = String::from_utf8(sent.lock().unwrap()[0].clone()).unwrap();
        assert!(text.contains("T1200"));
    }
}
