//! Joint-limit and workspace validation.
//!
//! Validation is pure: it returns the (possibly clamped) joint set and the
//! list of clamp warnings, or a fatal violation. The caller decides whether
//! a clamped command is still acceptable. Clamping is only ever applied to
//! individual joints; a workspace or collision-floor violation withholds the
//! whole motion, because silently repositioning the end effector could place
//! an object somewhere unintended.

use crate::errors::{ArmError, ClampTarget, JointClamp};
use crate::geometry::ArmGeometry;
use crate::joints::{Gripper, Joint, JointAngles, JOINT_COUNT};
use crate::kinematics::ArmKinematics;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Inclusive angle range of one servo, in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct JointRange {
    pub min: f64,
    pub max: f64,
}

impl JointRange {
    pub fn new(min: f64, max: f64) -> Self {
        JointRange { min, max }
    }

    pub fn contains(&self, angle: f64) -> bool {
        angle >= self.min && angle <= self.max
    }

    pub fn clamp(&self, angle: f64) -> f64 {
        angle.clamp(self.min, self.max)
    }
}

/// Per-joint limits plus the workspace bound derived from the geometry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SafetyLimits {
    /// Limits for the positioned joints, in transmission order.
    pub joints: [JointRange; JOINT_COUNT],
    /// Limit for an explicit gripper angle.
    pub gripper: JointRange,
    /// Reachable end-effector radius range around the base axis.
    pub min_radius: f64,
    pub max_radius: f64,
    /// Minimum allowed end-effector height (table surface); `None`
    /// disables the collision-floor check.
    pub floor_z: Option<f64>,
}

impl SafetyLimits {
    /// Limits for the AL5D-class arm, with the workspace annulus derived
    /// from the given geometry and the collision floor at the table.
    pub fn al5d(geometry: &ArmGeometry) -> Self {
        SafetyLimits {
            joints: [
                JointRange::new(0.0, 180.0),  // base
                JointRange::new(20.0, 140.0), // shoulder
                JointRange::new(20.0, 165.0), // elbow
                JointRange::new(0.0, 180.0),  // wrist pitch
                JointRange::new(0.0, 180.0),  // wrist roll
            ],
            gripper: JointRange::new(0.0, 180.0),
            min_radius: (geometry.min_reach() - geometry.wrist).max(0.0),
            max_radius: geometry.max_reach() + geometry.wrist,
            floor_z: Some(0.0),
        }
    }
}

/// A validated joint set together with any clamp warnings produced.
#[derive(Debug, Clone, PartialEq)]
pub struct Validated {
    pub joints: JointAngles,
    pub clamps: Vec<JointClamp>,
}

/// Checks candidate joint sets against limits and workspace bounds.
#[derive(Debug, Clone)]
pub struct SafetyValidator {
    limits: SafetyLimits,
    kinematics: ArmKinematics,
}

impl SafetyValidator {
    pub fn new(limits: SafetyLimits, geometry: ArmGeometry) -> Self {
        SafetyValidator {
            limits,
            kinematics: ArmKinematics::new(geometry),
        }
    }

    pub fn limits(&self) -> &SafetyLimits {
        &self.limits
    }

    /// Validates a candidate joint set.
    ///
    /// Out-of-range joints are clamped to the nearest bound and reported as
    /// warnings so near-limit commands still execute. Workspace and floor
    /// violations are fatal. NaN or infinite angles are rejected outright;
    /// clamping a non-finite value would silently fabricate a position.
    pub fn validate(&self, candidate: &JointAngles) -> Result<Validated, ArmError> {
        if !candidate.is_finite() {
            return Err(ArmError::InvalidPose(
                "joint angles contain non-finite values".to_string(),
            ));
        }
        if let Gripper::At(angle) = candidate.gripper {
            if !angle.is_finite() {
                return Err(ArmError::InvalidPose(
                    "gripper angle is not finite".to_string(),
                ));
            }
        }

        let mut clamps = Vec::new();
        let mut angles = candidate.as_array();
        for (i, joint) in Joint::ALL.iter().enumerate() {
            let range = &self.limits.joints[i];
            if !range.contains(angles[i]) {
                let clamped = range.clamp(angles[i]);
                let clamp = JointClamp {
                    joint: ClampTarget::Joint(*joint),
                    requested: angles[i],
                    clamped_to: clamped,
                };
                warn!("{}", clamp);
                clamps.push(clamp);
                angles[i] = clamped;
            }
        }
        let mut joints = candidate.with_array(angles);
        if let Gripper::At(angle) = joints.gripper {
            if !self.limits.gripper.contains(angle) {
                let clamped = self.limits.gripper.clamp(angle);
                let clamp = JointClamp {
                    joint: ClampTarget::Gripper,
                    requested: angle,
                    clamped_to: clamped,
                };
                warn!("{}", clamp);
                clamps.push(clamp);
                joints.gripper = Gripper::At(clamped);
            }
        }

        // Workspace checks run on the clamped set: that is what would be
        // transmitted.
        let effector = self.kinematics.forward(&joints);
        let radius = effector.position.x.hypot(effector.position.y);
        if radius < self.limits.min_radius || radius > self.limits.max_radius {
            return Err(ArmError::WorkspaceViolation {
                radius,
                min_radius: self.limits.min_radius,
                max_radius: self.limits.max_radius,
            });
        }
        if let Some(floor) = self.limits.floor_z {
            if effector.position.z < floor {
                return Err(ArmError::CollisionRisk {
                    height: effector.position.z,
                    floor,
                });
            }
        }

        Ok(Validated { joints, clamps })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn validator() -> SafetyValidator {
        let geometry = ArmGeometry::al5d();
        SafetyValidator::new(SafetyLimits::al5d(&geometry), geometry)
    }

    #[test]
    fn in_range_joints_pass_unchanged() {
        let v = validator();
        let joints = JointAngles::home();
        let validated = v.validate(&joints).unwrap();
        assert_eq!(validated.joints, joints);
        assert!(validated.clamps.is_empty());
    }

    #[test]
    fn out_of_range_joint_clamped_with_warning() {
        let v = validator();
        let mut joints = JointAngles::home();
        joints.shoulder = 150.0; // above the 140° shoulder limit
        let validated = v.validate(&joints).unwrap();
        assert_relative_eq!(validated.joints.shoulder, 140.0);
        assert_eq!(validated.clamps.len(), 1);
        assert_eq!(validated.clamps[0].joint, ClampTarget::Joint(Joint::Shoulder));
        assert_relative_eq!(validated.clamps[0].requested, 150.0);
        assert_relative_eq!(validated.clamps[0].clamped_to, 140.0);
    }

    #[test]
    fn clamped_output_always_within_limits() {
        let v = validator();
        // Wildly out-of-range requests must still come back within limits.
        let joints = JointAngles {
            base: -720.0,
            shoulder: 1000.0,
            elbow: 90.0,
            wrist_pitch: -5.0,
            wrist_roll: 400.0,
            gripper: Gripper::At(270.0),
        };
        if let Ok(validated) = v.validate(&joints) {
            for (i, angle) in validated.joints.as_array().iter().enumerate() {
                assert!(v.limits().joints[i].contains(*angle));
            }
            assert!(matches!(validated.joints.gripper, Gripper::At(a)
                if v.limits().gripper.contains(a)));
        }
        // A workspace violation is also acceptable here; what is not
        // acceptable is an out-of-limit angle set.
    }

    #[test]
    fn gripper_clamp_reported_like_joint_clamps() {
        let v = validator();
        let mut joints = JointAngles::home();
        joints.gripper = Gripper::At(270.0);
        let validated = v.validate(&joints).unwrap();
        assert_eq!(validated.joints.gripper, Gripper::At(180.0));
        assert_eq!(validated.clamps.len(), 1);
        assert_eq!(validated.clamps[0].joint, ClampTarget::Gripper);
        assert_relative_eq!(validated.clamps[0].requested, 270.0);
        assert_relative_eq!(validated.clamps[0].clamped_to, 180.0);
    }

    #[test]
    fn nan_input_fails_not_clamps() {
        let v = validator();
        let mut joints = JointAngles::home();
        joints.wrist_pitch = f64::NAN;
        assert!(matches!(
            v.validate(&joints),
            Err(ArmError::InvalidPose(_))
        ));
        let mut joints = JointAngles::home();
        joints.gripper = Gripper::At(f64::INFINITY);
        assert!(matches!(
            v.validate(&joints),
            Err(ArmError::InvalidPose(_))
        ));
    }

    #[test]
    fn floor_violation_is_fatal() {
        let geometry = ArmGeometry::al5d();
        let mut limits = SafetyLimits::al5d(&geometry);
        // Raise the floor above anything the arm can do from home.
        limits.floor_z = Some(1000.0);
        let v = SafetyValidator::new(limits, geometry);
        assert!(matches!(
            v.validate(&JointAngles::home()),
            Err(ArmError::CollisionRisk { .. })
        ));
    }

    #[test]
    fn workspace_violation_is_fatal_and_never_clamped() {
        let geometry = ArmGeometry::al5d();
        let mut limits = SafetyLimits::al5d(&geometry);
        limits.max_radius = 10.0; // far tighter than the arm's reach
        let v = SafetyValidator::new(limits, geometry);
        let mut joints = JointAngles::home();
        joints.shoulder = 90.0;
        joints.elbow = 160.0; // reach outward
        match v.validate(&joints) {
            Err(ArmError::WorkspaceViolation { radius, .. }) => {
                assert!(radius > 10.0);
            }
            other => panic!("expected WorkspaceViolation, got {:?}", other),
        }
    }
}
