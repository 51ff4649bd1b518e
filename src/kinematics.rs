//! Closed-form inverse and forward kinematics for the 5 axis arm.
//!
//! The arm decomposes into a rotating base selecting a vertical plane, a
//! two-link (upper arm + forearm) chain solved in that plane by the law of
//! cosines, and a wrist whose pitch keeps the end-effector orientation
//! absolute. Two planar branches exist (elbow-up and elbow-down); the solver
//! picks the branch whose elbow angle is closest to the current one so that
//! consecutive nearby targets never make the elbow jump between
//! configurations.
//!
//! All angles in [`JointAngles`] are servo-space degrees. The elbow angle is
//! the interior angle between upper arm and forearm for the elbow-up branch
//! and its 360° reflex for elbow-down, which keeps the two branches distinct
//! in servo space while sharing one forward-kinematic formula.

use crate::errors::ArmError;
use crate::frame::{Orientation, Pose3D};
use crate::geometry::ArmGeometry;
use crate::joints::{Gripper, JointAngles};

/// Maximum allowed position error when a solution is reconstructed with
/// forward kinematics, in millimeters.
pub const POSITION_TOLERANCE_MM: f64 = 0.5;

/// Radial distance from the base axis under which the target is treated as
/// on-axis: the base angle is kept from the previous state instead of
/// flipping with the unstable atan2 of a near-zero vector.
const NEAR_AXIS_MM: f64 = 0.5;

/// Numeric slack for the reachability boundary check.
const REACH_EPS: f64 = 1e-9;

/// Solves and verifies joint angles for the configured geometry.
#[derive(Debug, Clone)]
pub struct ArmKinematics {
    geometry: ArmGeometry,
}

impl ArmKinematics {
    pub fn new(geometry: ArmGeometry) -> Self {
        ArmKinematics { geometry }
    }

    pub fn geometry(&self) -> &ArmGeometry {
        &self.geometry
    }

    /// Computes the joint angles reaching `target` (in the arm-base frame).
    ///
    /// `current` supplies branch continuity and the retained base angle near
    /// the vertical axis; when absent the solver falls back to elbow-up.
    /// A target outside the reachable annulus fails with
    /// [`ArmError::Unreachable`]; the solver never clamps geometry.
    pub fn inverse(
        &self,
        target: &Pose3D,
        current: Option<&JointAngles>,
    ) -> Result<JointAngles, ArmError> {
        if !target.is_finite() {
            return Err(ArmError::InvalidPose(format!(
                "target pose contains non-finite values: {:?}",
                target.position
            )));
        }
        let g = &self.geometry;
        let (x, y, z) = (target.position.x, target.position.y, target.position.z);

        let orientation = target.orientation.unwrap_or(Orientation {
            pitch: 0.0,
            roll: current.map(|c| c.wrist_roll).unwrap_or(90.0),
        });
        let pitch = orientation.pitch.to_radians();

        // Base rotation. On the axis itself atan2 is meaningless; keep the
        // previous base angle rather than snapping to an arbitrary one.
        let radial = x.hypot(y);
        let base = if radial < NEAR_AXIS_MM {
            current.map(|c| c.base).unwrap_or(90.0)
        } else {
            y.atan2(x).to_degrees()
        };

        // Project into the vertical plane: the wrist joint must sit short of
        // the end effector by the wrist length along the approach direction.
        let r_wrist = radial - g.wrist * pitch.cos();
        let h_wrist = (z - g.base_height) - g.wrist * pitch.sin();
        let d = r_wrist.hypot(h_wrist);

        if d > g.max_reach() + REACH_EPS || d < g.min_reach() - REACH_EPS || d < REACH_EPS {
            return Err(ArmError::Unreachable {
                distance: d,
                min_reach: g.min_reach(),
                max_reach: g.max_reach(),
            });
        }

        let (l1, l2) = (g.upper_arm, g.forearm);
        // Within the validated annulus the cosines can only leave [-1, 1]
        // by floating point noise.
        let cos_interior = ((l1 * l1 + l2 * l2 - d * d) / (2.0 * l1 * l2)).clamp(-1.0, 1.0);
        let interior = cos_interior.acos().to_degrees();
        let theta1 = h_wrist.atan2(r_wrist);
        let cos_offset = ((l1 * l1 + d * d - l2 * l2) / (2.0 * l1 * d)).clamp(-1.0, 1.0);
        let theta2 = cos_offset.acos();

        // Elbow-up and elbow-down branches.
        let up = ((theta1 + theta2).to_degrees(), interior);
        let down = ((theta1 - theta2).to_degrees(), 360.0 - interior);
        let (shoulder, elbow) = match current {
            Some(c) => {
                if (up.1 - c.elbow).abs() <= (down.1 - c.elbow).abs() {
                    up
                } else {
                    down
                }
            }
            None => up,
        };

        // Absolute effector pitch: subtract the accumulated shoulder and
        // elbow rotation from the requested orientation.
        let wrist_pitch = 180.0 + orientation.pitch - shoulder - elbow;

        Ok(JointAngles {
            base,
            shoulder,
            elbow,
            wrist_pitch,
            wrist_roll: orientation.roll,
            gripper: current.map(|c| c.gripper).unwrap_or(Gripper::Open),
        })
    }

    /// Reconstructs the end-effector pose from joint angles.
    ///
    /// Used to cross-check inverse solutions and by the safety validator to
    /// measure the commanded end-effector position.
    pub fn forward(&self, joints: &JointAngles) -> Pose3D {
        let g = &self.geometry;
        let s = joints.shoulder.to_radians();
        // Forearm absolute angle from horizontal; the elbow servo angle is
        // interior (or reflex) so 180° marks the straightened arm.
        let forearm_abs = s + joints.elbow.to_radians() - std::f64::consts::PI;
        let pitch_deg = joints.shoulder + joints.elbow + joints.wrist_pitch - 180.0;
        let pitch = pitch_deg.to_radians();

        let r = g.upper_arm * s.cos() + g.forearm * forearm_abs.cos() + g.wrist * pitch.cos();
        let h = g.upper_arm * s.sin() + g.forearm * forearm_abs.sin() + g.wrist * pitch.sin();

        let base = joints.base.to_radians();
        Pose3D {
            position: nalgebra::Point3::new(r * base.cos(), r * base.sin(), h + g.base_height),
            orientation: Some(Orientation {
                pitch: pitch_deg,
                roll: joints.wrist_roll,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn solver() -> ArmKinematics {
        ArmKinematics::new(ArmGeometry::al5d())
    }

    /// Geometry without a wrist segment, so targets are wrist positions and
    /// the reachable annulus is exactly [|l1-l2|, l1+l2].
    fn wristless() -> ArmKinematics {
        ArmKinematics::new(ArmGeometry {
            base_height: 70.0,
            upper_arm: 146.0,
            forearm: 185.0,
            wrist: 0.0,
        })
    }

    fn assert_round_trip(kin: &ArmKinematics, target: &Pose3D, current: Option<&JointAngles>) {
        let joints = kin.inverse(target, current).unwrap();
        let rebuilt = kin.forward(&joints);
        let error = (rebuilt.position - target.position).norm();
        assert!(
            error < POSITION_TOLERANCE_MM,
            "FK reconstruction off by {:.4} mm for {:?} -> {:?}",
            error,
            target.position,
            joints
        );
    }

    #[test]
    fn reachable_targets_reconstruct_within_tolerance() {
        let kin = wristless();
        let g = *kin.geometry();
        // Sweep the annulus at several base rotations and heights.
        for base_deg in [0.0_f64, 30.0, 90.0, 150.0] {
            for reach in [g.min_reach() + 5.0, 150.0, 250.0, g.max_reach() - 5.0] {
                for dz in [-50.0, 0.0, 80.0] {
                    let planar = (reach * reach - dz * dz).sqrt();
                    if !planar.is_finite() || planar < 1.0 {
                        continue;
                    }
                    let rad = base_deg.to_radians();
                    let target = Pose3D::at(
                        planar * rad.cos(),
                        planar * rad.sin(),
                        g.base_height + dz,
                    );
                    assert_round_trip(&kin, &target, None);
                }
            }
        }
    }

    #[test]
    fn oriented_targets_reconstruct_with_wrist() {
        let kin = solver();
        for pitch in [-45.0, 0.0, 30.0] {
            let target = Pose3D::oriented(
                180.0,
                60.0,
                120.0,
                Orientation { pitch, roll: 45.0 },
            );
            let joints = kin.inverse(&target, None).unwrap();
            let rebuilt = kin.forward(&joints);
            assert!((rebuilt.position - target.position).norm() < POSITION_TOLERANCE_MM);
            let orientation = rebuilt.orientation.unwrap();
            assert_relative_eq!(orientation.pitch, pitch, epsilon = 1e-9);
            assert_relative_eq!(orientation.roll, 45.0);
        }
    }

    #[test]
    fn beyond_annulus_fails_with_diagnostics() {
        let kin = wristless();
        let g = *kin.geometry();
        // 1 mm past full extension along x, at shoulder height.
        let target = Pose3D::at(g.max_reach() + 1.0, 0.0, g.base_height);
        match kin.inverse(&target, None) {
            Err(ArmError::Unreachable {
                distance,
                min_reach,
                max_reach,
            }) => {
                assert_relative_eq!(distance, g.max_reach() + 1.0, epsilon = 1e-9);
                assert_relative_eq!(max_reach, g.max_reach());
                assert_relative_eq!(min_reach, g.min_reach());
            }
            other => panic!("expected Unreachable, got {:?}", other),
        }
    }

    #[test]
    fn inside_annulus_fails_not_clamps() {
        let kin = wristless();
        let g = *kin.geometry();
        let target = Pose3D::at(g.min_reach() - 1.0, 0.0, g.base_height);
        assert!(matches!(
            kin.inverse(&target, None),
            Err(ArmError::Unreachable { .. })
        ));
    }

    #[test]
    fn non_finite_target_rejected() {
        let kin = solver();
        let target = Pose3D::at(f64::NAN, 0.0, 100.0);
        assert!(matches!(
            kin.inverse(&target, None),
            Err(ArmError::InvalidPose(_))
        ));
    }

    #[test]
    fn near_axis_target_keeps_previous_base_angle() {
        let kin = wristless();
        let mut current = JointAngles::home();
        current.base = 137.0;
        let target = Pose3D::at(0.0, 0.0, kin.geometry().base_height + 200.0);
        let joints = kin.inverse(&target, Some(&current)).unwrap();
        assert_relative_eq!(joints.base, 137.0);
    }

    #[test]
    fn elbow_up_is_the_default_branch() {
        let kin = wristless();
        let target = Pose3D::at(200.0, 0.0, 150.0);
        let joints = kin.inverse(&target, None).unwrap();
        // Interior elbow angle: the elbow-up branch stays below 180°.
        assert!(joints.elbow < 180.0);
    }

    #[test]
    fn branch_follows_current_elbow_angle() {
        let kin = wristless();
        let target = Pose3D::at(200.0, 0.0, 150.0);

        let mut from_up = JointAngles::home();
        from_up.elbow = 100.0;
        let up = kin.inverse(&target, Some(&from_up)).unwrap();
        assert!(up.elbow < 180.0);

        let mut from_down = JointAngles::home();
        from_down.elbow = 280.0;
        let down = kin.inverse(&target, Some(&from_down)).unwrap();
        assert!(down.elbow > 180.0);

        // Both branches reach the same point.
        let p_up = kin.forward(&up).position;
        let p_down = kin.forward(&down).position;
        assert!((p_up - p_down).norm() < POSITION_TOLERANCE_MM);
    }

    #[test]
    fn branch_stable_under_small_perturbations() {
        let kin = wristless();
        let mut current = kin
            .inverse(&Pose3D::at(200.0, 0.0, 150.0), None)
            .unwrap();
        // Walk the target around in sub-millimeter steps; the elbow must
        // stay on one branch the whole way.
        for i in 0..50 {
            let wobble = 0.3 * (i as f64 * 0.7).sin();
            let target = Pose3D::at(200.0 + wobble, wobble, 150.0 - wobble);
            let next = kin.inverse(&target, Some(&current)).unwrap();
            assert!(
                (next.elbow - current.elbow).abs() < 5.0,
                "elbow jumped from {:.2} to {:.2}",
                current.elbow,
                next.elbow
            );
            current = next;
        }
    }

    #[test]
    fn wrist_pitch_makes_orientation_absolute() {
        let kin = solver();
        // Same level orientation requested at two different heights must
        // produce the same reconstructed pitch despite different shoulder
        // and elbow angles.
        let a = kin.inverse(&Pose3D::at(200.0, 0.0, 80.0), None).unwrap();
        let b = kin.inverse(&Pose3D::at(200.0, 0.0, 180.0), None).unwrap();
        assert!((a.shoulder - b.shoulder).abs() > 1.0);
        let pitch_a = kin.forward(&a).orientation.unwrap().pitch;
        let pitch_b = kin.forward(&b).orientation.unwrap().pitch;
        assert_relative_eq!(pitch_a, 0.0, epsilon = 1e-9);
        assert_relative_eq!(pitch_b, 0.0, epsilon = 1e-9);
    }
}
