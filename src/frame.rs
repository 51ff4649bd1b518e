//! World and arm-base coordinate frames.
//!
//! The vision side reports targets in a world frame anchored at the
//! calibration chessboard. The arm solves kinematics in its own base frame.
//! The two are related by a fixed rigid transform (rotation + translation)
//! measured once when the arm is bolted down; [`BaseFrame`] applies it.

use crate::errors::ArmError;
use nalgebra::{Isometry3, Point3, Translation3, UnitQuaternion, Vector3};
use serde::{Deserialize, Serialize};

/// Optional end-effector orientation. Pitch is the absolute angle of the
/// effector from horizontal (0 = level, positive = tilted up); roll is the
/// wrist rotation about the approach axis. Both in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Orientation {
    pub pitch: f64,
    pub roll: f64,
}

impl Orientation {
    pub fn level() -> Self {
        Orientation {
            pitch: 0.0,
            roll: 90.0,
        }
    }
}

/// A position in millimeters plus an optional end-effector orientation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Pose3D {
    pub position: Point3<f64>,
    pub orientation: Option<Orientation>,
}

impl Pose3D {
    /// Position-only pose; the solver picks a level orientation.
    pub fn at(x: f64, y: f64, z: f64) -> Self {
        Pose3D {
            position: Point3::new(x, y, z),
            orientation: None,
        }
    }

    pub fn oriented(x: f64, y: f64, z: f64, orientation: Orientation) -> Self {
        Pose3D {
            position: Point3::new(x, y, z),
            orientation: Some(orientation),
        }
    }

    /// True when every numeric component is finite.
    pub fn is_finite(&self) -> bool {
        let pos_ok = self.position.iter().all(|c| c.is_finite());
        let ori_ok = self
            .orientation
            .map(|o| o.pitch.is_finite() && o.roll.is_finite())
            .unwrap_or(true);
        pos_ok && ori_ok
    }
}

/// Fixed rigid transform taking world-frame points into the arm-base frame.
#[derive(Debug, Clone)]
pub struct BaseFrame {
    transform: Isometry3<f64>,
}

impl BaseFrame {
    /// The arm base coincides with the world origin.
    pub fn identity() -> Self {
        BaseFrame {
            transform: Isometry3::identity(),
        }
    }

    /// Builds the frame from an explicit isometry.
    pub fn new(transform: Isometry3<f64>) -> Self {
        BaseFrame { transform }
    }

    /// Frame with a pure shift: `world_origin_in_arm` is where the world
    /// origin lands in arm-base coordinates.
    pub fn translation(world_origin_in_arm: Vector3<f64>) -> Self {
        BaseFrame {
            transform: Isometry3::from_parts(
                Translation3::from(world_origin_in_arm),
                UnitQuaternion::identity(),
            ),
        }
    }

    /// Frame with a yaw (rotation about vertical) followed by a shift.
    /// Covers the common bench setup where the arm is mounted rotated on
    /// the same table the chessboard lies on.
    pub fn yaw_then_shift(yaw_degrees: f64, shift: Vector3<f64>) -> Self {
        let rotation =
            UnitQuaternion::from_axis_angle(&Vector3::z_axis(), yaw_degrees.to_radians());
        BaseFrame {
            transform: Isometry3::from_parts(Translation3::from(shift), rotation),
        }
    }

    /// Maps a world-frame pose into the arm-base frame.
    ///
    /// Pure and total apart from malformed input: NaN or infinite
    /// coordinates are rejected, everything else maps.
    pub fn to_arm_base(&self, pose: &Pose3D) -> Result<Pose3D, ArmError> {
        if !pose.is_finite() {
            return Err(ArmError::InvalidPose(format!(
                "world pose contains non-finite values: {:?}",
                pose.position
            )));
        }
        Ok(Pose3D {
            position: self.transform.transform_point(&pose.position),
            orientation: pose.orientation,
        })
    }
}
