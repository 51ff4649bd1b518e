//! Defines the fixed geometry of the arm.

use serde::{Deserialize, Serialize};

/// Link lengths and mounting offsets of the arm, all in millimeters.
///
/// The arm is modeled as a rotating base column of height `base_height`,
/// an upper arm and forearm moving in the vertical plane selected by the
/// base rotation, and a wrist segment carrying the end effector.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ArmGeometry {
    /// Height of the shoulder joint above the arm mounting plane.
    pub base_height: f64,

    /// Length of the upper arm (shoulder joint to elbow joint).
    pub upper_arm: f64,

    /// Length of the forearm (elbow joint to wrist joint).
    pub forearm: f64,

    /// Length from the wrist joint to the end-effector reference point.
    pub wrist: f64,
}

impl ArmGeometry {
    /// Geometry of the AL5D-class arm this project was built around.
    pub fn al5d() -> Self {
        ArmGeometry {
            base_height: 70.0,
            upper_arm: 146.0,
            forearm: 185.0,
            wrist: 90.0,
        }
    }

    /// Longest planar distance the wrist joint can be from the shoulder.
    pub fn max_reach(&self) -> f64 {
        self.upper_arm + self.forearm
    }

    /// Shortest planar distance the wrist joint can be from the shoulder.
    pub fn min_reach(&self) -> f64 {
        (self.upper_arm - self.forearm).abs()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reach_annulus() {
        let g = ArmGeometry::al5d();
        assert_eq!(g.max_reach(), 146.0 + 185.0);
        assert_eq!(g.min_reach(), 185.0 - 146.0);
    }
}
