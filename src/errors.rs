//! Unified error taxonomy for the control pipeline.
//!
//! Geometric and safety failures are decided locally and returned to the
//! caller; only link-level failures are retried (bounded) before surfacing.

use crate::joints::Joint;
use thiserror::Error;

/// Errors surfaced by the calibration, kinematics, safety and link layers.
#[derive(Debug, Error)]
pub enum ArmError {
    /// The pixel→world homography is missing or numerically singular.
    /// Fatal for pixel-frame requests until calibration is re-run.
    #[error("calibration error: {0}")]
    Calibration(String),

    /// Malformed numeric input (NaN/Inf coordinates or joint angles).
    /// Rejected immediately, never retried.
    #[error("invalid pose: {0}")]
    InvalidPose(String),

    /// The target is geometrically infeasible. Carries the planar wrist
    /// distance that was requested and the reachable annulus, so the
    /// caller can see by how much the target missed.
    #[error(
        "unreachable pose: wrist distance {distance:.1} mm outside reachable \
         range [{min_reach:.1}, {max_reach:.1}] mm"
    )]
    Unreachable {
        distance: f64,
        min_reach: f64,
        max_reach: f64,
    },

    /// The end effector would leave the configured workspace annulus.
    /// Motion is withheld; repositioning silently is never acceptable.
    #[error(
        "workspace violation: end effector radius {radius:.1} mm outside \
         [{min_radius:.1}, {max_radius:.1}] mm"
    )]
    WorkspaceViolation {
        radius: f64,
        min_radius: f64,
        max_radius: f64,
    },

    /// The end effector would drop below the configured collision floor.
    #[error("collision risk: end effector height {height:.1} mm below floor {floor:.1} mm")]
    CollisionRisk { height: f64, floor: f64 },

    /// The serial link stayed unresponsive through all retries. The arm's
    /// true position is unknown; the state is marked stale until re-homed.
    #[error("link timeout: no acknowledgment after {attempts} attempt(s)")]
    LinkTimeout { attempts: u32 },

    /// Transport failure while writing to or reading from the link.
    #[error("serial link error: {0}")]
    Link(String),

    /// The commander is in the faulted state and needs an explicit re-home.
    #[error("commander faulted; re-home required before new motion")]
    Faulted,

    /// Another motion request currently owns the commander. Rejected
    /// rather than queued, so a stale command is never executed late.
    #[error("commander busy with another motion request")]
    Busy,
}

/// Which servo a clamp applied to: a positioned joint or the gripper.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClampTarget {
    Joint(Joint),
    Gripper,
}

impl std::fmt::Display for ClampTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ClampTarget::Joint(joint) => write!(f, "{}", joint),
            ClampTarget::Gripper => write!(f, "gripper"),
        }
    }
}

/// Non-fatal report that a servo angle was clamped to its limit.
///
/// Clamps are warnings, not errors: the adjusted command still executes.
#[derive(Debug, Clone, PartialEq)]
pub struct JointClamp {
    pub joint: ClampTarget,
    pub requested: f64,
    pub clamped_to: f64,
}

impl std::fmt::Display for JointClamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} angle {:.2}° clamped to {:.2}°",
            self.joint, self.requested, self.clamped_to
        )
    }
}
