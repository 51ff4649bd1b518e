//! Shared record of the last confirmed arm position.
//!
//! One `ArmState` exists per controlled arm. Any component may take a
//! snapshot (the solver uses it for branch continuity, callers for status
//! display), but only the motion commander writes it, and only after the
//! controller has acknowledged a transmission. Updates swap the whole inner
//! record under the lock, so a reader never observes a half-updated joint
//! set.

use crate::joints::JointAngles;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// A consistent copy of the arm state at one instant.
#[derive(Debug, Clone, PartialEq)]
pub struct ArmSnapshot {
    /// Last confirmed joint angles. After a link timeout these describe the
    /// last position that was acknowledged, not where the arm may be now.
    pub joints: JointAngles,
    /// When the last confirmed update happened.
    pub updated_at: Instant,
    /// True while a confirmed move is still settling.
    pub moving: bool,
    /// True when the link failed and the physical position is unknown.
    /// Cleared only by a re-home.
    pub stale: bool,
}

#[derive(Debug, Clone)]
struct Inner {
    joints: JointAngles,
    updated_at: Instant,
    moving_until: Option<Instant>,
    stale: bool,
}

/// Process-wide arm state with single-writer discipline.
///
/// Every write swaps the whole inner record, so the value behind a
/// poisoned lock is still consistent and is recovered, not propagated.
#[derive(Debug)]
pub struct ArmState {
    inner: Mutex<Inner>,
}

impl ArmState {
    /// Creates the state at a known position, typically the home pose the
    /// arm is driven to at startup.
    pub fn new(initial: JointAngles) -> Self {
        ArmState {
            inner: Mutex::new(Inner {
                joints: initial,
                updated_at: Instant::now(),
                moving_until: None,
                stale: false,
            }),
        }
    }

    /// A stale-but-consistent snapshot for readers.
    pub fn snapshot(&self) -> ArmSnapshot {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        ArmSnapshot {
            joints: inner.joints,
            updated_at: inner.updated_at,
            moving: inner
                .moving_until
                .map(|until| Instant::now() < until)
                .unwrap_or(false),
            stale: inner.stale,
        }
    }

    /// Records an acknowledged motion. The arm counts as moving until the
    /// settle duration (the longest per-joint move time) has elapsed.
    pub(crate) fn confirm(&self, joints: JointAngles, settle: Duration) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let now = Instant::now();
        *inner = Inner {
            joints,
            updated_at: now,
            moving_until: if settle.is_zero() {
                None
            } else {
                Some(now + settle)
            },
            stale: false,
        };
    }

    /// Marks the position unknown after an unacknowledged transmission.
    /// The recorded joints stay at the last confirmed value.
    pub(crate) fn mark_stale(&self) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.stale = true;
        inner.moving_until = None;
    }

    /// Re-initializes from a known position (a re-home or calibration pose).
    pub(crate) fn reinitialize(&self, joints: JointAngles) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        *inner = Inner {
            joints,
            updated_at: Instant::now(),
            moving_until: None,
            stale: false,
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::joints::Gripper;

    #[test]
    fn starts_fresh_and_not_moving() {
        let state = ArmState::new(JointAngles::home());
        let snap = state.snapshot();
        assert_eq!(snap.joints, JointAngles::home());
        assert!(!snap.moving);
        assert!(!snap.stale);
    }

    #[test]
    fn confirm_swaps_whole_record() {
        let state = ArmState::new(JointAngles::home());
        let mut target = JointAngles::home();
        target.base = 120.0;
        target.gripper = Gripper::Closed;
        state.confirm(target, Duration::ZERO);
        let snap = state.snapshot();
        assert_eq!(snap.joints, target);
        assert!(!snap.moving);
    }

    #[test]
    fn moving_until_settle_elapses() {
        let state = ArmState::new(JointAngles::home());
        state.confirm(JointAngles::home(), Duration::from_secs(60));
        assert!(state.snapshot().moving);
        state.confirm(JointAngles::home(), Duration::ZERO);
        assert!(!state.snapshot().moving);
    }

    #[test]
    fn stale_keeps_last_confirmed_joints() {
        let state = ArmState::new(JointAngles::home());
        let mut confirmed = JointAngles::home();
        confirmed.elbow = 45.0;
        state.confirm(confirmed, Duration::ZERO);
        state.mark_stale();
        let snap = state.snapshot();
        assert!(snap.stale);
        assert_eq!(snap.joints, confirmed);
    }

    #[test]
    fn reinitialize_clears_stale() {
        let state = ArmState::new(JointAngles::home());
        state.mark_stale();
        state.reinitialize(JointAngles::home());
        assert!(!state.snapshot().stale);
    }
}
