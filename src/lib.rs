//! Control core for a 5 axis serial-servo robotic arm.
//!
//! This crate converts a desired end-effector pose (or a symbolic command such
//! as "open gripper") into verified joint-angle commands and transmits them to
//! a servo controller over a serial link. The pipeline is:
//!
//! camera pixel → world point ([`calibration`]) → arm-base frame ([`frame`]) →
//! joint angles ([`kinematics`]) → limit/workspace checks ([`safety`]) →
//! wire frames ([`wire`]) sent by the [`commander`], which confirms the move
//! and updates the shared [`arm_state`].
//!
//! # Features
//!
//! - Closed-form inverse kinematics with elbow-up/elbow-down branch selection
//!   by continuity with the previous joint state, and stable base-angle
//!   handling near the vertical axis.
//! - Every solution is cross-checked with forward kinematics; geometrically
//!   unreachable targets are rejected with reach diagnostics, never clamped.
//! - Joint limits are enforced by clamping with explicit warnings; workspace
//!   and collision-floor violations withhold the motion entirely.
//! - The serial protocol (`#<ID>D<tenths>\r`, optional `T<ms>` move time) is
//!   encoded deterministically, with acknowledgment, bounded retry with
//!   exponential backoff, and a fire-and-confirm-by-timeout mode for
//!   controllers that never reply.
//! - A single shared [`arm_state::ArmState`] records the last confirmed
//!   position; only the commander writes it, and a failed link marks it stale
//!   so callers know a re-home is required.
//!
//! The [`controller::ArmController`] ties the pipeline together behind a
//! tagged request type, rejecting concurrent motion requests instead of
//! queueing stale ones.

pub mod arm_state;
pub mod calibration;
pub mod commander;
pub mod controller;
pub mod errors;
pub mod frame;
pub mod geometry;
pub mod joints;
pub mod kinematics;
pub mod safety;
pub mod wire;
