//! Demonstration of the full pick pipeline against a simulated link.
//!
//! Calibrates from synthetic chessboard correspondences, then drives the arm
//! through a pixel-frame target, a world-frame target, gripper actions and a
//! return to home, printing every wire frame instead of writing to a serial
//! port. Point `SerialLink::open` at real hardware to run the same sequence
//! on an arm.

use anyhow::Result;
use nalgebra::Point2;
use rs_arm_control::calibration::{estimate_homography, CalibrationParams, ChessboardSpec};
use rs_arm_control::commander::{AckPolicy, CommanderConfig, ServoLink};
use rs_arm_control::controller::{
    ArmController, ArmRequest, ControllerConfig, SymbolicAction, TargetPose,
};
use rs_arm_control::errors::ArmError;
use rs_arm_control::frame::{BaseFrame, Pose3D};
use rs_arm_control::geometry::ArmGeometry;
use rs_arm_control::safety::SafetyLimits;
use std::time::Duration;
use tracing::info;

/// Prints frames to stdout instead of a serial port. Never replies, so the
/// commander runs in fire-and-confirm-by-timeout mode.
struct ConsoleLink;

impl ServoLink for ConsoleLink {
    fn transmit(&mut self, bytes: &[u8]) -> Result<(), ArmError> {
        for frame in String::from_utf8_lossy(bytes).split('\r') {
            if !frame.is_empty() {
                println!("  -> {}", frame);
            }
        }
        Ok(())
    }

    fn receive(&mut self, _timeout: Duration) -> Result<Vec<u8>, ArmError> {
        Ok(Vec::new())
    }
}

/// Simulated camera: a scaled, shifted view of the bench chessboard.
fn synthetic_calibration() -> Result<CalibrationParams, ArmError> {
    let board = ChessboardSpec::bench_default();
    let world = board.world_corners();
    let pixels: Vec<Point2<f64>> = world
        .iter()
        .map(|w| Point2::new(320.0 + 2.1 * w.x - 0.3 * w.y, 240.0 - 1.9 * w.y))
        .collect();
    let homography = estimate_homography(&pixels, &world)?;
    Ok(CalibrationParams {
        homography,
        board,
        working_plane_z: 20.0,
    })
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let geometry = ArmGeometry::al5d();
    let limits = SafetyLimits::al5d(&geometry);
    let commander_config = CommanderConfig {
        ack: AckPolicy::ConfirmByTimeout,
        ack_timeout_ms: 50,
        ..CommanderConfig::default()
    };
    let controller = ArmController::new(
        geometry,
        limits,
        BaseFrame::identity(),
        Box::new(ConsoleLink),
        commander_config,
        ControllerConfig::default(),
    );

    controller.calibrate(synthetic_calibration()?)?;
    info!("calibration installed");

    println!("Pixel target (520, 140), object height 25 mm:");
    let report = controller.dispatch(ArmRequest::Target {
        pose: TargetPose::Pixel {
            u: 520.0,
            v: 140.0,
            depth_hint: Some(25.0),
        },
        duration: Some(Duration::from_millis(1200)),
    })?;
    info!(?report.joints, "pixel target reached");

    println!("Close gripper:");
    controller.dispatch(ArmRequest::Action(SymbolicAction::CloseGripper))?;

    println!("World target (150, 120, 100):");
    controller.dispatch(ArmRequest::Target {
        pose: TargetPose::World(Pose3D::at(150.0, 120.0, 100.0)),
        duration: Some(Duration::from_millis(1500)),
    })?;

    println!("Open gripper:");
    controller.dispatch(ArmRequest::Action(SymbolicAction::OpenGripper))?;

    println!("Home:");
    controller.dispatch(ArmRequest::Action(SymbolicAction::Home))?;

    let snapshot = controller.snapshot();
    info!(?snapshot.joints, stale = snapshot.stale, "final arm state");
    Ok(())
}
