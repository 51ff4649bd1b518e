//! Transmits validated motions over the serial link and confirms them.
//!
//! The commander owns the link and the single write path to the shared
//! [`ArmState`]. A send walks the state machine
//! `Idle → Sending → AwaitingAck → {Idle, Retrying → Sending, Faulted}`:
//! each attempt transmits the full frame sequence and waits up to the
//! configured timeout for the controller's acknowledgment, growing the wait
//! by the backoff multiplier on every retry. When the retry budget is
//! exhausted the commander faults, the state is marked stale (the physical
//! position is no longer known), and no further motion is accepted until an
//! explicit re-home. Hardware that never acknowledges is supported by the
//! fire-and-confirm-by-timeout policy.

use crate::arm_state::ArmState;
use crate::errors::ArmError;
use crate::joints::JointAngles;
use crate::wire::{self, MotionCommand};
use serde::{Deserialize, Serialize};
use std::io::Read;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Granularity of the acknowledgment wait; the shutdown flag is checked
/// between slices so the blocking wait stays cancellable.
const WAIT_SLICE: Duration = Duration::from_millis(10);

/// Byte transport to the servo controller.
///
/// The pipeline only ever talks to this trait, so tests and the demo binary
/// can substitute scripted links for real hardware.
pub trait ServoLink: Send {
    /// Writes one frame sequence to the controller.
    fn transmit(&mut self, bytes: &[u8]) -> Result<(), ArmError>;

    /// Reads whatever response bytes arrive within `timeout`. An empty
    /// vector means the controller stayed silent.
    fn receive(&mut self, timeout: Duration) -> Result<Vec<u8>, ArmError>;
}

/// [`ServoLink`] over a physical serial port.
pub struct SerialLink {
    port: Box<dyn serialport::SerialPort>,
}

impl SerialLink {
    /// Opens the port at the given baud rate (the controller expects
    /// 115200 8N1 by default).
    pub fn open(path: &str, baud_rate: u32) -> Result<Self, ArmError> {
        let port = serialport::new(path, baud_rate)
            .timeout(WAIT_SLICE)
            .open()
            .map_err(|e| ArmError::Link(format!("cannot open {}: {}", path, e)))?;
        Ok(SerialLink { port })
    }
}

impl ServoLink for SerialLink {
    fn transmit(&mut self, bytes: &[u8]) -> Result<(), ArmError> {
        self.port
            .write_all(bytes)
            .and_then(|_| self.port.flush())
            .map_err(|e| ArmError::Link(format!("serial write failed: {}", e)))
    }

    fn receive(&mut self, timeout: Duration) -> Result<Vec<u8>, ArmError> {
        self.port
            .set_timeout(timeout.max(Duration::from_millis(1)))
            .map_err(|e| ArmError::Link(format!("serial timeout setup failed: {}", e)))?;
        let mut buf = [0u8; 64];
        match self.port.read(&mut buf) {
            Ok(n) => Ok(buf[..n].to_vec()),
            Err(e) if e.kind() == std::io::ErrorKind::TimedOut => Ok(Vec::new()),
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => Ok(Vec::new()),
            Err(e) => Err(ArmError::Link(format!("serial read failed: {}", e))),
        }
    }
}

/// How a transmission is considered acknowledged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AckPolicy {
    /// The controller replies; the response must contain this token.
    Token(Vec<u8>),
    /// The controller never replies (the original Arduino sketch does not):
    /// wait out the timeout once and treat silence as success.
    ConfirmByTimeout,
}

/// Retry and acknowledgment configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommanderConfig {
    /// Retry attempts after the first transmission fails to confirm.
    pub max_retries: u32,
    /// Acknowledgment wait for the first attempt, in milliseconds.
    pub ack_timeout_ms: u64,
    /// Growth factor applied to the wait on each retry.
    pub backoff_multiplier: f64,
    pub ack: AckPolicy,
}

impl Default for CommanderConfig {
    fn default() -> Self {
        CommanderConfig {
            max_retries: 3,
            ack_timeout_ms: 250,
            backoff_multiplier: 2.0,
            ack: AckPolicy::Token(b"OK".to_vec()),
        }
    }
}

/// Where the commander is in its send cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Sending,
    AwaitingAck,
    Retrying,
    /// Terminal until [`MotionCommander::reset`].
    Faulted,
}

/// Confirmation of a completed transmission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ack {
    /// How many transmission attempts it took.
    pub attempts: u32,
}

/// Owns the serial link and issues motion commands.
pub struct MotionCommander {
    link: Box<dyn ServoLink>,
    config: CommanderConfig,
    phase: Phase,
    state: Arc<ArmState>,
    shutdown: Arc<AtomicBool>,
}

impl MotionCommander {
    pub fn new(link: Box<dyn ServoLink>, config: CommanderConfig, state: Arc<ArmState>) -> Self {
        MotionCommander {
            link,
            config,
            phase: Phase::Idle,
            state,
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Flag that cancels a pending acknowledgment wait when the process is
    /// shutting down. Safe to store and set from another thread.
    pub fn shutdown_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.shutdown)
    }

    /// Transmits a validated motion and waits for confirmation.
    ///
    /// On success the shared state atomically becomes the commanded joint
    /// set. On exhausted retries the commander faults and the state is
    /// marked stale but keeps its last confirmed value; the caller must
    /// re-home before commanding further motion.
    pub fn send(&mut self, command: &MotionCommand) -> Result<Ack, ArmError> {
        if self.phase == Phase::Faulted {
            return Err(ArmError::Faulted);
        }
        let bytes = wire::encode(command)?;
        let total_attempts = self.config.max_retries + 1;
        let mut wait = Duration::from_millis(self.config.ack_timeout_ms);

        for attempt in 1..=total_attempts {
            self.phase = Phase::Sending;
            debug!(attempt, frame = %String::from_utf8_lossy(&bytes).trim_end(), "transmitting");
            let transmitted = self.link.transmit(&bytes);

            let acked = match transmitted {
                Ok(()) => {
                    self.phase = Phase::AwaitingAck;
                    self.await_ack(wait)?
                }
                Err(e) => {
                    warn!(attempt, "transmit failed: {}", e);
                    false
                }
            };

            if acked {
                self.phase = Phase::Idle;
                self.state.confirm(command.joints, command.settle_time());
                info!(attempts = attempt, "motion confirmed");
                return Ok(Ack { attempts: attempt });
            }

            if attempt < total_attempts {
                self.phase = Phase::Retrying;
                warn!(attempt, wait_ms = wait.as_millis() as u64, "no acknowledgment, retrying");
                wait = Duration::from_secs_f64(
                    wait.as_secs_f64() * self.config.backoff_multiplier.max(1.0),
                );
            }
        }

        self.phase = Phase::Faulted;
        self.state.mark_stale();
        Err(ArmError::LinkTimeout {
            attempts: total_attempts,
        })
    }

    /// Sends the immediate halt frame. The arm stops mid-trajectory, so the
    /// recorded position can no longer be trusted: the commander faults and
    /// the state is marked stale until re-homed.
    pub fn emergency_stop(&mut self) -> Result<(), ArmError> {
        let result = self.link.transmit(wire::encode_stop());
        self.phase = Phase::Faulted;
        self.state.mark_stale();
        warn!("emergency stop issued");
        result
    }

    /// Clears a fault after the arm has been physically brought to a known
    /// position, re-initializing the shared state from it.
    pub fn reset(&mut self, known_position: JointAngles) {
        self.phase = Phase::Idle;
        self.state.reinitialize(known_position);
        info!("commander reset; state re-homed");
    }

    /// Waits for the acknowledgment according to policy. Returns `Ok(false)`
    /// when the controller stayed silent past the deadline.
    fn await_ack(&mut self, timeout: Duration) -> Result<bool, ArmError> {
        let deadline = Instant::now() + timeout;
        match self.config.ack.clone() {
            AckPolicy::Token(token) => {
                let mut seen = Vec::new();
                loop {
                    if self.shutdown.load(Ordering::Relaxed) {
                        return Err(self.cancel());
                    }
                    let now = Instant::now();
                    if now >= deadline {
                        return Ok(false);
                    }
                    let slice = WAIT_SLICE.min(deadline - now);
                    // The frames already went out; with the read side broken
                    // this motion can never be confirmed.
                    let chunk = match self.link.receive(slice) {
                        Ok(chunk) => chunk,
                        Err(e) => return Err(self.fail_unconfirmed(e)),
                    };
                    seen.extend_from_slice(&chunk);
                    if contains_token(&seen, &token) {
                        return Ok(true);
                    }
                }
            }
            AckPolicy::ConfirmByTimeout => {
                while Instant::now() < deadline {
                    if self.shutdown.load(Ordering::Relaxed) {
                        return Err(self.cancel());
                    }
                    std::thread::sleep(WAIT_SLICE.min(deadline - Instant::now()));
                }
                Ok(true)
            }
        }
    }

    /// A transmission that can no longer be confirmed leaves the arm
    /// position uncertain: fault and mark stale, then surface `error`.
    fn fail_unconfirmed(&mut self, error: ArmError) -> ArmError {
        self.phase = Phase::Faulted;
        self.state.mark_stale();
        error
    }

    fn cancel(&mut self) -> ArmError {
        self.fail_unconfirmed(ArmError::Link(
            "acknowledgment wait cancelled by shutdown".to_string(),
        ))
    }
}

fn contains_token(haystack: &[u8], token: &[u8]) -> bool {
    if token.is_empty() {
        return true;
    }
    haystack.windows(token.len()).any(|w| w == token)
}
