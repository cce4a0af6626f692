//! [`MotionDispatcher`] – paced, sequential motion command dispatch.
//!
//! ```text
//! Idle ──(no rows)──────────────────────────────▶ Done
//!  │
//!  └─▶ Sending(0) ─▶ Sending(1) ─▶ … ─▶ Sending(n-1) ─▶ Done
//!          │              │                  │
//!          └──────────────┴── failure (abort policy) / cancel ──▶ Aborted
//! ```
//!
//! Each `Sending(i)` state builds a [`MotionCommand`] from row *i* and the
//! configured speed, runs one full link cycle, then sleeps for the
//! inter-command delay before the next row.  Under
//! [`FailurePolicy::ContinueOnError`] a failed command is logged and the
//! batch moves on; no command is ever retried.
//!
//! # Example
//!
//! ```rust
//! use std::time::Duration;
//! use armbridge_motion::{DispatchState, DispatcherConfig, DryRunLink, MotionDispatcher};
//! use armbridge_types::{JointAngleVector, MotionCommand};
//!
//! let config = DispatcherConfig { command_delay: Duration::ZERO, ..DispatcherConfig::default() };
//! let mut dispatcher = MotionDispatcher::new(DryRunLink::new(), config);
//!
//! let commands = vec![MotionCommand::new(JointAngleVector::new(vec![0.0; 7]), 500)];
//! let report = dispatcher.dispatch(&commands);
//! assert_eq!(report.final_state, DispatchState::Done);
//! assert_eq!(dispatcher.link().frames().len(), 1);
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use armbridge_store::{InterchangeStore, schema};
use armbridge_types::{ArmError, FailurePolicy, JOINT_TABLE, MotionCommand};
use tracing::{debug, info, instrument, warn};

use crate::link::ControllerLink;

/// Upper bound on how long a cancellation request can go unnoticed during the
/// inter-command delay.
const CANCEL_POLL: Duration = Duration::from_millis(50);

// ─────────────────────────────────────────────────────────────────────────────
// Config / state / report
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct DispatcherConfig {
    /// Speed appended to every command in the batch.
    pub speed: u32,
    /// Pause between consecutive commands.
    pub command_delay: Duration,
    /// Joint angles each row must carry.
    pub joint_count: usize,
    pub failure_policy: FailurePolicy,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            speed: 500,
            command_delay: Duration::from_secs(2),
            joint_count: 7,
            failure_policy: FailurePolicy::default(),
        }
    }
}

/// Where the dispatcher is in its batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchState {
    Idle,
    /// Handling the command at this 0-based row.
    Sending(usize),
    Done,
    Aborted,
}

impl DispatchState {
    pub fn is_terminal(self) -> bool {
        matches!(self, DispatchState::Done | DispatchState::Aborted)
    }
}

/// Summary of one batch.
#[derive(Debug, Clone, PartialEq)]
pub struct DispatchReport {
    pub final_state: DispatchState,
    /// Rows in the batch.
    pub total: usize,
    /// Commands whose link cycle completed.
    pub sent: usize,
    /// Failed commands as `(row, error)`.
    pub failures: Vec<(usize, ArmError)>,
    /// Response frames as `(row, text)`.
    pub responses: Vec<(usize, String)>,
    pub cancelled: bool,
}

impl DispatchReport {
    fn new(total: usize) -> Self {
        Self {
            final_state: DispatchState::Idle,
            total,
            sent: 0,
            failures: Vec::new(),
            responses: Vec::new(),
            cancelled: false,
        }
    }

    /// Rows that were never attempted.
    pub fn skipped(&self) -> usize {
        self.total - self.sent - self.failures.len()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// MotionDispatcher
// ─────────────────────────────────────────────────────────────────────────────

pub struct MotionDispatcher<L: ControllerLink> {
    link: L,
    config: DispatcherConfig,
    state: DispatchState,
    cancel: Arc<AtomicBool>,
}

impl<L: ControllerLink> MotionDispatcher<L> {
    pub fn new(link: L, config: DispatcherConfig) -> Self {
        Self {
            link,
            config,
            state: DispatchState::Idle,
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Share an external cancellation flag (e.g. set from a Ctrl-C handler).
    /// The flag is checked before every command and during every delay.
    pub fn with_cancel_flag(mut self, cancel: Arc<AtomicBool>) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn state(&self) -> DispatchState {
        self.state
    }

    pub fn link(&self) -> &L {
        &self.link
    }

    pub fn into_link(self) -> L {
        self.link
    }

    pub fn config(&self) -> &DispatcherConfig {
        &self.config
    }

    /// Read `joint_angles` and turn each row into a command.
    ///
    /// # Errors
    ///
    /// [`ArmError::Config`] if the table is missing, malformed, or a row does
    /// not carry exactly `joint_count` angles.
    pub fn load(&self, store: &InterchangeStore) -> Result<Vec<MotionCommand>, ArmError> {
        let rows = schema::joint_angles_from_table(&store.read_table(JOINT_TABLE)?)?;
        rows.into_iter()
            .enumerate()
            .map(|(idx, angles)| {
                if angles.len() != self.config.joint_count {
                    return Err(ArmError::Config(format!(
                        "joint_angles row {} has {} angles, expected {}",
                        idx + 1,
                        angles.len(),
                        self.config.joint_count
                    )));
                }
                Ok(MotionCommand::new(angles, self.config.speed))
            })
            .collect()
    }

    /// Load the stored batch and dispatch it.
    ///
    /// Load failures abort before any connection is opened.
    #[instrument(skip_all, fields(endpoint = self.link.endpoint()))]
    pub fn run(&mut self, store: &InterchangeStore) -> Result<DispatchReport, ArmError> {
        self.state = DispatchState::Idle;
        let commands = self.load(store).inspect_err(|e| {
            warn!(error = %e, "cannot load joint angles");
            self.state = DispatchState::Aborted;
        })?;
        Ok(self.dispatch(&commands))
    }

    /// Send `commands` in order, one link cycle each.
    pub fn dispatch(&mut self, commands: &[MotionCommand]) -> DispatchReport {
        let total = commands.len();
        let mut report = DispatchReport::new(total);
        self.state = DispatchState::Idle;

        for (idx, command) in commands.iter().enumerate() {
            if self.is_cancelled() {
                report.cancelled = true;
                self.state = DispatchState::Aborted;
                break;
            }
            self.state = DispatchState::Sending(idx);
            info!(point = idx + 1, total, command = %command, "moving to point");

            match self.link.exchange(&command.encode()) {
                Ok(response) => {
                    report.sent += 1;
                    match response {
                        Some(text) => {
                            info!(point = idx + 1, response = %text, "controller replied");
                            report.responses.push((idx, text));
                        }
                        None => debug!(point = idx + 1, "no controller reply"),
                    }
                }
                Err(e) => {
                    let err = ArmError::from(e);
                    warn!(point = idx + 1, error = %err, "motion command failed");
                    report.failures.push((idx, err));
                    if self.config.failure_policy == FailurePolicy::AbortOnFirstFailure {
                        self.state = DispatchState::Aborted;
                        break;
                    }
                }
            }

            if idx + 1 < total && !self.pause() {
                report.cancelled = true;
                self.state = DispatchState::Aborted;
                break;
            }
        }

        if !self.state.is_terminal() {
            self.state = DispatchState::Done;
        }
        report.final_state = self.state;
        info!(
            state = ?report.final_state,
            sent = report.sent,
            failed = report.failures.len(),
            total,
            "motion batch finished"
        );
        report
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::SeqCst)
    }

    // Sleep for the inter-command delay; false if cancelled meanwhile.
    fn pause(&self) -> bool {
        let deadline = Instant::now() + self.config.command_delay;
        loop {
            if self.is_cancelled() {
                return false;
            }
            let now = Instant::now();
            if now >= deadline {
                return true;
            }
            thread::sleep((deadline - now).min(CANCEL_POLL));
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
