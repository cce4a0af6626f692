//! External solver backends.
//!
//! Both backends speak the same JSON documents:
//!
//! ```text
//! request:  {"points": [[x, y, z], ...]}
//! response: {"angles": [[a1, ..., aK], ...]}   or a bare [[...], ...]
//! ```
//!
//! The exchange is purely positional: no IDs are sent, and the response rows
//! are expected in request order.

use std::io::{ErrorKind, Write};
use std::process::{Command, Stdio};
use std::thread;
use std::time::Duration;

use armbridge_types::{ArmError, JointAngleVector, PhysicalPoint};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

// ─────────────────────────────────────────────────────────────────────────────
// Error type
// ─────────────────────────────────────────────────────────────────────────────

/// Errors that can arise while calling an external solver.
#[derive(Error, Debug)]
pub enum SolverError {
    #[error("I/O error talking to solver: {0}")]
    Io(#[from] std::io::Error),
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Malformed solver payload: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Solver exited with {status}: {stderr}")]
    ExitStatus { status: String, stderr: String },
    #[error("Invalid solver configuration: {0}")]
    Config(String),
}

impl From<SolverError> for ArmError {
    fn from(err: SolverError) -> Self {
        ArmError::Kinematics(err.to_string())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Trait
// ─────────────────────────────────────────────────────────────────────────────

/// A synchronous, blocking inverse-kinematics solver.
///
/// Implementations are called once per batch and must return one angle
/// vector per input point, in input order.  The gateway checks that contract;
/// implementations only need to report transport or format failures.
pub trait KinematicsSolver: Send + Sync {
    /// Short label used in logs, e.g. `"command:ik-solver"`.
    fn name(&self) -> &str;

    fn solve(&self, points: &[PhysicalPoint]) -> Result<Vec<JointAngleVector>, SolverError>;
}

// ─────────────────────────────────────────────────────────────────────────────
// Wire format
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Serialize)]
struct SolveRequest {
    points: Vec<[f64; 3]>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum SolveResponse {
    Wrapped { angles: Vec<Vec<f64>> },
    Bare(Vec<Vec<f64>>),
}

fn encode_request(points: &[PhysicalPoint]) -> SolveRequest {
    SolveRequest {
        points: points.iter().map(|p| p.to_array()).collect(),
    }
}

fn decode_response(bytes: &[u8]) -> Result<Vec<JointAngleVector>, SolverError> {
    let rows = match serde_json::from_slice::<SolveResponse>(bytes)? {
        SolveResponse::Wrapped { angles } => angles,
        SolveResponse::Bare(angles) => angles,
    };
    Ok(rows.into_iter().map(JointAngleVector::new).collect())
}

// ─────────────────────────────────────────────────────────────────────────────
// CommandSolver
// ─────────────────────────────────────────────────────────────────────────────

/// Runs an external program once per batch: the request is written to its
/// stdin and the response read from its stdout.
pub struct CommandSolver {
    label: String,
    program: String,
    args: Vec<String>,
}

impl CommandSolver {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        let program = program.into();
        Self {
            label: format!("command:{program}"),
            program,
            args,
        }
    }
}

impl KinematicsSolver for CommandSolver {
    fn name(&self) -> &str {
        &self.label
    }

    fn solve(&self, points: &[PhysicalPoint]) -> Result<Vec<JointAngleVector>, SolverError> {
        let body = serde_json::to_vec(&encode_request(points))?;

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;
        // Feed stdin from its own thread while stdout/stderr are drained here,
        // so a solver that answers while still reading cannot fill a pipe and
        // stall both sides.  stdin is closed when the thread drops it.
        let writer = child.stdin.take().map(|mut stdin| {
            thread::spawn(move || match stdin.write_all(&body) {
                // The solver may exit without reading everything.
                Err(e) if e.kind() == ErrorKind::BrokenPipe => Ok(()),
                other => other,
            })
        });
        let output = child.wait_with_output()?;

        if !output.status.success() {
            return Err(SolverError::ExitStatus {
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        if let Some(writer) = writer {
            writer
                .join()
                .map_err(|_| std::io::Error::other("solver stdin writer panicked"))??;
        }
        debug!(solver = %self.label, bytes = output.stdout.len(), "solver replied");
        decode_response(&output.stdout)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// HttpSolver
// ─────────────────────────────────────────────────────────────────────────────

/// POSTs the request to a remote solver service.
pub struct HttpSolver {
    label: String,
    url: String,
    client: reqwest::blocking::Client,
}

impl HttpSolver {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, SolverError> {
        let url = url.into();
        let client = reqwest::blocking::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            label: format!("http:{url}"),
            url,
            client,
        })
    }
}

impl KinematicsSolver for HttpSolver {
    fn name(&self) -> &str {
        &self.label
    }

    fn solve(&self, points: &[PhysicalPoint]) -> Result<Vec<JointAngleVector>, SolverError> {
        let bytes = self
            .client
            .post(&self.url)
            .json(&encode_request(points))
            .send()?
            .error_for_status()?
            .bytes()?;
        decode_response(&bytes)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Which solver backend to build, as written in the config file:
///
/// ```toml
/// [solver]
/// kind = "command"
/// program = "ik-solver"
/// args = ["--arm", "7dof"]
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum SolverConfig {
    Command {
        program: String,
        #[serde(default)]
        args: Vec<String>,
    },
    Http {
        url: String,
        #[serde(default = "default_http_timeout_secs")]
        timeout_secs: f64,
    },
}

fn default_http_timeout_secs() -> f64 {
    30.0
}

impl Default for SolverConfig {
    fn default() -> Self {
        SolverConfig::Command {
            program: "ik-solver".to_string(),
            args: Vec::new(),
        }
    }
}

impl SolverConfig {
    /// Construct the configured backend.
    pub fn build(&self) -> Result<Box<dyn KinematicsSolver>, SolverError> {
        match self {
            SolverConfig::Command { program, args } => {
                if program.trim().is_empty() {
                    return Err(SolverError::Config("solver program is empty".to_string()));
                }
                Ok(Box::new(CommandSolver::new(program.clone(), args.clone())))
            }
            SolverConfig::Http { url, timeout_secs } => {
                let timeout = Duration::try_from_secs_f64(*timeout_secs).map_err(|e| {
                    SolverError::Config(format!("invalid timeout_secs {timeout_secs}: {e}"))
                })?;
                Ok(Box::new(HttpSolver::new(url.clone(), timeout)?))
            }
        }
    }
}
