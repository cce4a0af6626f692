//! `armbridge-types` – shared data model for the camera-to-arm pipeline.
//!
//! Every stage (calibration, kinematics, motion) exchanges these values
//! through the interchange store; none of them hold another stage's state.

use serde::{Deserialize, Serialize};
use thiserror::Error;

// ─────────────────────────────────────────────────────────────────────────────
// Table names
// ─────────────────────────────────────────────────────────────────────────────

/// Named rows `(key, value)` holding `mx`, `cx`, `my`, `cy`.
pub const CALIBRATION_TABLE: &str = "calibration_parameters";
/// Sensor input rows `(label, x, y)`.
pub const PIXEL_TABLE: &str = "pixel_coordinates";
/// Calibrated rows `(label, physicalX, physicalY, physicalZ)`.
pub const PHYSICAL_TABLE: &str = "physical_coordinates";
/// Solver output rows `(Joint1..JointK)`, one per physical point.
pub const JOINT_TABLE: &str = "joint_angles";

// ─────────────────────────────────────────────────────────────────────────────
// Geometry
// ─────────────────────────────────────────────────────────────────────────────

/// Affine sensor-to-physical coefficients (scale and offset per axis).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CalibrationParameters {
    pub mx: f64,
    pub cx: f64,
    pub my: f64,
    pub cy: f64,
}

impl CalibrationParameters {
    /// Map a sensor coordinate into the physical frame, before unit scaling.
    pub fn apply(&self, x: f64, y: f64) -> (f64, f64) {
        (x * self.mx + self.cx, y * self.my + self.cy)
    }
}

/// A raw 2-D position in the camera's pixel frame.
///
/// Points carry no identity of their own: a point is known by its position in
/// the batch.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SensorPoint {
    pub x: f64,
    pub y: f64,
}

impl SensorPoint {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// A 3-D position in the robot's workspace frame, in meters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PhysicalPoint {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl PhysicalPoint {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    pub fn to_array(self) -> [f64; 3] {
        [self.x, self.y, self.z]
    }
}

/// One row of controller-space joint values produced for a physical point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JointAngleVector(pub Vec<f64>);

impl JointAngleVector {
    pub fn new(angles: Vec<f64>) -> Self {
        Self(angles)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.0
    }
}

impl From<Vec<f64>> for JointAngleVector {
    fn from(angles: Vec<f64>) -> Self {
        Self(angles)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Motion command
// ─────────────────────────────────────────────────────────────────────────────

/// A joint-angle target plus the batch-wide speed, ready for transmission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MotionCommand {
    pub angles: JointAngleVector,
    pub speed: u32,
}

impl MotionCommand {
    pub fn new(angles: JointAngleVector, speed: u32) -> Self {
        Self { angles, speed }
    }

    /// Render the controller frame, e.g.
    /// `set_angles(0.0, 12.5, -30.0, 0.0, 45.0, 0.0, 90.0, 500)\n`.
    pub fn encode(&self) -> String {
        format!("{self}\n")
    }
}

impl std::fmt::Display for MotionCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "set_angles(")?;
        for angle in self.angles.as_slice() {
            write!(f, "{}, ", format_angle(*angle))?;
        }
        write!(f, "{})", self.speed)
    }
}

// Integral values keep a trailing ".0" so the controller always sees a float.
fn format_angle(value: f64) -> String {
    if value.is_finite() && value.fract() == 0.0 {
        format!("{value:.1}")
    } else {
        format!("{value}")
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Policies
// ─────────────────────────────────────────────────────────────────────────────

/// How the coordinate pipeline treats sensor rows with a missing X or Y.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RowPolicy {
    /// Skip incomplete rows silently.
    #[default]
    Lenient,
    /// Reject the whole batch on the first incomplete row.
    Strict,
}

/// How the motion dispatcher reacts to a failed command.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// Log the failure and move on to the next command.
    #[default]
    #[serde(rename = "continue")]
    ContinueOnError,
    /// Stop the batch at the first failed command.
    #[serde(rename = "abort")]
    AbortOnFirstFailure,
}

// ─────────────────────────────────────────────────────────────────────────────
// Errors
// ─────────────────────────────────────────────────────────────────────────────

/// Error taxonomy shared by every stage.
///
/// `Config` and `Kinematics` abort the owning stage before anything is
/// written; `Transport` is raised per motion command.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ArmError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Kinematics error: {0}")]
    Kinematics(String),

    #[error("Transport error on {endpoint}: {details}")]
    Transport { endpoint: String, details: String },

    #[error("Store error: {0}")]
    Store(String),

    #[error("Cancelled")]
    Cancelled,
}
