//! [`KinematicsGateway`] – one solver call per batch.
//!
//! The gateway reads the full `physical_coordinates` table, hands it to the
//! configured [`KinematicsSolver`] in a single call, checks the returned
//! shape, and only then replaces `joint_angles`.  A failed or malformed
//! result is discarded; nothing is persisted.

use armbridge_store::{InterchangeStore, schema};
use armbridge_types::{ArmError, JOINT_TABLE, JointAngleVector, PHYSICAL_TABLE, PhysicalPoint};
use tracing::{info, instrument, warn};

use crate::solver::KinematicsSolver;

/// Outcome of a successful gateway run.
#[derive(Debug, Clone, PartialEq)]
pub struct GatewayReport {
    /// Number of physical points sent, equal to the number of rows written.
    pub rows: usize,
    /// Degrees of freedom of the returned vectors (0 for an empty batch).
    pub joints: usize,
}

pub struct KinematicsGateway {
    solver: Box<dyn KinematicsSolver>,
}

impl KinematicsGateway {
    pub fn new(solver: Box<dyn KinematicsSolver>) -> Self {
        Self { solver }
    }

    pub fn solver_name(&self) -> &str {
        self.solver.name()
    }

    /// Call the solver once for `points` and validate the result.
    ///
    /// An empty batch returns an empty result without calling the solver.
    ///
    /// # Errors
    ///
    /// [`ArmError::Kinematics`] if the solver fails, returns a different
    /// number of vectors than points, returns empty or ragged vectors, or
    /// returns non-finite angles.
    pub fn solve(&self, points: &[PhysicalPoint]) -> Result<Vec<JointAngleVector>, ArmError> {
        if points.is_empty() {
            return Ok(Vec::new());
        }
        let angles = self.solver.solve(points).map_err(|e| {
            warn!(solver = self.solver.name(), error = %e, "solver call failed");
            ArmError::from(e)
        })?;
        validate(points.len(), &angles)?;
        Ok(angles)
    }

    /// Run the full stage: read physical points, solve, replace joint angles.
    #[instrument(skip_all, fields(solver = self.solver.name()))]
    pub fn run(&self, store: &mut InterchangeStore) -> Result<GatewayReport, ArmError> {
        let points = schema::physical_points_from_table(&store.read_table(PHYSICAL_TABLE)?)?;
        let angles = self.solve(&points)?;

        store.write_table(JOINT_TABLE, &schema::joint_angles_to_table(&angles))?;
        let report = GatewayReport {
            rows: angles.len(),
            joints: angles.first().map_or(0, JointAngleVector::len),
        };
        info!(rows = report.rows, joints = report.joints, "joint angles written");
        Ok(report)
    }
}

fn validate(expected: usize, angles: &[JointAngleVector]) -> Result<(), ArmError> {
    if angles.len() != expected {
        return Err(ArmError::Kinematics(format!(
            "solver returned {} angle vectors for {expected} points",
            angles.len()
        )));
    }
    let width = angles[0].len();
    if width == 0 {
        return Err(ArmError::Kinematics("solver returned empty angle vectors".to_string()));
    }
    for (idx, row) in angles.iter().enumerate() {
        if row.len() != width {
            return Err(ArmError::Kinematics(format!(
                "angle vector {} has {} joints, expected {width}",
                idx + 1,
                row.len()
            )));
        }
        if row.as_slice().iter().any(|a| !a.is_finite()) {
            return Err(ArmError::Kinematics(format!(
                "angle vector {} contains a non-finite value",
                idx + 1
            )));
        }
    }
    Ok(())
}
