//! Stage runners behind each subcommand.  Printing lives in `main.rs`.

use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use armbridge_calibration::{CoordinatePipeline, PipelineReport};
use armbridge_kinematics::{GatewayReport, KinematicsGateway};
use armbridge_motion::{
    ControllerLink, DispatchReport, DispatcherConfig, DryRunLink, MotionDispatcher,
};
use armbridge_store::{InterchangeStore, Table, schema};
use armbridge_types::{
    ArmError, CALIBRATION_TABLE, CalibrationParameters, FailurePolicy, JOINT_TABLE, PHYSICAL_TABLE,
    PIXEL_TABLE, RowPolicy,
};
use tracing::info;

use crate::config::{self, Config};

/// Write the default config to `path`.  Returns `false` if a file already
/// exists and `force` is not set.
pub fn init(path: &Path, force: bool) -> Result<bool, String> {
    if path.exists() && !force {
        return Ok(false);
    }
    config::save_to(&Config::default(), path)?;
    info!(path = %path.display(), "default config written");
    Ok(true)
}

pub fn set_calibration(
    store: &mut InterchangeStore,
    params: &CalibrationParameters,
) -> Result<(), ArmError> {
    for (key, value) in [("mx", params.mx), ("cx", params.cx), ("my", params.my), ("cy", params.cy)] {
        if !value.is_finite() {
            return Err(ArmError::Config(format!("calibration parameter '{key}' must be finite")));
        }
    }
    store.write_table(CALIBRATION_TABLE, &schema::calibration_to_table(params))?;
    info!(?params, "calibration parameters replaced");
    Ok(())
}

/// Replace `name` with the `{ "header": [...], "rows": [[...]] }` document at
/// `file`.  Well-known tables are decoded first so a malformed document never
/// reaches the store.
pub fn import_table(store: &mut InterchangeStore, name: &str, file: &Path) -> Result<Table, ArmError> {
    let raw = fs::read_to_string(file)
        .map_err(|e| ArmError::Config(format!("cannot read {}: {e}", file.display())))?;
    let table: Table = serde_json::from_str(&raw)
        .map_err(|e| ArmError::Config(format!("cannot parse {}: {e}", file.display())))?;

    match name {
        CALIBRATION_TABLE => {
            schema::calibration_from_table(&table)?;
        }
        PIXEL_TABLE => {
            schema::sensor_points_from_table(&table, RowPolicy::Lenient)?;
        }
        PHYSICAL_TABLE => {
            schema::physical_points_from_table(&table)?;
        }
        JOINT_TABLE => {
            schema::joint_angles_from_table(&table)?;
        }
        _ => {}
    }

    store.write_table(name, &table)?;
    info!(table = name, rows = table.len(), "table imported");
    Ok(table)
}

pub fn calibrate(cfg: &Config, store: &mut InterchangeStore) -> Result<PipelineReport, ArmError> {
    CoordinatePipeline::new(cfg.pipeline_config()).run(store)
}

/// Build the configured solver and run the gateway.
pub fn solve(cfg: &Config, store: &mut InterchangeStore) -> Result<(String, GatewayReport), ArmError> {
    let solver = cfg.solver.build()?;
    solve_with(&KinematicsGateway::new(solver), store)
}

pub fn solve_with(
    gateway: &KinematicsGateway,
    store: &mut InterchangeStore,
) -> Result<(String, GatewayReport), ArmError> {
    let report = gateway.run(store)?;
    Ok((gateway.solver_name().to_string(), report))
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DispatchOptions {
    pub abort_on_failure: bool,
    pub dry_run: bool,
}

#[derive(Debug)]
pub struct DispatchOutcome {
    pub endpoint: String,
    pub report: DispatchReport,
    /// Frames recorded by a dry run; empty otherwise.
    pub frames: Vec<String>,
}

pub fn dispatch(
    cfg: &Config,
    store: &InterchangeStore,
    opts: DispatchOptions,
    cancel: Arc<AtomicBool>,
) -> Result<DispatchOutcome, ArmError> {
    let mut dispatcher_config = cfg.dispatcher_config()?;
    if opts.abort_on_failure {
        dispatcher_config.failure_policy = FailurePolicy::AbortOnFirstFailure;
    }

    if opts.dry_run {
        let (report, link) = run_dispatch(DryRunLink::new(), dispatcher_config, store, cancel)?;
        Ok(DispatchOutcome {
            endpoint: link.endpoint().to_string(),
            report,
            frames: link.frames().to_vec(),
        })
    } else {
        let (report, link) = run_dispatch(cfg.controller_link()?, dispatcher_config, store, cancel)?;
        Ok(DispatchOutcome {
            endpoint: link.endpoint().to_string(),
            report,
            frames: Vec::new(),
        })
    }
}

fn run_dispatch<L: ControllerLink>(
    link: L,
    config: DispatcherConfig,
    store: &InterchangeStore,
    cancel: Arc<AtomicBool>,
) -> Result<(DispatchReport, L), ArmError> {
    let mut dispatcher = MotionDispatcher::new(link, config).with_cancel_flag(cancel);
    let report = dispatcher.run(store)?;
    Ok((report, dispatcher.into_link()))
}
