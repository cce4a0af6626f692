//! [`CoordinatePipeline`] – calibrates a whole batch of sensor points.
//!
//! 1. Read `calibration_parameters`; abort if any of `mx`, `cx`, `my`, `cy`
//!    is missing.
//! 2. Read `pixel_coordinates` in row order, applying the configured
//!    [`RowPolicy`] to rows with a missing X or Y.
//! 3. Transform every point and attach the fixed work-surface height.
//! 4. Replace `physical_coordinates` with the full batch.
//!
//! Every failure happens before step 4, so either the whole physical table is
//! written or nothing is.
//!
//! # Example
//!
//! ```rust
//! use armbridge_calibration::{CoordinatePipeline, PipelineConfig};
//! use armbridge_store::{InterchangeStore, schema};
//! use armbridge_types::{CalibrationParameters, SensorPoint, CALIBRATION_TABLE, PIXEL_TABLE};
//!
//! let mut store = InterchangeStore::open_in_memory().unwrap();
//! let params = CalibrationParameters { mx: 2.0, cx: 1.0, my: 3.0, cy: 0.0 };
//! store.write_table(CALIBRATION_TABLE, &schema::calibration_to_table(&params)).unwrap();
//! store
//!     .write_table(PIXEL_TABLE, &schema::sensor_points_to_table(&[SensorPoint::new(10.0, 5.0)]))
//!     .unwrap();
//!
//! let report = CoordinatePipeline::new(PipelineConfig::default()).run(&mut store).unwrap();
//! assert_eq!(report.points.len(), 1);
//! ```

use armbridge_store::{InterchangeStore, schema};
use armbridge_types::{
    ArmError, CALIBRATION_TABLE, CalibrationParameters, PHYSICAL_TABLE, PIXEL_TABLE,
    PhysicalPoint, RowPolicy, SensorPoint,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::transform::{DEFAULT_UNIT_SCALE, DEFAULT_WORK_SURFACE_HEIGHT, to_physical};

/// Tunables for one pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Physical Z assigned to every point, in meters.
    pub work_surface_height: f64,
    /// Multiplier applied after the affine transform (input units → meters).
    pub unit_scale: f64,
    pub row_policy: RowPolicy,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            work_surface_height: DEFAULT_WORK_SURFACE_HEIGHT,
            unit_scale: DEFAULT_UNIT_SCALE,
            row_policy: RowPolicy::default(),
        }
    }
}

/// Outcome of a successful run.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineReport {
    pub parameters: CalibrationParameters,
    /// Each written point next to the sensor point it came from, in order.
    pub points: Vec<(SensorPoint, PhysicalPoint)>,
    /// 1-based pixel-table rows that were skipped as incomplete.
    pub skipped_rows: Vec<usize>,
}

/// Orchestrates calibration → transform → persist for one batch.
pub struct CoordinatePipeline {
    config: PipelineConfig,
}

impl CoordinatePipeline {
    pub fn new(config: PipelineConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Transform `points` in order without touching any store.
    pub fn compute(&self, params: &CalibrationParameters, points: &[SensorPoint]) -> Vec<PhysicalPoint> {
        points
            .iter()
            .map(|p| {
                to_physical(
                    *p,
                    params,
                    self.config.unit_scale,
                    self.config.work_surface_height,
                )
            })
            .collect()
    }

    /// Run the full stage against `store`.
    ///
    /// # Errors
    ///
    /// [`ArmError::Config`] when a table is missing or malformed, a
    /// calibration key is absent, or the configured scale/height is not
    /// finite.  [`ArmError::Store`] when persistence fails.
    #[instrument(skip_all, fields(row_policy = ?self.config.row_policy))]
    pub fn run(&self, store: &mut InterchangeStore) -> Result<PipelineReport, ArmError> {
        if !self.config.unit_scale.is_finite() || !self.config.work_surface_height.is_finite() {
            return Err(ArmError::Config(
                "unit_scale and work_surface_height must be finite".to_string(),
            ));
        }

        let parameters = schema::calibration_from_table(&store.read_table(CALIBRATION_TABLE)?)?;
        debug!(?parameters, "calibration loaded");

        let sensor = schema::sensor_points_from_table(
            &store.read_table(PIXEL_TABLE)?,
            self.config.row_policy,
        )?;
        for row in &sensor.skipped {
            warn!(row, "pixel row missing X or Y; skipped");
        }

        let physical = self.compute(&parameters, &sensor.points);
        store.write_table(PHYSICAL_TABLE, &schema::physical_points_to_table(&physical))?;
        info!(
            points = physical.len(),
            skipped = sensor.skipped.len(),
            "physical coordinates written"
        );

        Ok(PipelineReport {
            parameters,
            points: sensor.points.into_iter().zip(physical).collect(),
            skipped_rows: sensor.skipped,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use armbridge_store::{Cell, Table};

    const EPS: f64 = 1e-9;

    fn seeded_store(params: &CalibrationParameters, points: &[SensorPoint]) -> InterchangeStore {
        let mut store = InterchangeStore::open_in_memory().unwrap();
        store
            .write_table(CALIBRATION_TABLE, &schema::calibration_to_table(params))
            .unwrap();
        store
            .write_table(PIXEL_TABLE, &schema::sensor_points_to_table(points))
            .unwrap();
        store
    }

    #[test]
    fn single_point_lands_at_expected_physical_position() {
        let params = CalibrationParameters { mx: 2.0, cx: 1.0, my: 3.0, cy: 0.0 };
        let mut store = seeded_store(&params, &[SensorPoint::new(10.0, 5.0)]);

        CoordinatePipeline::new(PipelineConfig::default()).run(&mut store).unwrap();

        let written =
            schema::physical_points_from_table(&store.read_table(PHYSICAL_TABLE).unwrap()).unwrap();
        assert_eq!(written.len(), 1);
        assert!((written[0].x - 0.021).abs() < EPS);
        assert!((written[0].y - 0.015).abs() < EPS);
        assert!((written[0].z - 0.07).abs() < EPS);
    }

    #[test]
    fn batch_order_is_preserved() {
        let params = CalibrationParameters { mx: 1.0, cx: 0.0, my: 1.0, cy: 0.0 };
        let pts: Vec<SensorPoint> = (0..20).map(|i| SensorPoint::new(i as f64, -(i as f64))).collect();
        let mut store = seeded_store(&params, &pts);

        let report = CoordinatePipeline::new(PipelineConfig::default()).run(&mut store).unwrap();
        assert_eq!(report.points.len(), 20);
        for (i, (sensor, physical)) in report.points.iter().enumerate() {
            assert_eq!(sensor.x, i as f64);
            assert!((physical.x - i as f64 * 0.001).abs() < EPS);
        }
    }

    #[test]
    fn missing_calibration_key_aborts_before_writing() {
        let mut store = InterchangeStore::open_in_memory().unwrap();
        let mut cal = Table::new(["key", "value"]);
        for (k, v) in [("mx", 2.0), ("cx", 1.0), ("my", 3.0)] {
            cal.push_row(vec![Cell::from(k), Cell::from(v)]);
        }
        store.write_table(CALIBRATION_TABLE, &cal).unwrap();
        store
            .write_table(PIXEL_TABLE, &schema::sensor_points_to_table(&[SensorPoint::new(1.0, 1.0)]))
            .unwrap();

        let err = CoordinatePipeline::new(PipelineConfig::default())
            .run(&mut store)
            .unwrap_err();
        assert!(matches!(err, ArmError::Config(ref msg) if msg.contains("'cy'")));
        assert!(!store.contains(PHYSICAL_TABLE).unwrap());
    }

    #[test]
    fn failed_run_leaves_previous_physical_table_untouched() {
        let params = CalibrationParameters { mx: 1.0, cx: 0.0, my: 1.0, cy: 0.0 };
        let mut store = seeded_store(&params, &[SensorPoint::new(1.0, 2.0)]);
        let pipeline = CoordinatePipeline::new(PipelineConfig::default());
        pipeline.run(&mut store).unwrap();
        let before = store.read_table(PHYSICAL_TABLE).unwrap();

        store.drop_table(CALIBRATION_TABLE).unwrap();
        assert!(matches!(pipeline.run(&mut store), Err(ArmError::Config(_))));
        assert_eq!(store.read_table(PHYSICAL_TABLE).unwrap(), before);
    }

    #[test]
    fn missing_pixel_table_is_config_error() {
        let mut store = InterchangeStore::open_in_memory().unwrap();
        let params = CalibrationParameters { mx: 1.0, cx: 0.0, my: 1.0, cy: 0.0 };
        store
            .write_table(CALIBRATION_TABLE, &schema::calibration_to_table(&params))
            .unwrap();
        let err = CoordinatePipeline::new(PipelineConfig::default())
            .run(&mut store)
            .unwrap_err();
        assert!(matches!(err, ArmError::Config(_)));
    }

    fn pixel_table_with_gap() -> Table {
        let mut t = Table::new(["Point", "X", "Y"]);
        t.push_row(vec![Cell::from("1"), Cell::from(100.0), Cell::from(200.0)]);
        t.push_row(vec![Cell::from("2"), Cell::from(150.0), Cell::Empty]);
        t.push_row(vec![Cell::from("3"), Cell::from(300.0), Cell::from(400.0)]);
        t
    }

    #[test]
    fn lenient_policy_skips_and_reports_incomplete_rows() {
        let params = CalibrationParameters { mx: 1.0, cx: 0.0, my: 1.0, cy: 0.0 };
        let mut store = seeded_store(&params, &[]);
        store.write_table(PIXEL_TABLE, &pixel_table_with_gap()).unwrap();

        let report = CoordinatePipeline::new(PipelineConfig::default()).run(&mut store).unwrap();
        assert_eq!(report.skipped_rows, vec![2]);
        let written = store.read_table(PHYSICAL_TABLE).unwrap();
        assert_eq!(written.len(), 2);
        assert_eq!(written.rows[1][0], Cell::from("2"));
        assert!((written.rows[1][1].as_f64().unwrap() - 0.3).abs() < EPS);
    }

    #[test]
    fn strict_policy_rejects_incomplete_rows() {
        let params = CalibrationParameters { mx: 1.0, cx: 0.0, my: 1.0, cy: 0.0 };
        let mut store = seeded_store(&params, &[]);
        store.write_table(PIXEL_TABLE, &pixel_table_with_gap()).unwrap();

        let config = PipelineConfig { row_policy: RowPolicy::Strict, ..PipelineConfig::default() };
        let err = CoordinatePipeline::new(config).run(&mut store).unwrap_err();
        assert!(matches!(err, ArmError::Config(_)));
        assert!(!store.contains(PHYSICAL_TABLE).unwrap());
    }

    #[test]
    fn custom_height_and_scale_are_applied() {
        let params = CalibrationParameters { mx: 1.0, cx: 0.0, my: 1.0, cy: 0.0 };
        let pipeline = CoordinatePipeline::new(PipelineConfig {
            work_surface_height: 0.25,
            unit_scale: 0.01,
            row_policy: RowPolicy::Lenient,
        });
        let out = pipeline.compute(&params, &[SensorPoint::new(50.0, 20.0)]);
        assert!((out[0].x - 0.5).abs() < EPS);
        assert!((out[0].y - 0.2).abs() < EPS);
        assert!((out[0].z - 0.25).abs() < EPS);
    }

    #[test]
    fn non_finite_config_is_rejected() {
        let params = CalibrationParameters { mx: 1.0, cx: 0.0, my: 1.0, cy: 0.0 };
        let mut store = seeded_store(&params, &[SensorPoint::new(1.0, 1.0)]);
        let config = PipelineConfig { unit_scale: f64::NAN, ..PipelineConfig::default() };
        assert!(CoordinatePipeline::new(config).run(&mut store).is_err());
    }
}
