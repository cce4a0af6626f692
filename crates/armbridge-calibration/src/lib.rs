//! `armbridge-calibration` – sensor-to-physical coordinate stage.
//!
//! # Modules
//!
//! - [`transform`] – the pure 4-parameter affine map from camera coordinates
//!   to robot-frame coordinates, plus unit scaling and the fixed work-surface
//!   height.
//! - [`pipeline`] – [`CoordinatePipeline`][pipeline::CoordinatePipeline]:
//!   loads calibration and pixel tables, applies the transform to the whole
//!   batch and replaces the physical-coordinates table.

pub mod pipeline;
pub mod transform;

pub use pipeline::{CoordinatePipeline, PipelineConfig, PipelineReport};
pub use transform::{DEFAULT_UNIT_SCALE, DEFAULT_WORK_SURFACE_HEIGHT, to_physical, transform};
