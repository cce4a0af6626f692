//! Calibration transform.
//!
//! ```text
//! physicalX = (sensorX * mx + cx) * unit_scale
//! physicalY = (sensorY * my + cy) * unit_scale
//! physicalZ = work_surface_height
//! ```
//!
//! No clamping or bounds checking is done here; callers reject missing or
//! invalid parameters before calling.

use armbridge_types::{CalibrationParameters, PhysicalPoint, SensorPoint};

/// Millimeters to meters.
pub const DEFAULT_UNIT_SCALE: f64 = 0.001;

/// Height of the work surface in the robot frame, in meters.
pub const DEFAULT_WORK_SURFACE_HEIGHT: f64 = 0.07;

/// Apply the affine model to one sensor coordinate (before unit scaling).
pub fn transform(sensor_x: f64, sensor_y: f64, mx: f64, cx: f64, my: f64, cy: f64) -> (f64, f64) {
    (sensor_x * mx + cx, sensor_y * my + cy)
}

/// Map a sensor point to a physical point: affine transform, unit scaling,
/// then the fixed height.
pub fn to_physical(
    point: SensorPoint,
    params: &CalibrationParameters,
    unit_scale: f64,
    height: f64,
) -> PhysicalPoint {
    let (x, y) = transform(point.x, point.y, params.mx, params.cx, params.my, params.cy);
    PhysicalPoint::new(x * unit_scale, y * unit_scale, height)
}
