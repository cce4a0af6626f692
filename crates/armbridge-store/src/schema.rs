//! Logical table schemas.
//!
//! Converts between raw [`Table`] grids and the typed rows each stage works
//! with.  Columns are addressed by position, not by header text, so a table
//! edited by hand keeps working as long as its column order is intact.
//!
//! | table                    | columns                                     |
//! |--------------------------|---------------------------------------------|
//! | `calibration_parameters` | `key`, `value`                              |
//! | `pixel_coordinates`      | `Point`, `X`, `Y`                           |
//! | `physical_coordinates`   | `Point`, `PhysicalX`, `PhysicalY`, `PhysicalZ` |
//! | `joint_angles`           | `Joint1` .. `JointK`                        |
//!
//! Decoding failures are reported as [`ArmError::Config`]: a malformed input
//! table is a configuration problem of the stage that reads it.

use armbridge_types::{
    ArmError, CalibrationParameters, JointAngleVector, PhysicalPoint, RowPolicy, SensorPoint,
};

use crate::interchange::{Cell, Table};

const CALIBRATION_KEYS: [&str; 4] = ["mx", "cx", "my", "cy"];

// ─────────────────────────────────────────────────────────────────────────────
// Calibration parameters
// ─────────────────────────────────────────────────────────────────────────────

pub fn calibration_to_table(params: &CalibrationParameters) -> Table {
    let mut table = Table::new(["key", "value"]);
    for (key, value) in [
        ("mx", params.mx),
        ("cx", params.cx),
        ("my", params.my),
        ("cy", params.cy),
    ] {
        table.push_row(vec![Cell::from(key), Cell::from(value)]);
    }
    table
}

/// Decode the named calibration rows.
///
/// Unknown keys are ignored; a repeated key keeps its last value.  Fails if
/// any of `mx`, `cx`, `my`, `cy` is absent or not numeric.
pub fn calibration_from_table(table: &Table) -> Result<CalibrationParameters, ArmError> {
    require_shape(table, "calibration_parameters", 2)?;

    let mut values: [Option<f64>; 4] = [None; 4];
    for row in &table.rows {
        let Some(key) = row[0].as_text().map(str::trim) else {
            continue;
        };
        let Some(slot) = CALIBRATION_KEYS.iter().position(|k| *k == key) else {
            continue;
        };
        let value = row[1].as_f64().ok_or_else(|| {
            ArmError::Config(format!("calibration parameter '{key}' is not numeric"))
        })?;
        values[slot] = Some(value);
    }

    let get = |slot: usize| {
        values[slot].ok_or_else(|| {
            ArmError::Config(format!(
                "calibration parameter '{}' is missing",
                CALIBRATION_KEYS[slot]
            ))
        })
    };
    Ok(CalibrationParameters {
        mx: get(0)?,
        cx: get(1)?,
        my: get(2)?,
        cy: get(3)?,
    })
}

// ─────────────────────────────────────────────────────────────────────────────
// Pixel coordinates
// ─────────────────────────────────────────────────────────────────────────────

pub fn sensor_points_to_table(points: &[SensorPoint]) -> Table {
    let mut table = Table::new(["Point", "X", "Y"]);
    for (idx, p) in points.iter().enumerate() {
        table.push_row(vec![
            Cell::from((idx + 1).to_string()),
            Cell::from(p.x),
            Cell::from(p.y),
        ]);
    }
    table
}

/// Sensor points decoded from the pixel table.
#[derive(Debug, Clone, PartialEq)]
pub struct SensorRows {
    /// Complete points, in table order.
    pub points: Vec<SensorPoint>,
    /// 1-based data-row numbers skipped for a missing X or Y.
    pub skipped: Vec<usize>,
}

/// Decode the pixel table.
///
/// Under [`RowPolicy::Lenient`] a row with an empty X or Y is skipped and
/// recorded in [`SensorRows::skipped`]; under [`RowPolicy::Strict`] it fails
/// the whole decode.  A non-numeric X or Y always fails.
pub fn sensor_points_from_table(table: &Table, policy: RowPolicy) -> Result<SensorRows, ArmError> {
    require_shape(table, "pixel_coordinates", 3)?;

    let mut points = Vec::with_capacity(table.len());
    let mut skipped = Vec::new();
    for (idx, row) in table.rows.iter().enumerate() {
        let row_no = idx + 1;
        if row[1].is_empty() || row[2].is_empty() {
            match policy {
                RowPolicy::Lenient => {
                    skipped.push(row_no);
                    continue;
                }
                RowPolicy::Strict => {
                    return Err(ArmError::Config(format!(
                        "pixel_coordinates row {row_no} is missing X or Y"
                    )));
                }
            }
        }
        let x = number(&row[1], "pixel_coordinates", row_no, "X")?;
        let y = number(&row[2], "pixel_coordinates", row_no, "Y")?;
        points.push(SensorPoint::new(x, y));
    }
    Ok(SensorRows { points, skipped })
}

// ─────────────────────────────────────────────────────────────────────────────
// Physical coordinates
// ─────────────────────────────────────────────────────────────────────────────

pub fn physical_points_to_table(points: &[PhysicalPoint]) -> Table {
    let mut table = Table::new(["Point", "PhysicalX", "PhysicalY", "PhysicalZ"]);
    for (idx, p) in points.iter().enumerate() {
        table.push_row(vec![
            Cell::from((idx + 1).to_string()),
            Cell::from(p.x),
            Cell::from(p.y),
            Cell::from(p.z),
        ]);
    }
    table
}

pub fn physical_points_from_table(table: &Table) -> Result<Vec<PhysicalPoint>, ArmError> {
    require_shape(table, "physical_coordinates", 4)?;
    table
        .rows
        .iter()
        .enumerate()
        .map(|(idx, row)| {
            let row_no = idx + 1;
            Ok(PhysicalPoint::new(
                number(&row[1], "physical_coordinates", row_no, "PhysicalX")?,
                number(&row[2], "physical_coordinates", row_no, "PhysicalY")?,
                number(&row[3], "physical_coordinates", row_no, "PhysicalZ")?,
            ))
        })
        .collect()
}

// ─────────────────────────────────────────────────────────────────────────────
// Joint angles
// ─────────────────────────────────────────────────────────────────────────────

/// Encode angle vectors as `Joint1..JointK` columns.  The width is taken from
/// the first row; an empty batch yields a table without columns.
pub fn joint_angles_to_table(rows: &[JointAngleVector]) -> Table {
    let width = rows.first().map_or(0, JointAngleVector::len);
    let mut table = Table::new((1..=width).map(|i| format!("Joint{i}")));
    for angles in rows {
        table.push_row(angles.as_slice().iter().copied().map(Cell::from).collect());
    }
    table
}

pub fn joint_angles_from_table(table: &Table) -> Result<Vec<JointAngleVector>, ArmError> {
    require_shape(table, "joint_angles", 0)?;
    table
        .rows
        .iter()
        .enumerate()
        .map(|(idx, row)| {
            row.iter()
                .enumerate()
                .map(|(col, cell)| {
                    let column = table.header[col].as_str();
                    number(cell, "joint_angles", idx + 1, column)
                })
                .collect::<Result<Vec<f64>, _>>()
                .map(JointAngleVector::new)
        })
        .collect()
}

// ─────────────────────────────────────────────────────────────────────────────
// Helpers
// ─────────────────────────────────────────────────────────────────────────────

// Tables built in memory or parsed from a file have not been through the
// store's write check yet.
fn require_shape(table: &Table, name: &str, min: usize) -> Result<(), ArmError> {
    table
        .validate(name)
        .map_err(|e| ArmError::Config(e.to_string()))?;
    if table.width() < min {
        return Err(ArmError::Config(format!(
            "{name} needs at least {min} columns, found {}",
            table.width()
        )));
    }
    Ok(())
}

fn number(cell: &Cell, table: &str, row_no: usize, column: &str) -> Result<f64, ArmError> {
    cell.as_f64().ok_or_else(|| {
        ArmError::Config(format!(
            "{table} row {row_no} column {column}: expected a number, found '{cell}'"
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn calibration_rows(rows: &[(&str, Cell)]) -> Table {
        let mut t = Table::new(["key", "value"]);
        for (k, v) in rows {
            t.push_row(vec![Cell::from(*k), v.clone()]);
        }
        t
    }

    #[test]
    fn calibration_round_trip() {
        let p = CalibrationParameters { mx: 0.5, cx: -12.0, my: 0.25, cy: 40.0 };
        assert_eq!(calibration_from_table(&calibration_to_table(&p)).unwrap(), p);
    }

    #[test]
    fn calibration_row_order_is_irrelevant_and_extra_keys_ignored() {
        let t = calibration_rows(&[
            ("cy", Cell::from(4.0)),
            ("note", Cell::from("taken on bench 2")),
            ("my", Cell::from(3.0)),
            ("cx", Cell::from(2.0)),
            ("mx", Cell::from(1.0)),
        ]);
        let p = calibration_from_table(&t).unwrap();
        assert_eq!(p, CalibrationParameters { mx: 1.0, cx: 2.0, my: 3.0, cy: 4.0 });
    }

    #[test]
    fn calibration_missing_key_is_config_error() {
        let t = calibration_rows(&[
            ("mx", Cell::from(1.0)),
            ("cx", Cell::from(2.0)),
            ("my", Cell::from(3.0)),
        ]);
        let err = calibration_from_table(&t).unwrap_err();
        assert_eq!(err, ArmError::Config("calibration parameter 'cy' is missing".into()));
    }

    #[test]
    fn calibration_non_numeric_value_is_config_error() {
        let t = calibration_rows(&[("mx", Cell::Empty)]);
        assert!(matches!(calibration_from_table(&t), Err(ArmError::Config(_))));
    }

    #[test]
    fn pixel_lenient_skips_incomplete_rows() {
        let mut t = Table::new(["Point", "X", "Y"]);
        t.push_row(vec![Cell::from("1"), Cell::from(10.0), Cell::from(5.0)]);
        t.push_row(vec![Cell::from("2"), Cell::Empty, Cell::from(5.0)]);
        t.push_row(vec![Cell::from("3"), Cell::from(7.0), Cell::from(8.0)]);

        let rows = sensor_points_from_table(&t, RowPolicy::Lenient).unwrap();
        assert_eq!(rows.points, vec![SensorPoint::new(10.0, 5.0), SensorPoint::new(7.0, 8.0)]);
        assert_eq!(rows.skipped, vec![2]);
    }

    #[test]
    fn pixel_strict_rejects_incomplete_rows() {
        let mut t = Table::new(["Point", "X", "Y"]);
        t.push_row(vec![Cell::from("1"), Cell::from(10.0), Cell::Empty]);
        let err = sensor_points_from_table(&t, RowPolicy::Strict).unwrap_err();
        assert!(err.to_string().contains("row 1"));
    }

    #[test]
    fn pixel_text_value_fails_in_both_modes() {
        let mut t = Table::new(["Point", "X", "Y"]);
        t.push_row(vec![Cell::from("1"), Cell::from("ten"), Cell::from(5.0)]);
        assert!(sensor_points_from_table(&t, RowPolicy::Lenient).is_err());
        assert!(sensor_points_from_table(&t, RowPolicy::Strict).is_err());
    }

    #[test]
    fn pixel_table_too_narrow() {
        let t = Table::new(["X", "Y"]);
        assert!(matches!(
            sensor_points_from_table(&t, RowPolicy::Lenient),
            Err(ArmError::Config(_))
        ));
    }

    #[test]
    fn physical_table_labels_points_from_one() {
        let pts = [PhysicalPoint::new(0.1, 0.2, 0.07), PhysicalPoint::new(0.3, 0.4, 0.07)];
        let t = physical_points_to_table(&pts);
        assert_eq!(t.header, ["Point", "PhysicalX", "PhysicalY", "PhysicalZ"]);
        assert_eq!(t.rows[0][0], Cell::from("1"));
        assert_eq!(t.rows[1][0], Cell::from("2"));
        assert_eq!(physical_points_from_table(&t).unwrap(), pts);
    }

    #[test]
    fn joint_table_headers_follow_width() {
        let rows = vec![
            JointAngleVector::new(vec![1.0, 2.0, 3.0]),
            JointAngleVector::new(vec![4.0, 5.0, 6.0]),
        ];
        let t = joint_angles_to_table(&rows);
        assert_eq!(t.header, ["Joint1", "Joint2", "Joint3"]);
        assert_eq!(joint_angles_from_table(&t).unwrap(), rows);
    }

    #[test]
    fn joint_table_empty_batch() {
        let t = joint_angles_to_table(&[]);
        assert_eq!(t.width(), 0);
        assert!(joint_angles_from_table(&t).unwrap().is_empty());
    }

    #[test]
    fn ragged_rows_are_config_errors_for_every_schema() {
        let mut calibration = Table::new(["key", "value"]);
        calibration.push_row(vec![Cell::from("mx")]);
        assert!(matches!(calibration_from_table(&calibration), Err(ArmError::Config(_))));

        let mut pixels = Table::new(["Point", "X", "Y"]);
        pixels.push_row(vec![Cell::from("1"), Cell::from(10.0)]);
        assert!(matches!(
            sensor_points_from_table(&pixels, RowPolicy::Lenient),
            Err(ArmError::Config(_))
        ));

        let mut physical = Table::new(["Point", "PhysicalX", "PhysicalY", "PhysicalZ"]);
        physical.push_row(vec![Cell::from("1"), Cell::from(0.1)]);
        assert!(matches!(physical_points_from_table(&physical), Err(ArmError::Config(_))));

        let mut joints = Table::new(["Joint1"]);
        joints.push_row(vec![Cell::from(1.0), Cell::from(2.0)]);
        let err = joint_angles_from_table(&joints).unwrap_err();
        assert!(matches!(err, ArmError::Config(ref m) if m.contains("expected 1 cells, found 2")));
    }

    #[test]
    fn joint_table_rejects_blank_angle() {
        let mut t = Table::new(["Joint1", "Joint2"]);
        t.push_row(vec![Cell::from(1.0), Cell::Empty]);
        let err = joint_angles_from_table(&t).unwrap_err();
        assert!(err.to_string().contains("Joint2"));
    }
}
