//! # Calibration Module
//!
//! Converts between antenna angles and the control voltages of an analog
//! rotator.
//!
//! ## Segment Tables
//!
//! A calibration is a set of measured `(angle, voltage)` points per axis.
//! Sorted by angle, each consecutive pair becomes one linear segment:
//!
//! `voltage = slope * angle + intercept`
//!
//! A lookup picks the first segment whose upper bound is strictly greater
//! than the query. Queries at or beyond the last point have no segment and
//! fail; values are never clamped.
//!
//! ## Usage
//!
//! ```
//! use orbit_rig::calibration::{Axis, CalibrationConverter};
//!
//! let points = [(0.0, 0.0), (10.0, 100.0)];
//! let cal = CalibrationConverter::new(&points, &points);
//!
//! assert_eq!(cal.angle_to_voltage(Axis::Azimuth, 5.0).unwrap(), 50.0);
//! assert!(cal.voltage_to_angle(Axis::Azimuth, 150.0).is_err());
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use tracing::debug;

use crate::error::{OrbitRigError, Result};

/// Rotator axis
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Axis {
    Azimuth,
    Elevation,
}

impl Axis {
    pub fn name(self) -> &'static str {
        match self {
            Axis::Azimuth => "azimuth",
            Axis::Elevation => "elevation",
        }
    }
}

/// Calibration file contents: per axis, angle (as a string key) to voltage
///
/// ```json
/// {
///   "azimuth":   { "0": 0.0, "180": 2.5, "360": 5.0 },
///   "elevation": { "0": 0.0, "90": 5.0 }
/// }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CalibrationDefinition {
    #[serde(default)]
    pub azimuth: BTreeMap<String, f64>,
    #[serde(default)]
    pub elevation: BTreeMap<String, f64>,
}

impl CalibrationDefinition {
    /// Load a definition from a JSON file
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read or is not valid JSON
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path.as_ref())?;
        let definition: CalibrationDefinition = serde_json::from_str(&contents)?;
        debug!(
            "Loaded calibration {} ({} azimuth, {} elevation points)",
            path.as_ref().display(),
            definition.azimuth.len(),
            definition.elevation.len()
        );
        Ok(definition)
    }
}

/// One linear piece: `y = slope * x + intercept`, valid below `upper`
#[derive(Debug, Clone, Copy, PartialEq)]
struct Segment {
    upper: f64,
    slope: f64,
    intercept: f64,
}

fn build_segments(points: &[(f64, f64)]) -> Vec<Segment> {
    points
        .windows(2)
        .filter(|pair| pair[1].0 != pair[0].0)
        .map(|pair| {
            let (x0, y0) = pair[0];
            let (x1, y1) = pair[1];
            let slope = (y1 - y0) / (x1 - x0);
            Segment {
                upper: x1,
                slope,
                intercept: y0 - slope * x0,
            }
        })
        .collect()
}

fn lookup(segments: &[Segment], x: f64) -> Option<f64> {
    segments
        .iter()
        .find(|segment| segment.upper > x)
        .map(|segment| segment.slope * x + segment.intercept)
}

/// Forward and inverse segment tables for one axis
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AxisTable {
    angle_segments: Vec<Segment>,
    voltage_segments: Vec<Segment>,
}

impl AxisTable {
    /// Build from `(angle, voltage)` points in any order
    ///
    /// Fewer than two points yield a table that rejects every query.
    #[must_use]
    pub fn from_points(points: &[(f64, f64)]) -> Self {
        let mut by_angle: Vec<(f64, f64)> = points.to_vec();
        by_angle.sort_by(|a, b| a.0.total_cmp(&b.0));

        let mut by_voltage: Vec<(f64, f64)> = by_angle.iter().map(|&(a, v)| (v, a)).collect();
        by_voltage.sort_by(|a, b| a.0.total_cmp(&b.0));

        Self {
            angle_segments: build_segments(&by_angle),
            voltage_segments: build_segments(&by_voltage),
        }
    }

    /// Build from a definition map whose keys are angles
    ///
    /// # Errors
    ///
    /// Returns error if a key does not parse as a number
    pub fn from_map(axis: Axis, map: &BTreeMap<String, f64>) -> Result<Self> {
        let points = map
            .iter()
            .map(|(angle, &voltage)| {
                angle.trim().parse::<f64>().map(|a| (a, voltage)).map_err(|_| {
                    OrbitRigError::CalibrationFile(serde::de::Error::custom(format!(
                        "Invalid {} angle key: {:?}",
                        axis.name(),
                        angle
                    )))
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self::from_points(&points))
    }

    /// Whether the table can answer any query
    pub fn is_usable(&self) -> bool {
        !self.angle_segments.is_empty()
    }
}

/// Angle/voltage converter for both rotator axes
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CalibrationConverter {
    azimuth: AxisTable,
    elevation: AxisTable,
}

impl CalibrationConverter {
    /// Create a converter from `(angle, voltage)` points per axis
    ///
    /// # Arguments
    ///
    /// * `azimuth` - Azimuth points, any order
    /// * `elevation` - Elevation points, any order
    #[must_use]
    pub fn new(azimuth: &[(f64, f64)], elevation: &[(f64, f64)]) -> Self {
        Self {
            azimuth: AxisTable::from_points(azimuth),
            elevation: AxisTable::from_points(elevation),
        }
    }

    /// Create a converter from a loaded calibration file
    ///
    /// # Errors
    ///
    /// Returns error if an angle key is not numeric
    pub fn from_definition(definition: &CalibrationDefinition) -> Result<Self> {
        Ok(Self {
            azimuth: AxisTable::from_map(Axis::Azimuth, &definition.azimuth)?,
            elevation: AxisTable::from_map(Axis::Elevation, &definition.elevation)?,
        })
    }

    fn table(&self, axis: Axis) -> &AxisTable {
        match axis {
            Axis::Azimuth => &self.azimuth,
            Axis::Elevation => &self.elevation,
        }
    }

    /// Voltage that drives `axis` to `angle`
    ///
    /// # Errors
    ///
    /// Returns [`OrbitRigError::CalibrationOutOfRange`] when no segment covers
    /// the angle
    pub fn angle_to_voltage(&self, axis: Axis, angle: f64) -> Result<f64> {
        lookup(&self.table(axis).angle_segments, angle).ok_or(
            OrbitRigError::CalibrationOutOfRange {
                axis: axis.name(),
                value: angle,
            },
        )
    }

    /// Angle that `axis` reports as `voltage`
    ///
    /// # Errors
    ///
    /// Returns [`OrbitRigError::CalibrationOutOfRange`] when no segment covers
    /// the voltage
    pub fn voltage_to_angle(&self, axis: Axis, voltage: f64) -> Result<f64> {
        lookup(&self.table(axis).voltage_segments, voltage).ok_or(
            OrbitRigError::CalibrationOutOfRange {
                axis: axis.name(),
                value: voltage,
            },
        )
    }
}
