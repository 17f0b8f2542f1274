//! # Rotator Module
//!
//! Points the antenna. Every backend implements [`RotatorController`]:
//!
//! - [`simulator::SimulatedRotator`] - no I/O, reports on a 200 ms timer
//! - [`monitor::MonitorRotator`] - ASCII device that pushes samples after
//!   `MONITOR ON`
//! - [`gs232::Gs232Rotator`] - GS-232 style poll/response
//! - [`analog::AnalogRotator`] - voltage-driven, through a calibration table
//!
//! The three serial backends share the [`session::SerialRotator`] driver and
//! differ only in their [`session::RotatorProtocol`].

pub mod watchdog;
pub mod session;
pub mod gs232;
pub mod monitor;
pub mod analog;
pub mod simulator;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::mpsc;

use crate::error::Result;
pub use watchdog::LinkState;

/// Antenna pointing in degrees
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct AntennaPosition {
    pub azimuth: f64,
    pub elevation: f64,
}

impl AntennaPosition {
    pub fn new(azimuth: f64, elevation: f64) -> Self {
        Self { azimuth, elevation }
    }
}

impl fmt::Display for AntennaPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "az {:.1}° el {:.1}°", self.azimuth, self.elevation)
    }
}

/// Mechanical limits of a rotator, inclusive
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PositionRange {
    pub azimuth_min: f64,
    pub azimuth_max: f64,
    pub elevation_min: f64,
    pub elevation_max: f64,
}

impl Default for PositionRange {
    fn default() -> Self {
        Self {
            azimuth_min: 0.0,
            azimuth_max: 360.0,
            elevation_min: 0.0,
            elevation_max: 90.0,
        }
    }
}

impl PositionRange {
    /// Whether `position` lies within the limits; NaN never does
    ///
    /// # Examples
    ///
    /// ```
    /// use orbit_rig::rotator::{AntennaPosition, PositionRange};
    ///
    /// let range = PositionRange::default();
    /// assert!(range.contains(&AntennaPosition::new(360.0, 0.0)));
    /// assert!(!range.contains(&AntennaPosition::new(180.0, -1.0)));
    /// ```
    pub fn contains(&self, position: &AntennaPosition) -> bool {
        (self.azimuth_min..=self.azimuth_max).contains(&position.azimuth)
            && (self.elevation_min..=self.elevation_max).contains(&position.elevation)
    }
}

/// Events a rotator controller reports upward
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RotatorEvent {
    PositionChanged(AntennaPosition),
    /// The device stopped answering; sent once per fault
    Disconnected,
}

/// Sink for rotator events
pub type RotatorEventSender = mpsc::UnboundedSender<RotatorEvent>;

/// Contract shared by every rotator backend
#[async_trait]
pub trait RotatorController: Send {
    /// Open the link (if any) and start reporting positions
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::OrbitRigError::LinkUnavailable`] if the port
    /// cannot be opened
    async fn start(&mut self) -> Result<()>;

    /// Stop timers and polling and close the link. Safe to call when stopped.
    async fn stop(&mut self);

    /// Command a new position
    ///
    /// Positions outside the configured range are dropped and `Ok` is
    /// returned; they never reach the device.
    async fn set_position(&mut self, position: AntennaPosition) -> Result<()>;

    /// Register the event sink, replacing any previous one
    fn set_callback(&mut self, events: RotatorEventSender);

    /// Drop the event sink
    fn unset_callback(&mut self);

    fn link_state(&self) -> LinkState;

    /// Last position reported by the device
    fn last_position(&self) -> Option<AntennaPosition>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_range_contains_bounds() {
        let range = PositionRange::default();
        assert!(range.contains(&AntennaPosition::new(0.0, 0.0)));
        assert!(range.contains(&AntennaPosition::new(360.0, 90.0)));
        assert!(!range.contains(&AntennaPosition::new(360.1, 45.0)));
        assert!(!range.contains(&AntennaPosition::new(180.0, 90.5)));
    }

    #[test]
    fn test_range_rejects_nan() {
        let range = PositionRange::default();
        assert!(!range.contains(&AntennaPosition::new(f64::NAN, 10.0)));
        assert!(!range.contains(&AntennaPosition::new(10.0, f64::NAN)));
    }

    #[test]
    fn test_custom_range() {
        let range = PositionRange {
            azimuth_min: -180.0,
            azimuth_max: 180.0,
            elevation_min: 0.0,
            elevation_max: 180.0,
        };
        assert!(range.contains(&AntennaPosition::new(-90.0, 170.0)));
        assert!(!range.contains(&AntennaPosition::new(270.0, 10.0)));
    }

    #[test]
    fn test_position_display() {
        assert_eq!(AntennaPosition::new(123.45, 6.0).to_string(), "az 123.5° el 6.0°");
    }
}
