//! # Analog Rotator
//!
//! Voltage-driven rotator. Positions are converted to control voltages with a
//! [`CalibrationConverter`], and voltage readings are converted back to
//! angles before they are reported.
//!
//! ```text
//! -> READ\n
//! <- V,2.500,1.250\n
//! -> SET 2.500,1.250\n
//! ```

use std::time::Duration;

use super::session::{RotatorProtocol, SerialRotator};
use super::watchdog::TimeoutPolicy;
use super::AntennaPosition;
use crate::calibration::{Axis, CalibrationConverter};
use crate::error::{OrbitRigError, Result};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Analog rotator controller
pub type AnalogRotator = SerialRotator<AnalogProtocol>;

#[derive(Debug, Clone)]
pub struct AnalogProtocol {
    converter: CalibrationConverter,
}

impl AnalogProtocol {
    pub fn new(converter: CalibrationConverter) -> Self {
        Self { converter }
    }

    pub fn converter(&self) -> &CalibrationConverter {
        &self.converter
    }
}

impl RotatorProtocol for AnalogProtocol {
    fn name(&self) -> &'static str {
        "Analog"
    }

    fn timeout_policy(&self) -> TimeoutPolicy {
        TimeoutPolicy::Rolling
    }

    fn timeout(&self) -> Duration {
        DEFAULT_TIMEOUT
    }

    fn poll_interval(&self) -> Option<Duration> {
        Some(DEFAULT_POLL_INTERVAL)
    }

    fn poll_command(&self) -> Option<Vec<u8>> {
        Some(b"READ\n".to_vec())
    }

    fn parse_line(&self, line: &str) -> Result<AntennaPosition> {
        let invalid = || OrbitRigError::RotatorProtocol(format!("Invalid voltage reply: {:?}", line));

        let mut fields = line.split(',').map(str::trim);
        if fields.next() != Some("V") {
            return Err(invalid());
        }
        let mut volts = || {
            fields
                .next()
                .and_then(|f| f.parse::<f64>().ok())
                .filter(|v| v.is_finite())
                .ok_or_else(invalid)
        };
        let az_volts = volts()?;
        let el_volts = volts()?;
        if fields.next().is_some() {
            return Err(invalid());
        }

        Ok(AntennaPosition::new(
            self.converter.voltage_to_angle(Axis::Azimuth, az_volts)?,
            self.converter.voltage_to_angle(Axis::Elevation, el_volts)?,
        ))
    }

    fn position_command(&self, position: AntennaPosition) -> Result<Vec<u8>> {
        let az_volts = self.converter.angle_to_voltage(Axis::Azimuth, position.azimuth)?;
        let el_volts = self.converter.angle_to_voltage(Axis::Elevation, position.elevation)?;
        Ok(format!("SET {:.3},{:.3}\n", az_volts, el_volts).into_bytes())
    }
}
