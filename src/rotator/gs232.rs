//! # GS-232 Rotator
//!
//! Poll/response rotator. The controller sends `C2\r` every second and the
//! device answers with azimuth and elevation as signed four-digit fields:
//!
//! ```text
//! -> C2\r
//! <- +0123+0045\r
//! -> W123 045\r
//! ```
//!
//! The receive timeout is rolling: five seconds without a valid reply faults
//! the link.

use std::time::Duration;

use super::session::{RotatorProtocol, SerialRotator};
use super::watchdog::TimeoutPolicy;
use super::AntennaPosition;
use crate::error::{OrbitRigError, Result};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

const POLL_COMMAND: &[u8] = b"C2\r";
const FIELD_LEN: usize = 5;

/// GS-232 rotator controller
pub type Gs232Rotator = SerialRotator<Gs232Protocol>;

#[derive(Debug, Clone, Copy, Default)]
pub struct Gs232Protocol;

/// Parse `+dddd` / `-dddd`
fn parse_field(field: &str) -> Option<f64> {
    let (sign, digits) = field.split_at(1);
    if digits.len() != FIELD_LEN - 1 || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let value: f64 = digits.parse::<u16>().ok()?.into();
    match sign {
        "+" => Some(value),
        "-" => Some(-value),
        _ => None,
    }
}

impl RotatorProtocol for Gs232Protocol {
    fn name(&self) -> &'static str {
        "GS-232"
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
        Some(POLL_COMMAND.to_vec())
    }

    fn parse_line(&self, line: &str) -> Result<AntennaPosition> {
        let invalid = || OrbitRigError::RotatorProtocol(format!("Invalid GS-232 reply: {:?}", line));

        if line.len() != FIELD_LEN * 2 || !line.is_ascii() {
            return Err(invalid());
        }
        let (az, el) = line.split_at(FIELD_LEN);
        let azimuth = parse_field(az).ok_or_else(invalid)?;
        let elevation = parse_field(el).ok_or_else(invalid)?;

        Ok(AntennaPosition::new(azimuth, elevation))
    }

    fn position_command(&self, position: AntennaPosition) -> Result<Vec<u8>> {
        let az = position.azimuth.round() as i32;
        let el = position.elevation.round() as i32;
        Ok(format!("W{:03} {:03}\r", az, el).into_bytes())
    }
}
