//! # Monitor-Mode Rotator
//!
//! ASCII rotator that streams its position once told to. After
//! `MONITOR ON\n` the device pushes one line per sample:
//!
//! ```text
//! AZ,123.4,EL,45.6,AZT,130.0,ELT,50.0
//! ```
//!
//! The `AZT`/`ELT` fields echo the current target. Nothing is polled, so the
//! receive timeout is one-shot: ten seconds to produce a first valid sample,
//! after which the link is trusted.

use std::time::Duration;
use tracing::trace;

use super::session::{RotatorProtocol, SerialRotator};
use super::watchdog::TimeoutPolicy;
use super::AntennaPosition;
use crate::error::{OrbitRigError, Result};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

const FIELD_COUNT: usize = 8;
const FIELD_TAGS: [(usize, &str); 4] = [(0, "AZ"), (2, "EL"), (4, "AZT"), (6, "ELT")];

/// Monitor-mode rotator controller
pub type MonitorRotator = SerialRotator<MonitorProtocol>;

#[derive(Debug, Clone, Copy, Default)]
pub struct MonitorProtocol;

impl RotatorProtocol for MonitorProtocol {
    fn name(&self) -> &'static str {
        "Monitor"
    }

    fn timeout_policy(&self) -> TimeoutPolicy {
        TimeoutPolicy::OneShot
    }

    fn timeout(&self) -> Duration {
        DEFAULT_TIMEOUT
    }

    fn poll_interval(&self) -> Option<Duration> {
        None
    }

    fn start_command(&self) -> Option<Vec<u8>> {
        Some(b"MONITOR ON\n".to_vec())
    }

    fn stop_command(&self) -> Option<Vec<u8>> {
        Some(b"MONITOR OFF\n".to_vec())
    }

    fn parse_line(&self, line: &str) -> Result<AntennaPosition> {
        let fields: Vec<&str> = line.split(',').map(str::trim).collect();
        if fields.len() != FIELD_COUNT {
            return Err(OrbitRigError::RotatorProtocol(format!(
                "Expected {} fields, got {}: {:?}",
                FIELD_COUNT,
                fields.len(),
                line
            )));
        }
        if let Some((index, tag)) = FIELD_TAGS.iter().find(|(i, tag)| fields[*i] != *tag) {
            return Err(OrbitRigError::RotatorProtocol(format!(
                "Expected {} in field {}: {:?}",
                tag, index, line
            )));
        }

        let number = |index: usize| -> Result<f64> {
            fields[index]
                .parse::<f64>()
                .ok()
                .filter(|value| value.is_finite())
                .ok_or_else(|| {
                    OrbitRigError::RotatorProtocol(format!(
                        "Invalid number {:?} in {:?}",
                        fields[index], line
                    ))
                })
        };
        let position = AntennaPosition::new(number(1)?, number(3)?);
        let (target_az, target_el) = (number(5)?, number(7)?);
        trace!("Rotator target az {} el {}", target_az, target_el);

        Ok(position)
    }

    fn position_command(&self, position: AntennaPosition) -> Result<Vec<u8>> {
        Ok(format!("GOTO {:.1},{:.1}\n", position.azimuth, position.elevation).into_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rotator::{LinkState, RotatorController, RotatorEvent};
    use crate::serial::port_trait::mocks::MockSerialLink;
    use tokio::sync::mpsc;
    use tokio::time::sleep;

    // ==================== Protocol Tests ====================

    #[test]
    fn test_parse_sample() {
        let pos = MonitorProtocol
            .parse_line("AZ,123.4,EL,45.6,AZT,130.0,ELT,50.0")
            .unwrap();
        assert_eq!(pos, AntennaPosition::new(123.4, 45.6));
    }

    #[test]
    fn test_parse_wrong_field_count() {
        assert!(MonitorProtocol.parse_line("AZ,123.4,EL,45.6").is_err());
        assert!(MonitorProtocol
            .parse_line("AZ,1,EL,2,AZT,3,ELT,4,EXTRA,5")
            .is_err());
    }

    #[test]
    fn test_parse_wrong_tags_or_numbers() {
        assert!(MonitorProtocol.parse_line("EL,1,AZ,2,AZT,3,ELT,4").is_err());
        assert!(MonitorProtocol.parse_line("AZ,north,EL,2,AZT,3,ELT,4").is_err());
    }

    #[test]
    fn test_parse_rejects_non_finite_numbers() {
        for line in [
            "AZ,NaN,EL,2,AZT,3,ELT,4",
            "AZ,1,EL,inf,AZT,3,ELT,4",
            "AZ,1,EL,2,AZT,-infinity,ELT,4",
            "AZ,1,EL,2,AZT,3,ELT,nan",
        ] {
            assert!(
                matches!(MonitorProtocol.parse_line(line), Err(OrbitRigError::RotatorProtocol(_))),
                "accepted {:?}",
                line
            );
        }
    }

    #[test]
    fn test_position_command() {
        let cmd = MonitorProtocol
            .position_command(AntennaPosition::new(10.0, 20.3))
            .unwrap();
        assert_eq!(cmd, b"GOTO 10.0,20.3\n");
    }

    // ==================== Controller Tests ====================

    #[tokio::test(start_paused = true)]
    async fn test_start_and_stop_commands() {
        let link = MockSerialLink::new();
        let mut rotator = MonitorRotator::new(MonitorProtocol, Box::new(link.clone()));
        rotator.start().await.unwrap();
        sleep(Duration::from_millis(10)).await;
        assert_eq!(link.get_written_text(), vec!["MONITOR ON\n".to_string()]);

        // Nothing is polled
        sleep(Duration::from_secs(3)).await;
        assert_eq!(link.get_written_data().len(), 1);

        rotator.stop().await;
        assert_eq!(
            link.get_written_text(),
            vec!["MONITOR ON\n".to_string(), "MONITOR OFF\n".to_string()]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_one_shot_timeout_without_samples() {
        let link = MockSerialLink::new();
        let mut rotator = MonitorRotator::new(MonitorProtocol, Box::new(link.clone()));
        let (tx, mut rx) = mpsc::unbounded_channel();
        rotator.set_callback(tx);
        rotator.start().await.unwrap();

        // Wrong field count does not count as a response
        link.push_inbound(b"AZ,1,EL,2\n");
        sleep(Duration::from_millis(9900)).await;
        assert!(rx.try_recv().is_err());

        sleep(Duration::from_millis(200)).await;
        assert_eq!(rx.try_recv().unwrap(), RotatorEvent::Disconnected);
        sleep(Duration::from_secs(60)).await;
        assert!(rx.try_recv().is_err());
        assert_eq!(rotator.link_state(), LinkState::Faulted);
        rotator.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_sample_disarms_timeout() {
        let link = MockSerialLink::new();
        let mut rotator = MonitorRotator::new(MonitorProtocol, Box::new(link.clone()));
        let (tx, mut rx) = mpsc::unbounded_channel();
        rotator.set_callback(tx);
        rotator.start().await.unwrap();

        sleep(Duration::from_secs(1)).await;
        link.push_inbound(b"AZ,90.0,EL,10.0,AZT,90.0,ELT,10.0\r\n");
        sleep(Duration::from_secs(60)).await;

        assert_eq!(
            rx.try_recv().unwrap(),
            RotatorEvent::PositionChanged(AntennaPosition::new(90.0, 10.0))
        );
        assert!(rx.try_recv().is_err());
        assert_eq!(rotator.link_state(), LinkState::Receiving);
        rotator.stop().await;
    }
}
