//! # Controller Factory
//!
//! Picks the concrete transceiver or rotator controller for a device-type tag.
//!
//! | Tag             | Controller                                   |
//! |-----------------|----------------------------------------------|
//! | `ic9700`        | [`Ic9700Controller`] over CI-V               |
//! | `simulator`     | [`SimulatedTransceiver`] / [`SimulatedRotator`] |
//! | `ascii-monitor` | [`MonitorRotator`]                           |
//! | `gs232`         | [`Gs232Rotator`]                             |
//! | `analog`        | [`AnalogRotator`]                            |

use std::fmt;
use std::str::FromStr;
use tracing::info;

use crate::calibration::{CalibrationConverter, CalibrationDefinition};
use crate::config::{RotatorConfig, TransceiverConfig};
use crate::error::{OrbitRigError, Result};
use crate::rotator::analog::{AnalogProtocol, AnalogRotator};
use crate::rotator::gs232::{Gs232Protocol, Gs232Rotator};
use crate::rotator::monitor::{MonitorProtocol, MonitorRotator};
use crate::rotator::session::{RotatorProtocol, SerialRotator};
use crate::rotator::simulator::SimulatedRotator;
use crate::rotator::RotatorController;
use crate::serial::{SerialLink, TokioSerialLink};
use crate::transceiver::ic9700::Ic9700Controller;
use crate::transceiver::simulator::SimulatedTransceiver;
use crate::transceiver::TransceiverController;

/// Supported transceiver backends
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransceiverKind {
    Ic9700,
    Simulator,
}

impl TransceiverKind {
    pub fn tag(self) -> &'static str {
        match self {
            TransceiverKind::Ic9700 => "ic9700",
            TransceiverKind::Simulator => "simulator",
        }
    }

    /// Whether this backend talks over a serial port
    pub fn uses_serial(self) -> bool {
        self != TransceiverKind::Simulator
    }
}

impl FromStr for TransceiverKind {
    type Err = OrbitRigError;

    fn from_str(tag: &str) -> Result<Self> {
        match tag {
            "ic9700" => Ok(TransceiverKind::Ic9700),
            "simulator" => Ok(TransceiverKind::Simulator),
            other => Err(OrbitRigError::UnsupportedDevice(other.to_string())),
        }
    }
}

impl fmt::Display for TransceiverKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// Supported rotator backends
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RotatorKind {
    Simulator,
    AsciiMonitor,
    Gs232,
    Analog,
}

impl RotatorKind {
    pub fn tag(self) -> &'static str {
        match self {
            RotatorKind::Simulator => "simulator",
            RotatorKind::AsciiMonitor => "ascii-monitor",
            RotatorKind::Gs232 => "gs232",
            RotatorKind::Analog => "analog",
        }
    }

    /// Whether this backend talks over a serial port
    pub fn uses_serial(self) -> bool {
        self != RotatorKind::Simulator
    }
}

impl FromStr for RotatorKind {
    type Err = OrbitRigError;

    fn from_str(tag: &str) -> Result<Self> {
        match tag {
            "simulator" => Ok(RotatorKind::Simulator),
            "ascii-monitor" => Ok(RotatorKind::AsciiMonitor),
            "gs232" => Ok(RotatorKind::Gs232),
            "analog" => Ok(RotatorKind::Analog),
            other => Err(OrbitRigError::UnsupportedDevice(other.to_string())),
        }
    }
}

impl fmt::Display for RotatorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// Build the transceiver controller named by `config.device`
///
/// Serial backends get a closed [`TokioSerialLink`]; the port is opened by
/// `start()`.
///
/// # Errors
///
/// Returns [`OrbitRigError::UnsupportedDevice`] for an unknown tag
///
/// # Examples
///
/// ```no_run
/// use orbit_rig::config::Config;
/// use orbit_rig::factory::create_transceiver;
///
/// let config = Config::load("config/default.toml")?;
/// let radio = create_transceiver(&config.transceiver)?;
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub fn create_transceiver(config: &TransceiverConfig) -> Result<Box<dyn TransceiverController>> {
    build_transceiver(config, || {
        Box::new(TokioSerialLink::new(config.port.as_str(), config.baud_rate))
    })
}

/// Same as [`create_transceiver`] with a caller-supplied link
pub fn create_transceiver_with_link(
    config: &TransceiverConfig,
    link: Box<dyn SerialLink>,
) -> Result<Box<dyn TransceiverController>> {
    build_transceiver(config, move || link)
}

fn build_transceiver(
    config: &TransceiverConfig,
    make_link: impl FnOnce() -> Box<dyn SerialLink>,
) -> Result<Box<dyn TransceiverController>> {
    let kind: TransceiverKind = config.device.parse()?;
    info!("Creating {} transceiver", kind);

    Ok(match kind {
        TransceiverKind::Ic9700 => Box::new(Ic9700Controller::with_settings(
            make_link(),
            config.civ_address,
            config.poll_interval(),
        )),
        TransceiverKind::Simulator => Box::new(SimulatedTransceiver::new()),
    })
}

/// Build the rotator controller named by `config.device`
///
/// Range, timeout and poll overrides from `config` are applied. The analog
/// rotator loads its calibration from `config.calibration_file`.
///
/// # Errors
///
/// Returns error if:
/// - The device tag is unknown
/// - The analog calibration file is missing, unreadable or malformed
pub fn create_rotator(config: &RotatorConfig) -> Result<Box<dyn RotatorController>> {
    build_rotator(config, || {
        Box::new(TokioSerialLink::new(config.port.as_str(), config.baud_rate))
    })
}

/// Same as [`create_rotator`] with a caller-supplied link
pub fn create_rotator_with_link(
    config: &RotatorConfig,
    link: Box<dyn SerialLink>,
) -> Result<Box<dyn RotatorController>> {
    build_rotator(config, move || link)
}

fn build_rotator(
    config: &RotatorConfig,
    make_link: impl FnOnce() -> Box<dyn SerialLink>,
) -> Result<Box<dyn RotatorController>> {
    let kind: RotatorKind = config.device.parse()?;
    info!("Creating {} rotator", kind);

    Ok(match kind {
        RotatorKind::Simulator => {
            Box::new(SimulatedRotator::new(config.range(), config.auto_tracking))
        }
        RotatorKind::AsciiMonitor => {
            let rotator: MonitorRotator = serial_rotator(config, MonitorProtocol, make_link());
            Box::new(rotator)
        }
        RotatorKind::Gs232 => {
            let rotator: Gs232Rotator = serial_rotator(config, Gs232Protocol, make_link());
            Box::new(rotator)
        }
        RotatorKind::Analog => {
            let path = config.calibration_file.as_deref().ok_or_else(|| {
                OrbitRigError::Io(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    "analog rotator requires a calibration_file",
                ))
            })?;
            let definition = CalibrationDefinition::load(path)?;
            let converter = CalibrationConverter::from_definition(&definition)?;
            let rotator: AnalogRotator =
                serial_rotator(config, AnalogProtocol::new(converter), make_link());
            Box::new(rotator)
        }
    })
}

fn serial_rotator<P: RotatorProtocol>(
    config: &RotatorConfig,
    protocol: P,
    link: Box<dyn SerialLink>,
) -> SerialRotator<P> {
    let mut rotator = SerialRotator::new(protocol, link).with_range(config.range());
    if let Some(timeout) = config.timeout() {
        rotator = rotator.with_timeout(timeout);
    }
    if let Some(period) = config.poll_interval() {
        rotator = rotator.with_poll_interval(period);
    }
    rotator
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rotator::watchdog::LinkState;
    use crate::rotator::AntennaPosition;
    use crate::serial::port_trait::mocks::MockSerialLink;
    use crate::transceiver::ControllerStatus;
    use std::io::Write;
    use std::time::Duration;
    use tempfile::NamedTempFile;
    use tokio::time::sleep;

    fn transceiver_config(device: &str) -> TransceiverConfig {
        TransceiverConfig {
            device: device.to_string(),
            port: "/dev/null-radio".to_string(),
            baud_rate: 19200,
            civ_address: 0xA2,
            poll_interval_ms: 500,
        }
    }

    fn rotator_config(device: &str) -> RotatorConfig {
        RotatorConfig {
            device: device.to_string(),
            port: "/dev/null-rotator".to_string(),
            baud_rate: 9600,
            poll_interval_ms: None,
            timeout_ms: None,
            azimuth_min: 0.0,
            azimuth_max: 360.0,
            elevation_min: 0.0,
            elevation_max: 90.0,
            auto_tracking: false,
            calibration_file: None,
        }
    }

    // ==================== Tag Tests ====================

    #[test]
    fn test_transceiver_tags() {
        for kind in [TransceiverKind::Ic9700, TransceiverKind::Simulator] {
            assert_eq!(kind.tag().parse::<TransceiverKind>().unwrap(), kind);
            assert_eq!(kind.to_string(), kind.tag());
        }
        assert!(TransceiverKind::Ic9700.uses_serial());
        assert!(!TransceiverKind::Simulator.uses_serial());
    }

    #[test]
    fn test_rotator_tags() {
        for kind in [
            RotatorKind::Simulator,
            RotatorKind::AsciiMonitor,
            RotatorKind::Gs232,
            RotatorKind::Analog,
        ] {
            assert_eq!(kind.tag().parse::<RotatorKind>().unwrap(), kind);
        }
        assert!(!RotatorKind::Simulator.uses_serial());
        assert!(RotatorKind::Gs232.uses_serial());
    }

    #[test]
    fn test_unknown_tags() {
        match "ft-991".parse::<TransceiverKind>() {
            Err(OrbitRigError::UnsupportedDevice(tag)) => assert_eq!(tag, "ft-991"),
            other => panic!("Expected UnsupportedDevice, got: {:?}", other),
        }
        assert!(matches!(
            "GS232".parse::<RotatorKind>(),
            Err(OrbitRigError::UnsupportedDevice(_))
        ));
    }

    // ==================== Transceiver Construction Tests ====================

    #[test]
    fn test_create_transceiver_unknown_device() {
        assert!(matches!(
            create_transceiver(&transceiver_config("ts-2000")),
            Err(OrbitRigError::UnsupportedDevice(_))
        ));
    }

    #[tokio::test]
    async fn test_create_simulated_transceiver() {
        let mut radio = create_transceiver(&transceiver_config("simulator")).unwrap();
        assert_eq!(radio.status(), ControllerStatus::Stopped);
        radio.start().await.unwrap();
        assert_eq!(radio.status(), ControllerStatus::Monitoring);
        radio.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_create_ic9700_uses_supplied_link() {
        let link = MockSerialLink::new();
        let mut radio =
            create_transceiver_with_link(&transceiver_config("ic9700"), Box::new(link.clone()))
                .unwrap();
        radio.start().await.unwrap();
        sleep(Duration::from_millis(10)).await;

        assert_eq!(link.open_calls(), 1);
        // Every frame is addressed to the configured radio
        let written = link.get_written_data();
        assert!(!written.is_empty());
        assert!(written.iter().all(|frame| frame[2] == 0xA2));
        radio.stop().await;
    }

    // ==================== Rotator Construction Tests ====================

    #[tokio::test(start_paused = true)]
    async fn test_create_simulated_rotator() {
        let mut config = rotator_config("simulator");
        config.azimuth_max = 180.0;
        let mut rotator = create_rotator(&config).unwrap();
        rotator.start().await.unwrap();

        // Outside the configured range: dropped
        rotator.set_position(AntennaPosition::new(270.0, 10.0)).await.unwrap();
        sleep(Duration::from_millis(250)).await;
        assert_eq!(rotator.last_position(), Some(AntennaPosition::default()));
        rotator.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_create_gs232_rotator() {
        let link = MockSerialLink::new();
        let mut rotator =
            create_rotator_with_link(&rotator_config("gs232"), Box::new(link.clone())).unwrap();
        rotator.start().await.unwrap();
        sleep(Duration::from_millis(10)).await;
        assert_eq!(link.get_written_text(), vec!["C2\r".to_string()]);
        rotator.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_create_monitor_rotator_with_timeout_override() {
        let link = MockSerialLink::new();
        let mut config = rotator_config("ascii-monitor");
        config.timeout_ms = Some(2000);
        let mut rotator = create_rotator_with_link(&config, Box::new(link.clone())).unwrap();
        rotator.start().await.unwrap();
        sleep(Duration::from_millis(10)).await;
        assert_eq!(link.get_written_text(), vec!["MONITOR ON\n".to_string()]);

        sleep(Duration::from_millis(2100)).await;
        assert_eq!(rotator.link_state(), LinkState::Faulted);
        rotator.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_create_gs232_with_poll_override() {
        let link = MockSerialLink::new();
        let mut config = rotator_config("gs232");
        config.poll_interval_ms = Some(250);
        let mut rotator = create_rotator_with_link(&config, Box::new(link.clone())).unwrap();
        rotator.start().await.unwrap();

        sleep(Duration::from_millis(600)).await;
        assert_eq!(link.get_written_text().len(), 3);
        rotator.stop().await;
    }

    #[test]
    fn test_create_analog_without_calibration() {
        assert!(create_rotator(&rotator_config("analog")).is_err());
    }

    #[test]
    fn test_create_analog_with_bad_calibration_file() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"not json").unwrap();
        let mut config = rotator_config("analog");
        config.calibration_file = Some(file.path().to_string_lossy().into_owned());
        assert!(matches!(
            create_rotator(&config),
            Err(OrbitRigError::CalibrationFile(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_create_analog_rotator() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(
            br#"{
                "azimuth": {"0": 0.0, "360": 4.5, "450": 5.0},
                "elevation": {"0": 0.0, "180": 5.0}
            }"#,
        )
        .unwrap();
        file.flush().unwrap();

        let link = MockSerialLink::new();
        let mut config = rotator_config("analog");
        config.calibration_file = Some(file.path().to_string_lossy().into_owned());
        let mut rotator = create_rotator_with_link(&config, Box::new(link.clone())).unwrap();
        rotator.start().await.unwrap();
        sleep(Duration::from_millis(10)).await;
        link.clear_written_data();

        rotator.set_position(AntennaPosition::new(180.0, 90.0)).await.unwrap();
        sleep(Duration::from_millis(10)).await;
        assert!(link.get_written_text().contains(&"SET 2.250,2.500\n".to_string()));
        rotator.stop().await;
    }
}
