//! # Configuration Module
//!
//! Handles loading and validating configuration from TOML files.

use serde::de::Error;
use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::doppler::tracker::FrequencyPlan;
use crate::error::{OrbitRigError, Result};
use crate::factory::{RotatorKind, TransceiverKind};
use crate::rotator::PositionRange;
use crate::serial::SUPPORTED_BAUD_RATES;

/// Main configuration structure
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub transceiver: TransceiverConfig,
    pub rotator: RotatorConfig,
    #[serde(default)]
    pub doppler: DopplerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Transceiver configuration
#[derive(Debug, Deserialize, Clone)]
pub struct TransceiverConfig {
    #[serde(default = "default_transceiver_device")]
    pub device: String,

    #[serde(default = "default_transceiver_port")]
    pub port: String,

    #[serde(default = "default_transceiver_baud_rate")]
    pub baud_rate: u32,

    #[serde(default = "default_civ_address")]
    pub civ_address: u8,

    #[serde(default = "default_transceiver_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

/// Rotator configuration
#[derive(Debug, Deserialize, Clone)]
pub struct RotatorConfig {
    #[serde(default = "default_rotator_device")]
    pub device: String,

    #[serde(default = "default_rotator_port")]
    pub port: String,

    #[serde(default = "default_rotator_baud_rate")]
    pub baud_rate: u32,

    /// Overrides the device's poll period
    #[serde(default)]
    pub poll_interval_ms: Option<u64>,

    /// Overrides the device's receive timeout
    #[serde(default)]
    pub timeout_ms: Option<u64>,

    #[serde(default = "default_azimuth_min")]
    pub azimuth_min: f64,

    #[serde(default = "default_azimuth_max")]
    pub azimuth_max: f64,

    #[serde(default = "default_elevation_min")]
    pub elevation_min: f64,

    #[serde(default = "default_elevation_max")]
    pub elevation_max: f64,

    /// Simulator only: sweep instead of holding the commanded position
    #[serde(default)]
    pub auto_tracking: bool,

    /// Analog only: JSON angle/voltage calibration
    #[serde(default)]
    pub calibration_file: Option<String>,
}

/// Doppler correction configuration
#[derive(Debug, Deserialize, Clone)]
pub struct DopplerConfig {
    #[serde(default = "default_update_interval_ms")]
    pub update_interval_ms: u64,

    #[serde(default)]
    pub uplink_hz: Option<u64>,

    #[serde(default)]
    pub downlink_hz: Option<u64>,
}

/// Logging configuration
#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Also write daily-rolling log files here
    #[serde(default)]
    pub directory: Option<String>,

    #[serde(default = "default_file_prefix")]
    pub file_prefix: String,
}

// Default value functions
fn default_transceiver_device() -> String { "ic9700".to_string() }
fn default_transceiver_port() -> String { "/dev/ttyUSB0".to_string() }
fn default_transceiver_baud_rate() -> u32 { 19200 }
fn default_civ_address() -> u8 { 0xA2 }
fn default_transceiver_poll_interval_ms() -> u64 { 500 }

fn default_rotator_device() -> String { "simulator".to_string() }
fn default_rotator_port() -> String { "/dev/ttyUSB1".to_string() }
fn default_rotator_baud_rate() -> u32 { 9600 }
fn default_azimuth_min() -> f64 { 0.0 }
fn default_azimuth_max() -> f64 { 360.0 }
fn default_elevation_min() -> f64 { 0.0 }
fn default_elevation_max() -> f64 { 90.0 }

fn default_update_interval_ms() -> u64 { 1000 }

fn default_log_level() -> String { "info".to_string() }
fn default_file_prefix() -> String { "orbit-rig.log".to_string() }

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

impl Default for DopplerConfig {
    fn default() -> Self {
        Self {
            update_interval_ms: default_update_interval_ms(),
            uplink_hz: None,
            downlink_hz: None,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            directory: None,
            file_prefix: default_file_prefix(),
        }
    }
}

impl TransceiverConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl RotatorConfig {
    /// Mechanical limits as a [`PositionRange`]
    pub fn range(&self) -> PositionRange {
        PositionRange {
            azimuth_min: self.azimuth_min,
            azimuth_max: self.azimuth_max,
            elevation_min: self.elevation_min,
            elevation_max: self.elevation_max,
        }
    }

    pub fn poll_interval(&self) -> Option<Duration> {
        self.poll_interval_ms.map(Duration::from_millis)
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }
}

impl DopplerConfig {
    pub fn update_interval(&self) -> Duration {
        Duration::from_millis(self.update_interval_ms)
    }

    /// Configured link frequencies as a [`FrequencyPlan`]
    pub fn plan(&self) -> FrequencyPlan {
        FrequencyPlan {
            uplink_hz: self.uplink_hz,
            downlink_hz: self.downlink_hz,
        }
    }
}

fn invalid(message: impl std::fmt::Display) -> OrbitRigError {
    OrbitRigError::Config(toml::de::Error::custom(message))
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the configuration file
    ///
    /// # Returns
    ///
    /// * `Result<Config>` - Loaded and validated configuration
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - File cannot be read
    /// - TOML parsing fails
    /// - Validation fails
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use orbit_rig::config::Config;
    ///
    /// let config = Config::load("config/default.toml")?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values
    ///
    /// # Errors
    ///
    /// Returns error if any configuration value is out of valid range
    pub fn validate(&self) -> Result<()> {
        self.validate_transceiver()?;
        self.validate_rotator()?;

        // Validate doppler configuration
        if self.doppler.update_interval_ms == 0 || self.doppler.update_interval_ms > 60000 {
            return Err(invalid("doppler update_interval_ms must be between 1 and 60000"));
        }
        for (name, value) in [
            ("uplink_hz", self.doppler.uplink_hz),
            ("downlink_hz", self.doppler.downlink_hz),
        ] {
            if value == Some(0) {
                return Err(invalid(format!("doppler {} must be greater than 0", name)));
            }
        }

        // Validate logging configuration
        if !LOG_LEVELS.contains(&self.logging.level.to_lowercase().as_str()) {
            return Err(invalid(format!(
                "log level must be one of: {}",
                LOG_LEVELS.join(", ")
            )));
        }
        if self.logging.directory.as_deref() == Some("") {
            return Err(invalid("logging directory cannot be empty when set"));
        }
        if self.logging.file_prefix.is_empty() {
            return Err(invalid("logging file_prefix cannot be empty"));
        }

        Ok(())
    }

    fn validate_transceiver(&self) -> Result<()> {
        let kind: TransceiverKind = self
            .transceiver
            .device
            .parse()
            .map_err(|e: OrbitRigError| invalid(format!("transceiver {}", e)))?;

        if kind.uses_serial() {
            if self.transceiver.port.is_empty() {
                return Err(invalid("transceiver port cannot be empty"));
            }
            if !SUPPORTED_BAUD_RATES.contains(&self.transceiver.baud_rate) {
                return Err(invalid(format!(
                    "transceiver baud_rate must be one of: {:?}",
                    SUPPORTED_BAUD_RATES
                )));
            }
        }

        // 0x00 is broadcast and 0xE0 is this controller
        if self.transceiver.civ_address == 0x00 || self.transceiver.civ_address == 0xE0 {
            return Err(invalid("civ_address cannot be 0x00 or 0xE0"));
        }

        if self.transceiver.poll_interval_ms == 0 || self.transceiver.poll_interval_ms > 60000 {
            return Err(invalid("transceiver poll_interval_ms must be between 1 and 60000"));
        }

        Ok(())
    }

    fn validate_rotator(&self) -> Result<()> {
        let rotator = &self.rotator;
        let kind: RotatorKind = rotator
            .device
            .parse()
            .map_err(|e: OrbitRigError| invalid(format!("rotator {}", e)))?;

        if kind.uses_serial() {
            if rotator.port.is_empty() {
                return Err(invalid("rotator port cannot be empty"));
            }
            if !SUPPORTED_BAUD_RATES.contains(&rotator.baud_rate) {
                return Err(invalid(format!(
                    "rotator baud_rate must be one of: {:?}",
                    SUPPORTED_BAUD_RATES
                )));
            }
        }

        if kind == RotatorKind::Analog
            && rotator.calibration_file.as_deref().map_or(true, str::is_empty)
        {
            return Err(invalid("analog rotator requires a calibration_file"));
        }

        if let Some(ms) = rotator.poll_interval_ms {
            if ms == 0 || ms > 60000 {
                return Err(invalid("rotator poll_interval_ms must be between 1 and 60000"));
            }
        }

        if let Some(ms) = rotator.timeout_ms {
            if ms == 0 || ms > 600000 {
                return Err(invalid("rotator timeout_ms must be between 1 and 600000"));
            }
        }

        for (name, value) in [
            ("azimuth_min", rotator.azimuth_min),
            ("azimuth_max", rotator.azimuth_max),
            ("elevation_min", rotator.elevation_min),
            ("elevation_max", rotator.elevation_max),
        ] {
            if !value.is_finite() {
                return Err(invalid(format!("{} must be a finite number", name)));
            }
        }

        if rotator.azimuth_min >= rotator.azimuth_max {
            return Err(invalid("azimuth_min must be less than azimuth_max"));
        }

        if rotator.elevation_min >= rotator.elevation_max {
            return Err(invalid("elevation_min must be less than elevation_max"));
        }

        Ok(())
    }
}
