//! # Error Types
//!
//! Custom error types for Orbit Rig using `thiserror`.
//!
//! Transient I/O and protocol noise never reaches these types: malformed
//! frames are logged and dropped where they are parsed. What remains are
//! failures the caller has to act on (a port that will not open, a command
//! issued while disconnected) and configuration bugs (calibration lookups
//! outside the table, tone values the radio cannot represent).

use thiserror::Error;

/// Main error type for Orbit Rig
#[derive(Debug, Error)]
pub enum OrbitRigError {
    /// Serial port could not be opened
    #[error("Serial link unavailable: {0}")]
    LinkUnavailable(String),

    /// Command issued while the controller is not running
    #[error("Not connected")]
    NotConnected,

    /// Serial I/O failure on an open link
    #[error("Serial error: {0}")]
    Serial(String),

    /// CI-V protocol errors
    #[error("CI-V protocol error: {0}")]
    CivProtocol(String),

    /// Rotator protocol errors
    #[error("Rotator protocol error: {0}")]
    RotatorProtocol(String),

    /// Calibration lookup outside the calibrated range
    #[error("No calibration segment found for {axis} value {value}")]
    CalibrationOutOfRange {
        axis: &'static str,
        value: f64,
    },

    /// Sub-audible tone above the 999.9 Hz the radio can encode
    #[error("Tone frequency {0} Hz exceeds 999.9 Hz")]
    ToneOverflow(f64),

    /// Unknown device-type tag passed to the factory
    #[error("Unsupported device type: {0}")]
    UnsupportedDevice(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    /// Calibration definition could not be parsed
    #[error("Calibration file error: {0}")]
    CalibrationFile(#[from] serde_json::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for Orbit Rig
pub type Result<T> = std::result::Result<T, OrbitRigError>;
