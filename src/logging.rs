//! # Logging Setup
//!
//! Installs the global `tracing` subscriber: console output filtered by
//! `RUST_LOG` plus the configured default level, and an optional
//! daily-rolling log file written through a non-blocking worker.

use serde::de::Error;
use tracing::{debug, Level};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::LoggingConfig;
use crate::error::{OrbitRigError, Result};

/// Parse a configured level name (case-insensitive)
pub fn parse_level(level: &str) -> Result<Level> {
    level.parse::<Level>().map_err(|_| {
        OrbitRigError::Config(toml::de::Error::custom(format!("unknown log level: {}", level)))
    })
}

/// Install the global subscriber
///
/// # Returns
///
/// * `Result<Option<WorkerGuard>>` - Guard for the file writer when
///   `config.directory` is set. Keep it alive until exit or buffered lines are
///   lost.
///
/// # Errors
///
/// Returns error if the configured level is not a valid level name
pub fn init(config: &LoggingConfig) -> Result<Option<WorkerGuard>> {
    let level = parse_level(&config.level)?;
    let filter = EnvFilter::from_default_env().add_directive(level.into());

    let (file_layer, guard) = match config.directory.as_deref() {
        Some(directory) => {
            let appender = tracing_appender::rolling::daily(directory, &config.file_prefix);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer().with_writer(writer).with_ansi(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    let installed = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .with(file_layer)
        .try_init();

    if installed.is_err() {
        debug!("Global subscriber already installed, keeping it");
    }

    Ok(guard)
}
