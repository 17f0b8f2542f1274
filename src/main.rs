//! # Orbit Rig
//!
//! Satellite ground-station controller: antenna rotator tracking and
//! Doppler-corrected transceiver tuning.

use anyhow::{Context, Result};
use tokio::sync::mpsc;
use tracing::{info, warn};

use orbit_rig::config::Config;
use orbit_rig::doppler::tracker::{DopplerCorrector, NoGeometry};
use orbit_rig::factory::{create_rotator, create_transceiver};
use orbit_rig::logging;
use orbit_rig::rotator::RotatorEvent;
use orbit_rig::station::Station;
use orbit_rig::transceiver::TransceiverEvent;

/// Configuration file used when no path is given on the command line
const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

/// Main entry point for Orbit Rig
///
/// # Control Flow
///
/// 1. **Initialization**
///    - Load configuration (first argument, or `config/default.toml`)
///    - Set up logging (console, plus rolling file when configured)
///    - Build the configured transceiver and rotator and connect them
///    - Start Doppler correction when a frequency plan is configured
///
/// 2. **Main Loop**
///    - Log every controller event
///    - Handle Ctrl+C for graceful shutdown
///
/// 3. **Graceful Shutdown**
///    - Stop the Doppler loop and both controllers, closing their ports
///
/// A device whose port cannot be opened is logged and skipped; the other
/// device keeps running.
///
/// # Errors
///
/// Returns error if:
/// - The configuration file cannot be loaded or fails validation
/// - A device cannot be constructed (e.g., unreadable calibration file)
///
/// # Examples
///
/// ```bash
/// cargo run --release -- config/default.toml
/// ```
#[tokio::main]
async fn main() -> Result<()> {
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());
    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load configuration from {}", config_path))?;

    let _log_guard = logging::init(&config.logging)?;
    info!("Orbit Rig v{} starting...", env!("CARGO_PKG_VERSION"));
    info!("Configuration loaded from {}", config_path);

    let (radio_tx, mut radio_rx) = mpsc::unbounded_channel();
    let (rotator_tx, mut rotator_rx) = mpsc::unbounded_channel();
    let station = Station::new(radio_tx, rotator_tx);

    let radio = create_transceiver(&config.transceiver)?;
    if let Err(e) = station.connect_transceiver(radio).await {
        warn!("Continuing without transceiver: {}", e);
    }

    let rotator = create_rotator(&config.rotator)?;
    if let Err(e) = station.connect_rotator(rotator).await {
        warn!("Continuing without rotator: {}", e);
    }

    let plan = config.doppler.plan();
    if plan.uplink_hz.is_some() || plan.downlink_hz.is_some() {
        // No propagator attached: factors stay at 1.0 and the plan is tuned as-is
        station
            .start_doppler(
                DopplerCorrector::new(NoGeometry, plan),
                config.doppler.update_interval(),
            )
            .await;
    }

    info!("Press Ctrl+C to exit");

    loop {
        tokio::select! {
            Some(event) = radio_rx.recv() => match event {
                TransceiverEvent::FrequencyChanged { band, hz } => {
                    info!("{:?} frequency: {} Hz", band, hz);
                }
                TransceiverEvent::ModeChanged { band, mode } => {
                    info!("{:?} mode: {:?}", band, mode);
                }
                TransceiverEvent::SatelliteModeChanged(on) => {
                    info!("Satellite mode {}", if on { "on" } else { "off" });
                }
                TransceiverEvent::Disconnected => warn!("Transceiver disconnected"),
            },

            Some(event) = rotator_rx.recv() => match event {
                RotatorEvent::PositionChanged(position) => info!("Antenna at {}", position),
                RotatorEvent::Disconnected => warn!("Rotator not responding"),
            },

            // Handle Ctrl+C for graceful shutdown
            _ = tokio::signal::ctrl_c() => {
                info!("Received Ctrl+C, shutting down...");
                break;
            }
        }
    }

    station.shutdown().await;
    info!("Orbit Rig stopped");

    Ok(())
}
