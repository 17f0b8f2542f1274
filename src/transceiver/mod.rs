//! # Transceiver Module
//!
//! Keeps a radio's Rx and Tx bands in step with what the station asks for.
//!
//! This module handles:
//! - The [`TransceiverController`] contract shared by every radio backend
//! - Requested vs. received state tracking ([`state::DeviceState`])
//! - The CI-V backend for the IC-9700 ([`ic9700::Ic9700Controller`])
//! - A loopback simulator for running without hardware

pub mod state;
pub mod ic9700;
pub mod simulator;

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::civ::protocol::{DataMode, OperatingMode};
use crate::error::Result;

/// Logical band of a satellite transceiver
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Band {
    /// Downlink
    Rx,
    /// Uplink
    Tx,
}

impl Band {
    pub const ALL: [Band; 2] = [Band::Rx, Band::Tx];

    /// The opposite band
    pub fn other(self) -> Self {
        match self {
            Band::Rx => Band::Tx,
            Band::Tx => Band::Rx,
        }
    }
}

/// Events a transceiver controller reports upward
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TransceiverEvent {
    FrequencyChanged { band: Band, hz: u64 },
    ModeChanged { band: Band, mode: OperatingMode },
    SatelliteModeChanged(bool),
    Disconnected,
}

/// Sink for controller events
pub type TransceiverEventSender = mpsc::UnboundedSender<TransceiverEvent>;

/// Active transceiver slot shared between the station and the Doppler loop
pub type SharedTransceiver = Arc<tokio::sync::Mutex<Option<Box<dyn TransceiverController>>>>;

/// Lifecycle of a transceiver controller
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ControllerStatus {
    #[default]
    Stopped,
    Starting,
    Monitoring,
}

/// Contract shared by every transceiver backend
#[async_trait]
pub trait TransceiverController: Send {
    /// Open the link and start the poll/parse loop
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::OrbitRigError::LinkUnavailable`] if the port
    /// cannot be opened
    async fn start(&mut self) -> Result<()>;

    /// Cancel the loop and close the link. Safe to call when stopped.
    async fn stop(&mut self);

    /// Tune `band` to `hz`; nothing is sent when the request is unchanged
    async fn set_frequency(&mut self, band: Band, hz: u64) -> Result<()>;

    /// Switch `band` to `mode`; nothing is sent when the request is unchanged
    async fn set_mode(&mut self, band: Band, mode: OperatingMode, data_mode: DataMode) -> Result<()>;

    /// Turn the radio's satellite mode on or off
    async fn set_satellite_mode(&mut self, on: bool) -> Result<()>;

    /// Set the CTCSS tone used on the uplink
    async fn set_tone(&mut self, tone_hz: f64) -> Result<()>;

    /// Register the event sink, replacing any previous one
    fn set_callback(&mut self, events: TransceiverEventSender);

    /// Drop the event sink
    fn unset_callback(&mut self);

    fn status(&self) -> ControllerStatus;

    /// Satellite mode as last set or reported
    fn satellite_mode(&self) -> bool;
}
