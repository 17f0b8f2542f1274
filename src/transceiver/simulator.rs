//! # Transceiver Simulator
//!
//! Loopback radio for running the station without hardware. Every accepted
//! request is reported back immediately as if the radio had confirmed it.

use async_trait::async_trait;
use tracing::{debug, info};

use super::state::DeviceState;
use super::{Band, ControllerStatus, TransceiverController, TransceiverEvent, TransceiverEventSender};
use crate::civ::encoder::encode_tone_hz;
use crate::civ::protocol::{DataMode, OperatingMode};
use crate::error::{OrbitRigError, Result};

/// In-memory transceiver
#[derive(Debug, Default)]
pub struct SimulatedTransceiver {
    status: ControllerStatus,
    state: DeviceState,
    satellite_mode: bool,
    tone_hz: Option<f64>,
    events: Option<TransceiverEventSender>,
}

impl SimulatedTransceiver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn device_state(&self) -> &DeviceState {
        &self.state
    }

    /// Last tone accepted by [`TransceiverController::set_tone`]
    pub fn tone_hz(&self) -> Option<f64> {
        self.tone_hz
    }

    fn emit(&self, event: TransceiverEvent) {
        if let Some(events) = &self.events {
            let _ = events.send(event);
        }
    }

    fn ensure_running(&self) -> Result<()> {
        match self.status {
            ControllerStatus::Monitoring => Ok(()),
            _ => Err(OrbitRigError::NotConnected),
        }
    }
}

#[async_trait]
impl TransceiverController for SimulatedTransceiver {
    async fn start(&mut self) -> Result<()> {
        if self.status != ControllerStatus::Monitoring {
            self.state = DeviceState::new();
            self.status = ControllerStatus::Monitoring;
            info!("Simulated transceiver started");
        }
        Ok(())
    }

    async fn stop(&mut self) {
        if self.status != ControllerStatus::Stopped {
            info!("Simulated transceiver stopped");
        }
        self.status = ControllerStatus::Stopped;
        self.events = None;
    }

    async fn set_frequency(&mut self, band: Band, hz: u64) -> Result<()> {
        self.ensure_running()?;
        self.state.set_requested_freq(band, hz);
        if !self.state.band(band).req_freq_dirty {
            return Ok(());
        }

        debug!("Simulated {:?} frequency {} Hz", band, hz);
        self.state.set_received_freq(band, hz);
        self.state.reset(band);
        self.emit(TransceiverEvent::FrequencyChanged { band, hz });
        Ok(())
    }

    async fn set_mode(&mut self, band: Band, mode: OperatingMode, data_mode: DataMode) -> Result<()> {
        self.ensure_running()?;
        self.state.set_requested_mode(band, mode, data_mode, false);
        if !self.state.band(band).req_mode_dirty {
            return Ok(());
        }

        self.state.set_received_mode(band, mode);
        self.state.reset(band);
        self.emit(TransceiverEvent::ModeChanged { band, mode });
        Ok(())
    }

    async fn set_satellite_mode(&mut self, on: bool) -> Result<()> {
        self.ensure_running()?;
        if self.satellite_mode != on {
            self.satellite_mode = on;
            self.emit(TransceiverEvent::SatelliteModeChanged(on));
        }
        Ok(())
    }

    async fn set_tone(&mut self, tone_hz: f64) -> Result<()> {
        self.ensure_running()?;
        encode_tone_hz(tone_hz)?;
        self.tone_hz = Some(tone_hz);
        Ok(())
    }

    fn set_callback(&mut self, events: TransceiverEventSender) {
        self.events = Some(events);
    }

    fn unset_callback(&mut self) {
        self.events = None;
    }

    fn status(&self) -> ControllerStatus {
        self.status
    }

    fn satellite_mode(&self) -> bool {
        self.satellite_mode
    }
}
