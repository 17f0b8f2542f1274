//! # Station Context
//!
//! Owns the active transceiver and rotator and the Doppler loop that steers
//! the transceiver.
//!
//! `main` builds one `Station` and passes it by reference. Connecting a
//! controller always stops the one it replaces first, and connect sequences
//! queue on a fair async mutex so two of them never open ports at once.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::civ::protocol::{DataMode, OperatingMode};
use crate::doppler::tracker::{run_doppler_loop, DopplerCorrector, OrbitalKinematics};
use crate::error::{OrbitRigError, Result};
use crate::rotator::{
    AntennaPosition, LinkState, RotatorController, RotatorEventSender,
};
use crate::transceiver::{
    Band, ControllerStatus, SharedTransceiver, TransceiverController, TransceiverEventSender,
};

/// Active rotator slot
pub type SharedRotator = Arc<Mutex<Option<Box<dyn RotatorController>>>>;

struct DopplerHandle {
    stop_tx: oneshot::Sender<()>,
    join: JoinHandle<()>,
}

pub struct Station {
    transceiver: SharedTransceiver,
    rotator: SharedRotator,
    /// Held for the whole stop-old/start-new sequence
    open_lock: Mutex<()>,
    transceiver_events: TransceiverEventSender,
    rotator_events: RotatorEventSender,
    doppler: Mutex<Option<DopplerHandle>>,
}

impl Station {
    /// Create a station with no devices; controller events go to the given sinks
    pub fn new(transceiver_events: TransceiverEventSender, rotator_events: RotatorEventSender) -> Self {
        Self {
            transceiver: Arc::new(Mutex::new(None)),
            rotator: Arc::new(Mutex::new(None)),
            open_lock: Mutex::new(()),
            transceiver_events,
            rotator_events,
            doppler: Mutex::new(None),
        }
    }

    /// Shared handle to the transceiver slot
    pub fn transceiver(&self) -> SharedTransceiver {
        self.transceiver.clone()
    }

    /// Shared handle to the rotator slot
    pub fn rotator(&self) -> SharedRotator {
        self.rotator.clone()
    }

    /// Replace the active transceiver and start the new one
    ///
    /// The previous controller is stopped before `controller` opens its link.
    ///
    /// # Errors
    ///
    /// Returns the controller's start error (typically
    /// [`OrbitRigError::LinkUnavailable`]); the slot is left empty
    pub async fn connect_transceiver(&self, mut controller: Box<dyn TransceiverController>) -> Result<()> {
        let _guard = self.open_lock.lock().await;
        let mut slot = self.transceiver.lock().await;

        if let Some(mut previous) = slot.take() {
            debug!("Stopping previous transceiver");
            previous.stop().await;
        }

        controller.set_callback(self.transceiver_events.clone());
        if let Err(e) = controller.start().await {
            controller.unset_callback();
            warn!("Transceiver failed to start: {}", e);
            return Err(e);
        }

        *slot = Some(controller);
        info!("Transceiver connected");
        Ok(())
    }

    /// Replace the active rotator and start the new one
    ///
    /// # Errors
    ///
    /// Returns the controller's start error; the slot is left empty
    pub async fn connect_rotator(&self, mut controller: Box<dyn RotatorController>) -> Result<()> {
        let _guard = self.open_lock.lock().await;
        let mut slot = self.rotator.lock().await;

        if let Some(mut previous) = slot.take() {
            debug!("Stopping previous rotator");
            previous.stop().await;
        }

        controller.set_callback(self.rotator_events.clone());
        if let Err(e) = controller.start().await {
            controller.unset_callback();
            warn!("Rotator failed to start: {}", e);
            return Err(e);
        }

        *slot = Some(controller);
        info!("Rotator connected");
        Ok(())
    }

    /// Stop and drop the active transceiver, if any
    pub async fn disconnect_transceiver(&self) {
        let _guard = self.open_lock.lock().await;
        if let Some(mut radio) = self.transceiver.lock().await.take() {
            radio.stop().await;
            info!("Transceiver disconnected");
        }
    }

    /// Stop and drop the active rotator, if any
    pub async fn disconnect_rotator(&self) {
        let _guard = self.open_lock.lock().await;
        if let Some(mut rotator) = self.rotator.lock().await.take() {
            rotator.stop().await;
            info!("Rotator disconnected");
        }
    }

    pub async fn set_frequency(&self, band: Band, hz: u64) -> Result<()> {
        let mut slot = self.transceiver.lock().await;
        let radio = slot.as_mut().ok_or(OrbitRigError::NotConnected)?;
        radio.set_frequency(band, hz).await
    }

    pub async fn set_mode(&self, band: Band, mode: OperatingMode, data_mode: DataMode) -> Result<()> {
        let mut slot = self.transceiver.lock().await;
        let radio = slot.as_mut().ok_or(OrbitRigError::NotConnected)?;
        radio.set_mode(band, mode, data_mode).await
    }

    pub async fn set_satellite_mode(&self, on: bool) -> Result<()> {
        let mut slot = self.transceiver.lock().await;
        let radio = slot.as_mut().ok_or(OrbitRigError::NotConnected)?;
        radio.set_satellite_mode(on).await
    }

    pub async fn set_tone(&self, tone_hz: f64) -> Result<()> {
        let mut slot = self.transceiver.lock().await;
        let radio = slot.as_mut().ok_or(OrbitRigError::NotConnected)?;
        radio.set_tone(tone_hz).await
    }

    /// Point the antenna; out-of-range positions are dropped by the rotator
    pub async fn set_position(&self, position: AntennaPosition) -> Result<()> {
        let mut slot = self.rotator.lock().await;
        let rotator = slot.as_mut().ok_or(OrbitRigError::NotConnected)?;
        rotator.set_position(position).await
    }

    /// Transceiver status, `None` when no transceiver is connected
    pub async fn transceiver_status(&self) -> Option<ControllerStatus> {
        self.transceiver.lock().await.as_ref().map(|radio| radio.status())
    }

    /// Rotator link state, `None` when no rotator is connected
    pub async fn rotator_link_state(&self) -> Option<LinkState> {
        self.rotator.lock().await.as_ref().map(|rotator| rotator.link_state())
    }

    /// Start steering the transceiver with `corrector` every `period`
    ///
    /// A running Doppler loop is stopped first.
    pub async fn start_doppler<K>(&self, corrector: DopplerCorrector<K>, period: Duration)
    where
        K: OrbitalKinematics + 'static,
    {
        let mut doppler = self.doppler.lock().await;
        if let Some(previous) = doppler.take() {
            Self::join_doppler(previous).await;
        }

        let (stop_tx, stop_rx) = oneshot::channel();
        let join = tokio::spawn(run_doppler_loop(
            corrector,
            self.transceiver.clone(),
            period,
            stop_rx,
        ));
        *doppler = Some(DopplerHandle { stop_tx, join });
        info!("Doppler correction started");
    }

    /// Stop the Doppler loop. Safe to call when it is not running.
    pub async fn stop_doppler(&self) {
        if let Some(handle) = self.doppler.lock().await.take() {
            Self::join_doppler(handle).await;
            info!("Doppler correction stopped");
        }
    }

    pub async fn doppler_running(&self) -> bool {
        self.doppler.lock().await.is_some()
    }

    async fn join_doppler(handle: DopplerHandle) {
        let _ = handle.stop_tx.send(());
        if let Err(e) = handle.join.await {
            warn!("Doppler task ended abnormally: {}", e);
        }
    }

    /// Stop the Doppler loop and both controllers
    pub async fn shutdown(&self) {
        self.stop_doppler().await;
        self.disconnect_rotator().await;
        self.disconnect_transceiver().await;
    }
}
