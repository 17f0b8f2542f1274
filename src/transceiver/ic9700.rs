//! # IC-9700 Controller
//!
//! CI-V backend for the Icom IC-9700. In satellite mode the main band is the
//! uplink (Tx) and the sub band is the downlink (Rx).
//!
//! A worker task owns the serial link while the controller runs. It:
//! - writes command frames queued by `set_*` calls and reports the result
//! - polls frequency and mode of the band selected on the radio
//! - extracts frames from the receive stream and feeds them to [`DeviceState`]
//!
//! The worker tracks which band the radio has selected and only writes a
//! select frame when a command targets the other band. Reports carry no band:
//! a read reply belongs to the band that was selected when its read was
//! written (replies come back in write order), and a transceive report
//! belongs to the band selected now.

use async_trait::async_trait;
use bytes::BytesMut;
use std::collections::VecDeque;
use std::io;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, trace, warn};

use super::state::DeviceState;
use super::{Band, ControllerStatus, TransceiverController, TransceiverEvent, TransceiverEventSender};
use crate::civ::decoder::{decode_frame, is_read_reply, next_frame};
use crate::civ::encoder::*;
use crate::civ::protocol::{CivMessage, DataMode, OperatingMode, CIV_DEFAULT_RADIO_ADDR};
use crate::error::{OrbitRigError, Result};
use crate::serial::SerialLink;

/// Default time between band polls
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Chunk size for each serial read call
const READ_CHUNK_SIZE: usize = 64;

struct Shared {
    status: ControllerStatus,
    state: DeviceState,
    satellite_mode: bool,
    events: Option<TransceiverEventSender>,
}

impl Shared {
    fn emit(&self, event: TransceiverEvent) {
        if let Some(events) = &self.events {
            let _ = events.send(event);
        }
    }

    /// Report received values whose dirty flag is raised, then clear them
    fn drain_received(&mut self) {
        for band in Band::ALL {
            let state = self.state.band(band);
            // A band the radio never reported has nothing to show yet
            if state.recv_freq_dirty && state.received_freq != 0 {
                self.emit(TransceiverEvent::FrequencyChanged {
                    band,
                    hz: state.received_freq,
                });
            }
            if state.recv_mode_dirty {
                if let Some(mode) = state.received_mode {
                    self.emit(TransceiverEvent::ModeChanged { band, mode });
                }
            }
        }
        self.state.clear_received();
    }
}

fn lock(shared: &Mutex<Shared>) -> MutexGuard<'_, Shared> {
    shared.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Frames queued for the worker to write
///
/// With a `band`, the worker selects it first unless the radio already has it
/// selected.
struct Outbound {
    band: Option<Band>,
    frames: Vec<Vec<u8>>,
    done: oneshot::Sender<io::Result<()>>,
}

struct WorkerHandle {
    stop_tx: oneshot::Sender<()>,
    outbound_tx: mpsc::UnboundedSender<Outbound>,
    join: JoinHandle<Box<dyn SerialLink>>,
}

/// CI-V transceiver controller for the IC-9700
pub struct Ic9700Controller {
    radio_addr: u8,
    poll_interval: Duration,
    link: Option<Box<dyn SerialLink>>,
    shared: Arc<Mutex<Shared>>,
    worker: Option<WorkerHandle>,
}

impl Ic9700Controller {
    /// Create a stopped controller that will talk over `link`
    pub fn new(link: Box<dyn SerialLink>) -> Self {
        Self::with_settings(link, CIV_DEFAULT_RADIO_ADDR, DEFAULT_POLL_INTERVAL)
    }

    /// Create a stopped controller with an explicit CI-V address and poll interval
    pub fn with_settings(link: Box<dyn SerialLink>, radio_addr: u8, poll_interval: Duration) -> Self {
        Self {
            radio_addr,
            poll_interval,
            link: Some(link),
            shared: Arc::new(Mutex::new(Shared {
                status: ControllerStatus::Stopped,
                state: DeviceState::new(),
                satellite_mode: false,
                events: None,
            })),
            worker: None,
        }
    }

    /// Snapshot of the requested/received state
    pub fn device_state(&self) -> DeviceState {
        lock(&self.shared).state.clone()
    }

    /// Stop the worker, if any, and take the closed link back
    async fn join_worker(&mut self) {
        if let Some(worker) = self.worker.take() {
            let _ = worker.stop_tx.send(());
            match worker.join.await {
                Ok(mut link) => {
                    if let Err(e) = link.close().await {
                        warn!("Failed to close transceiver link: {}", e);
                    }
                    self.link = Some(link);
                }
                Err(e) => warn!("Transceiver worker ended abnormally: {}", e),
            }
            info!("IC-9700 controller stopped");
        }
    }

    /// Queue frames for the worker and wait until they are written
    async fn send(&self, band: Option<Band>, frames: Vec<Vec<u8>>) -> Result<()> {
        let worker = self.worker.as_ref().ok_or(OrbitRigError::NotConnected)?;
        let (done, done_rx) = oneshot::channel();
        worker
            .outbound_tx
            .send(Outbound { band, frames, done })
            .map_err(|_| OrbitRigError::NotConnected)?;

        done_rx
            .await
            .map_err(|_| OrbitRigError::NotConnected)?
            .map_err(|e| OrbitRigError::Serial(format!("Failed to write command: {}", e)))
    }
}

#[async_trait]
impl TransceiverController for Ic9700Controller {
    async fn start(&mut self) -> Result<()> {
        if let Some(worker) = &self.worker {
            if !worker.join.is_finished() {
                debug!("IC-9700 controller already running");
                return Ok(());
            }
            // Worker exited after a link failure; reclaim the link first
            self.join_worker().await;
        }

        let mut link = self.link.take().ok_or_else(|| {
            OrbitRigError::LinkUnavailable("serial link lost by a previous run".to_string())
        })?;

        lock(&self.shared).status = ControllerStatus::Starting;

        if let Err(e) = link.open().await {
            let path = link.device_path().to_string();
            self.link = Some(link);
            lock(&self.shared).status = ControllerStatus::Stopped;
            warn!("Failed to open transceiver link {}: {}", path, e);
            return Err(OrbitRigError::LinkUnavailable(format!("{}: {}", path, e)));
        }

        info!("IC-9700 controller started on {}", link.device_path());

        {
            let mut shared = lock(&self.shared);
            shared.state = DeviceState::new();
            shared.status = ControllerStatus::Monitoring;
        }

        let (stop_tx, stop_rx) = oneshot::channel();
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let worker = Worker {
            link,
            shared: self.shared.clone(),
            radio_addr: self.radio_addr,
            poll_interval: self.poll_interval,
            selected: None,
            pending: PendingReads::default(),
        };
        let join = tokio::spawn(worker.run(stop_rx, outbound_rx));

        self.worker = Some(WorkerHandle {
            stop_tx,
            outbound_tx,
            join,
        });

        Ok(())
    }

    async fn stop(&mut self) {
        self.join_worker().await;

        let mut shared = lock(&self.shared);
        shared.status = ControllerStatus::Stopped;
        shared.events = None;
    }

    async fn set_frequency(&mut self, band: Band, hz: u64) -> Result<()> {
        if self.worker.is_none() {
            return Err(OrbitRigError::NotConnected);
        }
        let freq_frame = set_frequency_command(self.radio_addr, hz)?;

        {
            let mut shared = lock(&self.shared);
            shared.state.set_requested_freq(band, hz);
            if !shared.state.band(band).req_freq_dirty {
                trace!("{:?} already requested at {} Hz", band, hz);
                return Ok(());
            }
        }

        debug!("Setting {:?} frequency to {} Hz", band, hz);
        self.send(Some(band), vec![freq_frame]).await?;
        lock(&self.shared).state.clear_requested_freq(band);
        Ok(())
    }

    async fn set_mode(&mut self, band: Band, mode: OperatingMode, data_mode: DataMode) -> Result<()> {
        if self.worker.is_none() {
            return Err(OrbitRigError::NotConnected);
        }
        let mode_frame = set_mode_command(self.radio_addr, mode)?;

        {
            let mut shared = lock(&self.shared);
            let drifted = matches!(
                shared.state.band(band).received_mode,
                Some(current) if current != mode
            );
            shared.state.set_requested_mode(band, mode, data_mode, drifted);
            if !shared.state.band(band).req_mode_dirty {
                trace!("{:?} already requested in {}", band, mode);
                return Ok(());
            }
        }

        debug!("Setting {:?} mode to {} ({:?})", band, mode, data_mode);
        self.send(
            Some(band),
            vec![mode_frame, set_data_mode_command(self.radio_addr, data_mode)],
        )
        .await?;
        lock(&self.shared).state.clear_requested_mode(band);
        Ok(())
    }

    async fn set_satellite_mode(&mut self, on: bool) -> Result<()> {
        self.send(None, vec![satellite_mode_command(self.radio_addr, on)])
            .await?;

        let mut shared = lock(&self.shared);
        if shared.satellite_mode != on {
            shared.satellite_mode = on;
            shared.emit(TransceiverEvent::SatelliteModeChanged(on));
        }
        Ok(())
    }

    async fn set_tone(&mut self, tone_hz: f64) -> Result<()> {
        let tone_frame = set_tone_command(self.radio_addr, tone_hz)?;
        self.send(Some(Band::Tx), vec![tone_frame]).await
    }

    fn set_callback(&mut self, events: TransceiverEventSender) {
        lock(&self.shared).events = Some(events);
    }

    fn unset_callback(&mut self) {
        lock(&self.shared).events = None;
    }

    fn status(&self) -> ControllerStatus {
        lock(&self.shared).status
    }

    fn satellite_mode(&self) -> bool {
        lock(&self.shared).satellite_mode
    }
}

/// Bands of read commands still waiting for their reply, in write order
#[derive(Debug, Default)]
struct PendingReads {
    freq: VecDeque<Band>,
    mode: VecDeque<Band>,
}

impl PendingReads {
    fn clear(&mut self) {
        self.freq.clear();
        self.mode.clear();
    }
}

/// Owns the link while the controller runs
struct Worker {
    link: Box<dyn SerialLink>,
    shared: Arc<Mutex<Shared>>,
    radio_addr: u8,
    poll_interval: Duration,
    /// Band selected on the radio; unknown until we select one
    selected: Option<Band>,
    pending: PendingReads,
}

impl Worker {
    async fn run(
        mut self,
        mut stop_rx: oneshot::Receiver<()>,
        mut outbound_rx: mpsc::UnboundedReceiver<Outbound>,
    ) -> Box<dyn SerialLink> {
        let mut buf = BytesMut::with_capacity(256);
        let mut chunk = [0u8; READ_CHUNK_SIZE];
        let mut poll = interval(self.poll_interval);
        poll.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let query = [read_satellite_mode_command(self.radio_addr)];
        if let Err(e) = self.write_frames(None, &query).await {
            warn!("Failed to query satellite mode: {}", e);
        }

        loop {
            tokio::select! {
                _ = &mut stop_rx => break,
                Some(outbound) = outbound_rx.recv() => {
                    let result = self.write_frames(outbound.band, &outbound.frames).await;
                    let _ = outbound.done.send(result);
                }
                _ = poll.tick() => self.poll().await,
                read = self.link.read(&mut chunk) => match read {
                    Ok(0) => {
                        warn!("Transceiver link closed by the device");
                        self.disconnect();
                        break;
                    }
                    Ok(n) => {
                        buf.extend_from_slice(&chunk[..n]);
                        while let Some(frame) = next_frame(&mut buf) {
                            self.handle_frame(&frame);
                        }
                    }
                    Err(e) => {
                        warn!("Transceiver read failed: {}", e);
                        self.disconnect();
                        break;
                    }
                }
            }
        }

        self.link
    }

    /// Read frequency and mode of the selected band
    ///
    /// Only selects a band when none is known yet (Rx after start).
    async fn poll(&mut self) {
        let band = self.selected.unwrap_or(Band::Rx);
        if !self.pending.freq.is_empty() || !self.pending.mode.is_empty() {
            debug!("Previous poll went unanswered, dropping its pending reads");
            self.pending.clear();
        }

        let frames = [
            read_frequency_command(self.radio_addr),
            read_mode_command(self.radio_addr),
        ];
        match self.write_frames(Some(band), &frames).await {
            Ok(()) => {
                self.pending.freq.push_back(band);
                self.pending.mode.push_back(band);
            }
            Err(e) => warn!("Failed to poll {:?}: {}", band, e),
        }
    }

    /// Write `frames`, selecting `band` first when the radio is on the other one
    async fn write_frames(&mut self, band: Option<Band>, frames: &[Vec<u8>]) -> io::Result<()> {
        if let Some(band) = band {
            if self.selected != Some(band) {
                let select = select_band_command(self.radio_addr, band);
                trace!("CI-V TX: {:02X?}", select);
                if let Err(e) = self.link.write_all(&select).await {
                    // Partial write: the radio's selection is unknown now
                    self.selected = None;
                    return Err(e);
                }
                self.selected = Some(band);
            }
        }
        for frame in frames {
            trace!("CI-V TX: {:02X?}", frame);
            self.link.write_all(frame).await?;
        }
        self.link.flush().await
    }

    /// Band a frequency or mode report belongs to
    fn report_band(&mut self, frame: &[u8], message: &CivMessage) -> Band {
        let current = self.selected.unwrap_or(Band::Rx);
        if !is_read_reply(frame) {
            return current;
        }
        let queue = match message {
            CivMessage::Mode(_) => &mut self.pending.mode,
            _ => &mut self.pending.freq,
        };
        queue.pop_front().unwrap_or_else(|| {
            trace!("Unexpected read reply, crediting selected band {:?}", current);
            current
        })
    }

    fn handle_frame(&mut self, frame: &[u8]) {
        trace!("CI-V RX: {:02X?}", frame);
        let message = match decode_frame(frame) {
            Ok(Some(message)) => message,
            Ok(None) => return,
            Err(e) => {
                debug!("Dropping malformed CI-V frame: {}", e);
                return;
            }
        };

        let band = match message {
            CivMessage::Frequency(_) | CivMessage::Mode(_) => self.report_band(frame, &message),
            _ => self.selected.unwrap_or(Band::Rx),
        };

        let mut shared = lock(&self.shared);
        match message {
            CivMessage::Frequency(hz) => shared.state.set_received_freq(band, hz),
            CivMessage::Mode(mode) => shared.state.set_received_mode(band, mode),
            CivMessage::SatelliteMode(on) => {
                if shared.satellite_mode != on {
                    shared.satellite_mode = on;
                    shared.emit(TransceiverEvent::SatelliteModeChanged(on));
                }
            }
            CivMessage::Ack => trace!("Radio acknowledged command"),
            CivMessage::Nak => warn!("Radio rejected command (NAK)"),
        }
        shared.drain_received();
    }

    fn disconnect(&self) {
        let mut shared = lock(&self.shared);
        shared.status = ControllerStatus::Stopped;
        shared.emit(TransceiverEvent::Disconnected);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::civ::protocol::*;
    use crate::serial::port_trait::mocks::MockSerialLink;
    use tokio::sync::mpsc::UnboundedReceiver;

    const POLL: Duration = Duration::from_secs(1);

    fn controller(link: &MockSerialLink) -> Ic9700Controller {
        Ic9700Controller::with_settings(Box::new(link.clone()), CIV_DEFAULT_RADIO_ADDR, POLL)
    }

    async fn started(link: &MockSerialLink) -> (Ic9700Controller, UnboundedReceiver<TransceiverEvent>) {
        let mut ctrl = controller(link);
        let (tx, rx) = mpsc::unbounded_channel();
        ctrl.set_callback(tx);
        ctrl.start().await.unwrap();
        settle().await;
        (ctrl, rx)
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    fn drain(rx: &mut UnboundedReceiver<TransceiverEvent>) -> Vec<TransceiverEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    fn read_freq_reply(hz: u64) -> Vec<u8> {
        encode_reply(CMD_READ_FREQ, &encode_frequency(hz).unwrap())
    }

    fn encode_reply(cmd: u8, data: &[u8]) -> Vec<u8> {
        let mut frame = vec![0xFE, 0xFE, CIV_CONTROLLER_ADDR, CIV_DEFAULT_RADIO_ADDR, cmd];
        frame.extend_from_slice(data);
        frame.push(CIV_TERMINATOR);
        frame
    }

    // ==================== Lifecycle Tests ====================

    #[tokio::test(start_paused = true)]
    async fn test_start_opens_link_and_polls() {
        let link = MockSerialLink::new();
        let (ctrl, _rx) = started(&link).await;

        assert!(link.is_open());
        assert_eq!(ctrl.status(), ControllerStatus::Monitoring);

        assert_eq!(
            link.get_written_data(),
            vec![
                read_satellite_mode_command(CIV_DEFAULT_RADIO_ADDR),
                select_band_command(CIV_DEFAULT_RADIO_ADDR, Band::Rx),
                read_frequency_command(CIV_DEFAULT_RADIO_ADDR),
                read_mode_command(CIV_DEFAULT_RADIO_ADDR),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_keeps_band_selection() {
        let link = MockSerialLink::new();
        let (mut ctrl, _rx) = started(&link).await;
        link.clear_written_data();

        tokio::time::sleep(POLL * 3).await;

        let written = link.get_written_data();
        assert_eq!(written.len(), 6);
        assert!(written.iter().all(|frame| frame[4] != CMD_SELECT_BAND));

        // After a Tx command the poll follows the radio's selection
        ctrl.set_frequency(Band::Tx, 435_250_000).await.unwrap();
        link.clear_written_data();
        tokio::time::sleep(POLL).await;
        assert_eq!(
            link.get_written_data(),
            vec![
                read_frequency_command(CIV_DEFAULT_RADIO_ADDR),
                read_mode_command(CIV_DEFAULT_RADIO_ADDR),
            ]
        );
        ctrl.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_with_unavailable_link() {
        let link = MockSerialLink::new();
        link.set_open_error(io::ErrorKind::NotFound);
        let mut ctrl = controller(&link);

        match ctrl.start().await {
            Err(OrbitRigError::LinkUnavailable(msg)) => assert!(msg.contains("/dev/mock0")),
            other => panic!("Expected LinkUnavailable, got: {:?}", other),
        }
        assert_eq!(ctrl.status(), ControllerStatus::Stopped);

        // The link is kept, so a retry succeeds once the port is back
        *link.open_error.lock().unwrap() = None;
        assert!(ctrl.start().await.is_ok());
        assert_eq!(ctrl.status(), ControllerStatus::Monitoring);
        ctrl.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_is_idempotent_and_restartable() {
        let link = MockSerialLink::new();
        let (mut ctrl, _rx) = started(&link).await;

        ctrl.stop().await;
        assert!(!link.is_open());
        assert_eq!(ctrl.status(), ControllerStatus::Stopped);
        ctrl.stop().await;
        assert_eq!(ctrl.status(), ControllerStatus::Stopped);

        ctrl.start().await.unwrap();
        assert!(link.is_open());
        assert_eq!(link.open_calls(), 2);
        ctrl.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_read_failure_disconnects() {
        let link = MockSerialLink::new();
        let (mut ctrl, mut rx) = started(&link).await;

        link.fail_reads(io::ErrorKind::BrokenPipe);
        settle().await;
        assert_eq!(drain(&mut rx), vec![TransceiverEvent::Disconnected]);
        assert_eq!(ctrl.status(), ControllerStatus::Stopped);
        assert!(matches!(
            ctrl.set_frequency(Band::Rx, 145_800_000).await,
            Err(OrbitRigError::NotConnected)
        ));

        // start() reclaims the link from the dead worker and keeps the callback
        link.restore_reads();
        ctrl.start().await.unwrap();
        assert_eq!(ctrl.status(), ControllerStatus::Monitoring);
        assert_eq!(link.open_calls(), 2);

        link.push_inbound(&read_freq_reply(145_800_000));
        settle().await;
        assert_eq!(
            drain(&mut rx),
            vec![TransceiverEvent::FrequencyChanged { band: Band::Rx, hz: 145_800_000 }]
        );
        ctrl.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_unregisters_callback() {
        let link = MockSerialLink::new();
        let (mut ctrl, mut rx) = started(&link).await;
        ctrl.stop().await;

        // Sender was dropped by stop(), so the channel reports disconnection
        drain(&mut rx);
        assert!(rx.try_recv().is_err());
        assert!(rx.recv().await.is_none());
    }

    // ==================== Command Tests ====================

    #[tokio::test(start_paused = true)]
    async fn test_set_frequency_not_connected() {
        let link = MockSerialLink::new();
        let mut ctrl = controller(&link);
        assert!(matches!(
            ctrl.set_frequency(Band::Rx, 145_800_000).await,
            Err(OrbitRigError::NotConnected)
        ));
        assert!(link.get_written_data().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_set_frequency_sends_select_and_set() {
        let link = MockSerialLink::new();
        let (mut ctrl, _rx) = started(&link).await;
        link.clear_written_data();

        ctrl.set_frequency(Band::Tx, 435_250_000).await.unwrap();

        assert_eq!(
            link.get_written_data(),
            vec![
                select_band_command(CIV_DEFAULT_RADIO_ADDR, Band::Tx),
                set_frequency_command(CIV_DEFAULT_RADIO_ADDR, 435_250_000).unwrap(),
            ]
        );
        assert!(!ctrl.device_state().is_tx_dirty());

        // Tx is selected now, so the next change goes out without a select
        link.clear_written_data();
        ctrl.set_frequency(Band::Tx, 435_251_000).await.unwrap();
        assert_eq!(
            link.get_written_data(),
            vec![set_frequency_command(CIV_DEFAULT_RADIO_ADDR, 435_251_000).unwrap()]
        );
        ctrl.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_repeated_frequency_is_suppressed() {
        let link = MockSerialLink::new();
        let (mut ctrl, _rx) = started(&link).await;

        ctrl.set_frequency(Band::Rx, 145_800_000).await.unwrap();
        link.clear_written_data();
        ctrl.set_frequency(Band::Rx, 145_800_000).await.unwrap();

        assert!(link.get_written_data().is_empty());
        ctrl.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_write_failure_is_reported() {
        let link = MockSerialLink::new();
        let (mut ctrl, _rx) = started(&link).await;
        link.set_write_error(io::ErrorKind::BrokenPipe);

        match ctrl.set_frequency(Band::Rx, 145_800_000).await {
            Err(OrbitRigError::Serial(msg)) => assert!(msg.contains("Failed to write")),
            other => panic!("Expected Serial error, got: {:?}", other),
        }
        // The request stays dirty so the same value is retried
        assert!(ctrl.device_state().band(Band::Rx).req_freq_dirty);

        *link.write_error.lock().unwrap() = None;
        ctrl.set_frequency(Band::Rx, 145_800_000).await.unwrap();
        assert!(!ctrl.device_state().is_rx_dirty());
        ctrl.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_mode_survives_frequency_change() {
        let link = MockSerialLink::new();
        let (mut ctrl, _rx) = started(&link).await;

        link.set_write_error(io::ErrorKind::BrokenPipe);
        assert!(ctrl.set_mode(Band::Tx, OperatingMode::Fm, DataMode::Off).await.is_err());
        *link.write_error.lock().unwrap() = None;

        ctrl.set_frequency(Band::Tx, 435_250_000).await.unwrap();
        assert!(ctrl.device_state().band(Band::Tx).req_mode_dirty);

        link.clear_written_data();
        ctrl.set_mode(Band::Tx, OperatingMode::Fm, DataMode::Off).await.unwrap();
        assert_eq!(
            link.get_written_data(),
            vec![
                set_mode_command(CIV_DEFAULT_RADIO_ADDR, OperatingMode::Fm).unwrap(),
                set_data_mode_command(CIV_DEFAULT_RADIO_ADDR, DataMode::Off),
            ]
        );
        assert!(!ctrl.device_state().is_tx_dirty());
        ctrl.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_set_mode_sends_mode_and_data_mode() {
        let link = MockSerialLink::new();
        let (mut ctrl, _rx) = started(&link).await;
        link.clear_written_data();

        ctrl.set_mode(Band::Tx, OperatingMode::Usb, DataMode::Off).await.unwrap();

        assert_eq!(
            link.get_written_data(),
            vec![
                select_band_command(CIV_DEFAULT_RADIO_ADDR, Band::Tx),
                set_mode_command(CIV_DEFAULT_RADIO_ADDR, OperatingMode::Usb).unwrap(),
                set_data_mode_command(CIV_DEFAULT_RADIO_ADDR, DataMode::Off),
            ]
        );

        link.clear_written_data();
        ctrl.set_mode(Band::Tx, OperatingMode::Usb, DataMode::Off).await.unwrap();
        assert!(link.get_written_data().is_empty());
        ctrl.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_set_mode_reasserts_after_drift() {
        let link = MockSerialLink::new();
        let (mut ctrl, _rx) = started(&link).await;
        ctrl.set_mode(Band::Rx, OperatingMode::Usb, DataMode::Off).await.unwrap();

        // The radio answers the first poll's mode read with FM
        link.push_inbound(&encode_reply(CMD_READ_MODE, &[0x05, 0x01]));
        settle().await;
        link.clear_written_data();

        // Rx is still selected, so mode and data mode go out without a select
        ctrl.set_mode(Band::Rx, OperatingMode::Usb, DataMode::Off).await.unwrap();
        assert_eq!(link.get_written_data().len(), 2);
        ctrl.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_set_satellite_mode() {
        let link = MockSerialLink::new();
        let (mut ctrl, mut rx) = started(&link).await;
        link.clear_written_data();

        ctrl.set_satellite_mode(true).await.unwrap();

        assert_eq!(
            link.get_written_data(),
            vec![satellite_mode_command(CIV_DEFAULT_RADIO_ADDR, true)]
        );
        assert!(ctrl.satellite_mode());
        assert_eq!(drain(&mut rx), vec![TransceiverEvent::SatelliteModeChanged(true)]);

        // Setting it again still sends, but no new event
        ctrl.set_satellite_mode(true).await.unwrap();
        assert!(drain(&mut rx).is_empty());
        ctrl.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_set_tone() {
        let link = MockSerialLink::new();
        let (mut ctrl, _rx) = started(&link).await;
        link.clear_written_data();

        ctrl.set_tone(67.0).await.unwrap();
        assert_eq!(
            link.get_written_data(),
            vec![
                select_band_command(CIV_DEFAULT_RADIO_ADDR, Band::Tx),
                set_tone_command(CIV_DEFAULT_RADIO_ADDR, 67.0).unwrap(),
            ]
        );
        assert!(matches!(
            ctrl.set_tone(1234.5).await,
            Err(OrbitRigError::ToneOverflow(_))
        ));
        ctrl.stop().await;
    }

    // ==================== Receive Tests ====================

    #[tokio::test(start_paused = true)]
    async fn test_received_frequency_event() {
        let link = MockSerialLink::new();
        let (mut ctrl, mut rx) = started(&link).await;

        link.push_inbound(&read_freq_reply(145_800_000));
        settle().await;

        assert_eq!(
            drain(&mut rx),
            vec![TransceiverEvent::FrequencyChanged {
                band: Band::Rx,
                hz: 145_800_000
            }]
        );

        // Same report again: nothing changed, no event
        link.push_inbound(&read_freq_reply(145_800_000));
        settle().await;
        assert!(drain(&mut rx).is_empty());
        ctrl.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_received_frequency_refreshes_both_bands() {
        let link = MockSerialLink::new();
        let (mut ctrl, mut rx) = started(&link).await;

        link.push_inbound(&read_freq_reply(145_800_000));
        settle().await;
        drain(&mut rx);

        // A Tx command moves the selection; the next poll reads Tx
        ctrl.set_frequency(Band::Tx, 435_250_000).await.unwrap();
        tokio::time::sleep(POLL).await;
        link.push_inbound(&read_freq_reply(435_250_000));
        settle().await;

        assert_eq!(
            drain(&mut rx),
            vec![
                TransceiverEvent::FrequencyChanged { band: Band::Rx, hz: 145_800_000 },
                TransceiverEvent::FrequencyChanged { band: Band::Tx, hz: 435_250_000 },
            ]
        );
        ctrl.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_reply_credited_to_band_it_answers() {
        let link = MockSerialLink::new();
        let (mut ctrl, mut rx) = started(&link).await;

        // The Rx poll is still unanswered when a Tx command switches bands
        ctrl.set_frequency(Band::Tx, 435_250_000).await.unwrap();
        link.push_inbound(&read_freq_reply(145_800_000));
        settle().await;

        assert_eq!(
            drain(&mut rx),
            vec![TransceiverEvent::FrequencyChanged { band: Band::Rx, hz: 145_800_000 }]
        );
        let state = ctrl.device_state();
        assert_eq!(state.band(Band::Rx).received_freq, 145_800_000);
        assert_eq!(state.band(Band::Tx).received_freq, 0);
        ctrl.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_transceive_report_uses_selected_band() {
        let link = MockSerialLink::new();
        let (mut ctrl, mut rx) = started(&link).await;
        ctrl.set_frequency(Band::Tx, 435_250_000).await.unwrap();

        let report = encode_reply(CMD_TRANSCEIVE_FREQ, &encode_frequency(435_260_000).unwrap());
        link.push_inbound(&report);
        settle().await;

        assert_eq!(
            drain(&mut rx),
            vec![TransceiverEvent::FrequencyChanged { band: Band::Tx, hz: 435_260_000 }]
        );
        ctrl.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_received_mode_event() {
        let link = MockSerialLink::new();
        let (mut ctrl, mut rx) = started(&link).await;

        link.push_inbound(&encode_reply(CMD_READ_MODE, &[0x17, 0x01]));
        settle().await;

        assert_eq!(
            drain(&mut rx),
            vec![TransceiverEvent::ModeChanged {
                band: Band::Rx,
                mode: OperatingMode::Dv
            }]
        );
        ctrl.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_malformed_frames_are_dropped() {
        let link = MockSerialLink::new();
        let (mut ctrl, mut rx) = started(&link).await;

        // Noise, a bad BCD digit, an unknown mode, then a good report
        link.push_inbound(&[0x13, 0x37]);
        link.push_inbound(&encode_reply(CMD_READ_FREQ, &[0xAA, 0x00, 0x00, 0x00, 0x00]));
        link.push_inbound(&encode_reply(CMD_READ_MODE, &[0x42, 0x01]));
        link.push_inbound(&read_freq_reply(145_990_000));
        settle().await;

        assert_eq!(
            drain(&mut rx),
            vec![TransceiverEvent::FrequencyChanged {
                band: Band::Rx,
                hz: 145_990_000
            }]
        );
        assert_eq!(ctrl.status(), ControllerStatus::Monitoring);
        ctrl.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_frame_split_across_reads() {
        let link = MockSerialLink::new();
        let (mut ctrl, mut rx) = started(&link).await;

        let frame = read_freq_reply(435_000_000);
        link.push_inbound(&frame[..4]);
        link.push_inbound(&frame[4..]);
        settle().await;

        assert_eq!(drain(&mut rx).len(), 1);
        ctrl.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_satellite_mode_report() {
        let link = MockSerialLink::new();
        let (mut ctrl, mut rx) = started(&link).await;

        link.push_inbound(&encode_reply(CMD_FUNCTION, &[SUB_SATELLITE_MODE, SATELLITE_ON]));
        settle().await;

        assert!(ctrl.satellite_mode());
        assert_eq!(drain(&mut rx), vec![TransceiverEvent::SatelliteModeChanged(true)]);
        ctrl.stop().await;
    }
}
