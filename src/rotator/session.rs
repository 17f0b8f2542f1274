//! # Serial Rotator Driver
//!
//! Generic controller for line-oriented ASCII rotators. The wire format lives
//! in a [`RotatorProtocol`]; this module owns the link, the poll timer and
//! the receive watchdog.
//!
//! While running, a worker task:
//! - writes the protocol's start command once
//! - writes the poll command on every tick (if the protocol polls)
//! - splits the receive stream into lines and parses positions
//! - faults the link when the watchdog deadline passes, sending one
//!   [`RotatorEvent::Disconnected`] and halting the poll
//!
//! A faulted link ignores further frames until `stop()` and `start()`.

use async_trait::async_trait;
use bytes::BytesMut;
use std::io;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{interval, sleep_until, Instant, Interval, MissedTickBehavior};
use tracing::{debug, error, info, trace, warn};

use super::watchdog::{LinkState, ResponseWatchdog, TimeoutPolicy};
use super::{AntennaPosition, PositionRange, RotatorController, RotatorEvent, RotatorEventSender};
use crate::error::{OrbitRigError, Result};
use crate::serial::SerialLink;

/// Lines longer than this without a terminator are discarded
const MAX_LINE_LEN: usize = 256;

/// Chunk size for each serial read call
const READ_CHUNK_SIZE: usize = 64;

/// Wire format of one rotator family
pub trait RotatorProtocol: Send + Sync + 'static {
    /// Short name for log lines
    fn name(&self) -> &'static str;

    fn timeout_policy(&self) -> TimeoutPolicy;

    /// Default receive timeout
    fn timeout(&self) -> Duration;

    /// Default poll period; `None` for devices that push on their own
    fn poll_interval(&self) -> Option<Duration>;

    /// Sent once after the link opens
    fn start_command(&self) -> Option<Vec<u8>> {
        None
    }

    /// Sent once before the link closes
    fn stop_command(&self) -> Option<Vec<u8>> {
        None
    }

    /// Sent on every poll tick
    fn poll_command(&self) -> Option<Vec<u8>> {
        None
    }

    /// Parse one received line (terminator stripped)
    fn parse_line(&self, line: &str) -> Result<AntennaPosition>;

    /// Encode a set-position command
    fn position_command(&self, position: AntennaPosition) -> Result<Vec<u8>>;
}

/// Pull the next non-empty line out of the receive buffer
///
/// Lines end in `\n` or `\r`; surrounding whitespace is trimmed.
pub fn next_line(buf: &mut BytesMut) -> Option<String> {
    loop {
        let end = match buf.iter().position(|&b| b == b'\n' || b == b'\r') {
            Some(end) => end,
            None => {
                if buf.len() > MAX_LINE_LEN {
                    debug!("Discarding {} bytes without line terminator", buf.len());
                    buf.clear();
                }
                return None;
            }
        };

        let line = buf.split_to(end + 1);
        let text = String::from_utf8_lossy(&line[..end]).trim().to_string();
        if !text.is_empty() {
            return Some(text);
        }
    }
}

struct Shared {
    watchdog: ResponseWatchdog,
    position: Option<AntennaPosition>,
    events: Option<RotatorEventSender>,
}

impl Shared {
    fn emit(&self, event: RotatorEvent) {
        if let Some(events) = &self.events {
            let _ = events.send(event);
        }
    }
}

fn lock(shared: &Mutex<Shared>) -> MutexGuard<'_, Shared> {
    shared.lock().unwrap_or_else(PoisonError::into_inner)
}

struct Outbound {
    frame: Vec<u8>,
    done: oneshot::Sender<io::Result<()>>,
}

struct WorkerHandle {
    stop_tx: oneshot::Sender<()>,
    outbound_tx: mpsc::UnboundedSender<Outbound>,
    join: JoinHandle<Box<dyn SerialLink>>,
}

/// Rotator controller over a serial link, generic over the wire format
pub struct SerialRotator<P: RotatorProtocol> {
    protocol: Arc<P>,
    range: PositionRange,
    poll_interval: Option<Duration>,
    link: Option<Box<dyn SerialLink>>,
    shared: Arc<Mutex<Shared>>,
    worker: Option<WorkerHandle>,
}

impl<P: RotatorProtocol> SerialRotator<P> {
    /// Create a stopped rotator with the protocol's default timing
    pub fn new(protocol: P, link: Box<dyn SerialLink>) -> Self {
        let watchdog = ResponseWatchdog::new(protocol.timeout_policy(), protocol.timeout());
        Self {
            poll_interval: protocol.poll_interval(),
            protocol: Arc::new(protocol),
            range: PositionRange::default(),
            link: Some(link),
            shared: Arc::new(Mutex::new(Shared {
                watchdog,
                position: None,
                events: None,
            })),
            worker: None,
        }
    }

    /// Limit commanded positions to `range`
    pub fn with_range(mut self, range: PositionRange) -> Self {
        self.range = range;
        self
    }

    /// Override the receive timeout
    pub fn with_timeout(self, timeout: Duration) -> Self {
        lock(&self.shared).watchdog = ResponseWatchdog::new(self.protocol.timeout_policy(), timeout);
        self
    }

    /// Override the poll period; ignored by protocols that do not poll
    pub fn with_poll_interval(mut self, period: Duration) -> Self {
        if self.poll_interval.is_some() {
            self.poll_interval = Some(period);
        }
        self
    }

    pub fn protocol(&self) -> &P {
        &self.protocol
    }

    pub fn range(&self) -> PositionRange {
        self.range
    }

    /// Stop the worker, if any, and take the closed link back
    async fn join_worker(&mut self) {
        if let Some(worker) = self.worker.take() {
            let _ = worker.stop_tx.send(());
            match worker.join.await {
                Ok(mut link) => {
                    if let Err(e) = link.close().await {
                        warn!("Failed to close rotator link: {}", e);
                    }
                    self.link = Some(link);
                }
                Err(e) => warn!("Rotator worker ended abnormally: {}", e),
            }
            info!("{} rotator stopped", self.protocol.name());
        }
    }
}

#[async_trait]
impl<P: RotatorProtocol> RotatorController for SerialRotator<P> {
    async fn start(&mut self) -> Result<()> {
        if let Some(worker) = &self.worker {
            if !worker.join.is_finished() {
                debug!("{} rotator already running", self.protocol.name());
                return Ok(());
            }
            // Worker exited after a link failure; reclaim the link first
            self.join_worker().await;
        }

        let mut link = self.link.take().ok_or_else(|| {
            OrbitRigError::LinkUnavailable("serial link lost by a previous run".to_string())
        })?;

        if let Err(e) = link.open().await {
            let path = link.device_path().to_string();
            self.link = Some(link);
            warn!("Failed to open {} rotator link {}: {}", self.protocol.name(), path, e);
            return Err(OrbitRigError::LinkUnavailable(format!("{}: {}", path, e)));
        }

        info!("{} rotator started on {}", self.protocol.name(), link.device_path());

        {
            let mut shared = lock(&self.shared);
            shared.position = None;
            shared.watchdog.arm();
        }

        let (stop_tx, stop_rx) = oneshot::channel();
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let worker = Worker {
            link,
            protocol: self.protocol.clone(),
            shared: self.shared.clone(),
            poll_interval: self.poll_interval,
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
        shared.watchdog.reset();
        shared.events = None;
    }

    async fn set_position(&mut self, position: AntennaPosition) -> Result<()> {
        if !self.range.contains(&position) {
            debug!("Ignoring out-of-range position {}", position);
            return Ok(());
        }

        let worker = self.worker.as_ref().ok_or(OrbitRigError::NotConnected)?;
        let frame = self.protocol.position_command(position)?;
        debug!("Moving {} rotator to {}", self.protocol.name(), position);

        let (done, done_rx) = oneshot::channel();
        worker
            .outbound_tx
            .send(Outbound { frame, done })
            .map_err(|_| OrbitRigError::NotConnected)?;

        done_rx
            .await
            .map_err(|_| OrbitRigError::NotConnected)?
            .map_err(|e| OrbitRigError::Serial(format!("Failed to write command: {}", e)))
    }

    fn set_callback(&mut self, events: RotatorEventSender) {
        lock(&self.shared).events = Some(events);
    }

    fn unset_callback(&mut self) {
        lock(&self.shared).events = None;
    }

    fn link_state(&self) -> LinkState {
        lock(&self.shared).watchdog.state()
    }

    fn last_position(&self) -> Option<AntennaPosition> {
        lock(&self.shared).position
    }
}

async fn tick(poll: &mut Option<Interval>) {
    match poll {
        Some(poll) => {
            poll.tick().await;
        }
        None => std::future::pending().await,
    }
}

struct Worker<P: RotatorProtocol> {
    link: Box<dyn SerialLink>,
    protocol: Arc<P>,
    shared: Arc<Mutex<Shared>>,
    poll_interval: Option<Duration>,
}

impl<P: RotatorProtocol> Worker<P> {
    async fn run(
        mut self,
        mut stop_rx: oneshot::Receiver<()>,
        mut outbound_rx: mpsc::UnboundedReceiver<Outbound>,
    ) -> Box<dyn SerialLink> {
        let mut buf = BytesMut::with_capacity(MAX_LINE_LEN);
        let mut chunk = [0u8; READ_CHUNK_SIZE];
        let mut poll = self.poll_interval.map(|period| {
            let mut poll = interval(period);
            poll.set_missed_tick_behavior(MissedTickBehavior::Delay);
            poll
        });
        let poll_command = self.protocol.poll_command();

        if let Some(command) = self.protocol.start_command() {
            if let Err(e) = self.write(&command).await {
                warn!("Failed to send {} start command: {}", self.protocol.name(), e);
            }
        }

        loop {
            let (deadline, polling) = {
                let shared = lock(&self.shared);
                let polling = poll_command.is_some() && shared.watchdog.state() != LinkState::Faulted;
                (shared.watchdog.deadline(), polling)
            };

            tokio::select! {
                _ = &mut stop_rx => {
                    if let Some(command) = self.protocol.stop_command() {
                        if let Err(e) = self.write(&command).await {
                            debug!("Failed to send {} stop command: {}", self.protocol.name(), e);
                        }
                    }
                    break;
                }
                Some(outbound) = outbound_rx.recv() => {
                    let result = self.write(&outbound.frame).await;
                    let _ = outbound.done.send(result);
                }
                _ = tick(&mut poll), if polling => {
                    if let Some(command) = &poll_command {
                        if let Err(e) = self.write(command).await {
                            warn!("Failed to poll {} rotator: {}", self.protocol.name(), e);
                        }
                    }
                }
                _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    let mut shared = lock(&self.shared);
                    if shared.watchdog.expire() {
                        warn!(
                            "{} rotator sent no valid response within {:?}",
                            self.protocol.name(),
                            shared.watchdog.timeout()
                        );
                        shared.emit(RotatorEvent::Disconnected);
                    }
                }
                read = self.link.read(&mut chunk) => match read {
                    Ok(0) => {
                        warn!("{} rotator link closed by the device", self.protocol.name());
                        self.fault();
                        break;
                    }
                    Ok(n) => {
                        buf.extend_from_slice(&chunk[..n]);
                        while let Some(line) = next_line(&mut buf) {
                            self.handle_line(&line);
                        }
                    }
                    Err(e) => {
                        warn!("{} rotator read failed: {}", self.protocol.name(), e);
                        self.fault();
                        break;
                    }
                }
            }
        }

        self.link
    }

    async fn write(&mut self, frame: &[u8]) -> io::Result<()> {
        trace!("Rotator TX: {:?}", String::from_utf8_lossy(frame));
        self.link.write_all(frame).await?;
        self.link.flush().await
    }

    fn handle_line(&self, line: &str) {
        trace!("Rotator RX: {:?}", line);
        let position = match self.protocol.parse_line(line) {
            Ok(position) => position,
            Err(e @ OrbitRigError::CalibrationOutOfRange { .. }) => {
                // The device answered; the calibration table does not cover it
                error!("{} rotator reading {:?} rejected: {}", self.protocol.name(), line, e);
                lock(&self.shared).watchdog.record_valid();
                return;
            }
            Err(e) => {
                debug!("Dropping malformed rotator line {:?}: {}", line, e);
                return;
            }
        };

        let mut shared = lock(&self.shared);
        if !shared.watchdog.record_valid() {
            trace!("Ignoring position from faulted link");
            return;
        }
        shared.position = Some(position);
        shared.emit(RotatorEvent::PositionChanged(position));
    }

    /// Fault from a dead link; notifies unless the watchdog already did
    fn fault(&self) {
        let mut shared = lock(&self.shared);
        if shared.watchdog.fault() {
            shared.emit(RotatorEvent::Disconnected);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ==================== Line Splitting Tests ====================

    #[test]
    fn test_next_line_splits_on_cr_and_lf() {
        let mut buf = BytesMut::from(&b"+0010+0020\r\n+0030+0040\rpartial"[..]);
        assert_eq!(next_line(&mut buf).as_deref(), Some("+0010+0020"));
        assert_eq!(next_line(&mut buf).as_deref(), Some("+0030+0040"));
        assert_eq!(next_line(&mut buf), None);
        assert_eq!(&buf[..], b"partial");
    }

    #[test]
    fn test_next_line_skips_blank_lines() {
        let mut buf = BytesMut::from(&b"\r\n\r\n  \nAZ\n"[..]);
        assert_eq!(next_line(&mut buf).as_deref(), Some("AZ"));
        assert!(buf.is_empty());
    }

    #[test]
    fn test_next_line_discards_runaway_garbage() {
        let mut buf = BytesMut::from(&[b'x'; MAX_LINE_LEN + 1][..]);
        assert_eq!(next_line(&mut buf), None);
        assert!(buf.is_empty());
    }
}
