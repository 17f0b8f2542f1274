//! # Rotator Simulator
//!
//! Rotator without hardware. Every 200 ms it reports the last commanded
//! position, or, in auto-tracking mode, a triangle-wave sweep over the full
//! azimuth and elevation range.

use async_trait::async_trait;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::interval;
use tracing::{debug, info};

use super::watchdog::LinkState;
use super::{AntennaPosition, PositionRange, RotatorController, RotatorEvent, RotatorEventSender};
use crate::error::{OrbitRigError, Result};

pub const REPORT_INTERVAL: Duration = Duration::from_millis(200);

/// Sweep travel per report, degrees
const SWEEP_AZIMUTH_STEP: f64 = 2.0;
const SWEEP_ELEVATION_STEP: f64 = 0.5;

const SWEEP_AZIMUTH_MAX: f64 = 360.0;
const SWEEP_ELEVATION_MAX: f64 = 90.0;

/// Fold `travel` into `0..=max` and back, like a bouncing pointer
///
/// # Examples
///
/// ```
/// use orbit_rig::rotator::simulator::triangle_wave;
///
/// assert_eq!(triangle_wave(100.0, 360.0), 100.0);
/// assert_eq!(triangle_wave(370.0, 360.0), 350.0);
/// assert_eq!(triangle_wave(720.0, 360.0), 0.0);
/// ```
pub fn triangle_wave(travel: f64, max: f64) -> f64 {
    if max <= 0.0 {
        return 0.0;
    }
    let phase = travel.rem_euclid(2.0 * max);
    if phase <= max {
        phase
    } else {
        2.0 * max - phase
    }
}

/// Sweep position after `ticks` reports
pub fn sweep_position(ticks: u64) -> AntennaPosition {
    let ticks = ticks as f64;
    AntennaPosition::new(
        triangle_wave(ticks * SWEEP_AZIMUTH_STEP, SWEEP_AZIMUTH_MAX),
        triangle_wave(ticks * SWEEP_ELEVATION_STEP, SWEEP_ELEVATION_MAX),
    )
}

struct Shared {
    commanded: AntennaPosition,
    position: Option<AntennaPosition>,
    events: Option<RotatorEventSender>,
}

fn lock(shared: &Mutex<Shared>) -> MutexGuard<'_, Shared> {
    shared.lock().unwrap_or_else(PoisonError::into_inner)
}

struct WorkerHandle {
    stop_tx: oneshot::Sender<()>,
    join: JoinHandle<()>,
}

/// In-memory rotator
pub struct SimulatedRotator {
    range: PositionRange,
    auto_tracking: bool,
    shared: Arc<Mutex<Shared>>,
    worker: Option<WorkerHandle>,
}

impl SimulatedRotator {
    pub fn new(range: PositionRange, auto_tracking: bool) -> Self {
        Self {
            range,
            auto_tracking,
            shared: Arc::new(Mutex::new(Shared {
                commanded: AntennaPosition::default(),
                position: None,
                events: None,
            })),
            worker: None,
        }
    }

    pub fn auto_tracking(&self) -> bool {
        self.auto_tracking
    }
}

#[async_trait]
impl RotatorController for SimulatedRotator {
    async fn start(&mut self) -> Result<()> {
        if self.worker.is_some() {
            return Ok(());
        }

        let (stop_tx, mut stop_rx) = oneshot::channel::<()>();
        let shared = self.shared.clone();
        let auto_tracking = self.auto_tracking;

        let join = tokio::spawn(async move {
            let mut ticker = interval(REPORT_INTERVAL);
            let mut ticks: u64 = 0;
            loop {
                tokio::select! {
                    _ = &mut stop_rx => break,
                    _ = ticker.tick() => {
                        let mut shared = lock(&shared);
                        let position = if auto_tracking {
                            sweep_position(ticks)
                        } else {
                            shared.commanded
                        };
                        ticks += 1;
                        shared.position = Some(position);
                        if let Some(events) = &shared.events {
                            let _ = events.send(RotatorEvent::PositionChanged(position));
                        }
                    }
                }
            }
        });

        self.worker = Some(WorkerHandle { stop_tx, join });
        info!("Simulated rotator started (auto tracking: {})", self.auto_tracking);
        Ok(())
    }

    async fn stop(&mut self) {
        if let Some(worker) = self.worker.take() {
            let _ = worker.stop_tx.send(());
            if let Err(e) = worker.join.await {
                debug!("Simulated rotator task ended abnormally: {}", e);
            }
            info!("Simulated rotator stopped");
        }
        lock(&self.shared).events = None;
    }

    async fn set_position(&mut self, position: AntennaPosition) -> Result<()> {
        if !self.range.contains(&position) {
            debug!("Ignoring out-of-range position {}", position);
            return Ok(());
        }
        if self.worker.is_none() {
            return Err(OrbitRigError::NotConnected);
        }
        lock(&self.shared).commanded = position;
        Ok(())
    }

    fn set_callback(&mut self, events: RotatorEventSender) {
        lock(&self.shared).events = Some(events);
    }

    fn unset_callback(&mut self) {
        lock(&self.shared).events = None;
    }

    fn link_state(&self) -> LinkState {
        if self.worker.is_some() {
            LinkState::Receiving
        } else {
            LinkState::Idle
        }
    }

    fn last_position(&self) -> Option<AntennaPosition> {
        lock(&self.shared).position
    }
}
