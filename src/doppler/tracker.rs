//! # Doppler Corrector
//!
//! Turns a frequency plan into Doppler-corrected receive and transmit
//! frequencies and keeps the transceiver tuned to them.
//!
//! Orbit propagation is outside this crate; positions and velocities come in
//! through the [`OrbitalKinematics`] trait.

use chrono::{DateTime, Utc};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, trace, warn};

use super::{doppler_factor, DopplerSample, LinkDirection, Vector3, EARTH_ROTATION_RAD_S};
use crate::error::OrbitRigError;
use crate::transceiver::{Band, SharedTransceiver, TransceiverController};

/// Default time between frequency updates
pub const DEFAULT_UPDATE_INTERVAL: Duration = Duration::from_secs(1);

/// Satellite position (km) and velocity (km/s), ECEF
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SatelliteState {
    pub position: Vector3,
    pub velocity: Vector3,
}

/// Source of station and satellite geometry
#[cfg_attr(test, mockall::automock)]
pub trait OrbitalKinematics: Send {
    /// Station position, ECEF km
    fn observer_ecef(&self) -> Option<Vector3>;

    /// Satellite state at `time`, if it can be propagated
    fn satellite_state(&self, time: DateTime<Utc>) -> Option<SatelliteState>;
}

/// Kinematics source with no geometry
///
/// Every factor is `1.0`, so the corrector tunes the plain plan frequencies.
/// Used until a propagator is attached.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoGeometry;

impl OrbitalKinematics for NoGeometry {
    fn observer_ecef(&self) -> Option<Vector3> {
        None
    }

    fn satellite_state(&self, _time: DateTime<Utc>) -> Option<SatelliteState> {
        None
    }
}

/// Rest-frame link frequencies, Hz
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrequencyPlan {
    pub uplink_hz: Option<u64>,
    pub downlink_hz: Option<u64>,
}

/// Frequencies to tune at one instant
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CorrectedFrequencies {
    /// Downlink as heard on the ground
    pub rx_hz: Option<u64>,
    /// Uplink to transmit so the satellite hears the plan frequency
    pub tx_hz: Option<u64>,
    pub downlink: DopplerSample,
    pub uplink: DopplerSample,
}

fn apply_factor(hz: u64, factor: f64) -> u64 {
    (hz as f64 * factor).round().max(0.0) as u64
}

pub struct DopplerCorrector<K> {
    kinematics: K,
    plan: FrequencyPlan,
    earth_rotation_rate: f64,
}

impl<K: OrbitalKinematics> DopplerCorrector<K> {
    pub fn new(kinematics: K, plan: FrequencyPlan) -> Self {
        Self {
            kinematics,
            plan,
            earth_rotation_rate: EARTH_ROTATION_RAD_S,
        }
    }

    /// Override the Earth rotation rate (rad/s)
    pub fn with_earth_rotation_rate(mut self, rate: f64) -> Self {
        self.earth_rotation_rate = rate;
        self
    }

    pub fn plan(&self) -> FrequencyPlan {
        self.plan
    }

    /// Corrected frequencies at `time`
    ///
    /// Without geometry both factors are `1.0` and the plan passes through.
    pub fn correct(&self, time: DateTime<Utc>) -> CorrectedFrequencies {
        let observer = self.kinematics.observer_ecef();
        let satellite = self.kinematics.satellite_state(time);
        let factor = |direction| {
            doppler_factor(
                observer,
                satellite.map(|s| s.position),
                satellite.map(|s| s.velocity),
                self.earth_rotation_rate,
                direction,
            )
        };

        let downlink = DopplerSample {
            observation_time: time,
            doppler_factor: factor(LinkDirection::Downlink),
        };
        let uplink = DopplerSample {
            observation_time: time,
            doppler_factor: factor(LinkDirection::Uplink),
        };

        CorrectedFrequencies {
            rx_hz: self.plan.downlink_hz.map(|hz| apply_factor(hz, downlink.doppler_factor)),
            tx_hz: self.plan.uplink_hz.map(|hz| apply_factor(hz, uplink.doppler_factor)),
            downlink,
            uplink,
        }
    }
}

async fn tune(radio: &mut dyn TransceiverController, band: Band, hz: u64) {
    match radio.set_frequency(band, hz).await {
        Ok(()) => {}
        Err(OrbitRigError::NotConnected) => trace!("Transceiver not running, skipping {:?}", band),
        Err(e) => warn!("Doppler update of {:?} failed: {}", band, e),
    }
}

/// Push corrected frequencies into the active transceiver every `period`
///
/// Runs until `stop_rx` fires or its sender is dropped. An empty transceiver
/// slot is skipped, not an error.
pub async fn run_doppler_loop<K: OrbitalKinematics>(
    corrector: DopplerCorrector<K>,
    transceiver: SharedTransceiver,
    period: Duration,
    mut stop_rx: oneshot::Receiver<()>,
) {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    debug!("Doppler loop started ({:?} interval)", period);

    loop {
        tokio::select! {
            _ = &mut stop_rx => break,
            _ = ticker.tick() => {
                let corrected = corrector.correct(Utc::now());
                trace!(
                    "Doppler factors: down {:.9} up {:.9}",
                    corrected.downlink.doppler_factor,
                    corrected.uplink.doppler_factor
                );

                let mut slot = transceiver.lock().await;
                if let Some(radio) = slot.as_mut() {
                    if let Some(hz) = corrected.rx_hz {
                        tune(radio.as_mut(), Band::Rx, hz).await;
                    }
                    if let Some(hz) = corrected.tx_hz {
                        tune(radio.as_mut(), Band::Tx, hz).await;
                    }
                }
            }
        }
    }

    debug!("Doppler loop stopped");
}
