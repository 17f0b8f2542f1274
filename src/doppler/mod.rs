//! # Doppler Module
//!
//! Doppler correction for satellite links.
//!
//! Positions are ECEF kilometres and velocities ECEF kilometres per second.
//! The radial velocity is the relative velocity projected onto the line of
//! sight from the station to the satellite; positive means receding.
//!
//! - Downlink: `factor = 1 - v_r / c`
//! - Uplink: `factor = 1 + v_r / c`
//!
//! An approaching satellite (negative `v_r`) is heard high and must be
//! transmitted to low.

pub mod tracker;

use chrono::{DateTime, Utc};
use serde::Serialize;

pub const SPEED_OF_LIGHT_KM_S: f64 = 299_792.458;
pub const EARTH_ROTATION_RAD_S: f64 = 7.292_115e-5;

/// ECEF vector, km or km/s
pub type Vector3 = [f64; 3];

/// Which way the signal travels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkDirection {
    /// Satellite to ground
    Downlink,
    /// Ground to satellite
    Uplink,
}

/// One Doppler evaluation
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DopplerSample {
    pub observation_time: DateTime<Utc>,
    pub doppler_factor: f64,
}

fn sub(a: Vector3, b: Vector3) -> Vector3 {
    [a[0] - b[0], a[1] - b[1], a[2] - b[2]]
}

fn dot(a: Vector3, b: Vector3) -> f64 {
    a[0] * b[0] + a[1] * b[1] + a[2] * b[2]
}

/// Velocity of a point fixed on the rotating Earth
pub fn station_velocity(observer: Vector3, earth_rotation_rate: f64) -> Vector3 {
    [
        -earth_rotation_rate * observer[1],
        earth_rotation_rate * observer[0],
        0.0,
    ]
}

/// Radial velocity of the satellite seen from `observer`, km/s
///
/// Returns `None` when satellite and observer coincide.
pub fn range_rate(
    observer: Vector3,
    sat_position: Vector3,
    sat_velocity: Vector3,
    earth_rotation_rate: f64,
) -> Option<f64> {
    let los = sub(sat_position, observer);
    let range_km = dot(los, los).sqrt();
    if range_km <= 0.0 || !range_km.is_finite() {
        return None;
    }

    let los_unit = [los[0] / range_km, los[1] / range_km, los[2] / range_km];
    let rel_vel = sub(sat_velocity, station_velocity(observer, earth_rotation_rate));
    Some(dot(rel_vel, los_unit))
}

/// Doppler factor for one link direction
///
/// Missing inputs or a zero range give `1.0` (no correction).
///
/// # Arguments
///
/// * `observer` - Station position (ECEF km)
/// * `sat_position` - Satellite position (ECEF km)
/// * `sat_velocity` - Satellite velocity (ECEF km/s)
/// * `earth_rotation_rate` - rad/s, normally [`EARTH_ROTATION_RAD_S`]
/// * `direction` - Downlink or uplink
///
/// # Examples
///
/// ```
/// use orbit_rig::doppler::{doppler_factor, LinkDirection, EARTH_ROTATION_RAD_S};
///
/// let observer = [6378.0, 0.0, 0.0];
/// let satellite = [7378.0, 0.0, 0.0];
/// let approaching = [-7.0, 0.0, 0.0];
///
/// let down = doppler_factor(Some(observer), Some(satellite), Some(approaching),
///     EARTH_ROTATION_RAD_S, LinkDirection::Downlink);
/// assert!(down > 1.0);
/// assert_eq!(doppler_factor(None, Some(satellite), Some(approaching),
///     EARTH_ROTATION_RAD_S, LinkDirection::Downlink), 1.0);
/// ```
pub fn doppler_factor(
    observer: Option<Vector3>,
    sat_position: Option<Vector3>,
    sat_velocity: Option<Vector3>,
    earth_rotation_rate: f64,
    direction: LinkDirection,
) -> f64 {
    let (Some(observer), Some(sat_position), Some(sat_velocity)) =
        (observer, sat_position, sat_velocity)
    else {
        return 1.0;
    };

    match range_rate(observer, sat_position, sat_velocity, earth_rotation_rate) {
        Some(v_r) => match direction {
            LinkDirection::Downlink => 1.0 - v_r / SPEED_OF_LIGHT_KM_S,
            LinkDirection::Uplink => 1.0 - (-v_r / SPEED_OF_LIGHT_KM_S),
        },
        None => 1.0,
    }
}

/// How the transponder maps uplink to downlink
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MixingScheme {
    /// Full-precision results
    #[default]
    Direct,
    /// Inverting transponder; results rounded to whole hertz
    InvertingHeterodyne,
}

/// Rest-frame receive and transmit frequencies
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BaseFrequencies {
    pub rx_base: f64,
    pub tx_base: f64,
}

impl MixingScheme {
    /// Split a dial frequency into base receive and transmit frequencies
    ///
    /// `rx_base = intermediate / factor` and `tx_base = dial - rx_base`. A
    /// factor that is not a positive finite number is treated as `1.0`.
    ///
    /// # Examples
    ///
    /// ```
    /// use orbit_rig::doppler::MixingScheme;
    ///
    /// let base = MixingScheme::Direct.base_freq(1000.0, 500.0, 0.8);
    /// assert_eq!((base.rx_base, base.tx_base), (625.0, 375.0));
    /// ```
    pub fn base_freq(self, dial: f64, intermediate: f64, factor: f64) -> BaseFrequencies {
        let factor = if factor.is_finite() && factor > 0.0 { factor } else { 1.0 };
        let rx_base = intermediate / factor;
        let tx_base = dial - rx_base;

        match self {
            MixingScheme::Direct => BaseFrequencies { rx_base, tx_base },
            MixingScheme::InvertingHeterodyne => BaseFrequencies {
                rx_base: rx_base.round(),
                tx_base: tx_base.round(),
            },
        }
    }
}
