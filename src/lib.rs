//! # Orbit Rig Library
//!
//! Satellite ground-station control: keeps a directional antenna pointed at a
//! satellite and the transceiver tuned through the pass's Doppler shift.
//!
//! This library provides:
//! - The CI-V codec and an IC-9700 transceiver controller
//! - Rotator controllers for monitor-mode, GS-232 and analog hardware, plus a simulator
//! - Piecewise-linear angle/voltage calibration
//! - Doppler factor computation and a correction loop
//! - A [`station::Station`] context that owns the active devices

pub mod calibration;
pub mod civ;
pub mod config;
pub mod doppler;
pub mod error;
pub mod factory;
pub mod logging;
pub mod rotator;
pub mod serial;
pub mod station;
pub mod transceiver;
