//! # Device State
//!
//! What we last asked the radio for versus what it last told us, per band.
//!
//! Every setter compares against the stored value and only raises the dirty
//! flag on a real change. The controller sends a command only for dirty
//! requested values, which keeps a polling loop from re-sending band and mode
//! switches the radio is already in.

use super::Band;
use crate::civ::protocol::{DataMode, OperatingMode};

/// State of one logical band
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BandState {
    pub requested_freq: u64,
    pub requested_mode: Option<OperatingMode>,
    pub requested_data_mode: DataMode,
    pub received_freq: u64,
    pub received_mode: Option<OperatingMode>,
    pub req_freq_dirty: bool,
    pub req_mode_dirty: bool,
    pub recv_freq_dirty: bool,
    pub recv_mode_dirty: bool,
}

impl BandState {
    /// Whether any of the four flags is raised
    pub fn is_dirty(&self) -> bool {
        self.req_freq_dirty || self.req_mode_dirty || self.recv_freq_dirty || self.recv_mode_dirty
    }

    fn reset(&mut self) {
        self.req_freq_dirty = false;
        self.req_mode_dirty = false;
        self.recv_freq_dirty = false;
        self.recv_mode_dirty = false;
    }
}

/// Requested vs. received state for the Rx and Tx bands
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeviceState {
    rx: BandState,
    tx: BandState,
}

impl DeviceState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn band(&self, band: Band) -> &BandState {
        match band {
            Band::Rx => &self.rx,
            Band::Tx => &self.tx,
        }
    }

    fn band_mut(&mut self, band: Band) -> &mut BandState {
        match band {
            Band::Rx => &mut self.rx,
            Band::Tx => &mut self.tx,
        }
    }

    /// Record a frequency we want the radio on
    pub fn set_requested_freq(&mut self, band: Band, hz: u64) {
        let state = self.band_mut(band);
        if state.requested_freq != hz {
            state.requested_freq = hz;
            state.req_freq_dirty = true;
        }
    }

    /// Record a mode we want the radio in
    ///
    /// `force` raises the dirty flag even when the stored request is
    /// unchanged. Used to re-assert a mode the radio drifted away from.
    pub fn set_requested_mode(
        &mut self,
        band: Band,
        mode: OperatingMode,
        data_mode: DataMode,
        force: bool,
    ) {
        let state = self.band_mut(band);
        if force || state.requested_mode != Some(mode) || state.requested_data_mode != data_mode {
            state.requested_mode = Some(mode);
            state.requested_data_mode = data_mode;
            state.req_mode_dirty = true;
        }
    }

    /// Record a frequency reported by the radio
    ///
    /// The radio only reports the band that changed, so a change on one band
    /// also marks the other band's received frequency dirty to refresh both.
    pub fn set_received_freq(&mut self, band: Band, hz: u64) {
        let state = self.band_mut(band);
        if state.received_freq != hz {
            state.received_freq = hz;
            state.recv_freq_dirty = true;
            self.band_mut(band.other()).recv_freq_dirty = true;
        }
    }

    /// Record a mode reported by the radio
    pub fn set_received_mode(&mut self, band: Band, mode: OperatingMode) {
        let state = self.band_mut(band);
        if state.received_mode != Some(mode) {
            state.received_mode = Some(mode);
            state.recv_mode_dirty = true;
        }
    }

    pub fn is_rx_dirty(&self) -> bool {
        self.rx.is_dirty()
    }

    pub fn is_tx_dirty(&self) -> bool {
        self.tx.is_dirty()
    }

    pub fn reset(&mut self, band: Band) {
        self.band_mut(band).reset();
    }

    /// Mark the requested frequency as delivered, leaving the other flags
    pub fn clear_requested_freq(&mut self, band: Band) {
        self.band_mut(band).req_freq_dirty = false;
    }

    /// Mark the requested mode as delivered, leaving the other flags
    pub fn clear_requested_mode(&mut self, band: Band) {
        self.band_mut(band).req_mode_dirty = false;
    }

    /// Clear only the received flags of both bands, once their events are out
    pub fn clear_received(&mut self) {
        for state in [&mut self.rx, &mut self.tx] {
            state.recv_freq_dirty = false;
            state.recv_mode_dirty = false;
        }
    }

    pub fn reset_rx(&mut self) {
        self.rx.reset();
    }

    pub fn reset_tx(&mut self) {
        self.tx.reset();
    }

    pub fn reset_all(&mut self) {
        self.reset_rx();
        self.reset_tx();
    }
}
