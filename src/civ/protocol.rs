//! # CI-V Protocol Constants and Types
//!
//! Core protocol definitions for the CI-V transceiver link.
//!
//! ```text
//! 0xFE 0xFE <dst> <src> <cmd> [<sub>] [<data>...] 0xFD
//! ```

/// Frame preamble (two sync bytes)
pub const CIV_PREAMBLE: [u8; 2] = [0xFE, 0xFE];

/// Frame terminator
pub const CIV_TERMINATOR: u8 = 0xFD;

/// Longest frame we buffer while waiting for a terminator
pub const MAX_FRAME_LEN: usize = 64;

/// Standard PC controller address
pub const CIV_CONTROLLER_ADDR: u8 = 0xE0;

/// Broadcast address used by transceive (unsolicited) frames
pub const CIV_BROADCAST_ADDR: u8 = 0x00;

/// Factory default address of the IC-9700
pub const CIV_DEFAULT_RADIO_ADDR: u8 = 0xA2;

/// Transceive frequency report
pub const CMD_TRANSCEIVE_FREQ: u8 = 0x00;
/// Transceive mode report
pub const CMD_TRANSCEIVE_MODE: u8 = 0x01;
/// Read operating frequency
pub const CMD_READ_FREQ: u8 = 0x03;
/// Read operating mode
pub const CMD_READ_MODE: u8 = 0x04;
/// Set operating frequency
pub const CMD_SET_FREQ: u8 = 0x05;
/// Set operating mode
pub const CMD_SET_MODE: u8 = 0x06;
/// Select VFO / band
pub const CMD_SELECT_BAND: u8 = 0x07;
/// Function settings (satellite mode lives here)
pub const CMD_FUNCTION: u8 = 0x16;
/// Extended settings (data mode lives here)
pub const CMD_EXTENDED: u8 = 0x1A;
/// Tone settings
pub const CMD_TONE: u8 = 0x1B;
/// Positive acknowledgement
pub const CMD_ACK: u8 = 0xFB;
/// Negative acknowledgement
pub const CMD_NAK: u8 = 0xFA;

/// Select the main band (uplink in satellite mode)
pub const SUB_SELECT_MAIN: u8 = 0xD0;
/// Select the sub band (downlink in satellite mode)
pub const SUB_SELECT_SUB: u8 = 0xD1;
/// Satellite mode function
pub const SUB_SATELLITE_MODE: u8 = 0x5A;
/// Data mode setting
pub const SUB_DATA_MODE: u8 = 0x06;
/// Repeater tone frequency
pub const SUB_REPEATER_TONE: u8 = 0x00;

/// Satellite mode "on" value
pub const SATELLITE_ON: u8 = 0x01;
/// Satellite mode "off" value
pub const SATELLITE_OFF: u8 = 0x00;

/// Default IF filter sent with mode commands (FIL1)
pub const DEFAULT_FILTER: u8 = 0x01;

/// Offset of the command byte within a frame
pub const CMD_OFFSET: usize = 4;

/// Offset of the BCD frequency window (after preamble, dst, src, cmd)
pub const FREQ_OFFSET: usize = 5;

/// Frequency window length: 5 bytes, 10 BCD digits
pub const FREQ_LEN: usize = 5;

/// Largest encodable frequency + 1 (10 decimal digits)
pub const FREQ_LIMIT_HZ: u64 = 10_000_000_000;

/// Offset of the mode code in a mode frame
pub const MODE_OFFSET: usize = 5;

/// Offset of the satellite-mode value (after cmd and sub-command)
pub const SATELLITE_OFFSET: usize = 6;

/// Highest sub-audible tone the radio accepts
pub const MAX_TONE_HZ: f64 = 999.9;

/// Radio operating mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperatingMode {
    Lsb,
    Usb,
    Am,
    Cw,
    Fm,
    Dv,
}

/// Data sub-mode (IC-9700 "D" modes)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DataMode {
    #[default]
    Off,
    Data1,
    Data2,
    Data3,
}

impl DataMode {
    /// Wire code for the data-mode setting
    pub fn code(self) -> u8 {
        match self {
            DataMode::Off => 0x00,
            DataMode::Data1 => 0x01,
            DataMode::Data2 => 0x02,
            DataMode::Data3 => 0x03,
        }
    }
}

/// Bidirectional mode table
pub const MODE_TABLE: [(OperatingMode, u8); 6] = [
    (OperatingMode::Lsb, 0x00),
    (OperatingMode::Usb, 0x01),
    (OperatingMode::Am, 0x02),
    (OperatingMode::Cw, 0x03),
    (OperatingMode::Fm, 0x05),
    (OperatingMode::Dv, 0x17),
];

/// Look up the wire code for a mode
pub fn mode_to_code(mode: OperatingMode) -> Option<u8> {
    MODE_TABLE
        .iter()
        .find(|(m, _)| *m == mode)
        .map(|(_, code)| *code)
}

/// Look up the mode for a wire code; unknown codes yield `None`
pub fn code_to_mode(code: u8) -> Option<OperatingMode> {
    MODE_TABLE
        .iter()
        .find(|(_, c)| *c == code)
        .map(|(mode, _)| *mode)
}

impl OperatingMode {
    /// Parse a mode name as used in configuration and UI commands
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_uppercase().as_str() {
            "LSB" => Some(OperatingMode::Lsb),
            "USB" => Some(OperatingMode::Usb),
            "AM" => Some(OperatingMode::Am),
            "CW" => Some(OperatingMode::Cw),
            "FM" => Some(OperatingMode::Fm),
            "DV" => Some(OperatingMode::Dv),
            _ => None,
        }
    }
}

impl std::fmt::Display for OperatingMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            OperatingMode::Lsb => "LSB",
            OperatingMode::Usb => "USB",
            OperatingMode::Am => "AM",
            OperatingMode::Cw => "CW",
            OperatingMode::Fm => "FM",
            OperatingMode::Dv => "DV",
        };
        f.write_str(name)
    }
}

/// A decoded frame from the radio
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CivMessage {
    /// Operating frequency of the selected band
    Frequency(u64),
    /// Operating mode of the selected band
    Mode(OperatingMode),
    /// Satellite mode state
    SatelliteMode(bool),
    Ack,
    Nak,
}
