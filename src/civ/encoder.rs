//! # CI-V Frame Encoder
//!
//! Builds command frames for the transceiver.

use bytes::{BufMut, BytesMut};

use super::protocol::*;
use crate::error::{OrbitRigError, Result};
use crate::transceiver::Band;

/// Encode a complete CI-V frame
///
/// # Arguments
///
/// * `radio_addr` - Destination CI-V address
/// * `cmd` - Command byte
/// * `sub_cmd` - Optional sub-command byte
/// * `data` - Payload bytes
///
/// # Returns
///
/// * `Vec<u8>` - Frame including preamble and terminator
///
/// # Examples
///
/// ```
/// use orbit_rig::civ::encoder::encode_frame;
///
/// let frame = encode_frame(0xA2, 0x03, None, &[]);
/// assert_eq!(frame, vec![0xFE, 0xFE, 0xA2, 0xE0, 0x03, 0xFD]);
/// ```
pub fn encode_frame(radio_addr: u8, cmd: u8, sub_cmd: Option<u8>, data: &[u8]) -> Vec<u8> {
    let mut buf = BytesMut::with_capacity(6 + usize::from(sub_cmd.is_some()) + data.len());
    buf.put_slice(&CIV_PREAMBLE);
    buf.put_u8(radio_addr);
    buf.put_u8(CIV_CONTROLLER_ADDR);
    buf.put_u8(cmd);
    if let Some(sub) = sub_cmd {
        buf.put_u8(sub);
    }
    buf.put_slice(data);
    buf.put_u8(CIV_TERMINATOR);
    buf.to_vec()
}

/// Encode a frequency as five BCD digit pairs, least-significant pair first
///
/// # Errors
///
/// Returns error if `hz` needs more than 10 decimal digits
pub fn encode_frequency(hz: u64) -> Result<[u8; FREQ_LEN]> {
    if hz >= FREQ_LIMIT_HZ {
        return Err(OrbitRigError::CivProtocol(format!(
            "Frequency {} Hz does not fit in {} BCD digits",
            hz,
            FREQ_LEN * 2
        )));
    }

    let mut out = [0u8; FREQ_LEN];
    let mut rest = hz;
    for pair in out.iter_mut() {
        let two_digits = (rest % 100) as u8;
        *pair = ((two_digits / 10) << 4) | (two_digits % 10);
        rest /= 100;
    }

    Ok(out)
}

/// Encode a sub-audible tone as six decimal digits
///
/// The layout is two leading zeros, three integer digits and one tenth digit,
/// so 88.5 Hz becomes `"000885"`.
///
/// # Errors
///
/// Returns [`OrbitRigError::ToneOverflow`] above 999.9 Hz
///
/// # Examples
///
/// ```
/// use orbit_rig::civ::encoder::encode_tone_hz;
///
/// assert_eq!(encode_tone_hz(999.9).unwrap(), "009999");
/// assert_eq!(encode_tone_hz(1.0).unwrap(), "000010");
/// assert!(encode_tone_hz(1000.0).is_err());
/// ```
pub fn encode_tone_hz(tone_hz: f64) -> Result<String> {
    if tone_hz > MAX_TONE_HZ {
        return Err(OrbitRigError::ToneOverflow(tone_hz));
    }
    if !tone_hz.is_finite() || tone_hz < 0.0 {
        return Err(OrbitRigError::CivProtocol(format!(
            "Invalid tone frequency: {}",
            tone_hz
        )));
    }

    let tenths = (tone_hz * 10.0).round() as u32;
    Ok(format!("00{:03}{}", tenths / 10, tenths % 10))
}

/// Pack the six-digit tone string into three BCD bytes
pub fn encode_tone_bcd(tone_hz: f64) -> Result<[u8; 3]> {
    let digits: Vec<u8> = encode_tone_hz(tone_hz)?
        .bytes()
        .map(|d| d - b'0')
        .collect();

    let mut out = [0u8; 3];
    for (byte, pair) in out.iter_mut().zip(digits.chunks(2)) {
        *byte = (pair[0] << 4) | pair[1];
    }
    Ok(out)
}

fn band_sub_command(band: Band) -> u8 {
    match band {
        Band::Tx => SUB_SELECT_MAIN,
        Band::Rx => SUB_SELECT_SUB,
    }
}

/// Select the band the following commands apply to
pub fn select_band_command(radio_addr: u8, band: Band) -> Vec<u8> {
    encode_frame(radio_addr, CMD_SELECT_BAND, Some(band_sub_command(band)), &[])
}

/// Set the frequency of the selected band
pub fn set_frequency_command(radio_addr: u8, hz: u64) -> Result<Vec<u8>> {
    Ok(encode_frame(radio_addr, CMD_SET_FREQ, None, &encode_frequency(hz)?))
}

/// Set the mode of the selected band
pub fn set_mode_command(radio_addr: u8, mode: OperatingMode) -> Result<Vec<u8>> {
    let code = mode_to_code(mode)
        .ok_or_else(|| OrbitRigError::CivProtocol(format!("No code for mode {}", mode)))?;
    Ok(encode_frame(radio_addr, CMD_SET_MODE, None, &[code, DEFAULT_FILTER]))
}

/// Set the data sub-mode of the selected band
pub fn set_data_mode_command(radio_addr: u8, data_mode: DataMode) -> Vec<u8> {
    let filter = if data_mode == DataMode::Off { 0x00 } else { DEFAULT_FILTER };
    encode_frame(
        radio_addr,
        CMD_EXTENDED,
        Some(SUB_DATA_MODE),
        &[data_mode.code(), filter],
    )
}

/// Turn satellite mode on or off
pub fn satellite_mode_command(radio_addr: u8, on: bool) -> Vec<u8> {
    let value = if on { SATELLITE_ON } else { SATELLITE_OFF };
    encode_frame(radio_addr, CMD_FUNCTION, Some(SUB_SATELLITE_MODE), &[value])
}

/// Read satellite mode
pub fn read_satellite_mode_command(radio_addr: u8) -> Vec<u8> {
    encode_frame(radio_addr, CMD_FUNCTION, Some(SUB_SATELLITE_MODE), &[])
}

/// Read the frequency of the selected band
pub fn read_frequency_command(radio_addr: u8) -> Vec<u8> {
    encode_frame(radio_addr, CMD_READ_FREQ, None, &[])
}

/// Read the mode of the selected band
pub fn read_mode_command(radio_addr: u8) -> Vec<u8> {
    encode_frame(radio_addr, CMD_READ_MODE, None, &[])
}

/// Set the repeater (CTCSS) tone
pub fn set_tone_command(radio_addr: u8, tone_hz: f64) -> Result<Vec<u8>> {
    Ok(encode_frame(
        radio_addr,
        CMD_TONE,
        Some(SUB_REPEATER_TONE),
        &encode_tone_bcd(tone_hz)?,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    // ==================== Frame Tests ====================

    #[test]
    fn test_encode_frame_structure() {
        let frame = encode_frame(0xA2, CMD_SELECT_BAND, Some(SUB_SELECT_MAIN), &[]);
        assert_eq!(frame, vec![0xFE, 0xFE, 0xA2, 0xE0, 0x07, 0xD0, 0xFD]);
    }

    #[test]
    fn test_encode_frame_with_payload() {
        let frame = encode_frame(0xA2, CMD_SET_MODE, None, &[0x01, 0x01]);
        assert_eq!(frame.len(), 8);
        assert_eq!(&frame[..2], &CIV_PREAMBLE);
        assert_eq!(frame[5..7], [0x01, 0x01]);
        assert_eq!(*frame.last().unwrap(), CIV_TERMINATOR);
    }

    // ==================== Frequency Tests ====================

    #[test]
    fn test_encode_frequency_pairs_least_significant_first() {
        assert_eq!(encode_frequency(145_800_000).unwrap(), [0x00, 0x00, 0x80, 0x45, 0x01]);
        assert_eq!(encode_frequency(435_123_456).unwrap(), [0x56, 0x34, 0x12, 0x35, 0x04]);
        assert_eq!(encode_frequency(0).unwrap(), [0x00; 5]);
    }

    #[test]
    fn test_encode_frequency_limit() {
        assert_eq!(encode_frequency(9_999_999_999).unwrap(), [0x99; 5]);
        assert!(encode_frequency(10_000_000_000).is_err());
    }

    #[test]
    fn test_set_frequency_command() {
        let frame = set_frequency_command(0xA2, 145_800_000).unwrap();
        assert_eq!(
            frame,
            vec![0xFE, 0xFE, 0xA2, 0xE0, 0x05, 0x00, 0x00, 0x80, 0x45, 0x01, 0xFD]
        );
    }

    // ==================== Tone Tests ====================

    #[test]
    fn test_encode_tone_hz() {
        assert_eq!(encode_tone_hz(999.9).unwrap(), "009999");
        assert_eq!(encode_tone_hz(1.0).unwrap(), "000010");
        assert_eq!(encode_tone_hz(88.5).unwrap(), "000885");
        assert_eq!(encode_tone_hz(67.0).unwrap(), "000670");
    }

    #[test]
    fn test_encode_tone_hz_overflow() {
        match encode_tone_hz(1000.0) {
            Err(OrbitRigError::ToneOverflow(hz)) => assert_eq!(hz, 1000.0),
            other => panic!("Expected ToneOverflow, got: {:?}", other),
        }
    }

    #[test]
    fn test_encode_tone_hz_negative() {
        assert!(encode_tone_hz(-1.0).is_err());
    }

    #[test]
    fn test_encode_tone_bcd() {
        assert_eq!(encode_tone_bcd(88.5).unwrap(), [0x00, 0x08, 0x85]);
        assert_eq!(encode_tone_bcd(999.9).unwrap(), [0x00, 0x99, 0x99]);
    }

    #[test]
    fn test_set_tone_command() {
        let frame = set_tone_command(0xA2, 88.5).unwrap();
        assert_eq!(
            frame,
            vec![0xFE, 0xFE, 0xA2, 0xE0, 0x1B, 0x00, 0x00, 0x08, 0x85, 0xFD]
        );
        assert!(set_tone_command(0xA2, 1200.0).is_err());
    }

    // ==================== Command Tests ====================

    #[test]
    fn test_select_band_command() {
        assert_eq!(select_band_command(0xA2, Band::Tx)[5], SUB_SELECT_MAIN);
        assert_eq!(select_band_command(0xA2, Band::Rx)[5], SUB_SELECT_SUB);
    }

    #[test]
    fn test_set_mode_command() {
        let frame = set_mode_command(0xA2, OperatingMode::Fm).unwrap();
        assert_eq!(frame, vec![0xFE, 0xFE, 0xA2, 0xE0, 0x06, 0x05, 0x01, 0xFD]);
    }

    #[test]
    fn test_set_data_mode_command() {
        let frame = set_data_mode_command(0xA2, DataMode::Data1);
        assert_eq!(frame, vec![0xFE, 0xFE, 0xA2, 0xE0, 0x1A, 0x06, 0x01, 0x01, 0xFD]);
        let frame = set_data_mode_command(0xA2, DataMode::Off);
        assert_eq!(frame, vec![0xFE, 0xFE, 0xA2, 0xE0, 0x1A, 0x06, 0x00, 0x00, 0xFD]);
    }

    #[test]
    fn test_satellite_mode_command() {
        assert_eq!(
            satellite_mode_command(0xA2, true),
            vec![0xFE, 0xFE, 0xA2, 0xE0, 0x16, 0x5A, 0x01, 0xFD]
        );
        assert_eq!(satellite_mode_command(0xA2, false)[6], SATELLITE_OFF);
        assert_eq!(read_satellite_mode_command(0xA2).len(), 7);
    }
}
