//! # CI-V Frame Decoder
//!
//! Extracts frames from the receive stream and decodes frequency, mode and
//! satellite-mode reports.

use bytes::{Buf, BytesMut};
use tracing::{debug, trace};

use super::protocol::*;
use crate::error::{OrbitRigError, Result};

/// Position of the first preamble marker in `data`
fn find_preamble(data: &[u8]) -> Option<usize> {
    data.windows(CIV_PREAMBLE.len())
        .position(|window| window == CIV_PREAMBLE)
}

/// Return the suffix of `frame` starting at the preamble marker
///
/// Frames may be preceded by stray bytes left on the bus. If no marker is
/// present the result is empty.
///
/// # Examples
///
/// ```
/// use orbit_rig::civ::decoder::trim_preamble;
///
/// let raw = [0x00, 0x12, 0xFE, 0xFE, 0xE0, 0xA2, 0xFB, 0xFD];
/// assert_eq!(trim_preamble(&raw), &raw[2..]);
/// assert!(trim_preamble(&[0x01, 0x02]).is_empty());
/// ```
pub fn trim_preamble(frame: &[u8]) -> &[u8] {
    match find_preamble(frame) {
        Some(pos) => &frame[pos..],
        None => &[],
    }
}

/// Pull the next complete frame out of a streaming receive buffer
///
/// Bytes before the preamble are discarded. Returns `None` (leaving the
/// partial frame buffered) until a terminator arrives. A partial frame longer
/// than [`MAX_FRAME_LEN`] lost its terminator; it is dropped and extraction
/// resumes at the next preamble.
pub fn next_frame(buf: &mut BytesMut) -> Option<Vec<u8>> {
    let start = match find_preamble(&buf[..]) {
        Some(pos) => pos,
        None => {
            // Keep a trailing 0xFE, it may be the first half of a preamble
            let keep = usize::from(buf.last() == Some(&CIV_PREAMBLE[0]));
            let discard = buf.len() - keep;
            if discard > 0 {
                trace!("Discarding {} bytes without preamble", discard);
                buf.advance(discard);
            }
            return None;
        }
    };

    if start > 0 {
        trace!("Discarding {} stray bytes before preamble", start);
        buf.advance(start);
    }

    // Some radios send more than two sync bytes
    while buf.len() > CIV_PREAMBLE.len() && buf[CIV_PREAMBLE.len()] == CIV_PREAMBLE[0] {
        buf.advance(1);
    }

    let body = &buf[CIV_PREAMBLE.len()..];
    match body.iter().position(|&b| b == CIV_TERMINATOR) {
        Some(pos) => Some(buf.split_to(pos + CIV_PREAMBLE.len() + 1).to_vec()),
        None if buf.len() > MAX_FRAME_LEN => {
            let skip = find_preamble(body).map_or(buf.len(), |pos| pos + CIV_PREAMBLE.len());
            debug!("Discarding {} bytes of unterminated frame", skip);
            buf.advance(skip);
            next_frame(buf)
        }
        None => None,
    }
}

/// Decode the BCD frequency window of a frame
///
/// The radio sends five digit pairs least-significant first, so the pairs
/// are reassembled as (pair5, pair4, pair3, pair2, pair1).
///
/// # Arguments
///
/// * `frame` - Frame starting at the preamble
///
/// # Errors
///
/// Returns error if the frame is too short or a nibble is not a decimal digit
pub fn parse_frequency(frame: &[u8]) -> Result<u64> {
    if frame.len() < FREQ_OFFSET + FREQ_LEN {
        return Err(OrbitRigError::CivProtocol(format!(
            "Frequency frame too short: {} bytes",
            frame.len()
        )));
    }

    let window = &frame[FREQ_OFFSET..FREQ_OFFSET + FREQ_LEN];
    let mut hz = 0u64;
    for &pair in window.iter().rev() {
        let tens = pair >> 4;
        let ones = pair & 0x0F;
        if tens > 9 || ones > 9 {
            return Err(OrbitRigError::CivProtocol(format!(
                "Invalid BCD digit pair: 0x{:02X}",
                pair
            )));
        }
        hz = hz * 100 + u64::from(tens) * 10 + u64::from(ones);
    }

    Ok(hz)
}

/// Decode the mode byte of a mode frame; unknown codes yield `None`
pub fn parse_mode(frame: &[u8]) -> Option<OperatingMode> {
    frame.get(MODE_OFFSET).copied().and_then(code_to_mode)
}

/// Decode the satellite-mode value; anything other than "on" is off
pub fn parse_satellite_mode(frame: &[u8]) -> bool {
    frame.get(SATELLITE_OFFSET) == Some(&SATELLITE_ON)
}

/// Decode a complete frame addressed to the controller
///
/// # Returns
///
/// * `Ok(Some(message))` - a report the controller acts on
/// * `Ok(None)` - a valid frame we ignore (bus echo of our own command,
///   unhandled command)
///
/// # Errors
///
/// Returns error if the frame is truncated or its payload does not decode
pub fn decode_frame(frame: &[u8]) -> Result<Option<CivMessage>> {
    let frame = trim_preamble(frame);
    if frame.len() < CMD_OFFSET + 2 {
        return Err(OrbitRigError::CivProtocol(format!(
            "Frame too short: {} bytes",
            frame.len()
        )));
    }
    if frame.last() != Some(&CIV_TERMINATOR) {
        return Err(OrbitRigError::CivProtocol("Missing terminator".to_string()));
    }

    let dst = frame[2];
    if dst != CIV_CONTROLLER_ADDR && dst != CIV_BROADCAST_ADDR {
        return Ok(None);
    }

    let message = match frame[CMD_OFFSET] {
        CMD_TRANSCEIVE_FREQ | CMD_READ_FREQ => Some(CivMessage::Frequency(parse_frequency(frame)?)),
        CMD_TRANSCEIVE_MODE | CMD_READ_MODE => match parse_mode(frame) {
            Some(mode) => Some(CivMessage::Mode(mode)),
            None => {
                return Err(OrbitRigError::CivProtocol(format!(
                    "Unknown mode code in frame: {:02X?}",
                    frame
                )))
            }
        },
        CMD_FUNCTION if frame.get(CMD_OFFSET + 1) == Some(&SUB_SATELLITE_MODE) => {
            Some(CivMessage::SatelliteMode(parse_satellite_mode(frame)))
        }
        CMD_ACK => Some(CivMessage::Ack),
        CMD_NAK => Some(CivMessage::Nak),
        _ => None,
    };

    Ok(message)
}

/// Whether `frame` answers one of our read commands
///
/// Read replies (`0x03`/`0x04`) follow the order the reads were written in.
/// Transceive reports (`0x00`/`0x01`) are unsolicited and describe the band
/// currently selected on the radio.
pub fn is_read_reply(frame: &[u8]) -> bool {
    matches!(
        trim_preamble(frame).get(CMD_OFFSET),
        Some(&CMD_READ_FREQ) | Some(&CMD_READ_MODE)
    )
}
