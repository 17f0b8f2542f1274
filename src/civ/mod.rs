//! # CI-V Protocol Module
//!
//! Implementation of the Icom CI-V binary protocol for the transceiver link.
//!
//! This module handles:
//! - Frame encoding (preamble, addresses, command, payload, terminator)
//! - BCD frequency encoding with the radio's reversed digit-pair order
//! - Operating-mode and satellite-mode decoding
//! - Preamble search and frame extraction from a byte stream

pub mod protocol;
pub mod encoder;
pub mod decoder;
