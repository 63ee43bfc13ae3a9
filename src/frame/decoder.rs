//! # Survey Frame Decoder
//!
//! Splits an inbound datagram into payload and checksum text and verifies it.

use super::crc::checksum_text;
use super::protocol::*;
use crate::error::{CoverageError, Result};

/// Decode an inbound survey frame
///
/// The last [`CHECKSUM_TEXT_LEN`] bytes are the received checksum text; the
/// byte before them is the separator and is not inspected. The checksum is
/// recomputed over the remaining payload bytes.
///
/// # Arguments
///
/// * `raw` - Datagram bytes as read from the radio
///
/// # Returns
///
/// * `Result<DecodedFrame>` - Split frame with its validity flag
///
/// # Errors
///
/// Returns `FrameTooShort` if the datagram is under [`MIN_FRAME_LEN`] bytes.
/// A checksum mismatch is never an error.
///
/// # Examples
///
/// ```
/// use lora_coverage::frame::decoder::decode_frame;
///
/// let frame = decode_frame(b"5,AB12CD,0xd7").unwrap();
/// assert!(frame.is_valid);
/// assert_eq!(frame.payload, "5,AB12CD");
/// ```
pub fn decode_frame(raw: &[u8]) -> Result<DecodedFrame> {
    if raw.len() < MIN_FRAME_LEN {
        return Err(CoverageError::FrameTooShort(raw.len()));
    }

    let payload_bytes = &raw[..raw.len() - FRAME_SUFFIX_LEN];
    let checksum_bytes = &raw[raw.len() - CHECKSUM_TEXT_LEN..];

    let received_checksum = String::from_utf8_lossy(checksum_bytes).into_owned();
    let computed_checksum = checksum_text(payload_bytes);
    let is_valid = received_checksum == computed_checksum;

    Ok(DecodedFrame {
        payload: String::from_utf8_lossy(payload_bytes).into_owned(),
        received_checksum,
        computed_checksum,
        is_valid,
    })
}
