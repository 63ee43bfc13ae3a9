//! # Survey Frame Encoder
//!
//! Builds the `<sequence>,<node_id>,<checksum>` beacon frame.

use super::crc::checksum_text;
use super::protocol::FIELD_SEPARATOR;

/// Encode a beacon frame
///
/// # Arguments
///
/// * `sequence` - Transmit counter of the sending node
/// * `node_id` - Hex-encoded radio MAC (or any id without commas)
///
/// # Returns
///
/// * `String` - Payload followed by `,` and the checksum text
///
/// # Examples
///
/// ```
/// use lora_coverage::frame::encoder::encode_tx_frame;
///
/// assert_eq!(encode_tx_frame(5, "AB12CD"), "5,AB12CD,0xd7");
/// ```
pub fn encode_tx_frame(sequence: u64, node_id: &str) -> String {
    let payload = format!("{}{}{}", sequence, FIELD_SEPARATOR, node_id);
    let checksum = checksum_text(payload.as_bytes());

    format!("{}{}{}", payload, FIELD_SEPARATOR, checksum)
}
