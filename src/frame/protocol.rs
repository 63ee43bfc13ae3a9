//! # Survey Frame Constants and Types
//!
//! Layout shared by the transmitting beacon and the receiving survey node.
//!
//! ```text
//! <sequence>,<node_id>,0x<hh>
//! |----- payload ----||sep||checksum text|
//! ```

/// Field separator inside frames and log records
pub const FIELD_SEPARATOR: char = ',';

/// Length of the rendered checksum text (`0x` + two hex digits)
pub const CHECKSUM_TEXT_LEN: usize = 4;

/// Bytes trailing the payload: one separator plus the checksum text
pub const FRAME_SUFFIX_LEN: usize = 1 + CHECKSUM_TEXT_LEN;

/// Smallest frame that can be split into payload and checksum
pub const MIN_FRAME_LEN: usize = FRAME_SUFFIX_LEN;

/// Result of splitting and verifying an inbound frame
///
/// A checksum mismatch is a normal outcome carried in `is_valid`,
/// not an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedFrame {
    /// Everything before the separator, decoded lossily as UTF-8
    pub payload: String,

    /// Checksum text as sent by the transmitter
    pub received_checksum: String,

    /// Checksum text recomputed over the payload bytes
    pub computed_checksum: String,

    /// `received_checksum == computed_checksum`
    pub is_valid: bool,
}

impl DecodedFrame {
    /// Placeholder for a frame too short to carry a checksum
    ///
    /// Logged so the operator still sees the reception; carries no
    /// computed checksum and is never valid.
    pub fn too_short() -> Self {
        Self {
            payload: String::new(),
            received_checksum: String::new(),
            computed_checksum: String::new(),
            is_valid: false,
        }
    }
}
