//! # CRC-8/MAXIM Implementation
//!
//! Dallas/Maxim 1-Wire CRC-8 used to protect survey frames and log records.
//!
//! **Polynomial**: 0x31 (x^8 + x^5 + x^4 + 1), reflected as 0x8C
//! **Initial Value**: 0x00
//! **Check** (`"123456789"`): 0xA1

/// Reflected CRC-8/MAXIM feedback constant
const CRC8_MAXIM_POLY: u8 = 0x8C;

/// Precomputed CRC8 lookup table for fast calculation
const CRC8_TABLE: [u8; 256] = generate_crc8_table();

/// Generate CRC8 lookup table at compile time
const fn generate_crc8_table() -> [u8; 256] {
    let mut table = [0u8; 256];
    let mut i = 0;

    while i < 256 {
        let mut crc = i as u8;
        let mut j = 0;

        while j < 8 {
            if (crc & 0x01) != 0 {
                crc = (crc >> 1) ^ CRC8_MAXIM_POLY;
            } else {
                crc >>= 1;
            }
            j += 1;
        }

        table[i] = crc;
        i += 1;
    }

    table
}

/// Calculate CRC-8/MAXIM checksum using lookup table (fast)
///
/// # Arguments
///
/// * `data` - Byte slice to calculate CRC for
///
/// # Returns
///
/// * `u8` - Calculated CRC8 checksum
///
/// # Examples
///
/// ```
/// use lora_coverage::frame::crc::crc8_maxim;
///
/// assert_eq!(crc8_maxim(b"123456789"), 0xA1);
/// ```
pub fn crc8_maxim(data: &[u8]) -> u8 {
    let mut crc: u8 = 0;

    for &byte in data {
        crc = CRC8_TABLE[(crc ^ byte) as usize];
    }

    crc
}

/// Render a checksum the way it travels inside a frame
///
/// Always `0x` plus two lowercase hex digits, so the text is exactly
/// [`CHECKSUM_TEXT_LEN`](super::protocol::CHECKSUM_TEXT_LEN) characters.
///
/// ```
/// use lora_coverage::frame::crc::checksum_text;
///
/// assert_eq!(checksum_text(b"123456789"), "0xa1");
/// assert_eq!(checksum_text(b""), "0x00");
/// ```
pub fn checksum_text(data: &[u8]) -> String {
    format!("0x{:02x}", crc8_maxim(data))
}

/// Bit-serial CRC-8/MAXIM (slow, for verification)
///
/// Feeds each input bit against the accumulator's low bit, shifting both,
/// and folds in the feedback constant whenever they differ.
#[allow(dead_code)]
fn crc8_maxim_bitwise(data: &[u8]) -> u8 {
    let mut crc: u8 = 0;

    for &byte in data {
        let mut b = byte;
        for _ in 0..8 {
            let odd = ((b ^ crc) & 0x01) == 1;
            crc >>= 1;
            b >>= 1;
            if odd {
                crc ^= CRC8_MAXIM_POLY;
            }
        }
    }

    crc
}
