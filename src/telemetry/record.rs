//! # Survey Log Record
//!
//! One line of the acquisition log:
//!
//! ```text
//! seq,node,gps_time,lat,lon,alt,payload,rx_crc,calc_crc,crc_ok,radio_ts,rssi,snr,sf,record_crc
//! ```
//!
//! Rows are written with the `csv` crate. A payload holding commas or quotes
//! is quoted, and control characters in it are escaped (`\n` becomes the two
//! characters `\` `n`), so every record occupies exactly one line.

use std::fmt;
use std::io::{self, Write};

use crate::error::{CoverageError, Result};
use crate::frame::crc::checksum_text;
use crate::frame::protocol::{DecodedFrame, FIELD_SEPARATOR};
use crate::gps::GpsFix;
use crate::radio::RadioStats;

/// CSV writer configured for log rows: no header, `\n` terminated
pub fn row_writer<W: Write>(writer: W) -> csv::Writer<W> {
    csv::WriterBuilder::new()
        .has_headers(false)
        .delimiter(FIELD_SEPARATOR as u8)
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(writer)
}

/// Serialize one row without its terminator
fn csv_row(fields: &[String]) -> Result<String> {
    let mut writer = row_writer(Vec::new());
    writer
        .write_record(fields)
        .map_err(|e| CoverageError::Storage(e.into()))?;

    let mut bytes = writer
        .into_inner()
        .map_err(|e| CoverageError::Storage(e.into_error()))?;
    if bytes.last() == Some(&b'\n') {
        bytes.pop();
    }

    String::from_utf8(bytes)
        .map_err(|e| CoverageError::Storage(io::Error::new(io::ErrorKind::InvalidData, e)))
}

fn escape_controls(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        if c.is_control() {
            escaped.extend(c.escape_default());
        } else {
            escaped.push(c);
        }
    }
    escaped
}

/// Immutable record of one received frame correlated with a GPS fix
#[derive(Debug, Clone, PartialEq)]
pub struct LogRecord {
    /// Running count of emitted records, starting at 0
    pub sequence: u64,

    /// Id of the receiving node
    pub node_id: String,

    /// Latest fix at reception time (possibly stale)
    pub fix: GpsFix,

    /// Decoded frame with its validity flag
    pub frame: DecodedFrame,

    /// Radio diagnostics for the packet
    pub stats: RadioStats,

    /// Checksum text over the serialized body
    pub record_checksum: String,
}

impl LogRecord {
    /// Build a record and seal it with the whole-record checksum
    ///
    /// # Errors
    ///
    /// Returns `Storage` if the row cannot be serialized.
    pub fn new(
        sequence: u64,
        node_id: &str,
        fix: GpsFix,
        frame: DecodedFrame,
        stats: RadioStats,
    ) -> Result<Self> {
        let mut record = Self {
            sequence,
            node_id: node_id.to_string(),
            fix,
            frame,
            stats,
            record_checksum: String::new(),
        };
        record.record_checksum = checksum_text(record.body()?.as_bytes());
        Ok(record)
    }

    fn body_fields(&self) -> Vec<String> {
        vec![
            self.sequence.to_string(),
            self.node_id.clone(),
            self.fix.timestamp.clone(),
            self.fix.latitude.to_string(),
            self.fix.longitude.to_string(),
            self.fix.altitude.to_string(),
            escape_controls(&self.frame.payload),
            escape_controls(&self.frame.received_checksum),
            self.frame.computed_checksum.clone(),
            self.frame.is_valid.to_string(),
            self.stats.timestamp_us.to_string(),
            self.stats.rssi.to_string(),
            self.stats.snr.to_string(),
            self.stats.spreading_factor.to_string(),
        ]
    }

    /// Every logged field in order, record checksum last
    pub fn fields(&self) -> Vec<String> {
        let mut fields = self.body_fields();
        fields.push(self.record_checksum.clone());
        fields
    }

    /// Serialized fields covered by the record checksum
    pub fn body(&self) -> Result<String> {
        csv_row(&self.body_fields())
    }

    /// Complete log line without the trailing newline
    pub fn to_csv_line(&self) -> Result<String> {
        csv_row(&self.fields())
    }

    /// Whether the stored record checksum still matches the body
    pub fn verify(&self) -> bool {
        self.body()
            .map(|body| checksum_text(body.as_bytes()) == self.record_checksum)
            .unwrap_or(false)
    }
}

impl fmt::Display for LogRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let line = self.to_csv_line().map_err(|_| fmt::Error)?;
        f.write_str(&line)
    }
}
