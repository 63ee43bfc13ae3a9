//! # GPS Module
//!
//! Position fixes shared by the phone over the local network link.
//!
//! This module handles:
//! - Decoding ShareGPS `SHGPS.LOCATION` JSON responses into [`GpsFix`]
//! - The shared last-writer-wins [`FixStore`] slot
//! - The polling actor that keeps the slot fresh ([`poller`])

pub mod poller;
pub mod transport;

use serde::Deserialize;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::error::{CoverageError, Result};

/// Longest excerpt of a bad response echoed into diagnostics
const RESPONSE_EXCERPT_LEN: usize = 120;

/// A single GPS position-and-time reading
///
/// Either every field is present or the fix is not created.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct GpsFix {
    /// Latitude in decimal degrees
    #[serde(rename = "lat")]
    pub latitude: f64,

    /// Longitude in decimal degrees
    #[serde(rename = "lon")]
    pub longitude: f64,

    /// Altitude in meters
    #[serde(rename = "alt")]
    pub altitude: f64,

    /// ISO-8601 time as reported by the phone, kept verbatim
    #[serde(rename = "time")]
    pub timestamp: String,
}

impl GpsFix {
    /// Decode one JSON object into a fix
    ///
    /// Unknown keys (`class`, `mode`, ...) are ignored.
    ///
    /// # Errors
    ///
    /// Returns `MalformedResponse` if a required key is missing, has the wrong
    /// type, the coordinates are out of range, or `time` is not RFC 3339.
    pub fn from_json(line: &str) -> Result<Self> {
        let fix: GpsFix = serde_json::from_str(line)
            .map_err(|e| CoverageError::MalformedResponse(format!("{}: {}", e, excerpt(line))))?;

        if !fix.latitude.is_finite() || !(-90.0..=90.0).contains(&fix.latitude) {
            return Err(CoverageError::MalformedResponse(
                format!("latitude out of range: {}", fix.latitude)
            ));
        }

        if !fix.longitude.is_finite() || !(-180.0..=180.0).contains(&fix.longitude) {
            return Err(CoverageError::MalformedResponse(
                format!("longitude out of range: {}", fix.longitude)
            ));
        }

        if !fix.altitude.is_finite() {
            return Err(CoverageError::MalformedResponse(
                format!("altitude not finite: {}", fix.altitude)
            ));
        }

        chrono::DateTime::parse_from_rfc3339(&fix.timestamp).map_err(|e| {
            CoverageError::MalformedResponse(format!("bad time {:?}: {}", fix.timestamp, e))
        })?;

        Ok(fix)
    }
}

/// Decode a raw stream response into a fix
///
/// The phone may prepend a banner line on connect, so the last line that
/// decodes into a complete fix wins.
///
/// # Errors
///
/// Returns `MalformedResponse` if the bytes are not UTF-8 or no line holds a
/// complete fix.
pub fn parse_fix_response(data: &[u8]) -> Result<GpsFix> {
    let text = std::str::from_utf8(data)
        .map_err(|e| CoverageError::MalformedResponse(format!("response is not UTF-8: {}", e)))?;

    let mut last_error = None;
    for line in text.lines().rev().map(str::trim).filter(|l| !l.is_empty()) {
        match GpsFix::from_json(line) {
            Ok(fix) => return Ok(fix),
            Err(e) => {
                last_error.get_or_insert(e);
            }
        }
    }

    Err(last_error.unwrap_or_else(|| {
        CoverageError::MalformedResponse("empty response".to_string())
    }))
}

fn excerpt(text: &str) -> String {
    text.chars().take(RESPONSE_EXCERPT_LEN).collect()
}

#[derive(Debug, Default)]
struct FixSlot {
    fix: Option<GpsFix>,
    log_start_time: Option<String>,
}

/// Latest fix shared between the poll actor (writer) and the receive handler
/// (reader)
///
/// A single overwritten slot, not a queue: fixes arriving faster than packets
/// are lost, and a packet may be paired with a fix older than itself.
#[derive(Debug, Default)]
pub struct FixStore {
    slot: Mutex<FixSlot>,
}

impl FixStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    // Nothing panics while the guard is held, but a poisoned lock still must
    // not take the other actor down with it.
    fn lock(&self) -> MutexGuard<'_, FixSlot> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Replace the current fix
    ///
    /// The first fix ever written also fixes the log start time.
    pub fn write(&self, fix: GpsFix) {
        let mut slot = self.lock();
        if slot.log_start_time.is_none() {
            slot.log_start_time = Some(fix.timestamp.clone());
        }
        slot.fix = Some(fix);
    }

    /// Snapshot of the current fix, `None` until the first successful poll
    pub fn read(&self) -> Option<GpsFix> {
        self.lock().fix.clone()
    }

    /// Timestamp of the first fix ever written
    pub fn log_start_time(&self) -> Option<String> {
        self.lock().log_start_time.clone()
    }
}
