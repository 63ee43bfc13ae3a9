//! # Telemetry Module
//!
//! Survey records and their append-only CSV log.
//!
//! This module handles:
//! - Assembling one [`record::LogRecord`] per received frame
//! - Sealing each record with a whole-line checksum
//! - Appending records to `acq<timestamp>list.csv` with a flush per line
//! - Echoing every record to the operator console

pub mod logger;
pub mod record;
