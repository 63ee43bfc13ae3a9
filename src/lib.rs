//! # LoRa Coverage Library
//!
//! Survey the coverage of a LoRa link with a phone GPS and a receiving node.
//!
//! The node polls the phone for its position on one task, listens for beacon
//! frames on the radio, checks each frame's CRC-8 and appends one record per
//! packet, tagged with the most recent fix, to an append-only CSV log.

pub mod config;
pub mod error;
pub mod frame;
pub mod gps;
pub mod radio;
pub mod session;
pub mod telemetry;
