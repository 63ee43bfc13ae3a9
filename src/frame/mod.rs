//! # Survey Frame Module
//!
//! Text framing of the coverage beacons exchanged over LoRa.
//!
//! This module handles:
//! - CRC-8/MAXIM checksum calculation
//! - Beacon frame encoding (`<sequence>,<node_id>,<checksum>`)
//! - Inbound frame splitting and checksum verification

pub mod protocol;
pub mod encoder;
pub mod decoder;
pub mod crc;
