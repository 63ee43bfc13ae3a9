//! # Radio Module
//!
//! Packet-radio boundary of the survey node.
//!
//! This module handles:
//! - The [`RadioTransport`] seam the receive handler reads datagrams through
//! - Radio event masks delivered with each notification
//! - The receive handler invoked once per received packet ([`handler`])
//! - The serial LoRa modem driver for Linux hosts ([`modem`])

pub mod handler;
pub mod modem;

use std::io;

/// Largest datagram the radio will hand to the receive handler
pub const MAX_DATAGRAM_SIZE: usize = 256;

/// Diagnostics sampled from the radio when a packet is received
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct RadioStats {
    /// Microseconds since the radio driver started
    pub timestamp_us: u64,

    /// Received signal strength in dBm
    pub rssi: i16,

    /// Signal-to-noise ratio in dB
    pub snr: f32,

    /// Spreading factor the packet was received with
    pub spreading_factor: u8,
}

/// Bit mask of radio events carried by one notification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RadioEvents(u8);

impl RadioEvents {
    /// A packet was received
    pub const RX_PACKET: RadioEvents = RadioEvents(0x01);

    /// A queued packet finished transmitting
    pub const TX_PACKET: RadioEvents = RadioEvents(0x02);

    pub const fn empty() -> Self {
        RadioEvents(0)
    }

    pub const fn contains(self, other: RadioEvents) -> bool {
        self.0 & other.0 == other.0 && other.0 != 0
    }
}

impl std::ops::BitOr for RadioEvents {
    type Output = RadioEvents;

    fn bitor(self, rhs: RadioEvents) -> RadioEvents {
        RadioEvents(self.0 | rhs.0)
    }
}

/// Trait for raw packet-radio I/O
///
/// Calls are made from the radio event context and must not block.
pub trait RadioTransport: Send {
    /// Take the next received datagram, truncated to `buf.len()`
    ///
    /// Returns `Ok(0)` when nothing is pending.
    fn recv(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Stats of the most recently received packet
    fn stats(&self) -> RadioStats;

    /// Queue a frame for transmission
    fn send(&mut self, frame: &[u8]) -> io::Result<()>;
}
