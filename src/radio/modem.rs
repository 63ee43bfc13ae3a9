//! # Serial LoRa Modem Driver
//!
//! Drives a serial-attached LoRa modem speaking the REYAX-style AT protocol.
//!
//! This module handles:
//! - Opening the modem's serial port
//! - Parsing `+RCV=<address>,<length>,<data>,<rssi>,<snr>` receive lines
//! - Buffering received datagrams in a bounded inbox
//! - Invoking the [`ReceiveHandler`] once per received packet
//! - Draining queued `AT+SEND` commands to the modem

use std::collections::VecDeque;
use std::io::{self, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::time::{interval, Duration};
use tokio_serial::SerialPortBuilderExt;
use tracing::{debug, info, warn};

use super::handler::ReceiveHandler;
use super::{RadioEvents, RadioStats, RadioTransport, MAX_DATAGRAM_SIZE};
use crate::config::RadioConfig;
use crate::error::{CoverageError, Result};

/// Prefix of an unsolicited receive notification
pub const RX_LINE_PREFIX: &[u8] = b"+RCV=";

/// Largest payload the modem accepts in one `AT+SEND`
pub const MAX_SEND_PAYLOAD: usize = 240;

/// Received datagrams held before the oldest is dropped
const INBOX_CAPACITY: usize = 16;

/// How often the driver re-checks the stop flag while idle
const STOP_POLL_INTERVAL_MS: u64 = 100;

/// One packet reported by the modem
#[derive(Debug, Clone, PartialEq)]
pub struct ModemPacket {
    /// Transmitter address
    pub address: u16,
    /// Raw payload bytes
    pub data: Vec<u8>,
    /// Signal strength in dBm
    pub rssi: i16,
    /// Signal-to-noise ratio in dB
    pub snr: f32,
}

fn split_field(bytes: &[u8]) -> Option<(&[u8], &[u8])> {
    let pos = bytes.iter().position(|&b| b == b',')?;
    Some((&bytes[..pos], &bytes[pos + 1..]))
}

fn parse_number<T: std::str::FromStr>(field: &[u8]) -> Option<T> {
    std::str::from_utf8(field).ok()?.trim().parse().ok()
}

/// Parse a `+RCV=` line
///
/// The payload may contain commas, line breaks or non-UTF-8 bytes, so it is
/// sliced by the declared length rather than split.
///
/// # Errors
///
/// Returns `Serial` if the line is not a well-formed receive notification.
///
/// # Examples
///
/// ```
/// use lora_coverage::radio::modem::parse_rcv_line;
///
/// let packet = parse_rcv_line(b"+RCV=50,13,5,AB12CD,0xd7,-99,40").unwrap();
/// assert_eq!(packet.data, b"5,AB12CD,0xd7");
/// assert_eq!(packet.rssi, -99);
/// ```
pub fn parse_rcv_line(line: &[u8]) -> Result<ModemPacket> {
    let bad = |why: &str| {
        CoverageError::Serial(format!(
            "bad receive line ({}): {:?}",
            why,
            String::from_utf8_lossy(line)
        ))
    };

    let rest = line
        .strip_prefix(RX_LINE_PREFIX)
        .ok_or_else(|| bad("missing +RCV= prefix"))?;

    let (address, rest) = split_field(rest).ok_or_else(|| bad("no address"))?;
    let (length, rest) = split_field(rest).ok_or_else(|| bad("no length"))?;

    let address: u16 = parse_number(address).ok_or_else(|| bad("address"))?;
    let length: usize = parse_number(length).ok_or_else(|| bad("length"))?;

    // Declared length comes off the wire; compare without arithmetic on it
    if rest.len() <= length || rest[length] != b',' {
        return Err(bad("payload shorter than declared length"));
    }

    let data = rest[..length].to_vec();
    let tail = std::str::from_utf8(&rest[length + 1..]).map_err(|_| bad("tail"))?;
    let (rssi, snr) = tail
        .trim_end_matches(['\r', '\n'])
        .split_once(',')
        .ok_or_else(|| bad("no snr"))?;

    Ok(ModemPacket {
        address,
        data,
        rssi: rssi.trim().parse().map_err(|_| bad("rssi"))?,
        snr: snr.trim().parse().map_err(|_| bad("snr"))?,
    })
}

/// Whether `line` is a receive notification cut short by a line break
/// inside its payload
///
/// Only lengths a datagram can have are waited for, so a garbled length
/// never makes the driver read on indefinitely.
fn payload_incomplete(line: &[u8]) -> bool {
    let Some(rest) = line.strip_prefix(RX_LINE_PREFIX) else {
        return false;
    };
    let Some((_, rest)) = split_field(rest) else {
        return false;
    };
    let Some((length, payload)) = split_field(rest) else {
        return false;
    };

    match parse_number::<usize>(length) {
        Some(length) if length <= MAX_DATAGRAM_SIZE => payload.len() <= length,
        _ => false,
    }
}

/// Format an `AT+SEND` command for broadcast
pub fn format_send_command(frame: &[u8]) -> io::Result<String> {
    if frame.is_empty() || frame.len() > MAX_SEND_PAYLOAD {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("frame length {} outside 1..={}", frame.len(), MAX_SEND_PAYLOAD),
        ));
    }

    let text = std::str::from_utf8(frame)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;

    Ok(format!("AT+SEND=0,{},{}\r\n", frame.len(), text))
}

/// Modem-backed radio transport
///
/// Filled by the driver task, drained by the receive handler.
#[derive(Debug)]
pub struct ModemRadio {
    inbox: VecDeque<Vec<u8>>,
    outbox: VecDeque<String>,
    last_stats: RadioStats,
    spreading_factor: u8,
    started: Instant,
    dropped: u64,
}

impl ModemRadio {
    pub fn new(spreading_factor: u8) -> Self {
        Self {
            inbox: VecDeque::with_capacity(INBOX_CAPACITY),
            outbox: VecDeque::new(),
            last_stats: RadioStats {
                spreading_factor,
                ..RadioStats::default()
            },
            spreading_factor,
            started: Instant::now(),
            dropped: 0,
        }
    }

    /// Queue a received packet and record its stats
    pub fn deliver(&mut self, packet: ModemPacket) {
        if self.inbox.len() == INBOX_CAPACITY {
            self.inbox.pop_front();
            self.dropped += 1;
            warn!("Radio inbox full, dropped oldest packet ({} total)", self.dropped);
        }

        self.last_stats = RadioStats {
            timestamp_us: self.started.elapsed().as_micros() as u64,
            rssi: packet.rssi,
            snr: packet.snr,
            spreading_factor: self.spreading_factor,
        };
        self.inbox.push_back(packet.data);
    }

    /// Next command waiting to be written to the modem
    pub fn take_outbound(&mut self) -> Option<String> {
        self.outbox.pop_front()
    }

    /// Packets discarded because the inbox was full
    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}

impl RadioTransport for ModemRadio {
    fn recv(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.inbox.pop_front() {
            Some(data) => {
                let n = data.len().min(buf.len());
                buf[..n].copy_from_slice(&data[..n]);
                Ok(n)
            }
            None => Ok(0),
        }
    }

    fn stats(&self) -> RadioStats {
        self.last_stats
    }

    fn send(&mut self, frame: &[u8]) -> io::Result<()> {
        let command = format_send_command(frame)?;
        self.outbox.push_back(command);
        Ok(())
    }
}

/// Open the modem's serial port (8N1, no flow control)
///
/// # Errors
///
/// Returns `Serial` if the port cannot be opened.
pub fn open_modem(config: &RadioConfig) -> Result<tokio_serial::SerialStream> {
    let port = tokio_serial::new(&config.port, config.baud_rate)
        .data_bits(tokio_serial::DataBits::Eight)
        .parity(tokio_serial::Parity::None)
        .stop_bits(tokio_serial::StopBits::One)
        .flow_control(tokio_serial::FlowControl::None)
        .open_native_async()
        .map_err(|e| CoverageError::Serial(format!("Failed to open {}: {}", config.port, e)))?;

    info!("Opened LoRa modem at {} ({} baud)", config.port, config.baud_rate);
    Ok(port)
}

/// Hand one complete modem line to the receive handler
fn handle_line<W: Write>(
    line: &[u8],
    radio: &mut ModemRadio,
    handler: &ReceiveHandler<W>,
) -> Result<()> {
    if !line.starts_with(RX_LINE_PREFIX) {
        debug!("Modem: {}", String::from_utf8_lossy(line).trim_end());
        return Ok(());
    }

    match parse_rcv_line(line) {
        Ok(packet) if packet.data.len() > MAX_DATAGRAM_SIZE => {
            warn!("Dropping oversized packet ({} bytes)", packet.data.len());
        }
        Ok(packet) => {
            radio.deliver(packet);
            // Blocking append on the runtime thread; beacon rates keep it short
            handler.on_event(RadioEvents::RX_PACKET, radio)?;
        }
        Err(e) => warn!("Dropping packet: {}", e),
    }

    Ok(())
}

/// Run the modem driver until `stop` is set or the stream ends
///
/// Lines are read as raw bytes. A notification whose payload contains a
/// line break is reassembled from the following lines until its declared
/// length is met; if a new notification starts first, the cut one is
/// dropped and the new one kept.
///
/// # Errors
///
/// Returns `Storage` when the receive handler cannot append a record, and
/// `Serial` when the modem stream fails. Malformed lines are skipped.
pub async fn drive_modem<S, W>(
    stream: S,
    radio: &mut ModemRadio,
    handler: &ReceiveHandler<W>,
    stop: &AtomicBool,
) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
    W: Write,
{
    let (reader, mut writer) = tokio::io::split(stream);
    let mut reader = BufReader::new(reader);
    let mut stop_check = interval(Duration::from_millis(STOP_POLL_INTERVAL_MS));

    // Survives cancelled reads: read_until appends, so a partial line is kept
    let mut pending: Vec<u8> = Vec::new();
    // Start of the last line appended to a notification still being assembled
    let mut segment_start = 0;

    loop {
        while let Some(command) = radio.take_outbound() {
            writer
                .write_all(command.as_bytes())
                .await
                .map_err(|e| CoverageError::Serial(format!("Failed to write to modem: {}", e)))?;
            writer.flush().await.map_err(|e| CoverageError::Serial(e.to_string()))?;
        }

        if stop.load(Ordering::Acquire) {
            info!("Modem driver stopped");
            return Ok(());
        }

        tokio::select! {
            read = reader.read_until(b'\n', &mut pending) => {
                let n = read
                    .map_err(|e| CoverageError::Serial(format!("Modem read failed: {}", e)))?;

                if segment_start > 0 && pending[segment_start..].starts_with(RX_LINE_PREFIX) {
                    let next = pending.split_off(segment_start);
                    handle_line(&pending, radio, handler)?;
                    pending = next;
                    segment_start = 0;
                }

                if n == 0 {
                    if !pending.is_empty() {
                        handle_line(&pending, radio, handler)?;
                    }
                    warn!("Modem stream closed");
                    return Ok(());
                }

                if payload_incomplete(&pending) {
                    segment_start = pending.len();
                    continue;
                }

                handle_line(&pending, radio, handler)?;
                pending.clear();
                segment_start = 0;
            }
            _ = stop_check.tick() => {}
        }
    }
}
