//! # Radio Receive Handler
//!
//! Runs once per radio notification: reads the datagram, pairs it with the
//! latest GPS fix, verifies its checksum and appends a survey record.
//!
//! The handler runs in the radio event context, so it never waits on
//! anything but the fix store lock and the log append. Radio faults are
//! logged and swallowed; only a storage failure is returned.

use std::io::Write;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, info, warn};

use super::{RadioEvents, RadioTransport};
use crate::error::Result;
use crate::frame::decoder::decode_frame;
use crate::frame::protocol::DecodedFrame;
use crate::gps::FixStore;
use crate::telemetry::logger::CsvLogger;
use crate::telemetry::record::LogRecord;

/// What one notification led to
#[derive(Debug, Clone, PartialEq)]
pub enum RxOutcome {
    /// A record was appended to the log
    Logged(LogRecord),
    /// The notification carried no receive event
    NotReceive,
    /// Nothing pending, or the radio read failed
    NoData,
    /// The datagram was empty or whitespace only
    Blank,
    /// No GPS fix has been stored yet; the packet is dropped
    NoFix,
}

struct RecordSink<W: Write> {
    logger: CsvLogger<W>,
    next_sequence: u64,
}

/// Receive handler registered with the radio driver
pub struct ReceiveHandler<W: Write> {
    store: Arc<FixStore>,
    node_id: String,
    max_datagram_size: usize,
    sink: Mutex<RecordSink<W>>,
}

impl<W: Write> ReceiveHandler<W> {
    pub fn new(
        store: Arc<FixStore>,
        node_id: &str,
        max_datagram_size: usize,
        logger: CsvLogger<W>,
    ) -> Self {
        Self {
            store,
            node_id: node_id.to_string(),
            max_datagram_size,
            sink: Mutex::new(RecordSink {
                logger,
                next_sequence: 0,
            }),
        }
    }

    /// Handle one radio notification
    ///
    /// # Errors
    ///
    /// Returns `Storage` if the record could not be appended; the session
    /// must end. Every other fault yields an `Ok` outcome.
    pub fn on_event(
        &self,
        events: RadioEvents,
        radio: &mut dyn RadioTransport,
    ) -> Result<RxOutcome> {
        if !events.contains(RadioEvents::RX_PACKET) {
            return Ok(RxOutcome::NotReceive);
        }

        let mut buf = vec![0u8; self.max_datagram_size];
        let n = match radio.recv(&mut buf) {
            Ok(n) => n,
            Err(e) => {
                warn!("Radio receive failed: {}", e);
                return Ok(RxOutcome::NoData);
            }
        };

        if n == 0 {
            return Ok(RxOutcome::NoData);
        }

        let datagram = &buf[..n];
        if datagram.iter().all(u8::is_ascii_whitespace) {
            return Ok(RxOutcome::Blank);
        }

        let stats = radio.stats();

        let Some(fix) = self.store.read() else {
            debug!("No GPS fix yet, dropping {} byte packet", n);
            return Ok(RxOutcome::NoFix);
        };

        let frame = match decode_frame(datagram) {
            Ok(frame) => frame,
            Err(e) => {
                warn!("{}", e);
                DecodedFrame::too_short()
            }
        };

        let mut sink = self.sink.lock().unwrap_or_else(PoisonError::into_inner);
        let record = LogRecord::new(sink.next_sequence, &self.node_id, fix, frame, stats)?;
        sink.logger.append(&record)?;
        sink.next_sequence += 1;

        if record.frame.is_valid {
            debug!("Packet {} valid (rssi {} dBm)", record.sequence, stats.rssi);
        } else {
            info!(
                "Packet {} failed checksum: received {:?}, computed {:?}",
                record.sequence, record.frame.received_checksum, record.frame.computed_checksum
            );
        }

        Ok(RxOutcome::Logged(record))
    }

    /// Records appended so far
    pub fn records_written(&self) -> u64 {
        self.sink
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .logger
            .records_written()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CoverageError;
    use crate::frame::encoder::encode_tx_frame;
    use crate::gps::GpsFix;
    use crate::radio::mocks::MockRadio;
    use crate::radio::{RadioStats, MAX_DATAGRAM_SIZE};
    use crate::telemetry::logger::mocks::{FullDisk, SharedBuffer};
    use std::io;

    fn sample_fix() -> GpsFix {
        GpsFix {
            latitude: 45.70373,
            longitude: 13.72005,
            altitude: 57.45,
            timestamp: "2017-04-24T12:35:20.000Z".to_string(),
        }
    }

    fn stats() -> RadioStats {
        RadioStats {
            timestamp_us: 5_000_000,
            rssi: -101,
            snr: -3.25,
            spreading_factor: 7,
        }
    }

    fn handler() -> (ReceiveHandler<SharedBuffer>, Arc<FixStore>, SharedBuffer) {
        let store = Arc::new(FixStore::new());
        let file = SharedBuffer::new();
        let handler = ReceiveHandler::new(
            Arc::clone(&store),
            "240ac4ffee01",
            MAX_DATAGRAM_SIZE,
            CsvLogger::new(file.clone()),
        );
        (handler, store, file)
    }

    #[test]
    fn test_no_fix_emits_nothing() {
        let (handler, _store, file) = handler();
        let mut radio = MockRadio::new(stats());
        radio.push(encode_tx_frame(1, "AB12CD").as_bytes());
        radio.push(encode_tx_frame(2, "AB12CD").as_bytes());

        for _ in 0..2 {
            let outcome = handler.on_event(RadioEvents::RX_PACKET, &mut radio).unwrap();
            assert_eq!(outcome, RxOutcome::NoFix);
        }

        assert_eq!(handler.records_written(), 0);
        assert!(file.contents().is_empty());
        // Packets are consumed, not left pending
        assert!(radio.inbox.is_empty());
    }

    #[test]
    fn test_valid_packet_is_logged() {
        let (handler, store, file) = handler();
        store.write(sample_fix());
        let mut radio = MockRadio::new(stats());
        radio.push(encode_tx_frame(5, "AB12CD").as_bytes());

        let outcome = handler.on_event(RadioEvents::RX_PACKET, &mut radio).unwrap();
        let RxOutcome::Logged(record) = outcome else {
            panic!("Expected a logged record, got {:?}", outcome);
        };

        assert_eq!(record.sequence, 0);
        assert!(record.frame.is_valid);
        assert_eq!(record.frame.payload, "5,AB12CD");
        assert_eq!(record.fix, sample_fix());
        assert_eq!(record.stats, stats());
        assert_eq!(file.lines(), vec![record.to_csv_line().unwrap()]);
    }

    #[test]
    fn test_corrupt_packet_is_logged_invalid() {
        let (handler, store, file) = handler();
        store.write(sample_fix());
        let mut radio = MockRadio::new(stats());
        radio.push(b"5,AB12CD,0xd8");

        let outcome = handler.on_event(RadioEvents::RX_PACKET, &mut radio).unwrap();
        let RxOutcome::Logged(record) = outcome else {
            panic!("Expected a logged record");
        };

        assert!(!record.frame.is_valid);
        assert!(file.contents().contains(",false,"));
    }

    #[test]
    fn test_short_packet_is_logged_without_checksum() {
        let (handler, store, _file) = handler();
        store.write(sample_fix());
        let mut radio = MockRadio::new(stats());
        radio.push(b"abc");

        let outcome = handler.on_event(RadioEvents::RX_PACKET, &mut radio).unwrap();
        let RxOutcome::Logged(record) = outcome else {
            panic!("Expected a logged record");
        };

        assert_eq!(record.frame, DecodedFrame::too_short());
    }

    #[test]
    fn test_sequence_advances_only_on_emit() {
        let (handler, store, _file) = handler();
        let mut radio = MockRadio::new(stats());

        radio.push(encode_tx_frame(1, "A").as_bytes());
        handler.on_event(RadioEvents::RX_PACKET, &mut radio).unwrap();

        store.write(sample_fix());
        radio.push(b"   ");
        radio.push(encode_tx_frame(2, "A").as_bytes());
        radio.push(encode_tx_frame(3, "A").as_bytes());

        assert_eq!(
            handler.on_event(RadioEvents::RX_PACKET, &mut radio).unwrap(),
            RxOutcome::Blank
        );

        let sequences: Vec<u64> = (0..2)
            .map(|_| match handler.on_event(RadioEvents::RX_PACKET, &mut radio).unwrap() {
                RxOutcome::Logged(record) => record.sequence,
                other => panic!("Expected a logged record, got {:?}", other),
            })
            .collect();

        assert_eq!(sequences, vec![0, 1]);
    }

    #[test]
    fn test_stale_fix_is_used() {
        // The handler pairs with whatever fix is stored, however old
        let (handler, store, _file) = handler();
        store.write(sample_fix());
        let mut radio = MockRadio::new(RadioStats {
            timestamp_us: u64::MAX / 2,
            ..stats()
        });
        radio.push(encode_tx_frame(9, "AB12CD").as_bytes());

        match handler.on_event(RadioEvents::RX_PACKET, &mut radio).unwrap() {
            RxOutcome::Logged(record) => assert_eq!(record.fix.timestamp, "2017-04-24T12:35:20.000Z"),
            other => panic!("Expected a logged record, got {:?}", other),
        }
    }

    #[test]
    fn test_non_receive_event_is_ignored() {
        let (handler, store, _file) = handler();
        store.write(sample_fix());
        let mut radio = MockRadio::new(stats());
        radio.push(encode_tx_frame(1, "A").as_bytes());

        let outcome = handler.on_event(RadioEvents::TX_PACKET, &mut radio).unwrap();
        assert_eq!(outcome, RxOutcome::NotReceive);
        assert_eq!(radio.inbox.len(), 1);
    }

    #[test]
    fn test_empty_and_failing_radio() {
        let (handler, store, _file) = handler();
        store.write(sample_fix());

        let mut radio = MockRadio::new(stats());
        assert_eq!(
            handler.on_event(RadioEvents::RX_PACKET, &mut radio).unwrap(),
            RxOutcome::NoData
        );

        radio.recv_error = Some(io::ErrorKind::Other);
        assert_eq!(
            handler.on_event(RadioEvents::RX_PACKET, &mut radio).unwrap(),
            RxOutcome::NoData
        );
    }

    #[test]
    fn test_datagram_is_bounded() {
        let (handler, store, _file) = handler();
        store.write(sample_fix());
        let mut radio = MockRadio::new(stats());
        radio.push(&vec![b'a'; MAX_DATAGRAM_SIZE + 40]);

        match handler.on_event(RadioEvents::RX_PACKET, &mut radio).unwrap() {
            RxOutcome::Logged(record) => {
                assert_eq!(record.frame.payload.len(), MAX_DATAGRAM_SIZE - 5);
            }
            other => panic!("Expected a logged record, got {:?}", other),
        }
    }

    #[test]
    fn test_storage_failure_propagates() {
        let store = Arc::new(FixStore::new());
        store.write(sample_fix());
        let handler = ReceiveHandler::new(
            Arc::clone(&store),
            "node",
            MAX_DATAGRAM_SIZE,
            CsvLogger::new(FullDisk),
        );
        let mut radio = MockRadio::new(stats());
        radio.push(encode_tx_frame(1, "A").as_bytes());

        let err = handler.on_event(RadioEvents::RX_PACKET, &mut radio).unwrap_err();
        assert!(matches!(err, CoverageError::Storage(_)));
    }
}
