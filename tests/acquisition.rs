//! End-to-end acquisition against a fake ShareGPS server and an in-memory modem.

use std::fs;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use chrono::Utc;
use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio::time::{sleep, Duration};

use lora_coverage::config::Config;
use lora_coverage::error::CoverageError;
use lora_coverage::frame::crc::checksum_text;
use lora_coverage::frame::encoder::encode_tx_frame;
use lora_coverage::gps::poller::{GpsPoller, PollTiming, PollerState, GPS_REQUEST};
use lora_coverage::gps::transport::TcpGpsTransport;
use lora_coverage::gps::FixStore;
use lora_coverage::radio::modem::{drive_modem, ModemRadio};
use lora_coverage::session::CoverageSession;

const SAMPLE: &str = r#"{"class":"SHGPS.LOCATION","lat":45.70373,"lon":13.72005,"alt":57.45,"time":"2017-04-24T12:35:20.000Z","mode":2}"#;

/// Fake phone: answers the first `answers` requests, then stays silent
async fn spawn_phone(answers: usize) -> (u16, JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let handle = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut buf = [0u8; 64];
        let mut answered = 0;

        loop {
            let n = match socket.read(&mut buf).await {
                Ok(0) | Err(_) => return,
                Ok(n) => n,
            };
            // Requests sent after a timeout may arrive coalesced
            if !buf[..n].starts_with(GPS_REQUEST) {
                return;
            }

            if answered < answers {
                let reply = format!("{}\r\n", SAMPLE);
                if socket.write_all(reply.as_bytes()).await.is_err() {
                    return;
                }
                answered += 1;
            }
        }
    });

    (port, handle)
}

fn timing() -> PollTiming {
    PollTiming {
        poll_interval: Duration::from_millis(5),
        read_timeout: Duration::from_millis(50),
        backoff: Duration::from_millis(5),
    }
}

fn transport(port: u16) -> TcpGpsTransport {
    TcpGpsTransport::new("127.0.0.1", port, Duration::from_secs(1))
}

#[tokio::test]
async fn poll_over_tcp_stores_exact_fix() {
    let (port, _phone) = spawn_phone(1).await;
    let store = Arc::new(FixStore::new());
    let mut poller = GpsPoller::new(transport(port), Arc::clone(&store), timing());

    poller.poll_once().await.unwrap();

    let fix = store.read().unwrap();
    assert_eq!(fix.latitude, 45.70373);
    assert_eq!(fix.longitude, 13.72005);
    assert_eq!(fix.altitude, 57.45);
    assert_eq!(fix.timestamp, "2017-04-24T12:35:20.000Z");
}

#[tokio::test]
async fn silent_phone_times_out_without_losing_fix() {
    let (port, _phone) = spawn_phone(1).await;
    let store = Arc::new(FixStore::new());
    let mut poller = GpsPoller::new(transport(port), Arc::clone(&store), timing());

    let first = poller.poll_once().await.unwrap();
    for _ in 0..3 {
        let result = poller.poll_once().await;
        assert!(
            matches!(result, Err(CoverageError::TransientLink(_))),
            "expected a timeout, got {:?}",
            result
        );
    }

    assert_eq!(poller.state(), PollerState::Polling);
    assert_eq!(store.read(), Some(first));
}

#[tokio::test]
async fn unreachable_phone_is_reported_and_not_fatal() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let store = Arc::new(FixStore::new());
    let mut poller = GpsPoller::new(transport(port), Arc::clone(&store), timing());

    for _ in 0..2 {
        assert!(poller.poll_once().await.is_err());
    }
    assert!(store.read().is_none());
}

#[tokio::test]
async fn session_logs_received_packets_with_gps() {
    let temp = TempDir::new().unwrap();
    let (port, _phone) = spawn_phone(usize::MAX).await;

    let config = Config::from_toml(&format!(
        r#"
[node]
id = "240ac4ffee01"

[log]
log_dir = "{}"
echo_console = false
"#,
        temp.path().display()
    ))
    .unwrap();

    let session = CoverageSession::open(&config, &Utc::now()).unwrap();
    let poll_task = session.spawn_poller(transport(port), timing());

    let store = session.store();
    for _ in 0..200 {
        if store.read().is_some() {
            break;
        }
        sleep(Duration::from_millis(5)).await;
    }
    assert!(store.read().is_some(), "no fix arrived from the fake phone");

    let valid = encode_tx_frame(5, "AB12CD");
    let mut corrupt = encode_tx_frame(6, "AB12CD").into_bytes();
    let last = corrupt.len() - 1;
    corrupt[last] = if corrupt[last] == b'f' { b'e' } else { b'f' };
    let corrupt = String::from_utf8(corrupt).unwrap();

    let (modem_side, mut host_side) = tokio::io::duplex(1024);
    let input = format!(
        "+RCV=50,{},{},-99,40\r\n+RCV=50,{},{},-112,-4.5\r\n",
        valid.len(),
        valid,
        corrupt.len(),
        corrupt
    );
    host_side.write_all(input.as_bytes()).await.unwrap();
    drop(host_side);

    let mut radio = ModemRadio::new(config.radio.spreading_factor);
    let stop = AtomicBool::new(false);
    drive_modem(modem_side, &mut radio, session.handler().as_ref(), &stop)
        .await
        .unwrap();

    session.stop();
    let poller = poll_task.await.unwrap();
    assert_eq!(poller.state(), PollerState::Stopped);

    let logs: Vec<_> = fs::read_dir(temp.path())
        .unwrap()
        .map(|entry| entry.unwrap().path())
        .filter(|path| {
            let name = path.file_name().unwrap().to_string_lossy().into_owned();
            name.starts_with("acq") && name.ends_with("list.csv")
        })
        .collect();
    assert_eq!(logs.len(), 1);

    let contents = fs::read_to_string(&logs[0]).unwrap();
    let lines: Vec<&str> = contents.lines().collect();
    assert_eq!(lines.len(), 2);

    assert!(lines[0].starts_with(
        "0,240ac4ffee01,2017-04-24T12:35:20.000Z,45.70373,13.72005,57.45,\"5,AB12CD\",0xd7,0xd7,true,"
    ));
    assert!(lines[0].contains(",-99,40,7,"));
    assert!(lines[1].starts_with("1,240ac4ffee01,"));
    assert!(lines[1].contains(",false,"));
    assert!(lines[1].contains(",-112,-4.5,7,"));

    for line in lines {
        let (body, record_crc) = line.rsplit_once(',').unwrap();
        assert_eq!(record_crc, checksum_text(body.as_bytes()));
    }
}
