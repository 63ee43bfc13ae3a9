//! # GPS Poll Actor
//!
//! Periodically asks the phone for its location and refreshes the shared
//! [`FixStore`].
//!
//! ## States
//!
//! ```text
//! Connecting -> Polling -> (ErrorBackoff -> Polling) -> Stopped
//! ```
//!
//! - Read timeout: transient, back off and retry on the same connection
//! - Other link errors: logged, connection dropped, reopened next cycle
//! - Undecodable response: discarded, store untouched
//!
//! The actor only stops when the stop flag is seen at the top of its loop.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::time::{sleep, timeout, Duration};
use tracing::{debug, error, info, warn};

use super::transport::GpsTransport;
use super::{parse_fix_response, FixStore, GpsFix};
use crate::config::GpsConfig;
use crate::error::{CoverageError, Result};

/// ShareGPS location request
pub const GPS_REQUEST: &[u8] = b"?SHGPS.LOCATION;\r\n";

/// Receive buffer for one response
const RESPONSE_BUFFER_SIZE: usize = 4096;

/// Poll actor state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollerState {
    Connecting,
    Polling,
    ErrorBackoff,
    Stopped,
}

/// Timing of the poll loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollTiming {
    /// Delay between cycles
    pub poll_interval: Duration,
    /// Longest wait for a response
    pub read_timeout: Duration,
    /// Extra sleep after a timed-out read
    pub backoff: Duration,
}

impl From<&GpsConfig> for PollTiming {
    fn from(config: &GpsConfig) -> Self {
        Self {
            poll_interval: Duration::from_millis(config.poll_interval_ms),
            read_timeout: Duration::from_millis(config.read_timeout_ms),
            backoff: Duration::from_millis(config.backoff_ms),
        }
    }
}

/// Counters kept across the actor's lifetime
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PollStats {
    pub fixes: u64,
    pub timeouts: u64,
    pub link_errors: u64,
    pub malformed: u64,
}

/// GPS poll actor
pub struct GpsPoller<T: GpsTransport> {
    transport: T,
    store: Arc<FixStore>,
    timing: PollTiming,
    state: PollerState,
    stats: PollStats,
    buf: Vec<u8>,
}

impl<T: GpsTransport> GpsPoller<T> {
    pub fn new(transport: T, store: Arc<FixStore>, timing: PollTiming) -> Self {
        Self {
            transport,
            store,
            timing,
            state: PollerState::Connecting,
            stats: PollStats::default(),
            buf: vec![0u8; RESPONSE_BUFFER_SIZE],
        }
    }

    pub fn state(&self) -> PollerState {
        self.state
    }

    pub fn stats(&self) -> PollStats {
        self.stats
    }

    /// Run one request/response cycle
    ///
    /// On success the fix is already in the store when this returns.
    ///
    /// # Errors
    ///
    /// - `TransientLink`: the read (or connect) timed out
    /// - `LinkUnavailable`: any other connection failure, or the peer closed
    /// - `MalformedResponse`: the response held no complete fix
    pub async fn poll_once(&mut self) -> Result<GpsFix> {
        if !self.transport.is_connected() {
            self.state = PollerState::Connecting;
            if let Err(e) = self.transport.connect().await {
                return Err(self.link_failure(e));
            }
            info!("Connected to GPS server");
        }

        self.state = PollerState::Polling;

        if let Err(e) = self.transport.write_all(GPS_REQUEST).await {
            return Err(self.link_failure(e));
        }

        let n = match timeout(self.timing.read_timeout, self.transport.read(&mut self.buf)).await {
            Err(_) => {
                return Err(CoverageError::TransientLink(format!(
                    "no GPS response within {} ms",
                    self.timing.read_timeout.as_millis()
                )));
            }
            Ok(Err(e)) => return Err(self.link_failure(e)),
            Ok(Ok(0)) => {
                self.transport.disconnect();
                return Err(CoverageError::LinkUnavailable(
                    "GPS server closed the connection".to_string(),
                ));
            }
            Ok(Ok(n)) => n,
        };

        let fix = parse_fix_response(&self.buf[..n])?;
        self.store.write(fix.clone());
        Ok(fix)
    }

    fn link_failure(&mut self, e: io::Error) -> CoverageError {
        match e.kind() {
            io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => {
                CoverageError::TransientLink(e.to_string())
            }
            _ => {
                self.transport.disconnect();
                CoverageError::LinkUnavailable(e.to_string())
            }
        }
    }

    /// Poll until `stop` is observed
    ///
    /// Never returns an error: every link fault is logged and the loop goes on.
    pub async fn run(&mut self, stop: &AtomicBool) {
        info!(
            "GPS poller started (interval {} ms, timeout {} ms)",
            self.timing.poll_interval.as_millis(),
            self.timing.read_timeout.as_millis()
        );

        loop {
            if stop.load(Ordering::Acquire) {
                self.state = PollerState::Stopped;
                info!("GPS poller stopped ({} fixes)", self.stats.fixes);
                break;
            }

            match self.poll_once().await {
                Ok(fix) => {
                    self.stats.fixes += 1;
                    debug!(
                        "GPS fix {} lat={} lon={} alt={}",
                        fix.timestamp, fix.latitude, fix.longitude, fix.altitude
                    );
                }
                Err(CoverageError::TransientLink(msg)) => {
                    self.stats.timeouts += 1;
                    self.state = PollerState::ErrorBackoff;
                    debug!("GPS link timeout, backing off: {}", msg);
                    sleep(self.timing.backoff).await;
                }
                Err(CoverageError::LinkUnavailable(msg)) => {
                    self.stats.link_errors += 1;
                    error!("GPS link unavailable: {}", msg);
                    error!("ShareGPS connection status should be 'Listening'");
                }
                Err(CoverageError::MalformedResponse(msg)) => {
                    self.stats.malformed += 1;
                    warn!("Discarding GPS response: {}", msg);
                }
                Err(e) => {
                    warn!("GPS poll failed: {}", e);
                }
            }

            sleep(self.timing.poll_interval).await;
        }
    }
}
