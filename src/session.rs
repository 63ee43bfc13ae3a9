//! # Acquisition Session
//!
//! Owns everything the two actors share: the fix store, the receive handler
//! (and through it the log) and the stop flag. The session outlives both the
//! GPS poll task and the radio driver.

use chrono::{DateTime, TimeZone};
use std::fs::File;
use std::io::Write;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::info;

use crate::config::Config;
use crate::error::Result;
use crate::gps::poller::{GpsPoller, PollTiming};
use crate::gps::transport::GpsTransport;
use crate::gps::FixStore;
use crate::radio::handler::ReceiveHandler;
use crate::telemetry::logger::CsvLogger;

/// Shared state of one survey run
pub struct CoverageSession<W: Write> {
    store: Arc<FixStore>,
    handler: Arc<ReceiveHandler<W>>,
    stop: Arc<AtomicBool>,
}

impl CoverageSession<File> {
    /// Open a session logging to `<log_dir>/acq<started>list.csv`
    ///
    /// # Errors
    ///
    /// Returns `Storage` if the log cannot be created.
    pub fn open<Tz: TimeZone>(config: &Config, started: &DateTime<Tz>) -> Result<Self>
    where
        Tz::Offset: std::fmt::Display,
    {
        let mut logger = CsvLogger::create(Path::new(&config.log.log_dir), started)?;
        if config.log.echo_console {
            logger = logger.with_console(Box::new(std::io::stdout()));
        }

        Ok(Self::new(&config.node.id, config.radio.max_datagram_size, logger))
    }
}

impl<W: Write> CoverageSession<W> {
    pub fn new(node_id: &str, max_datagram_size: usize, logger: CsvLogger<W>) -> Self {
        let store = Arc::new(FixStore::new());
        let handler = Arc::new(ReceiveHandler::new(
            Arc::clone(&store),
            node_id,
            max_datagram_size,
            logger,
        ));

        Self {
            store,
            handler,
            stop: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn store(&self) -> Arc<FixStore> {
        Arc::clone(&self.store)
    }

    pub fn handler(&self) -> Arc<ReceiveHandler<W>> {
        Arc::clone(&self.handler)
    }

    pub fn stop_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop)
    }

    /// Start the GPS poll actor on its own task
    ///
    /// The task hands the poller back once it has observed the stop flag.
    pub fn spawn_poller<T>(&self, transport: T, timing: PollTiming) -> JoinHandle<GpsPoller<T>>
    where
        T: GpsTransport + 'static,
    {
        let mut poller = GpsPoller::new(transport, self.store(), timing);
        let stop = self.stop_flag();

        tokio::spawn(async move {
            poller.run(&stop).await;
            poller
        })
    }

    /// Ask both actors to finish their current cycle and stop
    pub fn stop(&self) {
        self.stop.store(true, Ordering::Release);
        info!(
            "Session stopping: {} records logged, first fix at {}",
            self.handler.records_written(),
            self.store.log_start_time().as_deref().unwrap_or("never")
        );
    }

    pub fn is_stopped(&self) -> bool {
        self.stop.load(Ordering::Acquire)
    }
}
