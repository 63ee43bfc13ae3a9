//! # LoRa Coverage
//!
//! Survey node for LoRa coverage measurements.
//!
//! Polls the phone's ShareGPS server for position fixes, listens for beacon
//! frames through a serial LoRa modem and logs one CSV record per packet.

use anyhow::{Context, Result};
use chrono::Local;
use tokio::time::Duration;
use tracing::{error, info};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::writer::MakeWriterExt;
use tracing_subscriber::EnvFilter;

use lora_coverage::config::{Config, LogConfig};
use lora_coverage::gps::poller::PollTiming;
use lora_coverage::gps::transport::TcpGpsTransport;
use lora_coverage::radio::modem::{drive_modem, open_modem, ModemRadio};
use lora_coverage::session::CoverageSession;

/// Configuration used when no path is given on the command line
const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

/// Prefix of the rolling diagnostics file inside the log directory
const DIAGNOSTICS_FILE_PREFIX: &str = "lora-coverage.log";

/// Main entry point for the survey node
///
/// # Control Flow
///
/// 1. **Initialization**
///    - Load configuration (first argument, or `config/default.toml`)
///    - Set up diagnostics on stderr and, optionally, a daily log file
///    - Open the acquisition log and start the GPS poll task
///    - Open the LoRa modem and start the radio driver
///
/// 2. **Acquisition**
///    - Every received packet is checked, paired with the latest fix and logged
///    - Records are echoed on stdout
///
/// 3. **Shutdown**
///    - Ctrl+C, or a storage failure in the radio driver, sets the stop flag
///    - Both tasks finish their current cycle and exit
///
/// # Errors
///
/// Returns error if the configuration, log file or modem cannot be opened, or
/// if appending to the log fails during acquisition.
#[tokio::main]
async fn main() -> Result<()> {
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());
    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load configuration from {}", config_path))?;

    std::fs::create_dir_all(&config.log.log_dir)
        .with_context(|| format!("Failed to create log directory {}", config.log.log_dir))?;
    let _diagnostics_guard = init_tracing(&config.log);

    info!("LoRa Coverage v{} starting...", env!("CARGO_PKG_VERSION"));

    let started = Local::now();
    let session = CoverageSession::open(&config, &started)?;

    let gps = TcpGpsTransport::new(
        &config.gps.host,
        config.gps.port,
        Duration::from_millis(config.gps.connect_timeout_ms),
    );
    info!("Polling GPS at {}", gps.addr());
    let poll_task = session.spawn_poller(gps, PollTiming::from(&config.gps));

    let port = open_modem(&config.radio)?;
    let handler = session.handler();
    let stop = session.stop_flag();
    let spreading_factor = config.radio.spreading_factor;
    let mut radio_task = tokio::spawn(async move {
        let mut radio = ModemRadio::new(spreading_factor);
        drive_modem(port, &mut radio, handler.as_ref(), &stop).await
    });

    info!("Acquisition running, press Ctrl+C to end");

    let early_exit = tokio::select! {
        result = &mut radio_task => Some(result),
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, ending acquisition...");
            None
        }
    };

    session.stop();

    let radio_result = match early_exit {
        Some(result) => result,
        None => radio_task.await,
    };
    let poller = poll_task.await.context("GPS poll task panicked")?;

    let stats = poller.stats();
    info!(
        "GPS poller: {} fixes, {} timeouts, {} link errors, {} malformed responses",
        stats.fixes, stats.timeouts, stats.link_errors, stats.malformed
    );

    if let Err(e) = radio_result.context("Radio driver task panicked")? {
        error!("Acquisition aborted: {}", e);
        return Err(e.into());
    }

    info!("Acquisition ended");
    Ok(())
}

/// Install the tracing subscriber
///
/// Diagnostics go to stderr so stdout carries only the record echo. The
/// returned guard must live until exit for the file writer to flush.
fn init_tracing(log: &LogConfig) -> Option<WorkerGuard> {
    let filter = EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into());

    if log.diagnostics_file {
        let appender = tracing_appender::rolling::daily(&log.log_dir, DIAGNOSTICS_FILE_PREFIX);
        let (file_writer, guard) = tracing_appender::non_blocking(appender);

        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_ansi(false)
            .with_writer(std::io::stderr.and(file_writer))
            .init();

        Some(guard)
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();

        None
    }
}
