//! # CSV Record Logger
//!
//! Appends survey records to the acquisition log, one flushed line per
//! record, and echoes each line to the operator console. Both sides go
//! through a `csv::Writer`, so they always carry identical rows.

use chrono::{DateTime, TimeZone};
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use super::record::{row_writer, LogRecord};
use crate::error::{CoverageError, Result};

/// Name of the acquisition log for a session started at `started`
///
/// Format: `acq<YYYYmmddHHMMSS>list.csv`
pub fn log_file_name<Tz: TimeZone>(started: &DateTime<Tz>) -> String
where
    Tz::Offset: std::fmt::Display,
{
    format!("acq{}list.csv", started.format("%Y%m%d%H%M%S"))
}

/// Append-only CSV logger
///
/// No buffering across records: every append is written and flushed before
/// it returns. A failed write or flush is a [`CoverageError::Storage`].
pub struct CsvLogger<W: Write> {
    writer: csv::Writer<W>,
    console: Option<csv::Writer<Box<dyn Write + Send>>>,
    path: Option<PathBuf>,
    records: u64,
}

impl<W: Write> std::fmt::Debug for CsvLogger<W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CsvLogger")
            .field("path", &self.path)
            .field("records", &self.records)
            .field("console", &self.console.is_some())
            .finish_non_exhaustive()
    }
}

impl CsvLogger<File> {
    /// Open (or create) the session log inside `log_dir`
    ///
    /// Creates the directory if it does not exist. An existing file with the
    /// same name is appended to, never truncated.
    ///
    /// # Errors
    ///
    /// Returns `Storage` if the directory or file cannot be created.
    pub fn create<Tz: TimeZone>(log_dir: &Path, started: &DateTime<Tz>) -> Result<Self>
    where
        Tz::Offset: std::fmt::Display,
    {
        fs::create_dir_all(log_dir).map_err(CoverageError::Storage)?;

        let path = log_dir.join(log_file_name(started));
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(CoverageError::Storage)?;

        info!("Logging survey records to {}", path.display());

        let mut logger = Self::new(file);
        logger.path = Some(path);
        Ok(logger)
    }
}

impl<W: Write> CsvLogger<W> {
    /// Wrap any writer, without console echo
    pub fn new(writer: W) -> Self {
        Self {
            writer: row_writer(writer),
            console: None,
            path: None,
            records: 0,
        }
    }

    /// Echo every appended line to `console`
    pub fn with_console(mut self, console: Box<dyn Write + Send>) -> Self {
        self.console = Some(row_writer(console));
        self
    }

    /// Append one record as a flushed CSV line
    ///
    /// # Errors
    ///
    /// Returns `Storage` if the line cannot be written or flushed. Console
    /// echo failures are only logged.
    pub fn append(&mut self, record: &LogRecord) -> Result<()> {
        let fields = record.fields();

        self.writer
            .write_record(&fields)
            .map_err(|e| CoverageError::Storage(e.into()))?;
        self.writer.flush().map_err(CoverageError::Storage)?;
        self.records += 1;

        if let Some(console) = self.console.as_mut() {
            let echoed = console
                .write_record(&fields)
                .map_err(std::io::Error::from)
                .and_then(|_| console.flush());
            if let Err(e) = echoed {
                warn!("Console echo failed: {}", e);
            }
        }

        Ok(())
    }

    /// Number of records appended by this logger
    pub fn records_written(&self) -> u64 {
        self.records
    }

    /// Path of the backing file, if the logger was opened from disk
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }
}
