//! # Configuration Module
//!
//! Handles loading and validating configuration from TOML files.

use serde::Deserialize;
use serde::de::Error;
use std::fs;
use std::path::Path;

use crate::error::Result;

/// Main configuration structure
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub node: NodeConfig,

    #[serde(default)]
    pub gps: GpsConfig,

    #[serde(default)]
    pub radio: RadioConfig,

    #[serde(default)]
    pub log: LogConfig,
}

/// Identity of this survey node
#[derive(Debug, Deserialize, Clone)]
pub struct NodeConfig {
    /// Node id written into every log record (usually the radio MAC in hex)
    pub id: String,
}

/// Phone GPS link configuration
#[derive(Debug, Deserialize, Clone)]
pub struct GpsConfig {
    #[serde(default = "default_gps_host")]
    pub host: String,

    #[serde(default = "default_gps_port")]
    pub port: u16,

    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    #[serde(default = "default_read_timeout_ms")]
    pub read_timeout_ms: u64,

    #[serde(default = "default_backoff_ms")]
    pub backoff_ms: u64,

    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
}

/// Serial LoRa modem configuration
#[derive(Debug, Deserialize, Clone)]
pub struct RadioConfig {
    #[serde(default = "default_radio_port")]
    pub port: String,

    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,

    #[serde(default = "default_max_datagram_size")]
    pub max_datagram_size: usize,

    /// Reported in radio stats only; the modem's PHY is configured elsewhere
    #[serde(default = "default_spreading_factor")]
    pub spreading_factor: u8,
}

/// Acquisition log configuration
#[derive(Debug, Deserialize, Clone)]
pub struct LogConfig {
    #[serde(default = "default_log_dir")]
    pub log_dir: String,

    #[serde(default = "default_echo_console")]
    pub echo_console: bool,

    #[serde(default = "default_diagnostics_file")]
    pub diagnostics_file: bool,
}

// Default value functions
fn default_gps_host() -> String { "192.168.43.1".to_string() }
fn default_gps_port() -> u16 { 2947 }
fn default_poll_interval_ms() -> u64 { 500 }
fn default_read_timeout_ms() -> u64 { 2000 }
fn default_backoff_ms() -> u64 { 1000 }
fn default_connect_timeout_ms() -> u64 { 3000 }

fn default_radio_port() -> String { "/dev/ttyUSB0".to_string() }
fn default_baud_rate() -> u32 { 115200 }
fn default_max_datagram_size() -> usize { 256 }
fn default_spreading_factor() -> u8 { 7 }

fn default_log_dir() -> String { "./log".to_string() }
fn default_echo_console() -> bool { true }
fn default_diagnostics_file() -> bool { true }

impl Default for GpsConfig {
    fn default() -> Self {
        Self {
            host: default_gps_host(),
            port: default_gps_port(),
            poll_interval_ms: default_poll_interval_ms(),
            read_timeout_ms: default_read_timeout_ms(),
            backoff_ms: default_backoff_ms(),
            connect_timeout_ms: default_connect_timeout_ms(),
        }
    }
}

impl Default for RadioConfig {
    fn default() -> Self {
        Self {
            port: default_radio_port(),
            baud_rate: default_baud_rate(),
            max_datagram_size: default_max_datagram_size(),
            spreading_factor: default_spreading_factor(),
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            log_dir: default_log_dir(),
            echo_console: default_echo_console(),
            diagnostics_file: default_diagnostics_file(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the configuration file
    ///
    /// # Returns
    ///
    /// * `Result<Config>` - Loaded and validated configuration
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - File cannot be read
    /// - TOML parsing fails
    /// - Validation fails
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use lora_coverage::config::Config;
    ///
    /// let config = Config::load("config/default.toml")?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        Self::from_toml(&contents)
    }

    /// Parse and validate configuration from a TOML string
    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values
    ///
    /// # Errors
    ///
    /// Returns error if any configuration value is out of valid range
    fn validate(&self) -> Result<()> {
        // Node id lands in a comma-separated record
        if self.node.id.trim().is_empty() {
            return Err(crate::error::CoverageError::Config(
                toml::de::Error::custom("node id cannot be empty")
            ));
        }

        if self.node.id.contains(',') || self.node.id.contains('\n') {
            return Err(crate::error::CoverageError::Config(
                toml::de::Error::custom("node id cannot contain commas or newlines")
            ));
        }

        if self.gps.host.is_empty() {
            return Err(crate::error::CoverageError::Config(
                toml::de::Error::custom("gps host cannot be empty")
            ));
        }

        if self.gps.port == 0 {
            return Err(crate::error::CoverageError::Config(
                toml::de::Error::custom("gps port must be greater than 0")
            ));
        }

        // Validate timing fields
        for (name, value, max) in [
            ("poll_interval_ms", self.gps.poll_interval_ms, 60000),
            ("read_timeout_ms", self.gps.read_timeout_ms, 60000),
            ("backoff_ms", self.gps.backoff_ms, 60000),
            ("connect_timeout_ms", self.gps.connect_timeout_ms, 60000),
        ] {
            if value == 0 || value > max {
                return Err(crate::error::CoverageError::Config(
                    toml::de::Error::custom(format!("{} must be between 1 and {}", name, max))
                ));
            }
        }

        if self.radio.port.is_empty() {
            return Err(crate::error::CoverageError::Config(
                toml::de::Error::custom("radio port cannot be empty")
            ));
        }

        if ![9600, 57600, 115200].contains(&self.radio.baud_rate) {
            return Err(crate::error::CoverageError::Config(
                toml::de::Error::custom("baud_rate must be one of: 9600, 57600, 115200")
            ));
        }

        if self.radio.max_datagram_size < 64 || self.radio.max_datagram_size > 256 {
            return Err(crate::error::CoverageError::Config(
                toml::de::Error::custom("max_datagram_size must be between 64 and 256")
            ));
        }

        if self.radio.spreading_factor < 7 || self.radio.spreading_factor > 12 {
            return Err(crate::error::CoverageError::Config(
                toml::de::Error::custom("spreading_factor must be between 7 and 12")
            ));
        }

        if self.log.log_dir.is_empty() {
            return Err(crate::error::CoverageError::Config(
                toml::de::Error::custom("log_dir cannot be empty")
            ));
        }

        Ok(())
    }
}
