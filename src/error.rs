//! # Error Types
//!
//! Custom error types for the coverage node using `thiserror`.
//!
//! Transport faults (`TransientLink`, `LinkUnavailable`, `MalformedResponse`)
//! stay inside the actor that raised them. Only `Storage` ends a session.

use thiserror::Error;

/// Main error type for the coverage node
#[derive(Debug, Error)]
pub enum CoverageError {
    /// Inbound frame is shorter than separator + checksum text
    #[error("Frame too short: {0} bytes")]
    FrameTooShort(usize),

    /// GPS stream read timed out
    #[error("Transient GPS link error: {0}")]
    TransientLink(String),

    /// GPS stream connection failed for a reason other than a timeout
    #[error("GPS link unavailable: {0}")]
    LinkUnavailable(String),

    /// GPS response could not be decoded into a complete fix
    #[error("Malformed GPS response: {0}")]
    MalformedResponse(String),

    /// Log append failed
    #[error("Storage failure: {0}")]
    Storage(std::io::Error),

    /// Serial modem errors
    #[error("Serial error: {0}")]
    Serial(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl CoverageError {
    /// Whether this error must terminate the acquisition session
    pub fn is_fatal(&self) -> bool {
        matches!(self, CoverageError::Storage(_))
    }
}

/// Result type alias for the coverage node
pub type Result<T> = std::result::Result<T, CoverageError>;
