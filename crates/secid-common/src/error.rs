//! Error types for secid

use thiserror::Error;

/// secid error type
///
/// Only configuration loading and user input parsing can fail. Per-packet
/// classification and origin resolution are total.
#[derive(Error, Debug)]
pub enum SecIdError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed configuration document
    #[error("parse error: {0}")]
    Parse(#[from] serde_json::Error),

    /// Configuration parsed but violates a protocol constraint
    #[error("invalid config: {0}")]
    InvalidConfig(String),

    /// Identity or marker literal could not be parsed
    #[error("invalid identity: {0}")]
    InvalidIdentity(String),
}

/// Result type for secid
pub type SecIdResult<T> = Result<T, SecIdError>;
