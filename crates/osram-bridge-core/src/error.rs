//! Error type shared across the bridge crates.

use thiserror::Error;

/// Result type for bridge operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Bridge error types.
#[derive(Debug, Error)]
pub enum Error {
    /// Invalid or unreadable configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A bus payload could not be decoded.
    #[error("Payload error: {0}")]
    Payload(String),

    /// The accessory host rejected an operation.
    #[error("Host error: {0}")]
    Host(String),

    /// Message bus client error.
    #[error("Bus error: {0}")]
    Bus(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Payload(e.to_string())
    }
}

impl From<toml::de::Error> for Error {
    fn from(e: toml::de::Error) -> Self {
        Error::Config(e.to_string())
    }
}
