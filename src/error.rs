//! ClientDesk error types

use thiserror::Error;

/// ClientDesk error type
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Storage backend error
    #[error("Storage error: {0}")]
    Storage(String),

    /// Storage write rejected because the backend is full
    #[error("Storage quota exceeded writing '{key}' (limit {limit} bytes)")]
    QuotaExceeded { key: String, limit: usize },

    /// Stored JSON is well-formed but does not have the expected shape
    #[error("Stored value under '{key}' has an unexpected shape: {reason}")]
    Schema { key: String, reason: String },

    /// Notifier error
    #[error("Notifier error: {0}")]
    Notifier(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias for ClientDesk operations
pub type Result<T> = std::result::Result<T, Error>;
