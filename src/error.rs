//! Error types for ArborDB
//!
//! Provides a unified error type for all operations.

use thiserror::Error;

/// Result type alias using ArborError
pub type Result<T> = std::result::Result<T, ArborError>;

/// Unified error type for ArborDB operations
#[derive(Debug, Error)]
pub enum ArborError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Lock failure: {0}")]
    Lock(#[source] std::io::Error),

    // -------------------------------------------------------------------------
    // Store Errors
    // -------------------------------------------------------------------------
    #[error("Key not found")]
    KeyNotFound,

    #[error("Corrupt store: {0}")]
    CorruptStore(String),

    #[error("Ref not loaded: {0}")]
    NotLoaded(String),

    // -------------------------------------------------------------------------
    // Serialization Errors
    // -------------------------------------------------------------------------
    #[error("Serialization error: {0}")]
    Serialization(String),

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),
}

impl ArborError {
    /// True for the expected "absent key" outcome, false for real failures.
    pub fn is_not_found(&self) -> bool {
        matches!(self, ArborError::KeyNotFound)
    }
}

impl From<bincode::Error> for ArborError {
    fn from(e: bincode::Error) -> Self {
        ArborError::Serialization(e.to_string())
    }
}
