//! Error types for the crisis-engine crate.

use thiserror::Error;

/// Errors that can occur in the crisis engine.
#[derive(Debug, Error)]
pub enum CrisisError {
    /// Alert with the given ID was not found.
    #[error("alert not found: {id}")]
    AlertNotFound {
        /// The alert ID that was not found.
        id: String,
    },

    /// An alert ID could not be parsed.
    #[error("invalid alert id: {id}")]
    InvalidAlertId {
        /// The rejected input.
        id: String,
    },

    /// The persistence layer rejected or failed an operation.
    #[error("persistence failed: {reason}")]
    Persistence {
        /// The reason the operation failed.
        reason: String,
    },

    /// A subject identifier was empty or looked like a raw contact address.
    #[error("invalid subject id: {reason}")]
    InvalidSubject {
        /// The reason the identifier was rejected.
        reason: String,
    },

    /// Invalid engine configuration.
    #[error("invalid configuration: {reason}")]
    InvalidConfig {
        /// The reason the configuration is invalid.
        reason: String,
    },

    /// A single notification channel could not be reached.
    #[error("notification to {channel} failed: {reason}")]
    NotificationFailed {
        /// The channel that failed.
        channel: String,
        /// The reason the send failed.
        reason: String,
    },

    /// Serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for CrisisError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Result type for crisis engine operations.
pub type Result<T> = std::result::Result<T, CrisisError>;
