//! Error types for record-sweep
//!
//! Only failures that make a whole run meaningless surface as [`Error`]:
//! bad configuration, unreadable input, or an empty proxy pool. Everything
//! that goes wrong for a single subject is reported as a
//! [`Classification`](crate::types::Classification) and degrades to
//! "no records for this subject" instead.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for record-sweep operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for record-sweep
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "workers")
        key: Option<String>,
    },

    /// No proxy candidates were supplied at all
    #[error("no proxies supplied")]
    NoProxies,

    /// Proxies were supplied but none passed validation
    #[error("none of the {candidates} supplied proxies passed validation")]
    NoUsableProxies {
        /// Number of candidates that were probed
        candidates: usize,
    },

    /// A subject row could not be turned into a [`Subject`](crate::types::Subject)
    #[error("invalid subject at row {row}: {reason}")]
    InvalidSubject {
        /// 1-based data row number (header excluded)
        row: usize,
        /// What was wrong with the row
        reason: String,
    },

    /// Input file could not be found or opened
    #[error("input file {path} could not be read: {source}")]
    Input {
        /// Path of the input file
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Other error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Build a configuration error pointing at a specific key
    pub fn config(key: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Config {
            message: message.into(),
            key: Some(key.into()),
        }
    }

    /// Whether this error must abort the run before any dispatch happens
    pub fn is_fatal_config(&self) -> bool {
        matches!(
            self,
            Error::Config { .. } | Error::NoProxies | Error::NoUsableProxies { .. }
        )
    }
}
