//! Error types for the tally service
//!
//! Two families live here. `ProtocolError` covers malformed client input and
//! renders the exact text written back on the wire. `TallyError` covers
//! configuration and environment failures inside the process.

use std::path::PathBuf;

use crate::protocol::{LINE_LENGTH, MIN_VALUE};

// ----------------------------------------------------------------------------
// Client Input Errors
// ----------------------------------------------------------------------------

/// A client line that failed validation.
///
/// The `Display` output is the response body sent to the client, without
/// the trailing newline.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    #[error("ERR Malformed Request: expected length {expected}, got {actual}.")]
    Length { expected: usize, actual: usize },

    #[error("ERR Malformed Request: expected number")]
    NotANumber,

    #[error("ERR Malformed Request: expected number greater than {minimum}")]
    BelowMinimum { minimum: i64 },
}

impl ProtocolError {
    /// Length mismatch against the fixed line length
    pub fn length(actual: usize) -> Self {
        Self::Length {
            expected: LINE_LENGTH,
            actual,
        }
    }

    /// Value below the fixed minimum
    pub fn below_minimum() -> Self {
        Self::BelowMinimum { minimum: MIN_VALUE }
    }

    /// Wire form of the error, newline-terminated
    pub fn to_response(&self) -> String {
        format!("{}\n", self)
    }
}

// ----------------------------------------------------------------------------
// Process Errors
// ----------------------------------------------------------------------------

/// Errors raised by configuration, state and sinks
#[derive(Debug, thiserror::Error)]
pub enum TallyError {
    #[error("Configuration error: {reason}")]
    Config { reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to record unique value {value} to {path}: {source}")]
    SinkWrite {
        value: i64,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl TallyError {
    pub fn config(reason: impl Into<String>) -> Self {
        Self::Config {
            reason: reason.into(),
        }
    }
}

/// Result type for tally operations
pub type TallyResult<T> = Result<T, TallyError>;
