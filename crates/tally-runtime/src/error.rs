//! Runtime error types

use std::io;

use tally_core::TallyError;
use tokio::task::JoinError;

/// Errors raised while running the service
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    #[error("Error listening on {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: io::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error(transparent)]
    Tally(#[from] TallyError),

    /// Reading a request failed for a reason other than the peer going away
    #[error("Error reading: {0}")]
    ReadFault(#[source] io::Error),

    /// A newly unique value could not be recorded
    #[error("Could not log unique value: {0}")]
    RecordFault(#[source] TallyError),

    #[error("Task failed: {0}")]
    TaskFailed(#[from] JoinError),
}

impl RuntimeError {
    /// Faults that must stop the process, as opposed to setup failures
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            RuntimeError::ReadFault(_) | RuntimeError::RecordFault(_) | RuntimeError::TaskFailed(_)
        )
    }
}

/// Result type for runtime operations
pub type RuntimeResult<T> = Result<T, RuntimeError>;
