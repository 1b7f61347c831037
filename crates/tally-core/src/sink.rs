//! Unique-value sinks
//!
//! Every value the dedup set sees for the first time is handed to a
//! [`UniqueSink`]. A failed append is an environment fault, not a client
//! error, and callers treat it as fatal.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::errors::{TallyError, TallyResult};

/// Destination for newly unique values
#[async_trait]
pub trait UniqueSink: Send + Sync {
    /// Durably record `value`. Called at most once per distinct value.
    async fn append(&self, value: i64) -> TallyResult<()>;

    /// Human-readable destination, used in startup logs
    fn describe(&self) -> String;
}

// ----------------------------------------------------------------------------
// File Sink
// ----------------------------------------------------------------------------

/// Appends one decimal line per value to a file, flushing after each write
pub struct FileSink {
    path: PathBuf,
    file: tokio::sync::Mutex<File>,
}

impl FileSink {
    /// Open `path` for appending, creating it if missing
    pub async fn open<P: AsRef<Path>>(path: P) -> TallyResult<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;

        debug!("Opened unique value log at {}", path.display());

        Ok(Self {
            path,
            file: tokio::sync::Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl UniqueSink for FileSink {
    async fn append(&self, value: i64) -> TallyResult<()> {
        let line = format!("{}\n", value);
        let mut file = self.file.lock().await;

        let result = match file.write_all(line.as_bytes()).await {
            Ok(()) => file.flush().await,
            Err(e) => Err(e),
        };

        result.map_err(|source| TallyError::SinkWrite {
            value,
            path: self.path.clone(),
            source,
        })
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

// ----------------------------------------------------------------------------
// Memory Sink
// ----------------------------------------------------------------------------

/// Keeps unique values in memory, in arrival order
#[derive(Debug, Default)]
pub struct MemorySink {
    values: Mutex<Vec<i64>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Values recorded so far
    pub fn values(&self) -> Vec<i64> {
        self.values
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn len(&self) -> usize {
        self.values
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl UniqueSink for MemorySink {
    async fn append(&self, value: i64) -> TallyResult<()> {
        self.values
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(value);
        Ok(())
    }

    fn describe(&self) -> String {
        "memory".to_string()
    }
}
