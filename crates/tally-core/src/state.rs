//! Shared Counter State
//!
//! The single piece of mutable state shared by every connection handler and
//! both interval reporters:
//! - an admission gate bounding concurrently handled connections
//! - the dedup set of every valid value seen in the process lifetime
//! - the running totals (lifetime and since the last output tick)
//! - the shutdown flag
//!
//! The dedup set and both totals sit behind one lock so they never disagree.
//! No await point is ever reached while that lock is held.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use hashbrown::HashSet;
use tokio::sync::{watch, OwnedSemaphorePermit, Semaphore, TryAcquireError};
use tracing::debug;

use crate::errors::TallyResult;
use crate::protocol::Record;
use crate::sink::UniqueSink;

// ----------------------------------------------------------------------------
// Admission
// ----------------------------------------------------------------------------

/// One reserved slot in the admission gate.
///
/// The slot returns to the gate when the permit is released or dropped,
/// whichever comes first, so it is released exactly once on every path.
#[derive(Debug)]
pub struct AdmissionPermit {
    _permit: OwnedSemaphorePermit,
}

impl AdmissionPermit {
    /// Return the slot to the gate
    pub fn release(self) {
        drop(self);
    }
}

/// Point-in-time view of the admission gate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GateStats {
    pub capacity: usize,
    pub in_flight: usize,
    pub rejected_total: u64,
}

// ----------------------------------------------------------------------------
// Records
// ----------------------------------------------------------------------------

#[derive(Debug, Default)]
struct RecordBook {
    seen: HashSet<i64>,
    total_valid: u64,
    interval_valid: u64,
}

// ----------------------------------------------------------------------------
// Shared State
// ----------------------------------------------------------------------------

/// Synchronized counters, dedup set, admission gate and shutdown flag
pub struct TallyState {
    gate: Arc<Semaphore>,
    capacity: usize,
    rejected: AtomicU64,
    book: Mutex<RecordBook>,
    shutdown: watch::Sender<bool>,
    sink: Arc<dyn UniqueSink>,
}

impl TallyState {
    /// Create state with a gate of `capacity` slots, recording unique values
    /// into `sink`
    pub fn new(capacity: usize, sink: Arc<dyn UniqueSink>) -> Self {
        let (shutdown, _) = watch::channel(false);

        Self {
            gate: Arc::new(Semaphore::new(capacity)),
            capacity,
            rejected: AtomicU64::new(0),
            book: Mutex::new(RecordBook::default()),
            shutdown,
            sink,
        }
    }

    fn book(&self) -> MutexGuard<'_, RecordBook> {
        // Nothing panics while the lock is held; a poisoned guard is still consistent
        self.book
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Reserve one admission slot without waiting.
    ///
    /// Returns `None` when the gate is full or closed.
    pub fn try_acquire(&self) -> Option<AdmissionPermit> {
        match self.gate.clone().try_acquire_owned() {
            Ok(permit) => Some(AdmissionPermit { _permit: permit }),
            Err(TryAcquireError::NoPermits) => {
                self.rejected.fetch_add(1, Ordering::Relaxed);
                None
            }
            Err(TryAcquireError::Closed) => None,
        }
    }

    /// Count one well-formed record. Returns the new lifetime total.
    pub fn record_valid(&self, _record: &Record) -> u64 {
        let mut book = self.book();
        book.total_valid += 1;
        book.interval_valid += 1;
        book.total_valid
    }

    /// Whether `value` has been recorded before
    pub fn has_seen(&self, value: i64) -> bool {
        self.book().seen.contains(&value)
    }

    /// Insert the record's value into the dedup set if absent.
    ///
    /// Returns `Ok(true)` on first insertion after the sink accepted the
    /// value, `Ok(false)` if it was already present. A sink failure is
    /// returned as an error and must be treated as fatal.
    pub async fn record_unique(&self, record: &Record) -> TallyResult<bool> {
        let value = record.value();
        let is_new = self.book().seen.insert(value);

        if !is_new {
            return Ok(false);
        }

        self.sink.append(value).await?;
        Ok(true)
    }

    /// Read and zero the count of records since the previous call
    pub fn snapshot_and_reset_interval(&self) -> u64 {
        std::mem::take(&mut self.book().interval_valid)
    }

    /// Lifetime count of valid records
    pub fn total(&self) -> u64 {
        self.book().total_valid
    }

    /// Number of distinct values recorded
    pub fn unique_count(&self) -> usize {
        self.book().seen.len()
    }

    pub fn gate_stats(&self) -> GateStats {
        GateStats {
            capacity: self.capacity,
            in_flight: self.capacity.saturating_sub(self.gate.available_permits()),
            rejected_total: self.rejected.load(Ordering::Relaxed),
        }
    }

    pub fn sink(&self) -> &Arc<dyn UniqueSink> {
        &self.sink
    }

    /// Move to the closed state. The gate stops granting slots and waiters
    /// on [`closed`](Self::closed) wake up. Returns `true` only for the call
    /// that performed the transition.
    pub fn close(&self) -> bool {
        let transitioned = self.shutdown.send_if_modified(|closed| {
            if *closed {
                false
            } else {
                *closed = true;
                true
            }
        });

        if transitioned {
            self.gate.close();
            debug!("Shared state closed");
        }

        transitioned
    }

    pub fn is_closed(&self) -> bool {
        *self.shutdown.borrow()
    }

    /// Wait until [`close`](Self::close) has been called
    pub async fn closed(&self) {
        let mut receiver = self.shutdown.subscribe();
        // The sender lives as long as `self`, so this only returns once closed
        let _ = receiver.wait_for(|closed| *closed).await;
    }
}

impl std::fmt::Debug for TallyState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TallyState")
            .field("capacity", &self.capacity)
            .field("closed", &self.is_closed())
            .field("sink", &self.sink.describe())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::validate_line;
    use crate::sink::MemorySink;
    use std::time::Duration;

    fn record(line: &str) -> Record {
        validate_line(line.as_bytes()).unwrap()
    }

    fn state_with_sink(capacity: usize) -> (TallyState, Arc<MemorySink>) {
        let sink = Arc::new(MemorySink::new());
        (TallyState::new(capacity, sink.clone()), sink)
    }

    #[test]
    fn test_gate_never_exceeds_capacity() {
        let (state, _) = state_with_sink(2);

        let first = state.try_acquire().unwrap();
        let second = state.try_acquire().unwrap();
        assert!(state.try_acquire().is_none());
        assert_eq!(
            state.gate_stats(),
            GateStats {
                capacity: 2,
                in_flight: 2,
                rejected_total: 1
            }
        );

        first.release();
        let third = state.try_acquire().unwrap();
        assert!(state.try_acquire().is_none());

        drop(second);
        drop(third);
        assert_eq!(state.gate_stats().in_flight, 0);
        assert_eq!(state.gate_stats().rejected_total, 2);
    }

    #[test]
    fn test_closed_gate_refuses_without_counting_rejection() {
        let (state, _) = state_with_sink(3);
        assert!(state.close());
        assert!(state.try_acquire().is_none());
        assert_eq!(state.gate_stats().rejected_total, 0);
    }

    #[test]
    fn test_close_is_idempotent() {
        let (state, _) = state_with_sink(1);
        assert!(!state.is_closed());
        assert!(state.close());
        assert!(!state.close());
        assert!(state.is_closed());
    }

    #[test]
    fn test_interval_snapshot_resets() {
        let (state, _) = state_with_sink(1);
        let r = record("123456789\n");

        state.record_valid(&r);
        state.record_valid(&r);
        assert_eq!(state.snapshot_and_reset_interval(), 2);
        assert_eq!(state.snapshot_and_reset_interval(), 0);

        state.record_valid(&r);
        assert_eq!(state.snapshot_and_reset_interval(), 1);
        assert_eq!(state.total(), 3);
    }

    #[tokio::test]
    async fn test_record_unique_is_idempotent() {
        let (state, sink) = state_with_sink(1);
        let r = record("123456789\n");

        assert!(!state.has_seen(r.value()));
        assert!(state.record_unique(&r).await.unwrap());
        assert!(state.has_seen(r.value()));
        assert!(!state.record_unique(&r).await.unwrap());

        assert_eq!(state.unique_count(), 1);
        assert_eq!(sink.values(), vec![123_456_789]);
    }

    #[tokio::test]
    async fn test_concurrent_updates_are_not_lost() {
        let (state, sink) = state_with_sink(8);
        let state = Arc::new(state);

        let mut handles = Vec::new();
        for worker in 0..8i64 {
            let state = state.clone();
            handles.push(tokio::spawn(async move {
                for i in 0..100i64 {
                    // Half the values collide across workers
                    let value = 1_000_000 + if i % 2 == 0 { i } else { worker * 1_000 + i };
                    let r = record(&format!("{:09}\n", value));
                    state.record_valid(&r);
                    state.record_unique(&r).await.unwrap();
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(state.total(), 800);
        assert_eq!(state.snapshot_and_reset_interval(), 800);
        // 50 shared even values plus 50 odd values per worker
        assert_eq!(state.unique_count(), 50 + 8 * 50);
        assert_eq!(sink.len(), state.unique_count());
    }

    #[tokio::test]
    async fn test_closed_wakes_waiters() {
        let (state, _) = state_with_sink(1);
        let state = Arc::new(state);

        let waiter = {
            let state = state.clone();
            tokio::spawn(async move { state.closed().await })
        };

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!waiter.is_finished());

        state.close();
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter should observe close")
            .unwrap();

        // Already closed: returns immediately
        tokio::time::timeout(Duration::from_millis(100), state.closed())
            .await
            .unwrap();
    }
}
