//! Interval Reporters
//!
//! Two independent periodic tasks read the shared state on their own
//! cadence:
//! - [`OutputReporter`] takes and resets the interval count, reporting the
//!   delta on the output stream
//! - [`LogReporter`] reads the lifetime total, reporting it on the log stream
//!
//! Both run until their stop future completes, then emit their current view
//! one last time on the way out. The lifecycle controller completes that
//! future only after in-flight connections have drained, so the final
//! emissions cover every record.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tally_core::TallyState;
use tokio::sync::mpsc;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info};

// ----------------------------------------------------------------------------
// Reports
// ----------------------------------------------------------------------------

/// A single emission from a reporter or the lifecycle controller
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Report {
    /// Valid records since the previous delta report
    Delta { count: u64, interval: Duration },
    /// Lifetime count of valid records
    Total { total: u64 },
    /// Final state after shutdown
    Summary {
        total: u64,
        unique: usize,
        rejected: u64,
    },
}

/// Destination for reports
pub trait ReportEmitter: Send + Sync {
    fn emit(&self, report: Report);
}

/// Deltas go to stdout; totals go to stdout and the log
#[derive(Debug, Default, Clone, Copy)]
pub struct StdoutEmitter;

impl ReportEmitter for StdoutEmitter {
    fn emit(&self, report: Report) {
        match report {
            Report::Delta { count, interval } => {
                println!(
                    "Received {} numbers in the last {}s",
                    count,
                    interval.as_secs()
                );
            }
            Report::Total { total } => {
                println!("Received {} numbers in total", total);
                info!(total, "Total numbers received");
            }
            Report::Summary {
                total,
                unique,
                rejected,
            } => {
                info!(total, unique, rejected, "Final tally");
            }
        }
    }
}

/// Forwards reports over an unbounded channel
#[derive(Debug, Clone)]
pub struct ChannelEmitter {
    sender: mpsc::UnboundedSender<Report>,
}

impl ChannelEmitter {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Report>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

impl ReportEmitter for ChannelEmitter {
    fn emit(&self, report: Report) {
        if self.sender.send(report).is_err() {
            debug!("Report receiver dropped");
        }
    }
}

// ----------------------------------------------------------------------------
// Reporter Tasks
// ----------------------------------------------------------------------------

fn ticker(period: Duration) -> tokio::time::Interval {
    // First tick one full period after start, not immediately
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker
}

/// Emits the delta of valid records every output interval
pub struct OutputReporter {
    state: Arc<TallyState>,
    emitter: Arc<dyn ReportEmitter>,
    period: Duration,
}

impl OutputReporter {
    pub fn new(state: Arc<TallyState>, emitter: Arc<dyn ReportEmitter>, period: Duration) -> Self {
        Self {
            state,
            emitter,
            period,
        }
    }

    fn emit_delta(&self, interval: Duration) {
        let count = self.state.snapshot_and_reset_interval();
        self.emitter.emit(Report::Delta { count, interval });
    }

    pub async fn run<F>(self, stop: F)
    where
        F: Future<Output = ()>,
    {
        debug!("Output reporter starting, every {:?}", self.period);
        let mut ticker = ticker(self.period);
        let mut last = Instant::now();
        tokio::pin!(stop);

        loop {
            tokio::select! {
                tick = ticker.tick() => {
                    self.emit_delta(tick.duration_since(last));
                    last = tick;
                }
                _ = &mut stop => break,
            }
        }

        self.emit_delta(last.elapsed());
        debug!("Output reporter stopped");
    }
}

/// Emits the cumulative total every log interval
pub struct LogReporter {
    state: Arc<TallyState>,
    emitter: Arc<dyn ReportEmitter>,
    period: Duration,
}

impl LogReporter {
    pub fn new(state: Arc<TallyState>, emitter: Arc<dyn ReportEmitter>, period: Duration) -> Self {
        Self {
            state,
            emitter,
            period,
        }
    }

    fn emit_total(&self) {
        self.emitter.emit(Report::Total {
            total: self.state.total(),
        });
    }

    pub async fn run<F>(self, stop: F)
    where
        F: Future<Output = ()>,
    {
        debug!("Log reporter starting, every {:?}", self.period);
        let mut ticker = ticker(self.period);
        tokio::pin!(stop);

        loop {
            tokio::select! {
                _ = ticker.tick() => self.emit_total(),
                _ = &mut stop => break,
            }
        }

        self.emit_total();
        debug!("Log reporter stopped");
    }
}
