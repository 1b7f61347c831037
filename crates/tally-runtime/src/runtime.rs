//! Tally Runtime
//!
//! The lifecycle controller. It owns the shared state, the bound server and
//! the report emitter, and runs them as independent tasks:
//!
//! ```text
//! accept loop ──permit──▶ connection handlers ──▶ TallyState ◀── reporters
//!      ▲                                              │
//!      └──────────── closed() ◀── close() ◀── shutdown signal
//! ```
//!
//! A shutdown signal closes the shared state. The accept loop stops and
//! drains its handlers, then the reporters are told to stop and each emits
//! once more, and `run_until` returns `Ok(())`. A fatal handler error returns
//! immediately instead.
//!
//! ```rust,no_run
//! use tally_runtime::RuntimeBuilder;
//! use tally_core::ServerConfig;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let runtime = RuntimeBuilder::new(ServerConfig::default()).build().await?;
//! runtime.run_until(async { let _ = tokio::signal::ctrl_c().await; }).await?;
//! # Ok(())
//! # }
//! ```

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use tally_core::{ServerConfig, TallyState};
use tokio::sync::watch;
use tracing::{error, info};

use crate::error::{RuntimeError, RuntimeResult};
use crate::reporters::{LogReporter, OutputReporter, Report, ReportEmitter};
use crate::server::TallyServer;

/// A bound, not yet running, tally service
pub struct TallyRuntime {
    config: ServerConfig,
    state: Arc<TallyState>,
    server: TallyServer,
    emitter: Arc<dyn ReportEmitter>,
}

impl TallyRuntime {
    pub(crate) fn new(
        config: ServerConfig,
        state: Arc<TallyState>,
        server: TallyServer,
        emitter: Arc<dyn ReportEmitter>,
    ) -> Self {
        Self {
            config,
            state,
            server,
            emitter,
        }
    }

    /// Shared state handle, for inspection and for closing from outside
    pub fn state(&self) -> Arc<TallyState> {
        self.state.clone()
    }

    pub fn local_addr(&self) -> RuntimeResult<SocketAddr> {
        self.server.local_addr()
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Run until `signal` completes or a fatal error occurs
    pub async fn run_until<F>(self, signal: F) -> RuntimeResult<()>
    where
        F: Future<Output = ()>,
    {
        let TallyRuntime {
            config,
            state,
            server,
            emitter,
        } = self;

        let address = server.local_addr()?;
        println!("Started tcp server.\nListening on {}", address);
        info!(
            "Serving on {} with {} connection slots, unique values to {}",
            address,
            config.connection_limit,
            state.sink().describe()
        );

        let (stop_reporters, reporters_stopped) = watch::channel(false);
        let output = tokio::spawn(
            OutputReporter::new(state.clone(), emitter.clone(), config.output_interval())
                .run(stopped(reporters_stopped.clone())),
        );
        let log = tokio::spawn(
            LogReporter::new(state.clone(), emitter.clone(), config.log_interval())
                .run(stopped(reporters_stopped)),
        );
        let mut server_task = tokio::spawn(server.run());

        tokio::pin!(signal);

        let server_result = tokio::select! {
            _ = &mut signal => {
                // Leading newline: the terminal echoes the interrupt on stdout
                println!("\nShutting down server.");
                state.close();
                server_task.await
            }
            result = &mut server_task => result,
        };

        let server_result = server_result.map_err(RuntimeError::from).and_then(|r| r);
        if let Err(e) = server_result {
            error!("Stopping on fatal error: {}", e);
            state.close();
            return Err(e);
        }

        // Server stopped on its own only if something else closed the state
        state.close();
        let _ = stop_reporters.send(true);
        output.await?;
        log.await?;

        emitter.emit(Report::Summary {
            total: state.total(),
            unique: state.unique_count(),
            rejected: state.gate_stats().rejected_total,
        });
        info!("Server stopped");
        Ok(())
    }
}

/// Completes once `true` is sent or the sender is dropped
async fn stopped(mut receiver: watch::Receiver<bool>) {
    let _ = receiver.wait_for(|stop| *stop).await;
}
