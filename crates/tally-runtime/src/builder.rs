//! Runtime Builder API
//!
//! Builds a [`TallyRuntime`] from a [`ServerConfig`], with optional
//! replacements for the unique-value sink and the report emitter.

use std::sync::Arc;

use tally_core::{FileSink, ServerConfig, TallyState, UniqueSink};
use tracing::info;

use crate::error::RuntimeResult;
use crate::reporters::{ReportEmitter, StdoutEmitter};
use crate::runtime::TallyRuntime;
use crate::server::TallyServer;

/// Builder for a tally runtime
pub struct RuntimeBuilder {
    config: ServerConfig,
    sink: Option<Arc<dyn UniqueSink>>,
    emitter: Option<Arc<dyn ReportEmitter>>,
}

impl RuntimeBuilder {
    pub fn new(config: ServerConfig) -> Self {
        Self {
            config,
            sink: None,
            emitter: None,
        }
    }

    /// Record unique values somewhere other than the configured log file
    pub fn with_sink(mut self, sink: Arc<dyn UniqueSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Send reports somewhere other than stdout and the log
    pub fn with_emitter(mut self, emitter: Arc<dyn ReportEmitter>) -> Self {
        self.emitter = Some(emitter);
        self
    }

    /// Validate the config, open the sink and bind the listener
    pub async fn build(self) -> RuntimeResult<TallyRuntime> {
        self.config.validate()?;

        let sink = match self.sink {
            Some(sink) => sink,
            None => Arc::new(FileSink::open(&self.config.unique_log_path).await?),
        };
        let emitter = self.emitter.unwrap_or_else(|| Arc::new(StdoutEmitter));

        let state = Arc::new(TallyState::new(self.config.connection_limit, sink));
        let server = TallyServer::bind(&self.config, state.clone()).await?;

        info!("Built tally runtime on {}", server.local_addr()?);
        Ok(TallyRuntime::new(self.config, state, server, emitter))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RuntimeError;
    use tally_core::MemorySink;

    #[tokio::test]
    async fn test_build_rejects_invalid_config() {
        let mut config = ServerConfig::for_testing();
        config.connection_limit = 0;

        let result = RuntimeBuilder::new(config)
            .with_sink(Arc::new(MemorySink::new()))
            .build()
            .await;
        assert!(matches!(result, Err(RuntimeError::Tally(_))));
    }

    #[tokio::test]
    async fn test_build_binds_ephemeral_port() {
        let runtime = RuntimeBuilder::new(ServerConfig::for_testing())
            .with_sink(Arc::new(MemorySink::new()))
            .build()
            .await
            .unwrap();

        assert_ne!(runtime.local_addr().unwrap().port(), 0);
        assert_eq!(runtime.state().gate_stats().capacity, 6);
        assert!(!runtime.state().is_closed());
    }

    #[tokio::test]
    async fn test_bind_conflict_is_reported() {
        let first = RuntimeBuilder::new(ServerConfig::for_testing())
            .with_sink(Arc::new(MemorySink::new()))
            .build()
            .await
            .unwrap();

        let mut config = ServerConfig::for_testing();
        config.port = first.local_addr().unwrap().port();

        let second = RuntimeBuilder::new(config)
            .with_sink(Arc::new(MemorySink::new()))
            .build()
            .await;
        assert!(matches!(second, Err(RuntimeError::Bind { .. })));
    }
}
