//! Accept loop with admission
//!
//! Every accepted socket asks the shared state for an admission slot before
//! any protocol work happens. Admitted sockets get their own task; the rest
//! receive the busy message and are closed straight away.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tally_core::{ServerConfig, TallyState, BUSY_MESSAGE};
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::{JoinError, JoinSet};
use tracing::{debug, error, info, warn};

use crate::error::{RuntimeError, RuntimeResult};
use crate::handler::{handle_connection, HandlerOutcome};

/// TCP listener bound to the configured address, gated by the shared state
pub struct TallyServer {
    listener: TcpListener,
    state: Arc<TallyState>,
    read_timeout: Option<Duration>,
}

impl TallyServer {
    /// Bind the listener described by `config`
    pub async fn bind(config: &ServerConfig, state: Arc<TallyState>) -> RuntimeResult<Self> {
        let address = config.bind_address();
        let listener = TcpListener::bind(&address)
            .await
            .map_err(|source| RuntimeError::Bind { address, source })?;

        Ok(Self {
            listener,
            state,
            read_timeout: config.read_timeout(),
        })
    }

    pub fn local_addr(&self) -> RuntimeResult<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept until the shared state is closed, then wait for in-flight
    /// handlers.
    ///
    /// Returns early with the first fatal handler error.
    pub async fn run(self) -> RuntimeResult<()> {
        info!("Accepting connections on {}", self.local_addr()?);
        let mut handlers: JoinSet<RuntimeResult<HandlerOutcome>> = JoinSet::new();

        loop {
            tokio::select! {
                _ = self.state.closed() => break,

                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer)) => self.admit(stream, peer, &mut handlers),
                    Err(e) => warn!("Error accepting connection: {}", e),
                },

                Some(joined) = handlers.join_next() => {
                    Self::check_handler(joined)?;
                }
            }
        }

        let TallyServer { listener, .. } = self;
        drop(listener);

        debug!("Listener closed, draining {} connections", handlers.len());
        while let Some(joined) = handlers.join_next().await {
            Self::check_handler(joined)?;
        }

        info!("All connections finished");
        Ok(())
    }

    fn admit(
        &self,
        stream: TcpStream,
        peer: SocketAddr,
        handlers: &mut JoinSet<RuntimeResult<HandlerOutcome>>,
    ) {
        match self.state.try_acquire() {
            Some(permit) => {
                debug!("Admitted connection from {}", peer);
                handlers.spawn(handle_connection(
                    stream,
                    self.state.clone(),
                    permit,
                    self.read_timeout,
                ));
            }
            None => {
                debug!("Turning away connection from {}: server busy", peer);
                tokio::spawn(reject_busy(stream));
            }
        }
    }

    fn check_handler(
        joined: Result<RuntimeResult<HandlerOutcome>, JoinError>,
    ) -> RuntimeResult<()> {
        match joined {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(e)) => {
                error!("Connection handler failed: {}", e);
                Err(e)
            }
            Err(e) => {
                error!("Connection handler panicked: {}", e);
                Err(RuntimeError::TaskFailed(e))
            }
        }
    }
}

async fn reject_busy(mut stream: TcpStream) {
    if let Err(e) = stream.write_all(BUSY_MESSAGE.as_bytes()).await {
        debug!("Error writing busy response: {}", e);
    }
    let _ = stream.shutdown().await;
}
