use std::future::Future;
use std::sync::Arc;

use arbor_store::{ChunkStore, MemoryStore};
use tokio::net::TcpListener;

use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};
use crate::router::build_router;
use crate::state::AppState;
use crate::transport::RouterTransport;

/// Serves one chunk store over the remote protocol.
pub struct ArborServer {
    state: AppState,
}

impl ArborServer {
    /// A server over a fresh in-memory store.
    pub fn new(config: ServerConfig) -> Self {
        Self::with_store(config, Arc::new(MemoryStore::new()))
    }

    pub fn with_store(config: ServerConfig, store: Arc<dyn ChunkStore>) -> Self {
        Self {
            state: AppState::new(store, config),
        }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.state.config
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Build the router (useful for testing).
    pub fn router(&self) -> axum::Router {
        build_router(self.state.clone())
    }

    /// A transport that reaches this server without a socket.
    pub fn transport(&self) -> RouterTransport {
        RouterTransport::new(self.router())
    }

    /// Bind the configured address and serve until the process exits.
    pub async fn serve(self) -> ServerResult<()> {
        let listener = TcpListener::bind(self.state.config.bind_addr).await?;
        self.serve_on(listener, std::future::pending()).await
    }

    /// Serve on `listener` until `shutdown` resolves.
    pub async fn serve_on(
        self,
        listener: TcpListener,
        shutdown: impl Future<Output = ()> + Send + 'static,
    ) -> ServerResult<()> {
        let addr = listener.local_addr()?;
        tracing::info!(%addr, "arbor server listening");
        axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown)
            .await
            .map_err(|e| ServerError::Internal(e.to_string()))
    }
}
