use std::net::SocketAddr;
use std::sync::Arc;

use tokio::sync::watch;

use quarry_jobs::WorkerSpawner;
use quarry_store::CoordStore;

use crate::error::GatewayError;
use crate::router::build_router;

/// Shared handler state. The store is the single source of truth for job
/// state; no in-memory registry shadows it.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn CoordStore>,
    pub spawner: Arc<dyn WorkerSpawner>,
}

pub struct GatewayServer {
    addr: SocketAddr,
    max_body_size: usize,
    state: AppState,
    shutdown_rx: watch::Receiver<bool>,
}

impl GatewayServer {
    #[must_use]
    pub fn new(
        bind: &str,
        port: u16,
        state: AppState,
        shutdown_rx: watch::Receiver<bool>,
    ) -> Self {
        let addr: SocketAddr = format!("{bind}:{port}").parse().unwrap_or_else(|e| {
            tracing::warn!("invalid bind '{bind}': {e}, falling back to 127.0.0.1:{port}");
            SocketAddr::from(([127, 0, 0, 1], port))
        });

        Self {
            addr,
            max_body_size: 1_048_576,
            state,
            shutdown_rx,
        }
    }

    #[must_use]
    pub fn with_max_body_size(mut self, size: usize) -> Self {
        self.max_body_size = size;
        self
    }

    /// Start the HTTP front door.
    ///
    /// # Errors
    ///
    /// Returns an error if the server fails to bind or encounters a fatal
    /// I/O error.
    pub async fn serve(self) -> Result<(), GatewayError> {
        let router = build_router(self.state, self.max_body_size);

        let listener = tokio::net::TcpListener::bind(self.addr)
            .await
            .map_err(|e| GatewayError::Bind(self.addr.to_string(), e))?;
        tracing::info!("gateway listening on {}", self.addr);

        let mut shutdown_rx = self.shutdown_rx;
        axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                while !*shutdown_rx.borrow_and_update() {
                    if shutdown_rx.changed().await.is_err() {
                        std::future::pending::<()>().await;
                    }
                }
                tracing::info!("gateway shutting down");
            })
            .await
            .map_err(|e| GatewayError::Server(format!("{e}")))?;

        Ok(())
    }
}
