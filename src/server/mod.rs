//! HTTP and WebSocket surface.
//!
//! The server runs on its own thread with a single-threaded tokio runtime that
//! drives accept, receive, and send for every session. Detector work never
//! runs on that thread; it goes through the orchestrator's worker pool.

mod handlers;

use std::net::{SocketAddr, TcpListener};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use tokio::sync::oneshot;

use crate::orchestrator::DetectionOrchestrator;
use crate::session::{ConnectionRegistry, SessionConfig};

/// Time allowed for detector jobs still running when the server stops.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServerConfig {
    pub addr: String,
    pub session: SessionConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: "127.0.0.1:8000".to_string(),
            session: SessionConfig::default(),
        }
    }
}

/// State shared by every handler.
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<DetectionOrchestrator>,
    pub connections: Arc<ConnectionRegistry>,
    pub session: SessionConfig,
}

pub fn build_router(state: AppState) -> Router {
    let body_limit = state.session.max_frame_bytes;
    Router::new()
        .route("/", get(handlers::root))
        .route("/health", get(handlers::health))
        .route("/ws/stream", get(handlers::stream))
        .route("/analyze", post(handlers::analyze))
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(state)
}

pub struct Server {
    config: ServerConfig,
    orchestrator: Arc<DetectionOrchestrator>,
}

impl Server {
    pub fn new(config: ServerConfig, orchestrator: Arc<DetectionOrchestrator>) -> Self {
        Self {
            config,
            orchestrator,
        }
    }

    /// Bind the listener and start serving on a dedicated thread.
    pub fn spawn(self) -> Result<ServerHandle> {
        let listener = TcpListener::bind(&self.config.addr)
            .with_context(|| format!("bind {}", self.config.addr))?;
        listener.set_nonblocking(true)?;
        let addr = listener.local_addr()?;

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .thread_name("eagle-eye-blocking")
            .build()
            .context("build server runtime")?;

        let connections = Arc::new(ConnectionRegistry::new());
        let state = AppState {
            orchestrator: self.orchestrator,
            connections: Arc::clone(&connections),
            session: self.config.session,
        };
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

        let join = std::thread::Builder::new()
            .name("eagle-eye-server".into())
            .spawn(move || {
                let served = runtime.block_on(serve(listener, state, shutdown_rx));
                runtime.shutdown_timeout(SHUTDOWN_GRACE);
                if let Err(err) = &served {
                    log::error!("server stopped: {:#}", err);
                }
                served
            })
            .context("spawn server thread")?;

        Ok(ServerHandle {
            addr,
            connections,
            shutdown: Some(shutdown_tx),
            join: Some(join),
        })
    }
}

async fn serve(
    listener: TcpListener,
    state: AppState,
    shutdown: oneshot::Receiver<()>,
) -> Result<()> {
    let listener = tokio::net::TcpListener::from_std(listener)?;
    log::info!("listening on {}", listener.local_addr()?);
    let app = build_router(state).into_make_service_with_connect_info::<SocketAddr>();
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = shutdown.await;
        })
        .await
        .context("http server")
}

#[derive(Debug)]
pub struct ServerHandle {
    pub addr: SocketAddr,
    connections: Arc<ConnectionRegistry>,
    shutdown: Option<oneshot::Sender<()>>,
    join: Option<JoinHandle<Result<()>>>,
}

impl ServerHandle {
    pub fn active_sessions(&self) -> usize {
        self.connections.active()
    }

    pub fn stop(mut self) -> Result<()> {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        match self.join.take() {
            Some(join) => join
                .join()
                .map_err(|_| anyhow!("server thread panicked"))?,
            None => Ok(()),
        }
    }
}
