use std::sync::Arc;

use anyhow::Context as _;
use tokio::net::TcpListener;

use crate::config::ServiceConfig;
use crate::generate::orchestrator::Orchestrator;

pub mod error;
pub mod handlers;
pub mod routes;

pub use routes::router;

/// Shared per-process state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
}

impl AppState {
    pub fn new(orchestrator: Orchestrator) -> Self {
        Self {
            orchestrator: Arc::new(orchestrator),
        }
    }
}

/// Serve on an already bound listener until `shutdown` resolves.
pub async fn serve_listener(
    listener: TcpListener,
    state: AppState,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    let addr = listener.local_addr().context("listener address")?;
    tracing::info!(%addr, device = state.orchestrator.device(), "listening");
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await
        .context("http server failed")
}

/// Build the orchestrator from `config`, bind `server.host:server.port` and serve until Ctrl-C.
pub async fn serve(config: &ServiceConfig) -> anyhow::Result<()> {
    let state = AppState::new(config.build_orchestrator()?);
    let bind = format!("{}:{}", config.server.host, config.server.port);
    let listener = TcpListener::bind(&bind)
        .await
        .with_context(|| format!("bind '{bind}'"))?;
    serve_listener(listener, state, async {
        let _ = tokio::signal::ctrl_c().await;
        tracing::info!("shutting down");
    })
    .await
}
