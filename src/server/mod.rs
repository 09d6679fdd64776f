//! HTTP server: shared state, router and startup.

pub mod orchestrator;
pub mod routes;

use std::sync::Arc;
use std::time::Duration;

use axum::http::Method;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::cache::ShameCache;
use crate::config::Config;
use crate::error::Result;
use crate::github::ProfileSource;
use crate::limiter::RequestGate;
use crate::llm::RoastGenerator;

/// Shared state for all handlers.
///
/// Every collaborator is an explicitly constructed, injected handle; there
/// are no module singletons, so tests swap in fakes freely.
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub cache: Arc<ShameCache>,
    pub limiter: Arc<dyn RequestGate>,
    pub profiles: Arc<dyn ProfileSource>,
    pub generator: Arc<dyn RoastGenerator>,
}

/// Build the axum router with all routes and layers.
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(Any);

    Router::new()
        .route("/roast", get(routes::roast::roast))
        .route("/admin/refresh-avatars", post(routes::admin::refresh_avatars))
        .route("/admin/report", get(routes::admin::report))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(Arc::new(state))
}

/// Start the server and the background cache sweep.
pub async fn start_server(state: AppState) -> Result<()> {
    let addr = format!("{}:{}", state.config.server.bind, state.config.server.port);

    spawn_sweep_task(
        state.cache.clone(),
        state.config.cache.retention_secs,
        state.config.cache.sweep_interval_secs,
    );

    let app = build_router(state);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("gitroast listening on {addr}");
    axum::serve(listener, app).await?;
    Ok(())
}

/// Periodically delete rows that nobody has touched within the retention
/// threshold.
fn spawn_sweep_task(cache: Arc<ShameCache>, retention_secs: u64, interval_secs: u64) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(interval_secs.max(1)));
        // The first tick fires immediately; skip it so startup stays quiet.
        interval.tick().await;
        loop {
            interval.tick().await;
            let cache = cache.clone();
            let swept =
                tokio::task::spawn_blocking(move || cache.sweep(retention_secs)).await;
            match swept {
                Ok(Ok(0)) => {}
                Ok(Ok(deleted)) => info!(deleted, "cache sweep removed stale rows"),
                Ok(Err(e)) => warn!("cache sweep failed: {e}"),
                Err(e) => error!("cache sweep task panicked: {e}"),
            }
        }
    });
}
