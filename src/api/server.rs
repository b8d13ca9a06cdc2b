//! Router assembly and serving

use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use super::handlers;
use crate::config::ServerConfig;
use crate::credentials::AccountPool;
use crate::scheduler::WorkerGroup;
use crate::storage::Stores;

// ============================================================================
// App State
// ============================================================================

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub group: Arc<WorkerGroup>,
    pub stores: Stores,
    pub pool: AccountPool,
    pub start_time: Instant,
}

impl AppState {
    pub fn new(group: Arc<WorkerGroup>, stores: Stores, pool: AccountPool) -> Self {
        Self {
            group,
            stores,
            pool,
            start_time: Instant::now(),
        }
    }
}

// ============================================================================
// Router
// ============================================================================

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/healthcheck", get(handlers::healthcheck))
        .route("/metrics", get(handlers::metrics))
        // Workers
        .route("/worker/status", get(handlers::worker_status))
        .route("/worker/start", post(handlers::start_workers))
        .route("/worker/stop", post(handlers::stop_workers))
        // Account pool
        .route(
            "/credentials",
            get(handlers::list_credentials).post(handlers::add_credential),
        )
        // Point gains
        .route("/point-gains", get(handlers::list_point_gains))
        .route("/point-gains/sample", get(handlers::point_gain_sample))
        .route("/point-gains/event/{id}", get(handlers::point_gains_for_event))
        .with_state(state)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

/// Serve until `shutdown` resolves
pub async fn serve(
    config: &ServerConfig,
    state: AppState,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<(), ServerError> {
    let addr = config.bind_address();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| ServerError::BindError(format!("{addr}: {e}")))?;

    tracing::info!("Control surface listening on {}", addr);

    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| ServerError::ServeError(e.to_string()))?;

    tracing::info!("Control surface shut down");
    Ok(())
}

// ============================================================================
// Server Errors
// ============================================================================

#[derive(Debug, Clone)]
pub enum ServerError {
    /// Failed to bind to address
    BindError(String),

    ServeError(String),
}

impl std::fmt::Display for ServerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BindError(msg) => write!(f, "Failed to bind: {}", msg),
            Self::ServeError(msg) => write!(f, "Server error: {}", msg),
        }
    }
}

impl std::error::Error for ServerError {}

// ============================================================================
// Tests
// ============================================================================
