//! HTTP server for dronehub

use std::sync::Arc;

use axum::Router;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::config::ApiConfig;
use crate::error::Result;
use crate::registry::DroneRegistry;
use crate::routes;
use crate::storage::Storage;
use crate::telemetry::TelemetryLog;

/// Application state shared across handlers
#[derive(Debug, Clone)]
pub struct AppState {
    /// Drone CRUD.
    pub registry: DroneRegistry,
    /// Telemetry append and queries.
    pub telemetry: TelemetryLog,
    /// Pagination defaults and limits.
    pub api: ApiConfig,
}

impl AppState {
    /// Wire both components to one store.
    #[must_use]
    pub fn new(storage: Arc<Storage>, api: ApiConfig) -> Self {
        Self {
            registry: DroneRegistry::new(Arc::clone(&storage)),
            telemetry: TelemetryLog::new(storage),
            api,
        }
    }
}

/// Build the full application router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .merge(routes::drone_routes())
        .merge(routes::telemetry_routes())
        .merge(routes::health_routes())
        .with_state(Arc::new(state))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

/// Run the HTTP server until Ctrl-C.
///
/// # Errors
///
/// Returns an error if the address cannot be bound or the server fails.
pub async fn run(state: AppState, addr: &str) -> Result<()> {
    let app = router(state);

    let listener = TcpListener::bind(addr).await?;
    info!("Listening on http://{}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_err() {
        // No signal handler available; run until the process is killed.
        std::future::pending::<()>().await;
    }
    info!("Shutdown requested");
}
