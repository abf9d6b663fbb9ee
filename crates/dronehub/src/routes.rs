//! API routes for dronehub
//!
//! Handlers translate HTTP into registry and telemetry calls. Store work is
//! synchronous, so each call runs on the blocking pool.

use std::sync::Arc;

use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection, QueryRejection},
        Path, Query, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, error};

use crate::error::{Error, ErrorKind};
use crate::model::{Drone, DronePatch, NewDrone, NewReading, Reading};
use crate::server::AppState;

type AppStateArc = Arc<AppState>;

/// An [`Error`] rendered as an HTTP response.
#[derive(Debug)]
pub struct ApiError(pub Error);

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        Self(err)
    }
}

impl ApiError {
    /// HTTP status for the wrapped error.
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self.0.kind() {
            ErrorKind::NotFound | ErrorKind::NoData => StatusCode::NOT_FOUND,
            ErrorKind::Conflict => StatusCode::BAD_REQUEST,
            ErrorKind::InvalidArgument => StatusCode::UNPROCESSABLE_ENTITY,
            ErrorKind::Storage | ErrorKind::Config | ErrorKind::Io | ErrorKind::Internal => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!("Request failed: {}", self.0);
        } else {
            debug!("Request rejected: {}", self.0);
        }

        let body = json!({
            "kind": self.0.kind().as_str(),
            "detail": self.0.to_string(),
        });
        (status, Json(body)).into_response()
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self(Error::invalid("body", rejection.body_text()))
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        Self(Error::invalid("path", rejection.body_text()))
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        Self(Error::invalid("query", rejection.body_text()))
    }
}

type ApiResult<T> = std::result::Result<T, ApiError>;

// Extractors are taken as `Result` so rejections render through `ApiError`.
type JsonBody<T> = std::result::Result<Json<T>, JsonRejection>;
type PathId = std::result::Result<Path<i64>, PathRejection>;
type QueryParams<T> = std::result::Result<Query<T>, QueryRejection>;

/// Run a store operation on the blocking pool.
async fn blocking<T, F>(f: F) -> ApiResult<T>
where
    F: FnOnce() -> crate::Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| Error::internal(format!("store task failed: {e}")))?
        .map_err(ApiError::from)
}

/// `skip`/`limit` query parameters.
#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    /// Rows to skip.
    pub skip: Option<i64>,
    /// Maximum rows to return.
    pub limit: Option<i64>,
}

/// Query parameters of the generic telemetry listing.
#[derive(Debug, Default, Deserialize)]
pub struct TelemetryQuery {
    /// Rows to skip.
    pub skip: Option<i64>,
    /// Maximum rows to return.
    pub limit: Option<i64>,
    /// Only readings of this drone.
    pub drone_id: Option<i64>,
}

/// Body of `GET /drones`.
#[derive(Debug, Serialize, Deserialize)]
pub struct DroneList {
    /// Drones in the registry.
    pub total: u64,
    /// Drones in the requested window.
    pub drones: Vec<Drone>,
}

/// Body of the telemetry listings.
#[derive(Debug, Serialize, Deserialize)]
pub struct TelemetryList {
    /// Readings matching the filter.
    pub total: u64,
    /// Readings in the requested window, newest first.
    pub telemetry: Vec<Reading>,
}

// ============================================================================
// Drone Routes
// ============================================================================

/// `/drones` and `/drones/:drone_id`.
pub fn drone_routes() -> Router<AppStateArc> {
    Router::new()
        .route("/drones", post(create_drone).get(list_drones))
        .route(
            "/drones/:drone_id",
            get(get_drone).put(update_drone).delete(delete_drone),
        )
}

async fn create_drone(
    State(state): State<AppStateArc>,
    body: JsonBody<NewDrone>,
) -> ApiResult<(StatusCode, Json<Drone>)> {
    let Json(req) = body?;
    let registry = state.registry.clone();
    let drone = blocking(move || registry.register(&req)).await?;
    Ok((StatusCode::CREATED, Json(drone)))
}

async fn list_drones(
    State(state): State<AppStateArc>,
    query: QueryParams<PageQuery>,
) -> ApiResult<Json<DroneList>> {
    let Query(query) = query?;
    let page = state.api.page(query.skip, query.limit);
    let registry = state.registry.clone();
    let page = blocking(move || registry.list(page)).await?;
    Ok(Json(DroneList {
        total: page.total,
        drones: page.items,
    }))
}

async fn get_drone(
    State(state): State<AppStateArc>,
    path: PathId,
) -> ApiResult<Json<Drone>> {
    let Path(drone_id) = path?;
    let registry = state.registry.clone();
    let drone = blocking(move || registry.get(drone_id)).await?;
    Ok(Json(drone))
}

async fn update_drone(
    State(state): State<AppStateArc>,
    path: PathId,
    body: JsonBody<DronePatch>,
) -> ApiResult<Json<Drone>> {
    let Path(drone_id) = path?;
    let Json(patch) = body?;
    let registry = state.registry.clone();
    let drone = blocking(move || registry.update(drone_id, &patch)).await?;
    Ok(Json(drone))
}

async fn delete_drone(
    State(state): State<AppStateArc>,
    path: PathId,
) -> ApiResult<StatusCode> {
    let Path(drone_id) = path?;
    let registry = state.registry.clone();
    blocking(move || registry.delete(drone_id)).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ============================================================================
// Telemetry Routes
// ============================================================================

/// `/telemetry` and its per-drone views.
pub fn telemetry_routes() -> Router<AppStateArc> {
    Router::new()
        .route("/telemetry", post(create_telemetry).get(list_telemetry))
        .route("/telemetry/:telemetry_id", delete(delete_telemetry))
        .route("/telemetry/drone/:drone_id", get(list_drone_telemetry))
        .route("/telemetry/drone/:drone_id/latest", get(latest_telemetry))
}

async fn create_telemetry(
    State(state): State<AppStateArc>,
    body: JsonBody<NewReading>,
) -> ApiResult<(StatusCode, Json<Reading>)> {
    let Json(req) = body?;
    let log = state.telemetry.clone();
    let reading = blocking(move || log.append(&req)).await?;
    Ok((StatusCode::CREATED, Json(reading)))
}

async fn list_telemetry(
    State(state): State<AppStateArc>,
    query: QueryParams<TelemetryQuery>,
) -> ApiResult<Json<TelemetryList>> {
    let Query(query) = query?;
    let page = state.api.page(query.skip, query.limit);
    let log = state.telemetry.clone();
    let page = blocking(move || log.list(query.drone_id, page)).await?;
    Ok(Json(TelemetryList {
        total: page.total,
        telemetry: page.items,
    }))
}

async fn list_drone_telemetry(
    State(state): State<AppStateArc>,
    path: PathId,
    query: QueryParams<PageQuery>,
) -> ApiResult<Json<TelemetryList>> {
    let Path(drone_id) = path?;
    let Query(query) = query?;
    let page = state.api.page(query.skip, query.limit);
    let log = state.telemetry.clone();
    let page = blocking(move || log.list_for_drone(drone_id, page)).await?;
    Ok(Json(TelemetryList {
        total: page.total,
        telemetry: page.items,
    }))
}

async fn latest_telemetry(
    State(state): State<AppStateArc>,
    path: PathId,
) -> ApiResult<Json<Reading>> {
    let Path(drone_id) = path?;
    let log = state.telemetry.clone();
    let reading = blocking(move || log.latest(drone_id)).await?;
    Ok(Json(reading))
}

async fn delete_telemetry(
    State(state): State<AppStateArc>,
    path: PathId,
) -> ApiResult<StatusCode> {
    let Path(telemetry_id) = path?;
    let log = state.telemetry.clone();
    blocking(move || log.delete(telemetry_id)).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ============================================================================
// Health Routes
// ============================================================================

/// Liveness probes.
pub fn health_routes() -> Router<AppStateArc> {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
}

async fn root() -> Json<serde_json::Value> {
    Json(json!({
        "message": "dronehub API is running",
        "version": env!("CARGO_PKG_VERSION"),
        "status": "healthy",
    }))
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "healthy" }))
}
