//! Read-side JSON endpoints.
//!
//! # Routes
//!
//! - `GET /latest` - most recent reading, `204 No Content` on an empty store
//! - `GET /api/readings/last24h` - readings from the last day, oldest first
//! - `GET /api/readings/summary` - fixed-stride subsample of all readings
//! - `GET /api/status` - sensor liveness for the dashboard
//! - `GET /api/health` - service health check
//! - `GET /url-list` - every route the service serves (loopback or trusted host only)
//!
//! # Concurrency
//!
//! Each handler takes `state.store` for a single query and releases it
//! before serializing. The summary endpoint reads the table one page per
//! acquisition, so uploads can interleave with a long scan.
//!
//! ## Error Handling
//!
//! All endpoints return structured JSON errors via [`AppError`]. Store errors
//! are logged and return HTTP 500.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{ConnectInfo, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use futures::stream::{self, Stream, TryStreamExt};
use geiger_store::{DownsampleOptions, Downsampler, StoredReading};
use geiger_types::SensorStatus;
use serde::Serialize;
use time::{Duration, OffsetDateTime};
use tracing::{error, warn};

use crate::state::AppState;

/// Span covered by `/api/readings/last24h`.
pub const RECENT_WINDOW: Duration = Duration::hours(24);

/// Create the API router.
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/latest", get(get_latest))
        .route("/api/readings/last24h", get(get_last_24h))
        .route("/api/readings/summary", get(get_summary))
        .route("/api/status", get(get_status))
        .route("/api/health", get(health))
        .route("/url-list", get(url_list))
}

/// One entry of `GET /url-list`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RouteInfo {
    pub path: &'static str,
    pub name: &'static str,
}

const fn route(path: &'static str, name: &'static str) -> RouteInfo {
    RouteInfo { path, name }
}

/// Every route served by [`crate::app`].
pub const ROUTES: &[RouteInfo] = &[
    route("/upload", "upload"),
    route("/latest", "latest"),
    route("/download", "download"),
    route("/", "root"),
    route("/dashboard", "dashboard"),
    route("/dashboard/", "dashboard"),
    route("/api/status", "status"),
    route("/api/readings/last24h", "last_24h"),
    route("/api/readings/summary", "summary"),
    route("/api/health", "health"),
    route("/url-list", "url_list"),
];

/// Route listing, restricted like uploads.
async fn url_list(
    State(state): State<Arc<AppState>>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
) -> Result<Json<&'static [RouteInfo]>, AppError> {
    if !state.guard.allows(peer.ip()).await {
        warn!("Rejected route listing for untrusted source {}", peer.ip());
        return Err(AppError::NotFound("Not Found".to_string()));
    }
    Ok(Json(ROUTES))
}

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
}

/// Health check endpoint.
async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        timestamp: OffsetDateTime::now_utc(),
    })
}

/// Body of `GET /latest`.
#[derive(Debug, Serialize, PartialEq)]
pub struct LatestResponse {
    pub cpm: u32,
    pub acpm: u32,
    pub usv: f64,
    #[serde(with = "time::serde::rfc3339")]
    pub time: OffsetDateTime,
}

impl From<StoredReading> for LatestResponse {
    fn from(r: StoredReading) -> Self {
        Self {
            cpm: r.cpm,
            acpm: r.acpm,
            usv: r.usv,
            time: r.time,
        }
    }
}

/// Most recent reading.
async fn get_latest(State(state): State<Arc<AppState>>) -> Result<Response, AppError> {
    let latest = state.store.lock().await.latest()?;
    Ok(match latest {
        Some(reading) => Json(LatestResponse::from(reading)).into_response(),
        None => StatusCode::NO_CONTENT.into_response(),
    })
}

/// Readings from the last 24 hours, oldest first.
async fn get_last_24h(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<StoredReading>>, AppError> {
    let cutoff = OffsetDateTime::now_utc() - RECENT_WINDOW;
    let readings = state.store.lock().await.window_since(cutoff)?;
    Ok(Json(readings))
}

/// Subsampled rows of the whole history, one item per storage page.
///
/// The store lock is held for a single page read.
fn summary_pages(
    state: Arc<AppState>,
    options: DownsampleOptions,
) -> impl Stream<Item = Result<Vec<StoredReading>, geiger_store::Error>> {
    stream::unfold(Downsampler::new(&options), move |mut sampler| {
        let state = Arc::clone(&state);
        async move {
            let step = sampler.step(&*state.store.lock().await);
            match step {
                Ok(Some(rows)) => Some((Ok(rows), sampler)),
                Ok(None) => None,
                Err(e) => Some((Err(e), sampler)),
            }
        }
    })
}

/// Subsample of the whole history for the long-range chart.
async fn get_summary(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<StoredReading>>, AppError> {
    let readings = summary_pages(state, DownsampleOptions::default())
        .try_concat()
        .await?;
    Ok(Json(readings))
}

/// Body of `GET /api/status`.
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    #[serde(flatten)]
    pub status: SensorStatus,
    /// Human readable status line.
    pub message: String,
    /// Threshold used to decide liveness.
    pub offline_after_secs: u64,
}

/// Sensor liveness derived from the latest reading.
async fn get_status(State(state): State<Arc<AppState>>) -> Result<Json<StatusResponse>, AppError> {
    let last_seen = state.store.lock().await.latest()?.map(|r| r.time);
    let dashboard = &state.config.dashboard;
    let status = SensorStatus::derive(
        last_seen,
        OffsetDateTime::now_utc(),
        dashboard.offline_after(),
    );

    Ok(Json(StatusResponse {
        message: status.to_string(),
        status,
        offline_after_secs: dashboard.offline_after_secs,
    }))
}

/// Application error type.
#[derive(Debug)]
pub enum AppError {
    /// Also used for rejected upload sources, so the endpoint looks absent.
    NotFound(String),
    /// A request parameter is missing or invalid.
    Unprocessable { field: String, message: String },
    Store(geiger_store::Error),
    Internal(String),
}

impl From<geiger_store::Error> for AppError {
    fn from(e: geiger_store::Error) -> Self {
        AppError::Store(e)
    }
}

impl From<geiger_types::Error> for AppError {
    fn from(e: geiger_types::Error) -> Self {
        AppError::Unprocessable {
            field: e.field().to_string(),
            message: e.to_string(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, serde_json::json!({ "error": msg })),
            AppError::Unprocessable { field, message } => (
                StatusCode::UNPROCESSABLE_ENTITY,
                serde_json::json!({ "error": message, "field": field }),
            ),
            AppError::Store(e) => {
                error!("Storage failure: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    serde_json::json!({ "error": e.to_string() }),
                )
            }
            AppError::Internal(msg) => {
                error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    serde_json::json!({ "error": msg }),
                )
            }
        };

        (status, Json(body)).into_response()
    }
}
