//! Ingest endpoint, query API and dashboard for a networked Geiger counter.
//!
//! This crate provides a service that:
//! - Accepts readings pushed by a GMC-320 style counter over HTTP
//! - Stores them with a soft cap on the number of rows kept
//! - Optionally relays each reading to a public radiation map
//! - Serves the recent history, a long-range summary and a CSV export
//! - Hosts a self-refreshing dashboard
//!
//! # Endpoints
//!
//! - `GET /upload?AID=&GID=&CPM=&ACPM=&uSV=` - ingest (loopback or trusted host only)
//! - `GET /latest` - most recent reading
//! - `GET /download` - all readings as CSV
//! - `GET /dashboard` - dashboard page (`/` redirects here)
//! - `GET /api/status` - sensor online/offline status
//! - `GET /api/readings/last24h` - readings from the last day
//! - `GET /api/readings/summary` - subsampled full history
//! - `GET /api/health` - service health check
//! - `GET /url-list` - route listing (loopback or trusted host only)
//!
//! # Configuration
//!
//! The service reads configuration from `~/.config/geiger/server.toml`:
//!
//! ```toml
//! [server]
//! bind = "0.0.0.0:8080"
//! trusted_host = "home.example.dyndns.org"
//!
//! [storage]
//! path = "~/.local/share/geiger/data.db"
//!
//! [retention]
//! cap = 9000
//! batch = 100
//!
//! [relay]
//! enabled = false
//! url = "http://www.gmcmap.com/log2.asp"
//! timeout_ms = 1000
//!
//! [dashboard]
//! refresh_secs = 5
//! offline_after_secs = 86400
//! ```

use std::sync::Arc;

use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub mod api;
pub mod config;
pub mod dashboard;
pub mod download;
pub mod ingest;
pub mod middleware;
pub mod relay;
pub mod state;

pub use api::AppError;
pub use config::{
    Config, ConfigError, DashboardConfig, RelayConfig, RetentionConfig, ServerConfig,
    StorageConfig,
};
pub use middleware::SourceGuard;
pub use relay::Relay;
pub use state::AppState;

/// Build the complete application with tracing and CORS layers.
///
/// Serve it with `into_make_service_with_connect_info::<SocketAddr>()`; the
/// upload handler needs the peer address.
pub fn app(state: Arc<AppState>) -> Router {
    Router::new()
        .merge(ingest::router())
        .merge(api::router())
        .merge(download::router())
        .merge(dashboard::router())
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}
