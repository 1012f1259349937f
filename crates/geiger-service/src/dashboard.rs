//! Browser dashboard.
//!
//! A single static page polls the JSON API on a timer and redraws the status
//! line and both charts from scratch on every tick.

use std::sync::Arc;

use axum::{
    Router,
    extract::State,
    response::{Html, Redirect},
    routing::get,
};

use crate::state::AppState;

const TEMPLATE: &str = include_str!("../assets/dashboard.html");
const REFRESH_PLACEHOLDER: &str = "{{REFRESH_MS}}";

/// Create the dashboard router.
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(|| async { Redirect::temporary("/dashboard") }))
        .route("/dashboard", get(dashboard))
        .route("/dashboard/", get(dashboard))
}

/// Render the page with the configured refresh interval.
pub fn render(refresh_secs: u64) -> String {
    TEMPLATE.replace(
        REFRESH_PLACEHOLDER,
        &refresh_secs.saturating_mul(1000).to_string(),
    )
}

async fn dashboard(State(state): State<Arc<AppState>>) -> Html<String> {
    Html(render(state.config.dashboard.refresh_secs))
}
