//! Upload endpoint polled by the counter.
//!
//! The counter is configured with a URL template and issues
//! `GET /upload?AID=..&GID=..&CPM=..&ACPM=..&uSV=..` once per logging
//! interval. It expects the literal body `OK.ERR0` on success.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    Router,
    extract::{ConnectInfo, Query, State, rejection::QueryRejection},
    response::Html,
    routing::get,
};
use geiger_types::{DeviceKey, Sample};
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::api::AppError;
use crate::state::AppState;

/// Body the counter firmware treats as success.
pub const ACK: &str = "OK.ERR0";

/// Create the ingest router.
pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/upload", get(upload))
}

/// Raw upload parameters, before validation.
///
/// Everything is optional text here so a missing or malformed parameter is
/// reported by name instead of as a generic deserialization failure.
#[derive(Debug, Default, Deserialize)]
pub struct UploadParams {
    #[serde(rename = "AID")]
    pub aid: Option<String>,
    #[serde(rename = "GID")]
    pub gid: Option<String>,
    #[serde(rename = "CPM")]
    pub cpm: Option<String>,
    #[serde(rename = "ACPM")]
    pub acpm: Option<String>,
    #[serde(rename = "uSV")]
    pub usv: Option<String>,
}

impl UploadParams {
    /// Check presence and types, in wire order, and build domain values.
    pub fn validate(self) -> Result<(DeviceKey, Sample), AppError> {
        let aid = required("AID", self.aid)?;
        let gid = required("GID", self.gid)?;
        let cpm = required("CPM", self.cpm)?;
        let acpm = required("ACPM", self.acpm)?;
        let usv = required("uSV", self.usv)?;

        let cpm: u32 = cpm
            .trim()
            .parse()
            .map_err(|_| unprocessable("CPM", format!("'{}' is not a non-negative integer", cpm)))?;
        let acpm = parse_real("ACPM", &acpm)?;
        let usv = parse_real("uSV", &usv)?;

        let key = DeviceKey::new(aid, gid)?;
        let sample = Sample::new(cpm, acpm, usv)?;
        Ok((key, sample))
    }
}

fn required(field: &str, value: Option<String>) -> Result<String, AppError> {
    value.ok_or_else(|| unprocessable(field, format!("missing required parameter {}", field)))
}

fn parse_real(field: &str, value: &str) -> Result<f64, AppError> {
    value
        .trim()
        .parse()
        .map_err(|_| unprocessable(field, format!("'{}' is not a number", value)))
}

fn unprocessable(field: &str, message: String) -> AppError {
    AppError::Unprocessable {
        field: field.to_string(),
        message,
    }
}

/// Accept one reading.
///
/// Order matters: parameters are validated before the peer is checked, and
/// the relay is started before anything is written.
async fn upload(
    State(state): State<Arc<AppState>>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    params: Result<Query<UploadParams>, QueryRejection>,
) -> Result<Html<&'static str>, AppError> {
    let Query(params) = params.map_err(|e| AppError::Unprocessable {
        field: "query".to_string(),
        message: e.body_text(),
    })?;
    let (key, sample) = params.validate()?;

    if !state.guard.allows(peer.ip()).await {
        warn!("Rejected upload for {} from untrusted source {}", key, peer.ip());
        return Err(AppError::NotFound("Not Found".to_string()));
    }

    if let Some(relay) = &state.relay {
        relay.spawn(&key, &sample);
    }

    let store = state.store.lock().await;
    let device = store.get_or_create(&key)?;
    let reading = store.append(&device, &sample)?;
    debug!(
        "Accepted reading #{} from {} (cpm={}, usv={})",
        reading.id, key, reading.cpm, reading.usv
    );

    match store.enforce_retention(&state.config.retention.policy()) {
        Ok(0) => {}
        Ok(evicted) => info!("Evicted {} old readings", evicted),
        Err(e) => warn!("Retention pass failed: {}", e),
    }

    Ok(Html(ACK))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::Body,
        extract::connect_info::MockConnectInfo,
        http::{Request, StatusCode},
        response::Response,
    };
    use geiger_store::Store;
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    use crate::config::Config;

    const UPLOAD: &str = "/upload?AID=u1&GID=d1&CPM=12&ACPM=11.5&uSV=0.08";

    fn create_test_state(config: Config) -> Arc<AppState> {
        AppState::new(Store::open_in_memory().unwrap(), config)
    }

    async fn upload_from(state: &Arc<AppState>, peer: [u8; 4], uri: &str) -> Response {
        router()
            .layer(MockConnectInfo(SocketAddr::from((peer, 40_000))))
            .with_state(Arc::clone(state))
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap()
    }

    async fn body_text(response: Response) -> String {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    async fn body_json(response: Response) -> serde_json::Value {
        serde_json::from_str(&body_text(response).await).unwrap()
    }

    fn params(aid: &str, gid: &str, cpm: &str, acpm: &str, usv: &str) -> UploadParams {
        UploadParams {
            aid: Some(aid.to_string()),
            gid: Some(gid.to_string()),
            cpm: Some(cpm.to_string()),
            acpm: Some(acpm.to_string()),
            usv: Some(usv.to_string()),
        }
    }

    fn rejected_field(params: UploadParams) -> String {
        match params.validate() {
            Err(AppError::Unprocessable { field, .. }) => field,
            other => panic!("expected 422, got {:?}", other.map(|_| ())),
        }
    }

    // ==================== Parameter validation ====================

    #[test]
    fn test_validate_accepts_well_formed() {
        let (key, sample) = params("u1", "d1", "12", "11.5", "0.08").validate().unwrap();
        assert_eq!(key.owner_id(), "u1");
        assert_eq!(key.device_id(), "d1");
        assert_eq!(sample.cpm(), 12);
        assert_eq!(sample.acpm(), 11.5);
        assert_eq!(sample.usv(), 0.08);
    }

    #[test]
    fn test_validate_reports_first_missing_field() {
        assert_eq!(rejected_field(UploadParams::default()), "AID");

        let mut p = params("u1", "d1", "12", "11.5", "0.08");
        p.cpm = None;
        p.usv = None;
        assert_eq!(rejected_field(p), "CPM");
    }

    #[test]
    fn test_validate_rejects_wrong_types() {
        assert_eq!(rejected_field(params("u1", "d1", "twelve", "1", "1")), "CPM");
        assert_eq!(rejected_field(params("u1", "d1", "-3", "1", "1")), "CPM");
        assert_eq!(rejected_field(params("u1", "d1", "12.5", "1", "1")), "CPM");
        assert_eq!(rejected_field(params("u1", "d1", "1", "abc", "1")), "ACPM");
        assert_eq!(rejected_field(params("u1", "d1", "1", "1", "")), "uSV");
    }

    #[test]
    fn test_validate_rejects_out_of_range_values() {
        assert_eq!(rejected_field(params("u1", "d1", "1", "-0.5", "1")), "ACPM");
        assert_eq!(rejected_field(params("u1", "d1", "1", "1", "NaN")), "uSV");
        assert_eq!(rejected_field(params("u1", "d1", "1", "1", "inf")), "uSV");
        assert_eq!(rejected_field(params("", "d1", "1", "1", "1")), "AID");
        assert_eq!(rejected_field(params("u1", "", "1", "1", "1")), "GID");
    }

    // ==================== Endpoint ====================

    #[tokio::test]
    async fn test_upload_from_loopback() {
        let state = create_test_state(Config::default());
        let response = upload_from(&state, [127, 0, 0, 1], UPLOAD).await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_text(response).await, ACK);

        let store = state.store.lock().await;
        assert_eq!(store.count_devices().unwrap(), 1);
        let latest = store.latest().unwrap().unwrap();
        assert_eq!(latest.cpm, 12);
        assert_eq!(latest.acpm, 11);
        assert_eq!(latest.usv, 0.08);
    }

    #[tokio::test]
    async fn test_upload_untrusted_source_is_not_found() {
        let state = create_test_state(Config::default());
        let response = upload_from(&state, [10, 0, 0, 5], UPLOAD).await;

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(body_json(response).await["error"], "Not Found");

        let store = state.store.lock().await;
        assert_eq!(store.count_devices().unwrap(), 0);
        assert_eq!(store.count_readings().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_upload_from_trusted_host() {
        let mut config = Config::default();
        config.server.trusted_host = Some("10.0.0.5".to_string());
        let state = create_test_state(config);

        let response = upload_from(&state, [10, 0, 0, 5], UPLOAD).await;
        assert_eq!(response.status(), StatusCode::OK);

        let response = upload_from(&state, [10, 0, 0, 6], UPLOAD).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        assert_eq!(state.store.lock().await.count_readings().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_upload_validation_runs_before_authorization() {
        let state = create_test_state(Config::default());
        let response =
            upload_from(&state, [10, 0, 0, 5], "/upload?AID=u1&GID=d1&ACPM=1&uSV=1").await;

        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body_json(response).await["field"], "CPM");
    }

    #[tokio::test]
    async fn test_upload_reuses_device() {
        let state = create_test_state(Config::default());
        for _ in 0..3 {
            let response = upload_from(&state, [127, 0, 0, 1], UPLOAD).await;
            assert_eq!(response.status(), StatusCode::OK);
        }
        let response = upload_from(
            &state,
            [127, 0, 0, 1],
            "/upload?AID=u1&GID=d2&CPM=1&ACPM=1&uSV=0.01",
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);

        let store = state.store.lock().await;
        assert_eq!(store.count_devices().unwrap(), 2);
        assert_eq!(store.count_readings().unwrap(), 4);
    }

    #[tokio::test]
    async fn test_upload_enforces_retention() {
        let mut config = Config::default();
        config.retention.cap = 5;
        config.retention.batch = 2;
        let state = create_test_state(config);

        for cpm in 0..12 {
            let uri = format!("/upload?AID=u1&GID=d1&CPM={}&ACPM=1&uSV=0.01", cpm);
            let response = upload_from(&state, [127, 0, 0, 1], &uri).await;
            assert_eq!(response.status(), StatusCode::OK);
            assert!(state.store.lock().await.count_readings().unwrap() <= 5);
        }
    }
}
