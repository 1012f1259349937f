//! Best-effort forwarding of readings to a public radiation map.

use std::time::Duration;

use geiger_types::{DeviceKey, Sample};
use tracing::{debug, warn};

use crate::config::RelayConfig;

/// Errors from a single forward attempt.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    /// Connection failure or timeout.
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    /// The aggregator answered with a non-success status.
    #[error("aggregator returned {0}")]
    Status(reqwest::StatusCode),
}

/// HTTP client for the aggregator.
#[derive(Debug, Clone)]
pub struct Relay {
    client: reqwest::Client,
    url: String,
    timeout: Duration,
}

impl Relay {
    /// Create a relay from configuration.
    pub fn new(config: &RelayConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: config.url.clone(),
            timeout: config.timeout(),
        }
    }

    /// Endpoint readings are sent to.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Forward one reading and wait for the answer.
    pub async fn forward(&self, key: &DeviceKey, sample: &Sample) -> Result<(), RelayError> {
        let cpm = sample.cpm().to_string();
        let acpm = sample.acpm().to_string();
        let usv = sample.usv().to_string();

        let response = self
            .client
            .get(&self.url)
            .query(&[
                ("AID", key.owner_id()),
                ("GID", key.device_id()),
                ("CPM", cpm.as_str()),
                ("ACPM", acpm.as_str()),
                ("uSV", usv.as_str()),
            ])
            .timeout(self.timeout)
            .send()
            .await?;

        let status = response.status();
        debug!("Relay to {} answered {}", self.url, status);
        if status.is_success() {
            Ok(())
        } else {
            Err(RelayError::Status(status))
        }
    }

    /// Forward in a detached task. Failures are logged and dropped.
    pub fn spawn(&self, key: &DeviceKey, sample: &Sample) -> tokio::task::JoinHandle<()> {
        let relay = self.clone();
        let key = key.clone();
        let sample = *sample;
        tokio::spawn(async move {
            if let Err(e) = relay.forward(&key, &sample).await {
                warn!("Failed to relay reading from {} to {}: {}", key, relay.url, e);
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::net::SocketAddr;

    use axum::{Router, extract::Query, http::StatusCode, routing::get};
    use tokio::sync::mpsc;

    /// Serve `router` on an ephemeral port and return its base URL.
    async fn serve(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr: SocketAddr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{}/log2.asp", addr)
    }

    fn relay_to(url: String, timeout_ms: u64) -> Relay {
        Relay::new(&RelayConfig {
            enabled: true,
            url,
            timeout_ms,
        })
    }

    fn reading() -> (DeviceKey, Sample) {
        (
            DeviceKey::new("u1", "d1").unwrap(),
            Sample::new(12, 11.5, 0.08).unwrap(),
        )
    }

    #[tokio::test]
    async fn test_forward_sends_all_fields() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let router = Router::new().route(
            "/log2.asp",
            get(move |Query(params): Query<HashMap<String, String>>| {
                let tx = tx.clone();
                async move {
                    tx.send(params).unwrap();
                    "OK.ERR0"
                }
            }),
        );
        let relay = relay_to(serve(router).await, 1000);
        let (key, sample) = reading();

        relay.forward(&key, &sample).await.unwrap();

        let params = rx.recv().await.unwrap();
        assert_eq!(params["AID"], "u1");
        assert_eq!(params["GID"], "d1");
        assert_eq!(params["CPM"], "12");
        assert_eq!(params["ACPM"], "11.5");
        assert_eq!(params["uSV"], "0.08");
    }

    #[tokio::test]
    async fn test_forward_reports_error_status() {
        let router = Router::new().route(
            "/log2.asp",
            get(|| async { StatusCode::SERVICE_UNAVAILABLE }),
        );
        let relay = relay_to(serve(router).await, 1000);
        let (key, sample) = reading();

        let err = relay.forward(&key, &sample).await.unwrap_err();
        assert!(matches!(err, RelayError::Status(s) if s == StatusCode::SERVICE_UNAVAILABLE));
    }

    #[tokio::test]
    async fn test_forward_times_out() {
        let router = Router::new().route(
            "/log2.asp",
            get(|| async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                "late"
            }),
        );
        let relay = relay_to(serve(router).await, 100);
        let (key, sample) = reading();

        let started = std::time::Instant::now();
        let err = relay.forward(&key, &sample).await.unwrap_err();
        assert!(matches!(err, RelayError::Request(ref e) if e.is_timeout()));
        assert!(started.elapsed() < Duration::from_secs(3));
    }

    #[tokio::test]
    async fn test_spawned_failure_is_swallowed() {
        // Nothing listens on port 9 of loopback in the test environment
        let relay = relay_to("http://127.0.0.1:9/log2.asp".to_string(), 200);
        let (key, sample) = reading();

        relay.spawn(&key, &sample).await.unwrap();
    }
}
