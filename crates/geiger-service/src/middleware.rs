//! Source-address guard for the ingest endpoint.
//!
//! The counter sits behind a home router with a dynamic address, published
//! under a dynamic DNS name. Uploads are accepted from loopback (a local
//! reverse proxy) and from whatever that name resolves to at the time of the
//! request. There is no other authentication.

use std::net::IpAddr;

use tracing::{debug, warn};

/// Decides whether a peer may post readings.
#[derive(Debug, Clone, Default)]
pub struct SourceGuard {
    trusted_host: Option<String>,
}

impl SourceGuard {
    /// Guard trusting loopback plus the current addresses of `trusted_host`.
    pub fn new(trusted_host: Option<String>) -> Self {
        Self { trusted_host }
    }

    /// Configured trusted hostname, if any.
    pub fn trusted_host(&self) -> Option<&str> {
        self.trusted_host.as_deref()
    }

    /// Check a peer address.
    ///
    /// The trusted name is resolved on every call and never cached. A
    /// resolution failure is logged and leaves only loopback trusted.
    pub async fn allows(&self, peer: IpAddr) -> bool {
        let peer = peer.to_canonical();
        if peer.is_loopback() {
            return true;
        }

        let Some(host) = self.trusted_host.as_deref() else {
            return false;
        };

        match resolve(host).await {
            Ok(addrs) => {
                debug!("Trusted host {} resolves to {:?}", host, addrs);
                addrs.contains(&peer)
            }
            Err(e) => {
                warn!("Failed to resolve trusted host {}: {}", host, e);
                false
            }
        }
    }
}

async fn resolve(host: &str) -> std::io::Result<Vec<IpAddr>> {
    let addrs = tokio::net::lookup_host((host, 0)).await?;
    Ok(addrs.map(|addr| addr.ip().to_canonical()).collect())
}
