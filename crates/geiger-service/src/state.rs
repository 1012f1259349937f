//! Application state shared across handlers.

use std::sync::Arc;

use geiger_store::Store;
use tokio::sync::Mutex;

use crate::config::Config;
use crate::middleware::SourceGuard;
use crate::relay::Relay;

/// Shared application state.
pub struct AppState {
    /// The data store (wrapped in Mutex for thread-safe access).
    ///
    /// Held for one storage round-trip at a time. Paged reads re-acquire it
    /// per page so uploads interleave with long downloads.
    pub store: Mutex<Store>,
    /// Configuration, fixed for the lifetime of the process.
    pub config: Config,
    /// Decides which peers may upload.
    pub guard: SourceGuard,
    /// Present when relaying is enabled.
    pub relay: Option<Relay>,
}

impl AppState {
    /// Create new application state.
    pub fn new(store: Store, config: Config) -> Arc<Self> {
        let guard = SourceGuard::new(config.server.trusted_host.clone());
        let relay = config.relay.enabled.then(|| Relay::new(&config.relay));
        Arc::new(Self {
            store: Mutex::new(store),
            config,
            guard,
            relay,
        })
    }
}
