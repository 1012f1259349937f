//! Server configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use geiger_store::RetentionPolicy;
use serde::{Deserialize, Serialize};

/// Server configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Server settings.
    pub server: ServerConfig,
    /// Storage settings.
    pub storage: StorageConfig,
    /// Row cap for stored readings.
    pub retention: RetentionConfig,
    /// Forwarding of readings to the public map.
    pub relay: RelayConfig,
    /// Dashboard behavior.
    pub dashboard: DashboardConfig,
}

impl Config {
    /// Load configuration from the default path.
    pub fn load_default() -> Result<Self, ConfigError> {
        let path = default_config_path();
        if path.exists() {
            Self::load(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load configuration from a file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| ConfigError::Read {
            path: path.as_ref().to_path_buf(),
            source: e,
        })?;
        toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.as_ref().to_path_buf(),
            source: e,
        })
    }

    /// Save configuration to a file.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self).map_err(ConfigError::Serialize)?;

        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::Write {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        std::fs::write(path.as_ref(), content).map_err(|e| ConfigError::Write {
            path: path.as_ref().to_path_buf(),
            source: e,
        })
    }

    /// Validate the configuration and return any errors.
    ///
    /// This checks:
    /// - Server bind address is valid (host:port format)
    /// - Trusted host, when set, is not blank
    /// - Storage path is not empty
    /// - Retention batch is at least 1 and not larger than the cap
    /// - Relay URL is http(s) and its timeout is within bounds
    /// - Dashboard intervals are positive
    ///
    /// # Example
    ///
    /// ```
    /// use geiger_service::Config;
    ///
    /// let config = Config::default();
    /// config.validate().expect("Default config should be valid");
    /// ```
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors = Vec::new();

        errors.extend(self.server.validate());
        errors.extend(self.storage.validate());
        errors.extend(self.retention.validate());
        errors.extend(self.relay.validate());
        errors.extend(self.dashboard.validate());

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(errors))
        }
    }
}

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind: String,
    /// Hostname whose current address may post readings, besides loopback.
    ///
    /// Resolved on every upload, so a dynamic DNS name keeps working when
    /// the home connection changes address.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trusted_host: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:8080".to_string(),
            trusted_host: None,
        }
    }
}

impl ServerConfig {
    /// Validate server configuration.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if self.bind.is_empty() {
            errors.push(ValidationError::new(
                "server.bind",
                "bind address cannot be empty",
            ));
        } else {
            match self.bind.rsplit_once(':') {
                None => errors.push(ValidationError::new(
                    "server.bind",
                    format!(
                        "invalid bind address '{}': expected format 'host:port'",
                        self.bind
                    ),
                )),
                Some((_, port)) => match port.parse::<u16>() {
                    Ok(0) => errors.push(ValidationError::new("server.bind", "port cannot be 0")),
                    Err(_) => errors.push(ValidationError::new(
                        "server.bind",
                        format!("invalid port '{}': must be a number 1-65535", port),
                    )),
                    Ok(_) => {}
                },
            }
        }

        if let Some(host) = &self.trusted_host
            && host.trim().is_empty()
        {
            errors.push(ValidationError::new(
                "server.trusted_host",
                "trusted host cannot be blank (omit it instead)",
            ));
        }

        errors
    }
}

/// Storage configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Database file path.
    pub path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: geiger_store::default_db_path(),
        }
    }
}

impl StorageConfig {
    /// Validate storage configuration.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if self.path.as_os_str().is_empty() {
            errors.push(ValidationError::new(
                "storage.path",
                "database path cannot be empty",
            ));
        }

        errors
    }
}

/// Retention configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetentionConfig {
    /// Number of readings above which the oldest are evicted.
    pub cap: u64,
    /// How many of the oldest readings one eviction removes (at least).
    pub batch: u32,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        let policy = RetentionPolicy::default();
        Self {
            cap: policy.cap,
            batch: policy.batch,
        }
    }
}

impl RetentionConfig {
    /// The store-level policy.
    pub fn policy(&self) -> RetentionPolicy {
        RetentionPolicy {
            cap: self.cap,
            batch: self.batch,
        }
    }

    /// Validate retention configuration.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if self.batch == 0 {
            errors.push(ValidationError::new(
                "retention.batch",
                "batch must be at least 1",
            ));
        } else if self.cap < u64::from(self.batch) {
            errors.push(ValidationError::new(
                "retention.cap",
                format!(
                    "cap {} is smaller than batch {}",
                    self.cap, self.batch
                ),
            ));
        }

        errors
    }
}

/// Public map that readings are forwarded to.
pub const DEFAULT_RELAY_URL: &str = "http://www.gmcmap.com/log2.asp";

/// Minimum relay timeout in milliseconds.
pub const MIN_RELAY_TIMEOUT_MS: u64 = 100;
/// Maximum relay timeout in milliseconds.
pub const MAX_RELAY_TIMEOUT_MS: u64 = 10_000;

/// Relay configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Forward each accepted reading.
    pub enabled: bool,
    /// Endpoint receiving `AID`, `GID`, `CPM`, `ACPM` and `uSV` as query
    /// parameters.
    pub url: String,
    /// Per-request timeout in milliseconds.
    pub timeout_ms: u64,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            url: DEFAULT_RELAY_URL.to_string(),
            timeout_ms: 1000,
        }
    }
}

impl RelayConfig {
    /// Per-request timeout.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Validate relay configuration.
    ///
    /// URL and timeout are checked even when the relay is disabled.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if !(self.url.starts_with("http://") || self.url.starts_with("https://")) {
            errors.push(ValidationError::new(
                "relay.url",
                format!("url '{}' must start with http:// or https://", self.url),
            ));
        }

        if self.timeout_ms < MIN_RELAY_TIMEOUT_MS {
            errors.push(ValidationError::new(
                "relay.timeout_ms",
                format!(
                    "timeout {} is too short (minimum {} ms)",
                    self.timeout_ms, MIN_RELAY_TIMEOUT_MS
                ),
            ));
        } else if self.timeout_ms > MAX_RELAY_TIMEOUT_MS {
            errors.push(ValidationError::new(
                "relay.timeout_ms",
                format!(
                    "timeout {} is too long (maximum {} ms)",
                    self.timeout_ms, MAX_RELAY_TIMEOUT_MS
                ),
            ));
        }

        errors
    }
}

/// Longest accepted offline threshold (one year).
pub const MAX_OFFLINE_AFTER_SECS: u64 = 365 * 86_400;

/// Dashboard configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DashboardConfig {
    /// Seconds between dashboard refreshes.
    pub refresh_secs: u64,
    /// Age of the latest reading after which the sensor shows as offline.
    pub offline_after_secs: u64,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            refresh_secs: 5,
            offline_after_secs: geiger_types::DEFAULT_OFFLINE_AFTER.whole_seconds() as u64,
        }
    }
}

impl DashboardConfig {
    /// Offline threshold as a signed duration, for timestamp arithmetic.
    pub fn offline_after(&self) -> time::Duration {
        time::Duration::seconds(i64::try_from(self.offline_after_secs).unwrap_or(i64::MAX))
    }

    /// Validate dashboard configuration.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if self.refresh_secs == 0 {
            errors.push(ValidationError::new(
                "dashboard.refresh_secs",
                "refresh interval must be at least 1 second",
            ));
        }
        if self.offline_after_secs == 0 {
            errors.push(ValidationError::new(
                "dashboard.offline_after_secs",
                "offline threshold must be at least 1 second",
            ));
        } else if self.offline_after_secs > MAX_OFFLINE_AFTER_SECS {
            errors.push(ValidationError::new(
                "dashboard.offline_after_secs",
                format!(
                    "offline threshold {} is too long (maximum {} s)",
                    self.offline_after_secs, MAX_OFFLINE_AFTER_SECS
                ),
            ));
        }

        errors
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("Failed to serialize config: {0}")]
    Serialize(toml::ser::Error),
    #[error("Failed to write config file {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Configuration validation failed:\n{}", format_validation_errors(.0))]
    Validation(Vec<ValidationError>),
}

/// A single validation error with context.
#[derive(Debug, Clone)]
pub struct ValidationError {
    /// The field path (e.g., `server.bind` or `retention.batch`).
    pub field: String,
    /// Description of the validation failure.
    pub message: String,
}

impl ValidationError {
    fn new(field: &str, message: impl Into<String>) -> Self {
        Self {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

fn format_validation_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(|e| format!("  - {}", e))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Default configuration file path.
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("geiger")
        .join("server.toml")
}
