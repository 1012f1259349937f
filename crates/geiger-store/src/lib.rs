//! SQLite persistence for Geiger counter readings.
//!
//! This crate owns the two tables behind the service:
//!
//! - `geigercounter`: one row per `(owner, device)` pair, created lazily
//! - `measurement`: timestamped CPM / ACPM / µSv readings
//!
//! # Features
//!
//! - Idempotent device registration that tolerates concurrent first use
//! - Server-assigned, monotonically non-decreasing reading timestamps
//! - Soft row cap enforced by bulk eviction of the oldest readings
//! - Keyset-paginated full scans for export and downsampling
//! - CSV page encoding for streamed downloads
//!
//! # Example
//!
//! ```
//! use geiger_store::{RetentionPolicy, Store};
//! use geiger_types::{DeviceKey, Sample};
//!
//! let store = Store::open_in_memory()?;
//! let device = store.get_or_create(&DeviceKey::new("u1", "d1")?)?;
//! store.append(&device, &Sample::new(12, 11.5, 0.08)?)?;
//! store.enforce_retention(&RetentionPolicy::default())?;
//!
//! let latest = store.latest()?.expect("one reading");
//! assert_eq!(latest.acpm, 11);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

mod error;
mod export;
mod models;
mod queries;
mod schema;
mod store;

pub use error::{Error, Result};
pub use export::{CSV_HEADER, encode_csv_page};
pub use models::{StoredDevice, StoredReading};
pub use queries::{PageCursor, ReadingQuery};
pub use store::{DownsampleOptions, Downsampler, Pages, RetentionPolicy, Store};

/// Rows read per storage round-trip by paged scans.
pub const DEFAULT_PAGE_SIZE: u32 = 1000;

/// Default database path following platform conventions.
///
/// - Linux: `~/.local/share/geiger/data.db`
/// - macOS: `~/Library/Application Support/geiger/data.db`
/// - Windows: `C:\Users\<user>\AppData\Local\geiger\data.db`
pub fn default_db_path() -> std::path::PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| std::path::PathBuf::from("."))
        .join("geiger")
        .join("data.db")
}
