//! Platform-agnostic types for Geiger counter telemetry.
//!
//! This crate provides the values shared by the store and the HTTP service:
//!
//! - [`DeviceKey`]: the `(owner, device)` identity a counter reports with
//! - [`Sample`]: one validated CPM / ACPM / µSv triple
//! - [`SensorStatus`]: online/offline derivation from reading recency
//!
//! # Example
//!
//! ```
//! use geiger_types::{DeviceKey, Sample};
//!
//! let key = DeviceKey::new("u1", "d1")?;
//! let sample = Sample::new(12, 11.5, 0.08)?;
//! assert_eq!(sample.acpm_truncated(), 11);
//! assert_eq!(key.owner_id(), "u1");
//! # Ok::<(), geiger_types::Error>(())
//! ```

pub mod error;
pub mod status;
pub mod types;

pub use error::{Error, Result};
pub use status::{DEFAULT_OFFLINE_AFTER, SensorStatus};
pub use types::{DeviceKey, MAX_ID_LEN, Sample};
