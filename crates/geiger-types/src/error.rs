//! Error types for geiger-types.

use thiserror::Error;

/// Errors raised when constructing domain values from untrusted input.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new error variants
/// in future versions without breaking downstream code.
#[derive(Debug, Clone, PartialEq, Error)]
#[non_exhaustive]
pub enum Error {
    /// A field was present but its value is out of range.
    #[error("invalid value for {field}: {reason}")]
    InvalidValue {
        /// Wire name of the offending field (e.g. `uSV`).
        field: &'static str,
        /// Human readable explanation.
        reason: String,
    },
}

impl Error {
    /// Wire name of the field that failed validation.
    pub fn field(&self) -> &'static str {
        match self {
            Error::InvalidValue { field, .. } => field,
        }
    }

    pub(crate) fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Error::InvalidValue {
            field,
            reason: reason.into(),
        }
    }
}

/// Result type alias using geiger-types' Error type.
pub type Result<T> = std::result::Result<T, Error>;
