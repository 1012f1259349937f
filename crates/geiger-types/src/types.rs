//! Core types for Geiger counter data.

use core::fmt;

#[cfg(feature = "serde")]
use serde::Serialize;

use crate::error::{Error, Result};

/// Maximum length of an owner or device identifier.
pub const MAX_ID_LEN: usize = 255;

/// Identity a counter reports with: the account it belongs to and its own id.
///
/// The firmware sends these as `AID` (owner) and `GID` (counter) on every
/// upload. Two keys are the same device exactly when both parts match.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct DeviceKey {
    owner_id: String,
    device_id: String,
}

impl DeviceKey {
    /// Build a key, rejecting empty or oversized identifiers.
    ///
    /// # Examples
    ///
    /// ```
    /// use geiger_types::DeviceKey;
    ///
    /// assert!(DeviceKey::new("u1", "d1").is_ok());
    /// assert!(DeviceKey::new("", "d1").is_err());
    /// ```
    pub fn new(owner_id: impl Into<String>, device_id: impl Into<String>) -> Result<Self> {
        let owner_id = owner_id.into();
        let device_id = device_id.into();
        check_id("AID", &owner_id)?;
        check_id("GID", &device_id)?;
        Ok(Self {
            owner_id,
            device_id,
        })
    }

    /// Owner (account) identifier.
    #[must_use]
    pub fn owner_id(&self) -> &str {
        &self.owner_id
    }

    /// Counter identifier, unique within its owner.
    #[must_use]
    pub fn device_id(&self) -> &str {
        &self.device_id
    }
}

impl fmt::Display for DeviceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.owner_id, self.device_id)
    }
}

fn check_id(field: &'static str, value: &str) -> Result<()> {
    if value.is_empty() {
        return Err(Error::invalid(field, "must not be empty"));
    }
    if value.len() > MAX_ID_LEN {
        return Err(Error::invalid(
            field,
            format!("must be at most {} bytes", MAX_ID_LEN),
        ));
    }
    Ok(())
}

/// One measurement as sent by the counter.
///
/// - `cpm`: raw counts per minute
/// - `acpm`: averaged counts per minute
/// - `usv`: dose-rate estimate in µSv/h
///
/// Values are stored as-is; there is no unit conversion.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct Sample {
    cpm: u32,
    acpm: f64,
    usv: f64,
}

impl Sample {
    /// Build a sample, rejecting negative or non-finite reals.
    ///
    /// # Examples
    ///
    /// ```
    /// use geiger_types::Sample;
    ///
    /// assert!(Sample::new(12, 11.5, 0.08).is_ok());
    /// assert!(Sample::new(12, -1.0, 0.08).is_err());
    /// assert!(Sample::new(12, 11.5, f64::NAN).is_err());
    /// ```
    pub fn new(cpm: u32, acpm: f64, usv: f64) -> Result<Self> {
        check_real("ACPM", acpm)?;
        check_real("uSV", usv)?;
        Ok(Self { cpm, acpm, usv })
    }

    /// Counts per minute.
    #[must_use]
    pub fn cpm(&self) -> u32 {
        self.cpm
    }

    /// Averaged counts per minute, as sent.
    #[must_use]
    pub fn acpm(&self) -> f64 {
        self.acpm
    }

    /// Averaged counts per minute truncated toward zero, the stored form.
    #[must_use]
    pub fn acpm_truncated(&self) -> u32 {
        // `as` saturates, so huge values clamp to u32::MAX
        self.acpm.trunc() as u32
    }

    /// Dose-rate estimate in µSv/h.
    #[must_use]
    pub fn usv(&self) -> f64 {
        self.usv
    }
}

fn check_real(field: &'static str, value: f64) -> Result<()> {
    if !value.is_finite() {
        return Err(Error::invalid(field, "must be a finite number"));
    }
    if value < 0.0 {
        return Err(Error::invalid(field, "must not be negative"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_key_accessors() {
        let key = DeviceKey::new("owner", "counter").unwrap();
        assert_eq!(key.owner_id(), "owner");
        assert_eq!(key.device_id(), "counter");
        assert_eq!(key.to_string(), "owner-counter");
    }

    #[test]
    fn test_device_key_rejects_empty_parts() {
        let err = DeviceKey::new("", "d1").unwrap_err();
        assert_eq!(err.field(), "AID");

        let err = DeviceKey::new("u1", "").unwrap_err();
        assert_eq!(err.field(), "GID");
    }

    #[test]
    fn test_device_key_length_limit() {
        let long = "x".repeat(MAX_ID_LEN);
        assert!(DeviceKey::new(long.clone(), "d1").is_ok());

        let too_long = "x".repeat(MAX_ID_LEN + 1);
        let err = DeviceKey::new("u1", too_long).unwrap_err();
        assert_eq!(err.field(), "GID");
        assert!(err.to_string().contains("255"));
    }

    #[test]
    fn test_device_key_equality() {
        let a = DeviceKey::new("u1", "d1").unwrap();
        let b = DeviceKey::new("u1", "d1").unwrap();
        let c = DeviceKey::new("d1", "u1").unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_sample_accessors() {
        let sample = Sample::new(12, 11.5, 0.08).unwrap();
        assert_eq!(sample.cpm(), 12);
        assert_eq!(sample.acpm(), 11.5);
        assert_eq!(sample.usv(), 0.08);
    }

    #[test]
    fn test_sample_acpm_truncation() {
        assert_eq!(Sample::new(0, 11.99, 0.0).unwrap().acpm_truncated(), 11);
        assert_eq!(Sample::new(0, 0.4, 0.0).unwrap().acpm_truncated(), 0);
        assert_eq!(Sample::new(0, 1e12, 0.0).unwrap().acpm_truncated(), u32::MAX);
    }

    #[test]
    fn test_sample_zero_is_valid() {
        assert!(Sample::new(0, 0.0, 0.0).is_ok());
    }

    #[test]
    fn test_sample_rejects_bad_reals() {
        assert_eq!(Sample::new(1, -0.5, 0.1).unwrap_err().field(), "ACPM");
        assert_eq!(Sample::new(1, 0.5, -0.1).unwrap_err().field(), "uSV");
        assert_eq!(Sample::new(1, f64::INFINITY, 0.1).unwrap_err().field(), "ACPM");
        assert_eq!(Sample::new(1, 0.5, f64::NAN).unwrap_err().field(), "uSV");
    }

    #[test]
    fn test_sample_serialization() {
        let sample = Sample::new(20, 18.0, 0.12).unwrap();
        let json = serde_json::to_string(&sample).unwrap();
        assert_eq!(json, r#"{"cpm":20,"acpm":18.0,"usv":0.12}"#);
    }
}
