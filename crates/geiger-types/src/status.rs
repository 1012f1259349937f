//! Sensor online/offline status.
//!
//! The counter pushes a reading every minute or so. There is no heartbeat,
//! so liveness is inferred from how old the most recent reading is.

use core::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use time::macros::format_description;
use time::{Duration, OffsetDateTime};

/// Default age after which a sensor is reported offline.
pub const DEFAULT_OFFLINE_AFTER: Duration = Duration::hours(24);

/// Liveness of the sensor as shown on the dashboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(
    feature = "serde",
    serde(tag = "state", rename_all = "SCREAMING_SNAKE_CASE")
)]
pub enum SensorStatus {
    /// The latest reading is recent enough.
    Online {
        /// Time of the latest reading.
        #[cfg_attr(feature = "serde", serde(with = "time::serde::rfc3339"))]
        last_seen: OffsetDateTime,
    },
    /// No reading at all, or the latest one is too old.
    Offline {
        /// Time of the latest reading, if any exists.
        #[cfg_attr(feature = "serde", serde(default, with = "time::serde::rfc3339::option"))]
        last_seen: Option<OffsetDateTime>,
    },
}

impl SensorStatus {
    /// Derive the status from the latest reading time.
    ///
    /// A reading exactly `max_age` old still counts as online. A `max_age`
    /// reaching back past the earliest representable time never goes stale.
    ///
    /// # Examples
    ///
    /// ```
    /// use geiger_types::SensorStatus;
    /// use time::{Duration, OffsetDateTime};
    ///
    /// let now = OffsetDateTime::now_utc();
    /// let status = SensorStatus::derive(Some(now - Duration::minutes(2)), now, Duration::hours(1));
    /// assert!(status.is_online());
    ///
    /// let status = SensorStatus::derive(None, now, Duration::hours(1));
    /// assert!(!status.is_online());
    /// ```
    #[must_use]
    pub fn derive(
        last_seen: Option<OffsetDateTime>,
        now: OffsetDateTime,
        max_age: Duration,
    ) -> Self {
        match last_seen {
            Some(t) if now.checked_sub(max_age).is_none_or(|cutoff| t >= cutoff) => {
                SensorStatus::Online { last_seen: t }
            }
            other => SensorStatus::Offline { last_seen: other },
        }
    }

    /// Whether the sensor is online.
    #[must_use]
    pub fn is_online(&self) -> bool {
        matches!(self, SensorStatus::Online { .. })
    }

    /// Time of the latest reading, if any.
    #[must_use]
    pub fn last_seen(&self) -> Option<OffsetDateTime> {
        match self {
            SensorStatus::Online { last_seen } => Some(*last_seen),
            SensorStatus::Offline { last_seen } => *last_seen,
        }
    }

    /// Short upper-case label.
    #[must_use]
    pub fn label(&self) -> &'static str {
        if self.is_online() { "ONLINE" } else { "OFFLINE" }
    }
}

impl fmt::Display for SensorStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Some(last_seen) = self.last_seen() else {
            return write!(f, "Sensor Status: OFFLINE. No data in database.");
        };
        let when = last_seen
            .to_offset(time::UtcOffset::UTC)
            .format(format_description!(
                "[month repr:long] [day padding:none], [year] at [hour]:[minute]"
            ))
            .map_err(|_| fmt::Error)?;
        write!(
            f,
            "Sensor Status: {} (last measurement was on {} UTC)",
            self.label(),
            when
        )
    }
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn status_matches_age(age_ms in 0i64..(7 * 86_400_000), max_age_ms in 1i64..(2 * 86_400_000)) {
            let now = OffsetDateTime::UNIX_EPOCH + Duration::days(20_000);
            let last = now - Duration::milliseconds(age_ms);
            let status = SensorStatus::derive(Some(last), now, Duration::milliseconds(max_age_ms));
            prop_assert_eq!(status.is_online(), age_ms <= max_age_ms);
            prop_assert_eq!(status.last_seen(), Some(last));
        }
    }
}
