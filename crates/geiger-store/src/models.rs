//! Data models for stored data.

use rusqlite::Row;
use rusqlite::types::Type;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::error::Error;
use crate::queries::PageCursor;

/// A counter registered in the database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredDevice {
    /// Surrogate row ID.
    pub id: i64,
    /// Owner (account) identifier, `AID` on the wire.
    pub owner_id: String,
    /// Counter identifier, `GID` on the wire.
    pub device_id: String,
}

/// A reading stored in the database.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredReading {
    /// Database row ID, increasing in insertion order.
    pub id: i64,
    /// Row ID of the owning [`StoredDevice`].
    pub counter_id: i64,
    /// Counts per minute.
    pub cpm: u32,
    /// Averaged counts per minute, truncated to an integer.
    pub acpm: u32,
    /// Dose-rate estimate in µSv/h.
    pub usv: f64,
    /// Server-assigned insertion time, millisecond resolution.
    #[serde(with = "time::serde::rfc3339")]
    pub time: OffsetDateTime,
}

impl StoredReading {
    /// Column list matching [`StoredReading::from_row`].
    pub(crate) const COLUMNS: &'static str = "id, counter_id, cpm, acpm, usv, time";

    /// Map a row selected with [`StoredReading::COLUMNS`].
    pub(crate) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            counter_id: row.get(1)?,
            cpm: row.get(2)?,
            acpm: row.get(3)?,
            usv: row.get(4)?,
            time: row_time(row, 5)?,
        })
    }

    /// Keyset position just past this reading.
    pub fn cursor(&self) -> PageCursor {
        PageCursor {
            time: self.time,
            id: self.id,
        }
    }
}

/// Convert a timestamp to stored unix milliseconds.
pub(crate) fn to_millis(t: OffsetDateTime) -> i64 {
    (t.unix_timestamp_nanos() / 1_000_000) as i64
}

/// Convert stored unix milliseconds back to a timestamp.
pub(crate) fn from_millis(ms: i64) -> Result<OffsetDateTime, Error> {
    OffsetDateTime::from_unix_timestamp_nanos(i128::from(ms) * 1_000_000)
        .map_err(|_| Error::InvalidTimestamp(ms))
}

fn row_time(row: &Row<'_>, idx: usize) -> rusqlite::Result<OffsetDateTime> {
    let ms: i64 = row.get(idx)?;
    from_millis(ms)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Integer, Box::new(e)))
}
