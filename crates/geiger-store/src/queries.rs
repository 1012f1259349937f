//! Query builder for readings.
//!
//! [`ReadingQuery`] is the single place SQL for reading selection is built.
//! The store's `latest`, `window_since` and paged scans are thin wrappers
//! around it.
//!
//! # Example
//!
//! ```
//! use geiger_store::{Store, ReadingQuery};
//! use time::{OffsetDateTime, Duration};
//!
//! let store = Store::open_in_memory()?;
//! let yesterday = OffsetDateTime::now_utc() - Duration::hours(24);
//!
//! let query = ReadingQuery::new()
//!     .since(yesterday)
//!     .oldest_first()
//!     .limit(50);
//!
//! let readings = store.query_readings(&query)?;
//! assert!(readings.is_empty());
//! # Ok::<(), geiger_store::Error>(())
//! ```

use time::OffsetDateTime;

use crate::models::{StoredReading, to_millis};

/// Keyset position in the `(time, id)` ordering of readings.
///
/// Paging with a cursor rather than `OFFSET` keeps each page a bounded index
/// range scan, and a page boundary never splits or repeats rows that share a
/// timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageCursor {
    /// Time of the last row already seen.
    pub time: OffsetDateTime,
    /// ID of the last row already seen.
    pub id: i64,
}

/// Fluent query builder for readings.
///
/// By default, queries return results ordered by `time` descending
/// (newest first). Rows sharing a timestamp are ordered by `id` in the
/// same direction.
#[derive(Debug, Default, Clone)]
pub struct ReadingQuery {
    /// Filter readings at or after this time.
    pub since: Option<OffsetDateTime>,
    /// Filter readings at or before this time.
    pub until: Option<OffsetDateTime>,
    /// Only rows strictly past this cursor in the query's ordering.
    pub after: Option<PageCursor>,
    /// Maximum number of results.
    pub limit: Option<u32>,
    /// Order by time descending (newest first).
    pub newest_first: bool,
}

impl ReadingQuery {
    /// Unbounded, newest-first query over every reading.
    pub fn new() -> Self {
        Self {
            newest_first: true,
            ..Default::default()
        }
    }

    /// Filter to readings at or after this time.
    pub fn since(mut self, time: OffsetDateTime) -> Self {
        self.since = Some(time);
        self
    }

    /// Filter to readings at or before this time.
    pub fn until(mut self, time: OffsetDateTime) -> Self {
        self.until = Some(time);
        self
    }

    /// Resume after a previously returned row.
    pub fn after(mut self, cursor: PageCursor) -> Self {
        self.after = Some(cursor);
        self
    }

    /// Limit the maximum number of results returned.
    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Order results by oldest first (ascending by `time`).
    pub fn oldest_first(mut self) -> Self {
        self.newest_first = false;
        self
    }

    /// Build the SQL WHERE clause and parameters.
    pub(crate) fn build_where(&self) -> (String, Vec<Box<dyn rusqlite::ToSql>>) {
        let mut conditions = Vec::new();
        let mut params: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if let Some(since) = self.since {
            conditions.push("time >= ?");
            params.push(Box::new(to_millis(since)));
        }

        if let Some(until) = self.until {
            conditions.push("time <= ?");
            params.push(Box::new(to_millis(until)));
        }

        if let Some(cursor) = self.after {
            conditions.push(if self.newest_first {
                "(time < ? OR (time = ? AND id < ?))"
            } else {
                "(time > ? OR (time = ? AND id > ?))"
            });
            let ms = to_millis(cursor.time);
            params.push(Box::new(ms));
            params.push(Box::new(ms));
            params.push(Box::new(cursor.id));
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };

        (where_clause, params)
    }

    /// Build the full SQL query.
    pub(crate) fn build_sql(&self) -> String {
        let (where_clause, _) = self.build_where();
        let order = if self.newest_first { "DESC" } else { "ASC" };

        let mut sql = format!(
            "SELECT {} FROM measurement {} ORDER BY time {order}, id {order}",
            StoredReading::COLUMNS,
            where_clause,
        );
        if let Some(limit) = self.limit {
            sql.push_str(&format!(" LIMIT {}", limit));
        }
        sql
    }
}
