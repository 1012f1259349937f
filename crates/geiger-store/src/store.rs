//! Main store implementation.

use std::path::Path;
use std::time::Duration;

use rusqlite::{Connection, OptionalExtension};
use time::OffsetDateTime;
use tracing::{debug, info};

use geiger_types::{DeviceKey, Sample};

use crate::error::{Error, Result};
use crate::models::{StoredDevice, StoredReading, from_millis, to_millis};
use crate::queries::{PageCursor, ReadingQuery};
use crate::schema;

/// How long a writer waits on a lock held by another connection.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Soft cap on stored readings.
///
/// When the table grows past `cap`, the oldest readings are evicted in one
/// block: everything at or before the timestamp of the `batch`-th oldest
/// row. Rows sharing that timestamp all go, so a single eviction can remove
/// more than `batch` rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionPolicy {
    /// Row count above which eviction runs.
    pub cap: u64,
    /// Rank of the row whose timestamp becomes the deletion threshold.
    pub batch: u32,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            cap: 9000,
            batch: 100,
        }
    }
}

/// Paging and stride for [`Store::downsampled_all`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DownsampleOptions {
    /// Rows read per page.
    pub page_size: u32,
    /// Keep every `stride`-th row of each page, starting with the first.
    pub stride: usize,
}

impl Default for DownsampleOptions {
    fn default() -> Self {
        Self {
            page_size: crate::DEFAULT_PAGE_SIZE,
            stride: 10,
        }
    }
}

/// SQLite-based store for Geiger counter data.
pub struct Store {
    conn: Connection,
}

impl Store {
    /// Open or create a database at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            std::fs::create_dir_all(parent).map_err(|e| Error::CreateDirectory {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        info!("Opening database at {}", path.display());
        let conn = Connection::open(path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;

        conn.execute_batch(
            "PRAGMA foreign_keys = ON;
             PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;",
        )?;

        schema::initialize(&conn)?;

        Ok(Self { conn })
    }

    /// Open the default database location.
    pub fn open_default() -> Result<Self> {
        Self::open(crate::default_db_path())
    }

    /// Open an in-memory database (for testing).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        schema::initialize(&conn)?;
        Ok(Self { conn })
    }
}

// Device registry
impl Store {
    /// Look up a counter by key, registering it on first use.
    ///
    /// Safe against concurrent first use from other connections: the
    /// `UNIQUE(geigerc_id, owner_id)` constraint rejects the second insert,
    /// and the loser re-reads the winner's row.
    pub fn get_or_create(&self, key: &DeviceKey) -> Result<StoredDevice> {
        if let Some(device) = self.get_device(key)? {
            return Ok(device);
        }

        let inserted = self.conn.execute(
            "INSERT INTO geigercounter (geigerc_id, owner_id) VALUES (?1, ?2)",
            rusqlite::params![key.device_id(), key.owner_id()],
        );

        match inserted {
            Ok(_) => {
                let id = self.conn.last_insert_rowid();
                info!("Registered new counter {} as #{}", key, id);
                Ok(StoredDevice {
                    id,
                    owner_id: key.owner_id().to_string(),
                    device_id: key.device_id().to_string(),
                })
            }
            Err(e) if is_unique_violation(&e) => {
                debug!("Counter {} was registered concurrently, re-reading", key);
                self.get_device(key)?
                    .ok_or_else(|| Error::DeviceNotFound(key.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Get a counter by key.
    pub fn get_device(&self, key: &DeviceKey) -> Result<Option<StoredDevice>> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT id, owner_id, geigerc_id FROM geigercounter
             WHERE geigerc_id = ?1 AND owner_id = ?2",
        )?;

        let device = stmt
            .query_row(
                rusqlite::params![key.device_id(), key.owner_id()],
                |row| {
                    Ok(StoredDevice {
                        id: row.get(0)?,
                        owner_id: row.get(1)?,
                        device_id: row.get(2)?,
                    })
                },
            )
            .optional()?;

        Ok(device)
    }

    /// Count registered counters.
    pub fn count_devices(&self) -> Result<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM geigercounter", [], |row| row.get(0))?;
        Ok(count as u64)
    }
}

fn is_unique_violation(e: &rusqlite::Error) -> bool {
    matches!(
        e,
        rusqlite::Error::SqliteFailure(err, _)
            if err.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
    )
}

// Reading operations
impl Store {
    /// Append a reading stamped with the current time.
    ///
    /// Does not enforce retention; call [`Store::enforce_retention`] after.
    pub fn append(&self, device: &StoredDevice, sample: &Sample) -> Result<StoredReading> {
        self.append_at(device, sample, OffsetDateTime::now_utc())
    }

    /// Append a reading stamped with `at`, clamped so it never sorts before
    /// an existing row.
    pub(crate) fn append_at(
        &self,
        device: &StoredDevice,
        sample: &Sample,
        at: OffsetDateTime,
    ) -> Result<StoredReading> {
        let (id, ms): (i64, i64) = self.conn.query_row(
            "INSERT INTO measurement (counter_id, cpm, acpm, usv, time)
             VALUES (?1, ?2, ?3, ?4,
                     MAX(?5, COALESCE((SELECT MAX(time) FROM measurement), ?5)))
             RETURNING id, time",
            rusqlite::params![
                device.id,
                sample.cpm(),
                sample.acpm_truncated(),
                sample.usv(),
                to_millis(at),
            ],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;

        debug!(
            "Stored reading #{} for counter #{}: cpm={} acpm={} usv={}",
            id,
            device.id,
            sample.cpm(),
            sample.acpm(),
            sample.usv()
        );

        Ok(StoredReading {
            id,
            counter_id: device.id,
            cpm: sample.cpm(),
            acpm: sample.acpm_truncated(),
            usv: sample.usv(),
            time: from_millis(ms)?,
        })
    }

    /// Evict the oldest readings once the table is over the policy cap.
    ///
    /// Returns the number of rows deleted; zero when under the cap. Count and
    /// threshold lookup are separate statements, so a reading inserted by
    /// another connection in between may be counted or evicted early. The
    /// cap is soft.
    pub fn enforce_retention(&self, policy: &RetentionPolicy) -> Result<usize> {
        let count = self.count_readings()?;
        if count <= policy.cap {
            return Ok(0);
        }

        let threshold: Option<i64> = self
            .conn
            .query_row(
                "SELECT time FROM measurement ORDER BY time ASC, id ASC LIMIT 1 OFFSET ?1",
                [policy.batch.saturating_sub(1)],
                |row| row.get(0),
            )
            .optional()?;

        let Some(threshold) = threshold else {
            return Ok(0);
        };

        let deleted = self
            .conn
            .execute("DELETE FROM measurement WHERE time <= ?1", [threshold])?;

        info!(
            "Retention: {} readings over cap {}, evicted {} up to {}",
            count,
            policy.cap,
            deleted,
            from_millis(threshold)?
        );

        Ok(deleted)
    }

    /// Query readings with filters.
    pub fn query_readings(&self, query: &ReadingQuery) -> Result<Vec<StoredReading>> {
        let sql = query.build_sql();
        let (_, params) = query.build_where();

        debug!("Executing query: {}", sql);

        let params_ref: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();

        let mut stmt = self.conn.prepare_cached(&sql)?;
        let readings = stmt
            .query_map(params_ref.as_slice(), StoredReading::from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(readings)
    }

    /// The most recent reading, or `None` on an empty store.
    pub fn latest(&self) -> Result<Option<StoredReading>> {
        let mut readings = self.query_readings(&ReadingQuery::new().limit(1))?;
        Ok(readings.pop())
    }

    /// All readings at or after `cutoff`, oldest first.
    pub fn window_since(&self, cutoff: OffsetDateTime) -> Result<Vec<StoredReading>> {
        self.query_readings(&ReadingQuery::new().since(cutoff).oldest_first())
    }

    /// One page of readings in ascending order, resuming after `cursor`.
    ///
    /// Each call is a single short statement; no transaction spans pages, so
    /// rows inserted between calls may or may not be seen.
    pub fn page_after(
        &self,
        cursor: Option<PageCursor>,
        page_size: u32,
    ) -> Result<Vec<StoredReading>> {
        let mut query = ReadingQuery::new().oldest_first().limit(page_size);
        if let Some(cursor) = cursor {
            query = query.after(cursor);
        }
        self.query_readings(&query)
    }

    /// Lazily scan every reading, oldest first, one page at a time.
    ///
    /// Memory use is bounded by `page_size`. Calling again starts a fresh
    /// scan from the beginning.
    pub fn full_export(&self, page_size: u32) -> Pages<'_> {
        Pages {
            store: self,
            cursor: None,
            page_size: page_size.max(1),
            done: false,
        }
    }

    /// Fixed-stride subsample of the whole table, oldest first.
    ///
    /// Each page of `page_size` rows contributes rows 0, `stride`, 2·`stride`…
    /// of that page. A table that fits in a single short page is returned
    /// whole, so small datasets are not thinned out. Empty tables yield an
    /// empty vector.
    ///
    /// Use [`Downsampler`] directly to release a shared store between pages.
    pub fn downsampled_all(&self, options: &DownsampleOptions) -> Result<Vec<StoredReading>> {
        let mut sampler = Downsampler::new(options);
        let mut sampled = Vec::new();
        while let Some(rows) = sampler.step(self)? {
            sampled.extend(rows);
        }
        Ok(sampled)
    }

    /// Count all readings.
    pub fn count_readings(&self) -> Result<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM measurement", [], |row| row.get(0))?;
        Ok(count as u64)
    }
}

/// Forward-only page iterator returned by [`Store::full_export`].
///
/// Yields non-empty pages until the table is exhausted. After an error the
/// iterator is fused.
pub struct Pages<'a> {
    store: &'a Store,
    cursor: Option<PageCursor>,
    page_size: u32,
    done: bool,
}

impl Iterator for Pages<'_> {
    type Item = Result<Vec<StoredReading>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        match self.store.page_after(self.cursor, self.page_size) {
            Ok(page) if page.is_empty() => {
                self.done = true;
                None
            }
            Ok(page) => {
                if page.len() < self.page_size as usize {
                    self.done = true;
                }
                self.cursor = page.last().map(StoredReading::cursor);
                Some(Ok(page))
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

/// Page-at-a-time form of [`Store::downsampled_all`].
///
/// Every [`step`](Self::step) is one short read, so the store does not have
/// to stay borrowed for the whole scan. Rows appended between steps may or
/// may not be seen.
#[derive(Debug, Clone)]
pub struct Downsampler {
    page_size: u32,
    stride: usize,
    cursor: Option<PageCursor>,
    done: bool,
}

impl Downsampler {
    pub fn new(options: &DownsampleOptions) -> Self {
        Self {
            page_size: options.page_size.max(1),
            stride: options.stride.max(1),
            cursor: None,
            done: false,
        }
    }

    /// Read the next page and return the rows kept from it.
    ///
    /// Returns `None` once the table is exhausted, and after an error.
    pub fn step(&mut self, store: &Store) -> Result<Option<Vec<StoredReading>>> {
        if self.done {
            return Ok(None);
        }

        let first = self.cursor.is_none();
        let page = store.page_after(self.cursor, self.page_size).inspect_err(|_| {
            self.done = true;
        })?;
        let full = page.len() == self.page_size as usize;
        self.done = !full;
        self.cursor = page.last().map(StoredReading::cursor);

        if page.is_empty() {
            Ok(None)
        } else if first && !full {
            Ok(Some(page))
        } else {
            Ok(Some(page.into_iter().step_by(self.stride).collect()))
        }
    }
}
