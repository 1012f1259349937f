//! Table definitions and versioned upgrades.
//!
//! `MIGRATIONS[n]` upgrades a database from version `n` to `n + 1`. A fresh
//! database is at version 0 and runs every step; the stored version lives in
//! a single-row `schema_version` table.

use rusqlite::{Connection, OptionalExtension};

use crate::error::Result;

/// Ordered upgrade steps.
///
/// `measurement.time` holds unix milliseconds (UTC). Reads order and filter
/// on `(time, id)`, hence the composite index.
const MIGRATIONS: &[&str] = &[r#"
    CREATE TABLE IF NOT EXISTS geigercounter (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        geigerc_id TEXT NOT NULL,
        owner_id TEXT NOT NULL,
        UNIQUE(geigerc_id, owner_id)
    );

    CREATE TABLE IF NOT EXISTS measurement (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        counter_id INTEGER NOT NULL REFERENCES geigercounter(id),
        cpm INTEGER NOT NULL CHECK (cpm >= 0),
        acpm INTEGER NOT NULL CHECK (acpm >= 0),
        usv REAL NOT NULL CHECK (usv >= 0),
        time INTEGER NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_measurement_time
        ON measurement(time, id);
"#];

/// Version a fully migrated database reports.
pub const SCHEMA_VERSION: usize = MIGRATIONS.len();

/// Bring the schema up to [`SCHEMA_VERSION`].
///
/// Each pending step runs in its own transaction together with the version
/// bump, so an interrupted upgrade resumes where it stopped.
pub fn initialize(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (
             id INTEGER PRIMARY KEY CHECK (id = 1),
             version INTEGER NOT NULL
         );",
    )?;

    let current = stored_version(conn)?;
    for (step, sql) in MIGRATIONS.iter().enumerate().skip(current) {
        let tx = conn.unchecked_transaction()?;
        tx.execute_batch(sql)?;
        tx.execute(
            "INSERT INTO schema_version (id, version) VALUES (1, ?1)
             ON CONFLICT(id) DO UPDATE SET version = excluded.version",
            [step as i64 + 1],
        )?;
        tx.commit()?;
    }

    Ok(())
}

fn stored_version(conn: &Connection) -> Result<usize> {
    let version: Option<i64> = conn
        .query_row("SELECT version FROM schema_version WHERE id = 1", [], |row| {
            row.get(0)
        })
        .optional()?;
    Ok(version.unwrap_or(0).max(0) as usize)
}
