//! CSV encoding of reading pages.
//!
//! Downloads are streamed one storage page at a time, so encoding works on a
//! single page and only the first page carries the header row.

use serde::Serialize;
use time::format_description::well_known::Rfc3339;

use crate::error::{Error, Result};
use crate::models::StoredReading;

/// Column order of exported CSV files.
pub const CSV_HEADER: [&str; 6] = ["id", "counter_id", "cpm", "acpm", "usv", "time"];

#[derive(Serialize)]
struct CsvRow {
    id: i64,
    counter_id: i64,
    cpm: u32,
    acpm: u32,
    usv: f64,
    time: String,
}

impl CsvRow {
    fn from_reading(reading: &StoredReading) -> Result<Self> {
        let time = reading
            .time
            .format(&Rfc3339)
            .map_err(|e| Error::Io(std::io::Error::other(e)))?;
        Ok(Self {
            id: reading.id,
            counter_id: reading.counter_id,
            cpm: reading.cpm,
            acpm: reading.acpm,
            usv: reading.usv,
            time,
        })
    }
}

/// Encode one page of readings as CSV.
///
/// Pass `with_header = true` for the first page of a download only. An empty
/// page with a header yields just the header line.
pub fn encode_csv_page(rows: &[StoredReading], with_header: bool) -> Result<Vec<u8>> {
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(Vec::with_capacity(rows.len() * 64 + 48));

    if with_header {
        writer.write_record(CSV_HEADER)?;
    }

    for reading in rows {
        writer.serialize(CsvRow::from_reading(reading)?)?;
    }

    writer.into_inner().map_err(|e| Error::Io(e.into_error()))
}
