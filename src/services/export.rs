// src/services/export.rs
use anyhow::Result;
use csv::Writer;
use std::io::Write;

use crate::models::ReconciledRow;
use crate::services::row::{to_record, HEADERS};

/// Writes the header and one record per row, in the order given.
pub fn write_rows<W: Write>(writer: W, rows: &[ReconciledRow]) -> Result<()> {
    let mut wtr = Writer::from_writer(writer);
    wtr.write_record(HEADERS)?;
    for row in rows {
        wtr.write_record(to_record(row))?;
    }
    wtr.flush()?;
    Ok(())
}

pub fn to_csv_string(rows: &[ReconciledRow]) -> Result<String> {
    let mut buffer = Vec::new();
    write_rows(&mut buffer, rows)?;
    Ok(String::from_utf8(buffer)?)
}
