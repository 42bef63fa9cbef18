//! Workbook decoding via `calamine` (first sheet only).
//!
//! Cell rendering rules:
//! - whole-number floats render without a fractional part (`250.0` → `"250"`)
//! - other floats use Rust's shortest round-trip formatting, so values that
//!   Excel displays rounded (e.g. `0.1 + 0.2`) come through unrounded
//! - date cells render as `YYYY-MM-DD`, or `YYYY-MM-DDTHH:MM:SS` when they
//!   carry a time of day; unconvertible date serials fall back to the raw
//!   serial number
//! - error cells render as their Excel literal (`#N/A`, `#DIV/0!`, ...)

use std::io::Cursor;

use calamine::{Data, Reader, open_workbook_auto_from_rs};
use chrono::{NaiveDateTime, Timelike};

use reportkit_shared::{ReportKitError, Result};

use crate::{Table, assemble};

pub(crate) fn read(bytes: &[u8]) -> Result<Table> {
    let mut workbook = open_workbook_auto_from_rs(Cursor::new(bytes.to_vec()))
        .map_err(|e| ReportKitError::malformed(format!("unreadable workbook: {e}")))?;

    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| ReportKitError::malformed("workbook has no sheets"))?
        .map_err(|e| ReportKitError::malformed(format!("unreadable first sheet: {e}")))?;

    // Ranges start at the first used cell, not at A1.
    let first_row = range.start().map(|(row, _)| row as usize).unwrap_or(0);

    let mut rows = range
        .rows()
        .enumerate()
        .skip_while(|(_, row)| row.iter().all(|c| matches!(c, Data::Empty)));

    let Some((_, header_cells)) = rows.next() else {
        return Err(ReportKitError::EmptyFile);
    };
    let headers = header_cells
        .iter()
        .map(|c| cell_to_string(c).trim().to_string())
        .collect();

    let raw_rows = rows
        .map(|(idx0, row)| {
            let user_row = first_row + idx0 + 1;
            (user_row, row.iter().map(cell_to_string).collect())
        })
        .collect();

    Ok(assemble(headers, raw_rows))
}

fn cell_to_string(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.clone(),
        Data::Int(i) => i.to_string(),
        Data::Float(f) => format_float(*f),
        Data::Bool(b) => b.to_string(),
        Data::DateTime(dt) => dt
            .as_datetime()
            .map(format_datetime)
            .unwrap_or_else(|| format_float(dt.as_f64())),
        Data::DateTimeIso(s) | Data::DurationIso(s) => s.clone(),
        Data::Error(e) => e.to_string(),
    }
}

fn format_float(f: f64) -> String {
    if f.fract() == 0.0 && f.abs() < 1e15 {
        (f as i64).to_string()
    } else {
        f.to_string()
    }
}

fn format_datetime(dt: NaiveDateTime) -> String {
    if dt.time().num_seconds_from_midnight() == 0 {
        dt.format("%Y-%m-%d").to_string()
    } else {
        dt.format("%Y-%m-%dT%H:%M:%S").to_string()
    }
}
