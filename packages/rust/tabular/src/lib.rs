//! Tabular reader for report spreadsheets.
//!
//! Decodes delimited text (CSV/TSV) or the first sheet of a workbook into an
//! ordered header list plus [`RawRow`]s of raw cell strings. Every cell is
//! rendered to a string regardless of its underlying type; see
//! [`workbook`] for how numbers and dates are formatted.

mod delimited;
mod workbook;

use tracing::{debug, instrument};

use reportkit_shared::{ReportKitError, Result};

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

/// Declared kind of the uploaded bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TabularKind {
    /// CSV, TSV or semicolon-separated text.
    Delimited,
    /// An Excel or OpenDocument workbook; only the first sheet is read.
    Workbook,
}

impl TabularKind {
    /// Infer the kind from a file name's extension.
    pub fn from_file_name(name: &str) -> Option<Self> {
        let ext = name.rsplit_once('.')?.1.to_ascii_lowercase();
        match ext.as_str() {
            "csv" | "tsv" | "txt" => Some(Self::Delimited),
            "xlsx" | "xlsm" | "xlsb" | "xls" | "ods" => Some(Self::Workbook),
            _ => None,
        }
    }
}

/// One data row: header → raw cell string, in column order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRow {
    /// 1-based row number in the source (the header row is row 1 for CSV).
    pub number: usize,
    cells: Vec<(String, String)>,
}

impl RawRow {
    pub fn new(number: usize, cells: Vec<(String, String)>) -> Self {
        Self { number, cells }
    }

    /// Cell at column `index`.
    pub fn cell(&self, index: usize) -> Option<&str> {
        self.cells.get(index).map(|(_, v)| v.as_str())
    }

    /// First cell whose header equals `header` exactly.
    pub fn get(&self, header: &str) -> Option<&str> {
        self.cells
            .iter()
            .find(|(h, _)| h == header)
            .map(|(_, v)| v.as_str())
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// True when every cell is empty or whitespace.
    pub fn is_blank(&self) -> bool {
        self.cells.iter().all(|(_, v)| v.trim().is_empty())
    }
}

/// A decoded table: ordered headers plus non-blank data rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Table {
    pub headers: Vec<String>,
    pub rows: Vec<RawRow>,
}

// ---------------------------------------------------------------------------
// Reader
// ---------------------------------------------------------------------------

/// Decode `bytes` as `kind`.
///
/// Fails with `OversizeFile` before decoding when `bytes` exceeds
/// `max_bytes`, `MalformedFile` when the bytes cannot be decoded, and
/// `EmptyFile` when no non-blank data row remains.
#[instrument(skip(bytes), fields(len = bytes.len()))]
pub fn read_table(bytes: &[u8], kind: TabularKind, max_bytes: usize) -> Result<Table> {
    check_size(bytes.len(), max_bytes)?;

    let table = match kind {
        TabularKind::Delimited => delimited::read(bytes)?,
        TabularKind::Workbook => workbook::read(bytes)?,
    };

    if table.rows.is_empty() {
        return Err(ReportKitError::EmptyFile);
    }

    debug!(
        headers = table.headers.len(),
        rows = table.rows.len(),
        "table decoded"
    );

    Ok(table)
}

/// Reject inputs over the size cap.
pub fn check_size(size: usize, max_bytes: usize) -> Result<()> {
    if size > max_bytes {
        return Err(ReportKitError::OversizeFile {
            size,
            limit: max_bytes,
        });
    }
    Ok(())
}

/// Pair raw cells with headers and drop blank rows.
///
/// Short rows are padded with empty cells; cells beyond the last header are
/// ignored.
fn assemble(headers: Vec<String>, raw_rows: Vec<(usize, Vec<String>)>) -> Table {
    let rows = raw_rows
        .into_iter()
        .map(|(number, mut cells)| {
            cells.resize(headers.len(), String::new());
            let cells = headers.iter().cloned().zip(cells).collect();
            RawRow::new(number, cells)
        })
        .filter(|row| !row.is_blank())
        .collect();

    Table { headers, rows }
}
