//! Delimited-text decoding (CSV, TSV, semicolon-separated).

use reportkit_shared::{ReportKitError, Result};

use crate::{Table, assemble};

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// Candidate delimiters, in tie-break order.
const DELIMITERS: [u8; 3] = [b',', b';', b'\t'];

pub(crate) fn read(bytes: &[u8]) -> Result<Table> {
    let bytes = bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes);
    let delimiter = sniff_delimiter(bytes);

    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .delimiter(delimiter)
        .from_reader(bytes);

    let headers: Vec<String> = rdr
        .headers()
        .map_err(|e| ReportKitError::malformed(format!("unreadable header row: {e}")))?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();

    let mut rows = Vec::new();
    for (idx0, result) in rdr.records().enumerate() {
        // 1-based, and the header occupies row 1.
        let user_row = idx0 + 2;
        let record = result
            .map_err(|e| ReportKitError::malformed(format!("row {user_row}: {e}")))?;
        rows.push((user_row, record.iter().map(str::to_string).collect()));
    }

    Ok(assemble(headers, rows))
}

/// Pick the delimiter that occurs most often on the header line.
fn sniff_delimiter(bytes: &[u8]) -> u8 {
    let header_line = bytes.split(|&b| b == b'\n').next().unwrap_or_default();

    let mut best = (b',', 0usize);
    for candidate in DELIMITERS {
        let count = header_line.iter().filter(|&&b| b == candidate).count();
        if count > best.1 {
            best = (candidate, count);
        }
    }
    best.0
}
