//! Value coercion: raw cell strings → typed [`FieldValue`]s.
//!
//! Every coercion is total. Blank cells take the field default silently;
//! a non-blank value that cannot be read also takes the default and leaves
//! a soft warning behind.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use tracing::debug;

use reportkit_markup::render_rich_text;
use reportkit_shared::{CanonicalRecord, FieldValue, RowWarning, WarningKind};
use reportkit_tabular::RawRow;

use crate::mapping::{ColumnMapping, FieldKind};

/// Fallback for unreadable integer cells.
pub const DEFAULT_INTEGER: i64 = 1;

/// Fallback for unreadable money cells.
pub const DEFAULT_MONEY: f64 = 0.0;

const NAIVE_DATETIME_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S"];

/// A coerced row plus the warnings it produced.
#[derive(Debug, Clone, PartialEq)]
pub struct CoercedRow {
    pub record: CanonicalRecord,
    pub warnings: Vec<RowWarning>,
}

/// Coerce every mapped column of `row`.
///
/// The record carries a value for every mapped field, blank or not. `now` is
/// the import timestamp used as the date fallback.
pub fn coerce_row(row: &RawRow, mapping: &ColumnMapping, now: DateTime<Utc>) -> CoercedRow {
    let mut record = CanonicalRecord::new(row.number);
    let mut warnings = Vec::new();

    for column in &mapping.columns {
        let raw = row.cell(column.index).unwrap_or_default();
        let (value, problem) = coerce_value(column.field.kind, raw, now);

        if let Some((kind, detail)) = problem {
            debug!(row = row.number, field = column.field.name, %detail, "coercion fallback");
            warnings.push(RowWarning {
                row: row.number,
                field: column.field.name.to_string(),
                kind,
                detail,
            });
        }
        record.insert(column.field.name, value);
    }

    CoercedRow { record, warnings }
}

/// Coerce one cell. The second element describes a fallback, if one fired.
pub fn coerce_value(
    kind: FieldKind,
    raw: &str,
    now: DateTime<Utc>,
) -> (FieldValue, Option<(WarningKind, String)>) {
    let trimmed = raw.trim();
    let blank = trimmed.is_empty();

    match kind {
        FieldKind::Text => (FieldValue::Text(trimmed.to_string()), None),
        FieldKind::Integer => match parse_integer(trimmed) {
            Some(n) => (FieldValue::Integer(n), None),
            None => (
                FieldValue::Integer(DEFAULT_INTEGER),
                fallback(blank, format!("'{trimmed}' is not a number, using {DEFAULT_INTEGER}")),
            ),
        },
        FieldKind::Money => match parse_money(trimmed) {
            Some(amount) => (FieldValue::Money(amount), None),
            None => (
                FieldValue::Money(DEFAULT_MONEY),
                fallback(blank, format!("'{trimmed}' is not an amount, using 0")),
            ),
        },
        FieldKind::Date => match parse_date(trimmed) {
            Some(date) => (FieldValue::Date(date), None),
            None => (
                FieldValue::Date(now),
                fallback(
                    blank,
                    format!("'{trimmed}' is not a date, using the import time"),
                ),
            ),
        },
        FieldKind::Markup => {
            let sanitized = render_rich_text(trimmed);
            let problem = sanitized
                .anomaly
                .map(|anomaly| (WarningKind::Sanitization, anomaly));
            (FieldValue::Markup(sanitized.html), problem)
        }
    }
}

fn fallback(blank: bool, detail: String) -> Option<(WarningKind, String)> {
    (!blank).then_some((WarningKind::Coercion, detail))
}

/// Leading decimal digits of `raw`, e.g. `"250 pages"` → 250.
pub fn parse_integer(raw: &str) -> Option<i64> {
    let digits_end = raw
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(raw.len());
    raw[..digits_end].parse().ok()
}

/// Digits and `.` only, e.g. `"$1,499.50"` → 1499.5.
///
/// Anything that is not a single well-formed decimal after stripping, such as
/// `"1.2.3"`, is unreadable.
pub fn parse_money(raw: &str) -> Option<f64> {
    let stripped: String = raw
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.')
        .collect();
    if !stripped.bytes().any(|b| b.is_ascii_digit()) {
        return None;
    }
    stripped.parse().ok().filter(|value: &f64| value.is_finite())
}

/// ISO-8601 date or date-time. Values without an offset are taken as UTC.
pub fn parse_date(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    for format in NAIVE_DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(dt.and_utc());
        }
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping::map_columns;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap()
    }

    fn row(number: usize, cells: &[(&str, &str)]) -> RawRow {
        RawRow::new(
            number,
            cells
                .iter()
                .map(|(h, v)| (h.to_string(), v.to_string()))
                .collect(),
        )
    }

    #[test]
    fn integers_take_leading_digits() {
        assert_eq!(parse_integer("250"), Some(250));
        assert_eq!(parse_integer("180 pages"), Some(180));
        assert_eq!(parse_integer("approx. 90"), None);
        assert_eq!(parse_integer(""), None);
        assert_eq!(parse_integer("99999999999999999999"), None);
    }

    #[test]
    fn money_strips_symbols() {
        assert_eq!(parse_money("$1,499.50"), Some(1499.5));
        assert_eq!(parse_money("USD 3 500"), Some(3500.0));
        assert_eq!(parse_money("N/A"), None);
        assert_eq!(parse_money("1.2.3"), None);
        assert_eq!(parse_money(&"9".repeat(400)), None);
    }

    #[test]
    fn dates_accept_iso_variants() {
        let expected = Utc.with_ymd_and_hms(2024, 3, 15, 0, 0, 0).unwrap();
        assert_eq!(parse_date("2024-03-15"), Some(expected));
        assert_eq!(parse_date("2024-03-15T00:00:00"), Some(expected));
        assert_eq!(parse_date("2024-03-15 00:00:00"), Some(expected));
        assert_eq!(parse_date("2024-03-15T02:00:00+02:00"), Some(expected));
        assert_eq!(parse_date("15/03/2024"), None);
    }

    #[test]
    fn blank_cells_default_without_warning() {
        for kind in [FieldKind::Integer, FieldKind::Money, FieldKind::Date] {
            let (_, problem) = coerce_value(kind, "   ", now());
            assert!(problem.is_none(), "{kind:?} warned on blank");
        }
        assert_eq!(
            coerce_value(FieldKind::Integer, "", now()).0,
            FieldValue::Integer(1)
        );
        assert_eq!(coerce_value(FieldKind::Date, "", now()).0, FieldValue::Date(now()));
    }

    #[test]
    fn unreadable_values_warn_and_fall_back() {
        let (value, problem) = coerce_value(FieldKind::Date, "sometime in spring", now());
        assert_eq!(value, FieldValue::Date(now()));
        let (kind, detail) = problem.unwrap();
        assert_eq!(kind, WarningKind::Coercion);
        assert!(detail.contains("sometime in spring"));

        let (value, problem) = coerce_value(FieldKind::Money, "call us", now());
        assert_eq!(value, FieldValue::Money(0.0));
        assert!(problem.is_some());

        let (value, problem) = coerce_value(FieldKind::Money, &"9".repeat(400), now());
        assert_eq!(value, FieldValue::Money(0.0));
        assert!(problem.is_some());
    }

    #[test]
    fn markup_fields_are_converted_and_sanitized() {
        let (value, problem) = coerce_value(FieldKind::Markup, "• Alpha\n• Beta", now());
        assert_eq!(
            value,
            FieldValue::Markup("<ul>\n<li>Alpha</li>\n<li>Beta</li>\n</ul>".into())
        );
        assert!(problem.is_none());

        let (value, _) = coerce_value(FieldKind::Markup, "<p>ok</p><script>x()</script>", now());
        assert_eq!(value, FieldValue::Markup("<p>ok</p>".into()));
    }

    #[test]
    fn row_gets_every_mapped_field() {
        let headers: Vec<String> = ["Title", "Pages", "Price", "Published Date", "Summary", "Notes"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let mapping = map_columns(&headers).unwrap();
        let raw = row(
            3,
            &[
                ("Title", "  Widget Market  "),
                ("Pages", "n/a"),
                ("Price", ""),
                ("Published Date", "2024-01-02"),
                ("Summary", ""),
                ("Notes", "ignored"),
            ],
        );

        let coerced = coerce_row(&raw, &mapping, now());
        let record = &coerced.record;
        assert_eq!(record.row, 3);
        assert_eq!(record.title(), Some("Widget Market"));
        assert_eq!(record.get("pages"), Some(&FieldValue::Integer(1)));
        assert_eq!(record.get("singleUserPrice"), Some(&FieldValue::Money(0.0)));
        assert_eq!(record.get("reportDescription"), Some(&FieldValue::Markup(String::new())));
        assert_eq!(record.fields.len(), 5);

        assert_eq!(coerced.warnings.len(), 1);
        assert_eq!(coerced.warnings[0].field, "pages");
        assert_eq!(coerced.warnings[0].row, 3);
    }
}
