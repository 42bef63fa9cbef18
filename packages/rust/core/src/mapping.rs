//! Column mapping: raw spreadsheet headers → canonical report fields.
//!
//! Headers are matched against a static synonym table after normalization
//! (lower-cased, all whitespace removed), so `"Report  Title"`,
//! `"REPORT TITLE"` and `"reporttitle"` are the same header.

use std::collections::{BTreeMap, HashMap};
use std::sync::LazyLock;

use serde::Serialize;
use tracing::{debug, instrument, warn};

use reportkit_shared::{ReportKitError, Result, field};

/// How a canonical field's raw cell is coerced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    Text,
    Integer,
    Money,
    Date,
    /// Rich text: converted to markup and sanitized.
    Markup,
}

/// One entry of the canonical field catalogue.
#[derive(Debug, PartialEq, Eq)]
pub struct FieldSpec {
    /// Canonical field name.
    pub name: &'static str,
    /// Header written by the import template.
    pub display: &'static str,
    pub kind: FieldKind,
    /// Accepted header variants, in addition to `display`.
    pub synonyms: &'static [&'static str],
    /// Example value for the import template.
    pub example: &'static str,
}

// ---------------------------------------------------------------------------
// Catalogue
// ---------------------------------------------------------------------------

/// Every canonical field, in template column order.
pub static CATALOGUE: &[FieldSpec] = &[
    FieldSpec {
        name: field::TITLE,
        display: "Report Title",
        kind: FieldKind::Text,
        synonyms: &["title", "report name", "name"],
        example: "Global Widget Market Outlook 2025",
    },
    FieldSpec {
        name: field::REPORT_CODE,
        display: "Report Code",
        kind: FieldKind::Text,
        synonyms: &["code", "sku", "report id"],
        example: "RK-1001",
    },
    FieldSpec {
        name: field::CATEGORY,
        display: "Category",
        kind: FieldKind::Text,
        synonyms: &["industry", "sector"],
        example: "Consumer Goods",
    },
    FieldSpec {
        name: "subCategory",
        display: "Sub Category",
        kind: FieldKind::Text,
        synonyms: &["subcategory", "sub-category", "sub industry"],
        example: "Household Appliances",
    },
    FieldSpec {
        name: "reportDescription",
        display: "Report Description",
        kind: FieldKind::Markup,
        synonyms: &[
            "description",
            "summary",
            "executive summary",
            "report overview",
            "overview",
        ],
        example: "EXECUTIVE SUMMARY\n\nThe widget market grew steadily across all regions.\n\n• Hardware\n• Software",
    },
    FieldSpec {
        name: "tableOfContents",
        display: "Table of Contents",
        kind: FieldKind::Markup,
        synonyms: &["toc", "contents"],
        example: "1. Introduction\n2. Market Overview\n3. Competitive Landscape",
    },
    FieldSpec {
        name: "segmentation",
        display: "Segmentation",
        kind: FieldKind::Markup,
        synonyms: &["market segmentation", "segments"],
        example: "By Type:\n- Portable\n- Stationary",
    },
    FieldSpec {
        name: "methodology",
        display: "Research Methodology",
        kind: FieldKind::Markup,
        synonyms: &["methodology"],
        example: "Primary interviews combined with secondary desk research.",
    },
    FieldSpec {
        name: "author",
        display: "Author",
        kind: FieldKind::Text,
        synonyms: &["analyst"],
        example: "Jordan Lee",
    },
    FieldSpec {
        name: "pages",
        display: "Pages",
        kind: FieldKind::Integer,
        synonyms: &["no. of pages", "number of pages", "page count"],
        example: "180",
    },
    FieldSpec {
        name: "singleUserPrice",
        display: "Single User Price",
        kind: FieldKind::Money,
        synonyms: &["price", "single user license"],
        example: "3499.00",
    },
    FieldSpec {
        name: "multiUserPrice",
        display: "Multi User Price",
        kind: FieldKind::Money,
        synonyms: &["multi user license"],
        example: "4999.00",
    },
    FieldSpec {
        name: "enterprisePrice",
        display: "Enterprise Price",
        kind: FieldKind::Money,
        synonyms: &["enterprise license", "corporate price"],
        example: "6999.00",
    },
    FieldSpec {
        name: "publishedDate",
        display: "Published Date",
        kind: FieldKind::Date,
        synonyms: &["publish date", "publication date", "release date", "date"],
        example: "2025-01-15",
    },
    FieldSpec {
        name: "region",
        display: "Region",
        kind: FieldKind::Text,
        synonyms: &["geography", "country"],
        example: "Global",
    },
    FieldSpec {
        name: "metaTitle",
        display: "Meta Title",
        kind: FieldKind::Text,
        synonyms: &["seo title"],
        example: "Widget Market Size & Share Report 2025",
    },
    FieldSpec {
        name: "metaDescription",
        display: "Meta Description",
        kind: FieldKind::Text,
        synonyms: &["seo description"],
        example: "Size, share and forecast of the global widget market.",
    },
    FieldSpec {
        name: "keywords",
        display: "Keywords",
        kind: FieldKind::Text,
        synonyms: &["meta keywords", "tags"],
        example: "widgets, market size, forecast",
    },
];

/// The field every file must map.
pub const REQUIRED_FIELD: &str = field::TITLE;

static SYNONYMS: LazyLock<HashMap<String, &'static FieldSpec>> = LazyLock::new(|| {
    let mut table = HashMap::new();
    for spec in CATALOGUE {
        let variants = std::iter::once(spec.display).chain(spec.synonyms.iter().copied());
        for variant in variants {
            table.insert(normalize_header(variant), spec);
        }
    }
    table
});

/// Catalogue entry for a canonical field name.
pub fn field_spec(name: &str) -> Option<&'static FieldSpec> {
    CATALOGUE.iter().find(|spec| spec.name == name)
}

/// Lower-case and drop every whitespace character.
pub fn normalize_header(header: &str) -> String {
    header
        .chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect()
}

/// Canonical field a single header maps to, if any.
pub fn resolve_header(header: &str) -> Option<&'static FieldSpec> {
    SYNONYMS.get(&normalize_header(header)).copied()
}

// ---------------------------------------------------------------------------
// ColumnMapping
// ---------------------------------------------------------------------------

/// A source column bound to a canonical field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MappedColumn {
    /// 0-based column index.
    pub index: usize,
    pub header: String,
    pub field: &'static FieldSpec,
}

/// The field map for one import, built once and read by every row.
#[derive(Debug, Clone, Default)]
pub struct ColumnMapping {
    /// One column per canonical field, in column order.
    pub columns: Vec<MappedColumn>,
    /// Non-blank headers that matched no field.
    pub unmapped: Vec<String>,
    /// Columns overridden by a later column mapping to the same field.
    pub shadowed: Vec<MappedColumn>,
}

impl ColumnMapping {
    /// Column feeding canonical field `name`.
    pub fn column_for(&self, name: &str) -> Option<&MappedColumn> {
        self.columns.iter().find(|c| c.field.name == name)
    }

    /// Raw header → canonical field name, for diagnostics.
    pub fn field_map(&self) -> BTreeMap<&str, &'static str> {
        self.columns
            .iter()
            .map(|c| (c.header.as_str(), c.field.name))
            .collect()
    }
}

/// Build the column mapping for `headers`.
///
/// When several columns map to one field the last one wins. Fails with
/// `MissingRequiredField` when nothing maps to the title.
#[instrument(skip_all, fields(headers = headers.len()))]
pub fn map_columns(headers: &[String]) -> Result<ColumnMapping> {
    let mut by_field: BTreeMap<&'static str, MappedColumn> = BTreeMap::new();
    let mut mapping = ColumnMapping::default();

    for (index, header) in headers.iter().enumerate() {
        let trimmed = header.trim();
        if trimmed.is_empty() {
            continue;
        }

        let Some(spec) = resolve_header(trimmed) else {
            mapping.unmapped.push(trimmed.to_string());
            continue;
        };

        let column = MappedColumn {
            index,
            header: trimmed.to_string(),
            field: spec,
        };
        if let Some(previous) = by_field.insert(spec.name, column) {
            debug!(
                field = spec.name,
                shadowed = %previous.header,
                "later column overrides earlier mapping"
            );
            mapping.shadowed.push(previous);
        }
    }

    if !by_field.contains_key(REQUIRED_FIELD) {
        return Err(ReportKitError::MissingRequiredField {
            field: REQUIRED_FIELD.to_string(),
        });
    }

    if !mapping.unmapped.is_empty() {
        warn!(unmapped = ?mapping.unmapped, "ignoring unmapped columns");
    }

    let mut columns: Vec<MappedColumn> = by_field.into_values().collect();
    columns.sort_by_key(|c| c.index);
    mapping.columns = columns;

    debug!(mapped = mapping.columns.len(), "columns mapped");
    Ok(mapping)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn maps_title_overview_and_author() {
        let mapping = map_columns(&headers(&["Report Title", "REPORT OVERVIEW", "Author"])).unwrap();
        let fields: Vec<_> = mapping.columns.iter().map(|c| c.field.name).collect();
        assert_eq!(fields, ["title", "reportDescription", "author"]);
        assert!(mapping.unmapped.is_empty());
    }

    #[test]
    fn header_matching_ignores_case_and_whitespace() {
        assert_eq!(resolve_header("  Report   Title ").unwrap().name, "title");
        assert_eq!(resolve_header("EXECUTIVESUMMARY").unwrap().name, "reportDescription");
        assert_eq!(resolve_header("No. Of\tPages").unwrap().name, "pages");
        assert!(resolve_header("Shoe Size").is_none());
    }

    #[test]
    fn last_matching_column_wins() {
        let mapping = map_columns(&headers(&["Title", "Summary", "Description", "Pages"])).unwrap();
        let description = mapping.column_for("reportDescription").unwrap();
        assert_eq!(description.index, 2);
        assert_eq!(description.header, "Description");
        assert_eq!(mapping.shadowed.len(), 1);
        assert_eq!(mapping.shadowed[0].header, "Summary");
    }

    #[test]
    fn unmapped_headers_are_reported_not_rejected() {
        let mapping = map_columns(&headers(&["Title", "Internal Notes", "", "Colour"])).unwrap();
        assert_eq!(mapping.unmapped, ["Internal Notes", "Colour"]);
        assert_eq!(mapping.columns.len(), 1);
    }

    #[test]
    fn missing_title_fails() {
        let err = map_columns(&headers(&["Author", "Pages"])).unwrap_err();
        assert!(matches!(
            err,
            ReportKitError::MissingRequiredField { ref field } if field == "title"
        ));
    }

    #[test]
    fn catalogue_variants_are_unambiguous() {
        let mut seen: HashMap<String, &str> = HashMap::new();
        for spec in CATALOGUE {
            for variant in std::iter::once(spec.display).chain(spec.synonyms.iter().copied()) {
                if let Some(other) = seen.insert(normalize_header(variant), spec.name) {
                    assert_eq!(other, spec.name, "variant {variant} maps to two fields");
                }
            }
        }
        assert!(field_spec(REQUIRED_FIELD).is_some());
    }

    #[test]
    fn field_map_lists_raw_headers() {
        let mapping = map_columns(&headers(&["Name", "Price"])).unwrap();
        let map = mapping.field_map();
        assert_eq!(map.get("Name"), Some(&"title"));
        assert_eq!(map.get("Price"), Some(&"singleUserPrice"));
    }
}
