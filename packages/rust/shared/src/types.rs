//! Core domain types for report imports.

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{ErrorKind, ReportKitError};

/// Canonical field names the rest of the workspace refers to directly.
pub mod field {
    pub const TITLE: &str = "title";
    pub const REPORT_CODE: &str = "reportCode";
    pub const CATEGORY: &str = "category";
}

// ---------------------------------------------------------------------------
// RecordId
// ---------------------------------------------------------------------------

/// A UUID v7 wrapper for stored report identifiers (time-sortable).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(pub Uuid);

impl RecordId {
    /// Generate a new time-sortable record identifier.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for RecordId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RecordId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for RecordId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

// ---------------------------------------------------------------------------
// CanonicalRecord
// ---------------------------------------------------------------------------

/// A typed value for one canonical field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum FieldValue {
    Text(String),
    Integer(i64),
    /// Monetary amount in the currency's major unit.
    Money(f64),
    Date(DateTime<Utc>),
    /// Sanitized, serialized markup.
    Markup(String),
}

impl FieldValue {
    /// String view for text-like values (text and markup).
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) | Self::Markup(s) => Some(s),
            _ => None,
        }
    }
}

/// One input row after mapping and coercion, keyed by canonical field name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CanonicalRecord {
    /// 1-based row number in the source file.
    pub row: usize,
    pub fields: BTreeMap<String, FieldValue>,
}

impl CanonicalRecord {
    pub fn new(row: usize) -> Self {
        Self {
            row,
            fields: BTreeMap::new(),
        }
    }

    pub fn insert(&mut self, field: impl Into<String>, value: FieldValue) {
        self.fields.insert(field.into(), value);
    }

    pub fn get(&self, field: &str) -> Option<&FieldValue> {
        self.fields.get(field)
    }

    /// Trimmed text of a field, `None` when absent or blank.
    pub fn text(&self, field: &str) -> Option<&str> {
        self.get(field)
            .and_then(FieldValue::as_text)
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    pub fn title(&self) -> Option<&str> {
        self.text(field::TITLE)
    }

    /// Natural keys in lookup priority order: report code first, then title.
    pub fn natural_keys(&self) -> Vec<NaturalKey> {
        let mut keys = Vec::with_capacity(2);
        if let Some(code) = self.text(field::REPORT_CODE) {
            keys.push(NaturalKey::ReportCode(normalize_key(code)));
        }
        if let Some(title) = self.title() {
            keys.push(NaturalKey::Title(normalize_key(title)));
        }
        keys
    }
}

/// A business-identifying value used for duplicate detection.
///
/// Values are stored normalized (trimmed, lower-cased); matching is exact.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum NaturalKey {
    ReportCode(String),
    Title(String),
}

impl NaturalKey {
    pub fn value(&self) -> &str {
        match self {
            Self::ReportCode(v) | Self::Title(v) => v,
        }
    }
}

/// Normalize a natural-key value for comparison.
pub fn normalize_key(raw: &str) -> String {
    raw.trim().to_lowercase()
}

// ---------------------------------------------------------------------------
// DuplicateMode
// ---------------------------------------------------------------------------

/// Caller-selected policy for records that match an existing natural key.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DuplicateMode {
    /// Overwrite the existing record.
    #[default]
    Update,
    /// Leave the existing record alone and skip the row.
    Skip,
    /// Insert a new record regardless of the match.
    Create,
}

impl DuplicateMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Update => "update",
            Self::Skip => "skip",
            Self::Create => "create",
        }
    }
}

impl std::fmt::Display for DuplicateMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for DuplicateMode {
    type Err = ReportKitError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "update" => Ok(Self::Update),
            "skip" => Ok(Self::Skip),
            "create" => Ok(Self::Create),
            other => Err(ReportKitError::config(format!(
                "unknown duplicate mode '{other}' (expected update, skip or create)"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// Outcomes and statistics
// ---------------------------------------------------------------------------

/// What happened to a single row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ImportOutcome {
    Inserted { id: RecordId },
    Updated { id: RecordId },
    Skipped { reason: String },
    Failed(RowFailure),
}

/// A row that could not be persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowFailure {
    pub row: usize,
    #[serde(rename = "errorKind")]
    pub kind: ErrorKind,
    pub detail: String,
}

impl RowFailure {
    pub fn new(row: usize, kind: ErrorKind, detail: impl Into<String>) -> Self {
        Self {
            row,
            kind,
            detail: detail.into(),
        }
    }
}

/// A soft, non-fatal problem recorded while processing a row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowWarning {
    pub row: usize,
    pub field: String,
    pub kind: WarningKind,
    pub detail: String,
}

/// Where a soft warning came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarningKind {
    /// A value fell back to its field default.
    Coercion,
    /// Markup had to be degraded to plain text.
    Sanitization,
}

/// Aggregate counts for one batch run.
///
/// Built by folding [`ImportOutcome`]s; [`ImportStats::merge`] is commutative
/// and associative so partial stats from concurrent workers can be combined
/// in any order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ImportStats {
    pub total: usize,
    pub inserted: usize,
    pub updated: usize,
    pub skipped: usize,
    pub failed: usize,
    #[serde(with = "duration_ms")]
    pub elapsed: Duration,
    /// Set when the caller cancelled before every row was scheduled.
    #[serde(default)]
    pub cancelled: bool,
}

impl ImportStats {
    /// Stats for a single outcome.
    pub fn of(outcome: &ImportOutcome) -> Self {
        let mut stats = Self {
            total: 1,
            ..Self::default()
        };
        match outcome {
            ImportOutcome::Inserted { .. } => stats.inserted = 1,
            ImportOutcome::Updated { .. } => stats.updated = 1,
            ImportOutcome::Skipped { .. } => stats.skipped = 1,
            ImportOutcome::Failed(_) => stats.failed = 1,
        }
        stats
    }

    /// Combine two partial stats.
    pub fn merge(self, other: Self) -> Self {
        Self {
            total: self.total + other.total,
            inserted: self.inserted + other.inserted,
            updated: self.updated + other.updated,
            skipped: self.skipped + other.skipped,
            failed: self.failed + other.failed,
            elapsed: self.elapsed.max(other.elapsed),
            cancelled: self.cancelled || other.cancelled,
        }
    }

    /// Fold a sequence of outcomes.
    pub fn fold<'a>(outcomes: impl IntoIterator<Item = &'a ImportOutcome>) -> Self {
        outcomes
            .into_iter()
            .map(Self::of)
            .fold(Self::default(), Self::merge)
    }
}

/// Counts of lookup entities (e.g. categories) the store created on the fly.
pub type LookupCounts = BTreeMap<String, usize>;

mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}
