//! The persistence collaborator the import pipeline writes through.

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{CanonicalRecord, LookupCounts, NaturalKey, RecordId};

/// A store of reports addressable by natural key.
///
/// Each call is fallible with a distinguishable error; the importer bounds
/// every call with a timeout and maps failures to per-row outcomes.
#[async_trait]
pub trait ReportStore: Send + Sync {
    /// Find the existing report whose natural key equals `key`.
    async fn find_by_natural_key(&self, key: &NaturalKey) -> Result<Option<RecordId>>;

    /// Insert a new report, returning its identifier.
    async fn insert(&self, record: &CanonicalRecord) -> Result<RecordId>;

    /// Overwrite the report `id` with `record`.
    async fn update(&self, id: &RecordId, record: &CanonicalRecord) -> Result<RecordId>;

    /// Lookup entities (categories and the like) created as a side effect of
    /// inserts and updates since the store was opened.
    async fn lookup_counts(&self) -> Result<LookupCounts> {
        Ok(LookupCounts::new())
    }
}
