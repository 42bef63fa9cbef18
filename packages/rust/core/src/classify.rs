//! Duplicate classification against the report store.

use tracing::debug;

use reportkit_shared::{CanonicalRecord, DuplicateMode, NaturalKey, RecordId, ReportStore, Result};

/// What to do with one record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    Insert,
    Update(RecordId),
    SkipAsDuplicate,
}

/// Apply `mode` to the result of a natural-key lookup.
pub fn classify(existing: Option<RecordId>, mode: DuplicateMode) -> Classification {
    match (existing, mode) {
        (None, _) => Classification::Insert,
        (Some(id), DuplicateMode::Update) => Classification::Update(id),
        (Some(_), DuplicateMode::Skip) => Classification::SkipAsDuplicate,
        (Some(_), DuplicateMode::Create) => Classification::Insert,
    }
}

/// Find the stored report `record` duplicates, trying its natural keys in
/// priority order (report code, then title).
pub async fn find_existing(
    store: &dyn ReportStore,
    record: &CanonicalRecord,
) -> Result<Option<(NaturalKey, RecordId)>> {
    for key in record.natural_keys() {
        if let Some(id) = store.find_by_natural_key(&key).await? {
            debug!(row = record.row, key = key.value(), %id, "natural key matched");
            return Ok(Some((key, id)));
        }
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_match_always_inserts() {
        for mode in [DuplicateMode::Update, DuplicateMode::Skip, DuplicateMode::Create] {
            assert_eq!(classify(None, mode), Classification::Insert);
        }
    }

    #[test]
    fn match_follows_mode() {
        let id = RecordId::new();
        assert_eq!(
            classify(Some(id.clone()), DuplicateMode::Update),
            Classification::Update(id.clone())
        );
        assert_eq!(
            classify(Some(id.clone()), DuplicateMode::Skip),
            Classification::SkipAsDuplicate
        );
        assert_eq!(classify(Some(id), DuplicateMode::Create), Classification::Insert);
    }
}
