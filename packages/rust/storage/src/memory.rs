//! In-memory report store for dry runs and tests.

use std::collections::HashSet;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use reportkit_shared::{
    CanonicalRecord, LookupCounts, NaturalKey, RecordId, ReportKitError, ReportStore, Result,
    field, normalize_key,
};

use crate::CATEGORIES;

/// A [`ReportStore`] backed by in-process maps.
///
/// Optional knobs simulate a slow or unreliable backend: a delay before
/// every call, a global failure switch, and per-title write failures.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
    delay: Option<Duration>,
    failing: AtomicBool,
    failing_titles: HashSet<String>,
}

#[derive(Default)]
struct Inner {
    /// Reports in insertion order.
    reports: Vec<(RecordId, CanonicalRecord)>,
    categories: HashSet<String>,
    categories_created: usize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sleep for `delay` before answering any call.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Make every call fail.
    pub fn failing(self) -> Self {
        self.set_failing(true);
        self
    }

    /// Fail inserts and updates of reports titled `title`.
    pub fn with_failing_title(mut self, title: &str) -> Self {
        self.failing_titles.insert(normalize_key(title));
        self
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Number of stored reports.
    pub fn len(&self) -> usize {
        self.lock().map(|inner| inner.reports.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// A stored report by id.
    pub fn get(&self, id: &RecordId) -> Option<CanonicalRecord> {
        let inner = self.lock().ok()?;
        inner
            .reports
            .iter()
            .find(|(stored, _)| stored == id)
            .map(|(_, record)| record.clone())
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Inner>> {
        self.inner
            .lock()
            .map_err(|_| ReportKitError::Persistence("memory store lock poisoned".into()))
    }

    async fn before_call(&self, operation: &str) -> Result<()> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(ReportKitError::Persistence(format!(
                "{operation} rejected by store"
            )));
        }
        Ok(())
    }

    fn check_writable(&self, record: &CanonicalRecord) -> Result<()> {
        let title = record
            .title()
            .ok_or_else(|| ReportKitError::Persistence("report has no title".into()))?;
        if self.failing_titles.contains(&normalize_key(title)) {
            return Err(ReportKitError::Persistence(format!(
                "write of '{title}' rejected by store"
            )));
        }
        Ok(())
    }
}

impl Inner {
    fn note_category(&mut self, record: &CanonicalRecord) {
        let Some(name) = record.text(field::CATEGORY) else {
            return;
        };
        if self.categories.insert(normalize_key(name)) {
            self.categories_created += 1;
            debug!(category = name, "category created");
        }
    }
}

fn key_of(record: &CanonicalRecord, key: &NaturalKey) -> Option<String> {
    let raw = match key {
        NaturalKey::ReportCode(_) => record.text(field::REPORT_CODE),
        NaturalKey::Title(_) => record.title(),
    };
    raw.map(normalize_key)
}

#[async_trait]
impl ReportStore for MemoryStore {
    async fn find_by_natural_key(&self, key: &NaturalKey) -> Result<Option<RecordId>> {
        self.before_call("lookup").await?;
        let inner = self.lock()?;
        Ok(inner
            .reports
            .iter()
            .find(|(_, record)| key_of(record, key).as_deref() == Some(key.value()))
            .map(|(id, _)| id.clone()))
    }

    async fn insert(&self, record: &CanonicalRecord) -> Result<RecordId> {
        self.before_call("insert").await?;
        self.check_writable(record)?;

        let id = RecordId::new();
        let mut inner = self.lock()?;
        inner.note_category(record);
        inner.reports.push((id.clone(), record.clone()));
        debug!(%id, "report inserted");
        Ok(id)
    }

    async fn update(&self, id: &RecordId, record: &CanonicalRecord) -> Result<RecordId> {
        self.before_call("update").await?;
        self.check_writable(record)?;

        let mut inner = self.lock()?;
        let at = inner
            .reports
            .iter()
            .position(|(stored, _)| stored == id)
            .ok_or_else(|| ReportKitError::Persistence(format!("report {id} not found")))?;
        inner.note_category(record);
        inner.reports[at].1 = record.clone();
        debug!(%id, "report updated");
        Ok(id.clone())
    }

    async fn lookup_counts(&self) -> Result<LookupCounts> {
        self.before_call("lookup counts").await?;
        let inner = self.lock()?;
        Ok(LookupCounts::from([(
            CATEGORIES.to_string(),
            inner.categories_created,
        )]))
    }
}
