//! Batch import: bytes → table → records → store.
//!
//! Whole-file problems (oversize, undecodable, empty, no title column) fail
//! the call before any row is touched. Everything after that is per row: a
//! row's failure is recorded in the report and the batch carries on.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use chrono::Utc;
use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, instrument, warn};

use reportkit_shared::{
    CanonicalRecord, DuplicateMode, ErrorKind, ImportConfig, ImportOutcome, ImportStats,
    LookupCounts, NaturalKey, ReportKitError, ReportStore, Result, RowFailure, RowWarning,
};
use reportkit_tabular::{TabularKind, read_table};

use crate::classify::{Classification, classify, find_existing};
use crate::coerce::coerce_row;
use crate::mapping::map_columns;

// ---------------------------------------------------------------------------
// Request / report
// ---------------------------------------------------------------------------

/// Input for one batch import.
#[derive(Debug, Clone)]
pub struct ImportRequest {
    pub bytes: Vec<u8>,
    pub kind: TabularKind,
    pub mode: DuplicateMode,
    pub config: ImportConfig,
}

/// What the caller gets back from a batch.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ImportReport {
    pub stats: ImportStats,
    /// Row failures in row order, at most `max_failure_details` entries.
    pub failures: Vec<RowFailure>,
    /// Soft warnings in row order.
    pub warnings: Vec<RowWarning>,
    pub unmapped_headers: Vec<String>,
    /// Lookup entities the store created, passed through as reported.
    pub lookups: LookupCounts,
}

// ---------------------------------------------------------------------------
// Progress / cancellation
// ---------------------------------------------------------------------------

/// Progress callback for reporting import status.
pub trait ProgressReporter: Send + Sync {
    /// Called when entering a new phase.
    fn phase(&self, name: &str);
    /// Called each time a row's outcome is known.
    fn row_done(&self, current: usize, total: usize);
    /// Called once the report is ready.
    fn done(&self, report: &ImportReport);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn phase(&self, _name: &str) {}
    fn row_done(&self, _current: usize, _total: usize) {}
    fn done(&self, _report: &ImportReport) {}
}

/// Shared switch that stops an import from scheduling further rows.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

/// Run a batch import against `store`.
///
/// 1. Size check, decode, column mapping (whole-file errors abort here)
/// 2. Coerce every row
/// 3. Classify and persist rows on a bounded worker pool
/// 4. Fold outcomes into the report
///
/// Rows sharing a report code or a title are handled by one worker in file
/// order, so a file that repeats a report sees its own earlier insert
/// whatever the pool size.
#[instrument(skip_all, fields(kind = ?request.kind, mode = %request.mode, len = request.bytes.len()))]
pub async fn run_import(
    request: ImportRequest,
    store: Arc<dyn ReportStore>,
    progress: &dyn ProgressReporter,
    cancel: &CancelFlag,
) -> Result<ImportReport> {
    let start = Instant::now();
    let config = &request.config;

    // --- Phase 1: Read ---
    progress.phase("Reading file");
    let table = read_table(&request.bytes, request.kind, config.max_file_bytes)?;
    let mapping = map_columns(&table.headers)?;
    debug!(fields = ?mapping.field_map(), "columns mapped");

    // --- Phase 2: Coerce ---
    progress.phase("Normalizing rows");
    let now = Utc::now();
    let mut warnings = Vec::new();
    let mut records = Vec::with_capacity(table.rows.len());
    for row in &table.rows {
        let coerced = coerce_row(row, &mapping, now);
        warnings.extend(coerced.warnings);
        records.push(coerced.record);
    }
    let total_rows = records.len();
    info!(rows = total_rows, columns = mapping.columns.len(), "rows normalized");

    // --- Phase 3: Persist ---
    progress.phase("Saving reports");
    let (outcomes, cancelled) = persist_all(records, &request, store.clone(), progress, cancel).await?;

    // --- Phase 4: Report ---
    let mut stats = ImportStats::fold(outcomes.iter().map(|(_, outcome)| outcome));
    stats.cancelled = cancelled;

    let mut failures: Vec<RowFailure> = outcomes
        .into_iter()
        .filter_map(|(_, outcome)| match outcome {
            ImportOutcome::Failed(failure) => Some(failure),
            _ => None,
        })
        .collect();
    failures.sort_by_key(|f| f.row);
    failures.truncate(config.max_failure_details);
    warnings.sort_by_key(|w| w.row);

    let lookups = match bounded("lookup counts", config.persist_timeout, store.lookup_counts()).await {
        Ok(counts) => counts,
        Err(e) => {
            warn!(error = %e, "could not read lookup counts");
            LookupCounts::new()
        }
    };

    stats.elapsed = start.elapsed();
    let report = ImportReport {
        stats,
        failures,
        warnings,
        unmapped_headers: mapping.unmapped,
        lookups,
    };

    info!(
        total = report.stats.total,
        inserted = report.stats.inserted,
        updated = report.stats.updated,
        skipped = report.stats.skipped,
        failed = report.stats.failed,
        cancelled = report.stats.cancelled,
        elapsed_ms = report.stats.elapsed.as_millis() as u64,
        "import complete"
    );
    progress.done(&report);

    Ok(report)
}

/// Schedule row groups on the worker pool and collect `(row, outcome)`
/// pairs. The flag in the result is set when cancellation cut the batch short.
async fn persist_all(
    records: Vec<CanonicalRecord>,
    request: &ImportRequest,
    store: Arc<dyn ReportStore>,
    progress: &dyn ProgressReporter,
    cancel: &CancelFlag,
) -> Result<(Vec<(usize, ImportOutcome)>, bool)> {
    let total = records.len();
    let semaphore = Arc::new(Semaphore::new(request.config.concurrency.max(1)));
    let mut set = JoinSet::new();
    let mut group_rows: HashMap<tokio::task::Id, Vec<usize>> = HashMap::new();
    let mut outcomes = Vec::with_capacity(total);
    let mut cancelled = false;

    for group in group_by_natural_key(records) {
        if cancel.is_cancelled() {
            cancelled = true;
            break;
        }

        let permit = semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|e| ReportKitError::Persistence(format!("worker pool closed: {e}")))?;

        // The wait for a permit may have been long.
        if cancel.is_cancelled() {
            cancelled = true;
            break;
        }

        let rows = group.iter().map(|r| r.row).collect();
        let store = store.clone();
        let cancel = cancel.clone();
        let mode = request.mode;
        let budget = request.config.persist_timeout;
        let handle = set.spawn(async move {
            let _permit = permit;
            let mut done = Vec::with_capacity(group.len());
            for (i, record) in group.iter().enumerate() {
                // The first row of a scheduled group always runs.
                if i > 0 && cancel.is_cancelled() {
                    break;
                }
                let outcome = process_row(store.as_ref(), record, mode, budget).await;
                done.push((record.row, outcome));
            }
            done
        });
        group_rows.insert(handle.id(), rows);

        while let Some(joined) = set.try_join_next_with_id() {
            record_joined(joined, &mut group_rows, &mut outcomes, progress, total);
        }
    }

    while let Some(joined) = set.join_next_with_id().await {
        record_joined(joined, &mut group_rows, &mut outcomes, progress, total);
    }

    if cancelled || outcomes.len() < total {
        cancelled = true;
        warn!(processed = outcomes.len(), total, "import cancelled");
    }
    Ok((outcomes, cancelled))
}

type Joined = std::result::Result<(tokio::task::Id, Vec<(usize, ImportOutcome)>), tokio::task::JoinError>;

fn record_joined(
    joined: Joined,
    group_rows: &mut HashMap<tokio::task::Id, Vec<usize>>,
    outcomes: &mut Vec<(usize, ImportOutcome)>,
    progress: &dyn ProgressReporter,
    total: usize,
) {
    match joined {
        Ok((id, done)) => {
            group_rows.remove(&id);
            for entry in done {
                outcomes.push(entry);
                progress.row_done(outcomes.len(), total);
            }
        }
        Err(e) => {
            // A panicked worker fails every row it owned.
            let rows = group_rows.remove(&e.id()).unwrap_or_default();
            warn!(error = %e, rows = ?rows, "import worker failed");
            for row in rows {
                let failure = RowFailure::new(row, ErrorKind::Persistence, format!("worker failed: {e}"));
                outcomes.push((row, ImportOutcome::Failed(failure)));
                progress.row_done(outcomes.len(), total);
            }
        }
    }
}

/// Group records that share any natural key, groups ordered by their first
/// row and records in file order within a group.
///
/// Keys chain: a row matching one row by code and another by title joins
/// both into one group. Rows without a title are never looked up and stay
/// alone.
fn group_by_natural_key(records: Vec<CanonicalRecord>) -> Vec<Vec<CanonicalRecord>> {
    let mut parent: Vec<usize> = (0..records.len()).collect();
    let mut first_seen: HashMap<NaturalKey, usize> = HashMap::new();

    for (i, record) in records.iter().enumerate() {
        if record.title().is_none() {
            continue;
        }
        for key in record.natural_keys() {
            match first_seen.entry(key) {
                Entry::Occupied(seen) => union(&mut parent, *seen.get(), i),
                Entry::Vacant(slot) => {
                    slot.insert(i);
                }
            }
        }
    }

    let mut group_of_root: HashMap<usize, usize> = HashMap::new();
    let mut groups: Vec<Vec<CanonicalRecord>> = Vec::new();
    for (i, record) in records.into_iter().enumerate() {
        let root = find_root(&mut parent, i);
        let at = *group_of_root.entry(root).or_insert_with(|| {
            groups.push(Vec::new());
            groups.len() - 1
        });
        groups[at].push(record);
    }
    groups
}

fn find_root(parent: &mut [usize], mut i: usize) -> usize {
    while parent[i] != i {
        parent[i] = parent[parent[i]];
        i = parent[i];
    }
    i
}

/// Join the sets of `a` and `b`; the lower index becomes the root.
fn union(parent: &mut [usize], a: usize, b: usize) {
    let (ra, rb) = (find_root(parent, a), find_root(parent, b));
    if ra != rb {
        parent[ra.max(rb)] = ra.min(rb);
    }
}

/// Classify and persist one record. Never fails; problems become outcomes.
async fn process_row(
    store: &dyn ReportStore,
    record: &CanonicalRecord,
    mode: DuplicateMode,
    budget: Duration,
) -> ImportOutcome {
    let row = record.row;
    if record.title().is_none() {
        debug!(row, "row has no title, skipping");
        return ImportOutcome::Skipped {
            reason: "title is blank".into(),
        };
    }

    let existing = match bounded("natural key lookup", budget, find_existing(store, record)).await {
        Ok(found) => found,
        Err(e) => {
            let kind = match &e {
                ReportKitError::Timeout { .. } => ErrorKind::Timeout,
                _ => ErrorKind::Lookup,
            };
            return failed(row, kind, &e);
        }
    };

    let (matched_key, existing_id) = match existing {
        Some((key, id)) => (Some(key), Some(id)),
        None => (None, None),
    };

    match classify(existing_id, mode) {
        Classification::SkipAsDuplicate => {
            let reason = match matched_key {
                Some(key) => format!("duplicate of an existing report ({})", key.value()),
                None => "duplicate of an existing report".into(),
            };
            debug!(row, %reason, "row skipped");
            ImportOutcome::Skipped { reason }
        }
        Classification::Insert => match bounded("insert", budget, store.insert(record)).await {
            Ok(id) => ImportOutcome::Inserted { id },
            Err(e) => failed(row, e.row_kind(), &e),
        },
        Classification::Update(id) => {
            match bounded("update", budget, store.update(&id, record)).await {
                Ok(id) => ImportOutcome::Updated { id },
                Err(e) => failed(row, e.row_kind(), &e),
            }
        }
    }
}

fn failed(row: usize, kind: ErrorKind, error: &ReportKitError) -> ImportOutcome {
    warn!(row, kind = %kind, error = %error, "row failed");
    ImportOutcome::Failed(RowFailure::new(row, kind, error.to_string()))
}

/// Run `fut` with a time budget; overrunning is a `Timeout` error.
async fn bounded<T>(
    operation: &str,
    budget: Duration,
    fut: impl Future<Output = Result<T>>,
) -> Result<T> {
    match tokio::time::timeout(budget, fut).await {
        Ok(result) => result,
        Err(_) => Err(ReportKitError::Timeout {
            operation: operation.to_string(),
            millis: budget.as_millis() as u64,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reportkit_shared::{FieldValue, NaturalKey, field};
    use reportkit_storage::MemoryStore;
    use std::sync::Mutex;

    fn request(csv: &str, mode: DuplicateMode) -> ImportRequest {
        ImportRequest {
            bytes: csv.as_bytes().to_vec(),
            kind: TabularKind::Delimited,
            mode,
            config: ImportConfig::default(),
        }
    }

    fn seeded(title: &str) -> CanonicalRecord {
        let mut record = CanonicalRecord::new(0);
        record.insert(field::TITLE, FieldValue::Text(title.into()));
        record
    }

    async fn run(req: ImportRequest, store: Arc<MemoryStore>) -> Result<ImportReport> {
        run_import(req, store, &SilentProgress, &CancelFlag::new()).await
    }

    #[tokio::test]
    async fn bad_date_is_a_warning_not_a_failure() {
        let csv = "Title,Published Date\n\
                   Alpha Report,2024-01-01\n\
                   Beta Report,not a date\n\
                   Gamma Report,2024-03-01\n";
        let store = Arc::new(MemoryStore::new());
        let report = run(request(csv, DuplicateMode::Update), store.clone()).await.unwrap();

        assert_eq!(report.stats.total, 3);
        assert_eq!(report.stats.inserted + report.stats.updated, 3);
        assert_eq!(report.stats.failed, 0);
        assert_eq!(report.warnings.len(), 1);
        assert_eq!(report.warnings[0].row, 3);
        assert_eq!(report.warnings[0].field, "publishedDate");
        assert_eq!(store.len(), 3);
    }

    #[tokio::test]
    async fn skip_mode_skips_existing_title() {
        let store = Arc::new(MemoryStore::new());
        store.insert(&seeded("Widget Market")).await.unwrap();

        let csv = "Report Title,Author\n  WIDGET market ,Sam\nNew Report,Ari\n";
        let report = run(request(csv, DuplicateMode::Skip), store.clone()).await.unwrap();

        assert_eq!(report.stats.skipped, 1);
        assert_eq!(report.stats.inserted, 1);
        assert_eq!(report.stats.updated, 0);
        assert_eq!(store.len(), 2);
    }

    #[tokio::test]
    async fn update_and_create_modes() {
        let store = Arc::new(MemoryStore::new());
        let id = store.insert(&seeded("Widget Market")).await.unwrap();

        let csv = "Title,Pages\nWidget Market,300\n";
        let report = run(request(csv, DuplicateMode::Update), store.clone()).await.unwrap();
        assert_eq!(report.stats.updated, 1);
        let stored = store.get(&id).unwrap();
        assert_eq!(stored.get("pages"), Some(&FieldValue::Integer(300)));

        let report = run(request(csv, DuplicateMode::Create), store.clone()).await.unwrap();
        assert_eq!(report.stats.inserted, 1);
        assert_eq!(store.len(), 2);
    }

    #[tokio::test]
    async fn report_code_matches_before_title() {
        let store = Arc::new(MemoryStore::new());
        let mut existing = seeded("Old Name");
        existing.insert(field::REPORT_CODE, FieldValue::Text("RK-7".into()));
        let id = store.insert(&existing).await.unwrap();

        let csv = "Title,Report Code\nBrand New Name,rk-7\n";
        let report = run(request(csv, DuplicateMode::Update), store.clone()).await.unwrap();
        assert_eq!(report.stats.updated, 1);
        assert_eq!(store.get(&id).unwrap().title(), Some("Brand New Name"));
        assert_eq!(
            store.find_by_natural_key(&NaturalKey::Title("old name".into())).await.unwrap(),
            None
        );
    }

    #[tokio::test]
    async fn repeated_title_in_one_file_updates_its_own_insert() {
        let store = Arc::new(MemoryStore::new());
        let csv = "Title,Pages\nWidgets,10\nGadgets,20\nwidgets,30\n";
        let report = run(request(csv, DuplicateMode::Update), store.clone()).await.unwrap();

        assert_eq!(report.stats.inserted, 2);
        assert_eq!(report.stats.updated, 1);
        assert_eq!(store.len(), 2);
    }

    #[tokio::test]
    async fn persistence_failure_isolated_to_its_row() {
        let store = Arc::new(MemoryStore::new().with_failing_title("Broken Report"));
        let csv = "Title\nFine One\nBroken Report\nFine Two\n";
        let report = run(request(csv, DuplicateMode::Update), store.clone()).await.unwrap();

        assert_eq!(report.stats.total, 3);
        assert_eq!(report.stats.inserted, 2);
        assert_eq!(report.stats.failed, 1);
        assert_eq!(report.failures[0].row, 3);
        assert_eq!(report.failures[0].kind, ErrorKind::Persistence);
    }

    #[tokio::test]
    async fn slow_store_times_out_per_row() {
        let store = Arc::new(MemoryStore::new().with_delay(Duration::from_millis(200)));
        let mut req = request("Title\nSlow One\nSlow Two\n", DuplicateMode::Update);
        req.config.persist_timeout = Duration::from_millis(20);

        let report = run(req, store).await.unwrap();
        assert_eq!(report.stats.total, 2);
        assert_eq!(report.stats.failed, 2);
        assert!(report.failures.iter().all(|f| f.kind == ErrorKind::Timeout));
        assert_eq!(
            report.failures.iter().map(|f| f.row).collect::<Vec<_>>(),
            [2, 3]
        );
    }

    #[tokio::test]
    async fn failure_list_is_bounded_but_counted() {
        let store = Arc::new(MemoryStore::new().failing());
        let mut req = request("Title\nA\nB\nC\nD\n", DuplicateMode::Update);
        req.config.max_failure_details = 2;

        let report = run(req, store).await.unwrap();
        assert_eq!(report.stats.failed, 4);
        assert_eq!(report.failures.len(), 2);
        assert_eq!(report.failures[0].row, 2);
        assert_eq!(report.failures[1].row, 3);
    }

    #[tokio::test]
    async fn whole_file_errors_abort() {
        let store = Arc::new(MemoryStore::new());

        let err = run(request("Title\n", DuplicateMode::Update), store.clone())
            .await
            .unwrap_err();
        assert!(matches!(err, ReportKitError::EmptyFile));

        let err = run(request("Author\nSam\n", DuplicateMode::Update), store.clone())
            .await
            .unwrap_err();
        assert!(matches!(err, ReportKitError::MissingRequiredField { .. }));

        let mut req = request("Title\nA\n", DuplicateMode::Update);
        req.config.max_file_bytes = 4;
        let err = run(req, store.clone()).await.unwrap_err();
        assert!(matches!(err, ReportKitError::OversizeFile { .. }));
        assert_eq!(store.len(), 0);
    }

    #[tokio::test]
    async fn cancelled_before_start_schedules_nothing() {
        let store = Arc::new(MemoryStore::new());
        let cancel = CancelFlag::new();
        cancel.cancel();

        let report = run_import(
            request("Title\nA\nB\n", DuplicateMode::Update),
            store.clone(),
            &SilentProgress,
            &cancel,
        )
        .await
        .unwrap();
        assert!(report.stats.cancelled);
        assert_eq!(report.stats.total, 0);
        assert_eq!(store.len(), 0);
    }

    #[tokio::test]
    async fn blank_title_rows_are_skipped() {
        let store = Arc::new(MemoryStore::new());
        let csv = "Title,Author\n,Sam\nReal Report,Ari\n";
        let report = run(request(csv, DuplicateMode::Update), store).await.unwrap();
        assert_eq!(report.stats.skipped, 1);
        assert_eq!(report.stats.inserted, 1);
    }

    #[tokio::test]
    async fn categories_created_are_reported() {
        let store = Arc::new(MemoryStore::new());
        let csv = "Title,Category\nA,Energy\nB,energy\nC,Healthcare\n";
        let report = run(request(csv, DuplicateMode::Update), store).await.unwrap();
        assert_eq!(report.lookups.get("categories"), Some(&2));
    }

    #[tokio::test]
    async fn sample_fixture_imports() {
        let store = Arc::new(MemoryStore::new());
        let req = ImportRequest {
            bytes: include_bytes!("../../../../fixtures/reports.csv").to_vec(),
            ..request("", DuplicateMode::Update)
        };
        let report = run(req, store.clone()).await.unwrap();

        assert_eq!(report.stats.total, 5);
        assert_eq!(report.stats.inserted, 3);
        assert_eq!(report.stats.updated, 1);
        assert_eq!(report.stats.skipped, 1);
        assert_eq!(report.stats.failed, 0);
        assert_eq!(report.unmapped_headers, ["Internal Notes"]);
        assert_eq!(report.lookups.get("categories"), Some(&2));

        assert_eq!(report.warnings.len(), 1);
        assert_eq!(report.warnings[0].row, 3);
        assert_eq!(report.warnings[0].field, "publishedDate");

        let id = store
            .find_by_natural_key(&NaturalKey::ReportCode("ow-1180".into()))
            .await
            .unwrap()
            .unwrap();
        let stored = store.get(&id).unwrap();
        let description = stored.text("reportDescription").unwrap();
        assert!(description.contains("<strong>lags</strong>"));
        assert!(!description.contains("script"));
        assert_eq!(stored.get("enterprisePrice"), Some(&FieldValue::Money(7500.0)));
    }

    #[tokio::test]
    async fn shared_report_code_is_one_report_at_any_pool_size() {
        let csv = "Title,Report Code\nWidget Market,RK-1\nWidget Market Renamed,rk-1\n";
        for concurrency in [1, 4] {
            let store = Arc::new(MemoryStore::new().with_delay(Duration::from_millis(20)));
            let mut req = request(csv, DuplicateMode::Update);
            req.config.concurrency = concurrency;

            let report = run(req, store.clone()).await.unwrap();
            assert_eq!(report.stats.inserted, 1, "concurrency {concurrency}");
            assert_eq!(report.stats.updated, 1, "concurrency {concurrency}");
            assert_eq!(store.len(), 1, "concurrency {concurrency}");
        }
    }

    #[test]
    fn grouping_chains_code_and_title_matches() {
        let row = |n: usize, title: &str, code: Option<&str>| {
            let mut record = CanonicalRecord::new(n);
            record.insert(field::TITLE, FieldValue::Text(title.into()));
            if let Some(code) = code {
                record.insert(field::REPORT_CODE, FieldValue::Text(code.into()));
            }
            record
        };
        let groups = group_by_natural_key(vec![
            row(2, "Alpha", Some("A-1")),
            row(3, "Beta", None),
            row(4, "Alpha Renamed", Some("a-1")),
            row(5, "alpha renamed", Some("Z-9")),
            row(6, "", Some("A-1")),
        ]);

        let rows: Vec<Vec<usize>> = groups
            .iter()
            .map(|g| g.iter().map(|r| r.row).collect())
            .collect();
        assert_eq!(rows, [vec![2, 4, 5], vec![3], vec![6]]);
    }

    struct CancelOnFirstRow {
        cancel: CancelFlag,
        cancelled_at: Mutex<Option<usize>>,
    }

    impl ProgressReporter for CancelOnFirstRow {
        fn phase(&self, _name: &str) {}
        fn row_done(&self, current: usize, _total: usize) {
            let mut at = self.cancelled_at.lock().unwrap();
            if at.is_none() {
                *at = Some(current);
                self.cancel.cancel();
            }
        }
        fn done(&self, _report: &ImportReport) {}
    }

    #[tokio::test]
    async fn cancel_mid_batch_counts_rows_in_flight() {
        let store = Arc::new(MemoryStore::new().with_delay(Duration::from_millis(20)));
        let mut req = request("Title\nA\nB\nC\nD\nE\nF\n", DuplicateMode::Update);
        req.config.concurrency = 1;

        let cancel = CancelFlag::new();
        let reporter = CancelOnFirstRow {
            cancel: cancel.clone(),
            cancelled_at: Mutex::new(None),
        };
        let report = run_import(req, store.clone(), &reporter, &cancel).await.unwrap();

        assert!(report.stats.cancelled);
        assert_eq!(reporter.cancelled_at.lock().unwrap().as_ref(), Some(&1));
        // Rows already scheduled finish and are counted; nothing starts after.
        assert!(report.stats.total > 0);
        assert!(report.stats.total < 6, "total {}", report.stats.total);
        assert_eq!(report.stats.inserted, report.stats.total);
        assert_eq!(store.len(), report.stats.total);
        assert_eq!(
            store.find_by_natural_key(&NaturalKey::Title("f".into())).await.unwrap(),
            None
        );
    }

    struct Recorder(Mutex<Vec<String>>);

    impl ProgressReporter for Recorder {
        fn phase(&self, name: &str) {
            self.0.lock().unwrap().push(name.to_string());
        }
        fn row_done(&self, current: usize, total: usize) {
            self.0.lock().unwrap().push(format!("{current}/{total}"));
        }
        fn done(&self, report: &ImportReport) {
            self.0.lock().unwrap().push(format!("done {}", report.stats.total));
        }
    }

    #[tokio::test]
    async fn progress_sees_every_row() {
        let store = Arc::new(MemoryStore::new());
        let recorder = Recorder(Mutex::new(Vec::new()));
        run_import(
            request("Title\nA\nB\n", DuplicateMode::Update),
            store,
            &recorder,
            &CancelFlag::new(),
        )
        .await
        .unwrap();

        let events = recorder.0.into_inner().unwrap();
        assert!(events.contains(&"1/2".to_string()));
        assert!(events.contains(&"2/2".to_string()));
        assert_eq!(events.last().map(String::as_str), Some("done 2"));
    }
}
