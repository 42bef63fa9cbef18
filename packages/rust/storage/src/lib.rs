//! Report stores.
//!
//! Two [`ReportStore`] implementations:
//! - [`Storage`]: Turso Embedded / libSQL database (offline mode)
//! - [`MemoryStore`]: in-process maps, for tests and dry runs
//!
//! Both create categories on first use and count them for the import report.

mod memory;
mod migrations;

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use libsql::{Connection, Database, params};
use tokio::sync::{Mutex, MutexGuard};
use uuid::Uuid;

use reportkit_shared::{
    CanonicalRecord, LookupCounts, NaturalKey, RecordId, ReportKitError, ReportStore, Result,
    field, normalize_key,
};

pub use memory::MemoryStore;

/// Key under which created categories are reported in [`LookupCounts`].
pub const CATEGORIES: &str = "categories";

/// Primary storage handle wrapping a libSQL database.
pub struct Storage {
    #[allow(dead_code)]
    db: Database,
    conn: Connection,
    /// Serializes writes so category creation and report writes interleave
    /// cleanly across import workers.
    write_lock: Mutex<()>,
    categories_created: AtomicUsize,
}

impl Storage {
    /// Open or create a database at `path` and apply pending migrations.
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ReportKitError::io(parent, e))?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(storage_err)?;
        let conn = db.connect().map_err(storage_err)?;

        let storage = Self {
            db,
            conn,
            write_lock: Mutex::new(()),
            categories_created: AtomicUsize::new(0),
        };
        storage.run_migrations().await?;
        Ok(storage)
    }

    /// Run pending schema migrations.
    async fn run_migrations(&self) -> Result<()> {
        let current_version = self.get_schema_version().await;

        for migration in migrations::all_migrations() {
            if migration.version > current_version {
                tracing::info!(
                    version = migration.version,
                    description = migration.description,
                    "applying migration"
                );
                self.conn
                    .execute_batch(migration.sql)
                    .await
                    .map_err(|e| {
                        ReportKitError::Storage(format!(
                            "migration v{} failed: {e}",
                            migration.version
                        ))
                    })?;
            }
        }
        Ok(())
    }

    /// Current schema version, or 0 if no migrations have been applied.
    async fn get_schema_version(&self) -> u32 {
        let result = self
            .conn
            .query("SELECT MAX(version) FROM schema_migrations", params![])
            .await;

        match result {
            Ok(mut rows) => match rows.next().await {
                Ok(Some(row)) => row.get::<u32>(0).unwrap_or(0),
                _ => 0,
            },
            Err(_) => 0, // Table doesn't exist yet
        }
    }

    // -----------------------------------------------------------------------
    // Reads
    // -----------------------------------------------------------------------

    /// Load a stored report's fields.
    pub async fn get(&self, id: &RecordId) -> Result<Option<CanonicalRecord>> {
        let mut rows = self
            .conn
            .query(
                "SELECT fields_json FROM reports WHERE id = ?1",
                params![id.to_string()],
            )
            .await
            .map_err(storage_err)?;

        match rows.next().await.map_err(storage_err)? {
            Some(row) => {
                let json = row.get::<String>(0).map_err(storage_err)?;
                let fields = serde_json::from_str(&json)
                    .map_err(|e| ReportKitError::Storage(format!("corrupt fields for {id}: {e}")))?;
                Ok(Some(CanonicalRecord { row: 0, fields }))
            }
            None => Ok(None),
        }
    }

    /// Number of stored reports.
    pub async fn count_reports(&self) -> Result<u64> {
        self.count("SELECT COUNT(*) FROM reports").await
    }

    /// Number of stored categories.
    pub async fn count_categories(&self) -> Result<u64> {
        self.count("SELECT COUNT(*) FROM categories").await
    }

    async fn count(&self, sql: &str) -> Result<u64> {
        let mut rows = self.conn.query(sql, params![]).await.map_err(storage_err)?;
        match rows.next().await.map_err(storage_err)? {
            Some(row) => row.get::<i64>(0).map(|n| n as u64).map_err(storage_err),
            None => Ok(0),
        }
    }

    async fn find_id(&self, sql: &str, key: &str) -> Result<Option<RecordId>> {
        let mut rows = self
            .conn
            .query(sql, params![key])
            .await
            .map_err(storage_err)?;

        match rows.next().await.map_err(storage_err)? {
            Some(row) => {
                let id = row.get::<String>(0).map_err(storage_err)?;
                let id = id
                    .parse()
                    .map_err(|e| ReportKitError::Storage(format!("bad report id '{id}': {e}")))?;
                Ok(Some(id))
            }
            None => Ok(None),
        }
    }

    // -----------------------------------------------------------------------
    // Writes
    // -----------------------------------------------------------------------

    /// Take the write lock and open a transaction for one report write.
    async fn begin(&self) -> Result<MutexGuard<'_, ()>> {
        let guard = self.write_lock.lock().await;
        self.conn
            .execute("BEGIN IMMEDIATE", ())
            .await
            .map_err(storage_err)?;
        Ok(guard)
    }

    /// Commit a successful write or roll a failed one back. `written` says
    /// whether a category was created; the count only moves on commit.
    async fn finish(&self, written: Result<bool>) -> Result<()> {
        match written {
            Ok(category_created) => {
                self.conn.execute("COMMIT", ()).await.map_err(storage_err)?;
                if category_created {
                    self.categories_created.fetch_add(1, Ordering::SeqCst);
                }
                Ok(())
            }
            Err(e) => {
                if let Err(rollback) = self.conn.execute("ROLLBACK", ()).await {
                    tracing::warn!(error = %rollback, "rollback failed");
                }
                Err(e)
            }
        }
    }

    async fn insert_row(
        &self,
        id: &RecordId,
        row: &StoredRow,
        record: &CanonicalRecord,
    ) -> Result<bool> {
        let (category_id, created) = category_id(&self.conn, record).await?;
        let now = Utc::now().to_rfc3339();
        self.conn
            .execute(
                "INSERT INTO reports
                 (id, title, title_key, report_code, code_key, category_id, fields_json, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    id.to_string(),
                    row.title.as_str(),
                    row.title_key.as_str(),
                    row.code.as_deref(),
                    row.code_key.as_deref(),
                    category_id.as_deref(),
                    row.fields_json.as_str(),
                    now.as_str(),
                    now.as_str()
                ],
            )
            .await
            .map_err(storage_err)?;
        Ok(created)
    }

    async fn update_row(
        &self,
        id: &RecordId,
        row: &StoredRow,
        record: &CanonicalRecord,
    ) -> Result<bool> {
        let (category_id, created) = category_id(&self.conn, record).await?;
        let changed = self
            .conn
            .execute(
                "UPDATE reports SET title = ?2, title_key = ?3, report_code = ?4, code_key = ?5,
                 category_id = ?6, fields_json = ?7, updated_at = ?8
                 WHERE id = ?1",
                params![
                    id.to_string(),
                    row.title.as_str(),
                    row.title_key.as_str(),
                    row.code.as_deref(),
                    row.code_key.as_deref(),
                    category_id.as_deref(),
                    row.fields_json.as_str(),
                    Utc::now().to_rfc3339()
                ],
            )
            .await
            .map_err(storage_err)?;

        if changed == 0 {
            return Err(ReportKitError::Persistence(format!("report {id} not found")));
        }
        Ok(created)
    }
}

/// Find or create the category named `name`. Returns its id and whether it
/// was created by this call.
async fn ensure_category(conn: &Connection, name: &str) -> Result<(String, bool)> {
    let key = normalize_key(name);
    let inserted = conn
        .execute(
            "INSERT OR IGNORE INTO categories (id, name, name_key, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                Uuid::now_v7().to_string(),
                name.trim(),
                key.as_str(),
                Utc::now().to_rfc3339()
            ],
        )
        .await
        .map_err(storage_err)?;

    let mut rows = conn
        .query(
            "SELECT id FROM categories WHERE name_key = ?1",
            params![key.as_str()],
        )
        .await
        .map_err(storage_err)?;
    match rows.next().await.map_err(storage_err)? {
        Some(row) => {
            let id = row.get::<String>(0).map_err(storage_err)?;
            if inserted > 0 {
                tracing::debug!(category = name.trim(), "category created");
            }
            Ok((id, inserted > 0))
        }
        None => Err(ReportKitError::Storage(format!(
            "category '{name}' vanished after insert"
        ))),
    }
}

async fn category_id(
    conn: &Connection,
    record: &CanonicalRecord,
) -> Result<(Option<String>, bool)> {
    match record.text(field::CATEGORY) {
        Some(name) => {
            let (id, created) = ensure_category(conn, name).await?;
            Ok((Some(id), created))
        }
        None => Ok((None, false)),
    }
}

#[async_trait]
impl ReportStore for Storage {
    async fn find_by_natural_key(&self, key: &NaturalKey) -> Result<Option<RecordId>> {
        let sql = match key {
            NaturalKey::ReportCode(_) => {
                "SELECT id FROM reports WHERE code_key = ?1 ORDER BY created_at LIMIT 1"
            }
            NaturalKey::Title(_) => {
                "SELECT id FROM reports WHERE title_key = ?1 ORDER BY created_at LIMIT 1"
            }
        };
        self.find_id(sql, key.value()).await
    }

    async fn insert(&self, record: &CanonicalRecord) -> Result<RecordId> {
        let row = StoredRow::from_record(record)?;
        let id = RecordId::new();

        let _guard = self.begin().await?;
        let written = self.insert_row(&id, &row, record).await;
        self.finish(written).await?;

        tracing::debug!(%id, title = %row.title, "report inserted");
        Ok(id)
    }

    async fn update(&self, id: &RecordId, record: &CanonicalRecord) -> Result<RecordId> {
        let row = StoredRow::from_record(record)?;

        let _guard = self.begin().await?;
        let written = self.update_row(id, &row, record).await;
        self.finish(written).await?;

        tracing::debug!(%id, title = %row.title, "report updated");
        Ok(id.clone())
    }

    async fn lookup_counts(&self) -> Result<LookupCounts> {
        Ok(LookupCounts::from([(
            CATEGORIES.to_string(),
            self.categories_created.load(Ordering::SeqCst),
        )]))
    }
}

/// Column values derived from a record.
struct StoredRow {
    title: String,
    title_key: String,
    code: Option<String>,
    code_key: Option<String>,
    fields_json: String,
}

impl StoredRow {
    fn from_record(record: &CanonicalRecord) -> Result<Self> {
        let title = record
            .title()
            .ok_or_else(|| ReportKitError::Persistence("report has no title".into()))?;
        let code = record.text(field::REPORT_CODE);
        let fields_json = serde_json::to_string(&record.fields)
            .map_err(|e| ReportKitError::Storage(format!("cannot encode fields: {e}")))?;

        Ok(Self {
            title: title.to_string(),
            title_key: normalize_key(title),
            code: code.map(str::to_string),
            code_key: code.map(normalize_key),
            fields_json,
        })
    }
}

fn storage_err(e: libsql::Error) -> ReportKitError {
    ReportKitError::Storage(e.to_string())
}
