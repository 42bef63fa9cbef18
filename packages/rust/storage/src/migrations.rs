//! SQL migration definitions for the ReportKit database.
//!
//! Migrations are applied in order on database open. Each migration has a
//! version number and a batch of SQL statements.

/// A database migration with a version and SQL statements.
pub(crate) struct Migration {
    pub version: u32,
    pub description: &'static str,
    pub sql: &'static str,
}

/// All migrations, in ascending version order.
pub(crate) fn all_migrations() -> Vec<Migration> {
    vec![Migration {
        version: 1,
        description: "Initial schema: reports, categories",
        sql: r#"
-- Schema version tracking
CREATE TABLE IF NOT EXISTS schema_migrations (
    version    INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- Lookup categories, created on first use by an imported report
CREATE TABLE IF NOT EXISTS categories (
    id         TEXT PRIMARY KEY,
    name       TEXT NOT NULL,
    name_key   TEXT NOT NULL UNIQUE,
    created_at TEXT NOT NULL
);

-- Reports; natural keys are stored normalized next to the display values
CREATE TABLE IF NOT EXISTS reports (
    id          TEXT PRIMARY KEY,
    title       TEXT NOT NULL,
    title_key   TEXT NOT NULL,
    report_code TEXT,
    code_key    TEXT,
    category_id TEXT REFERENCES categories(id),
    fields_json TEXT NOT NULL,
    created_at  TEXT NOT NULL,
    updated_at  TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_reports_title_key ON reports(title_key);
CREATE INDEX IF NOT EXISTS idx_reports_code_key ON reports(code_key);
CREATE INDEX IF NOT EXISTS idx_reports_category ON reports(category_id);

INSERT INTO schema_migrations (version) VALUES (1);
"#,
    }]
}
