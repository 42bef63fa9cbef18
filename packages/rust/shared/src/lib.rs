//! Shared types, error model, and configuration for ReportKit.
//!
//! This crate is the foundation depended on by all other ReportKit crates.
//! It provides:
//! - [`ReportKitError`], the unified error type
//! - Domain types ([`CanonicalRecord`], [`ImportOutcome`], [`ImportStats`], [`DuplicateMode`])
//! - The [`ReportStore`] persistence collaborator trait
//! - Configuration ([`AppConfig`], [`ImportConfig`], config loading)

pub mod config;
pub mod error;
pub mod store;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, DEFAULT_MAX_FILE_BYTES, ImportConfig, ImportSection, StorageSection, config_dir,
    config_file_path, expand_home, init_config, load_config, load_config_from,
};
pub use error::{ErrorKind, ReportKitError, Result};
pub use store::ReportStore;
pub use types::{
    CanonicalRecord, DuplicateMode, FieldValue, ImportOutcome, ImportStats, LookupCounts,
    NaturalKey, RecordId, RowFailure, RowWarning, WarningKind, field, normalize_key,
};
