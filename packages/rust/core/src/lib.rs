//! Core import pipeline for ReportKit.
//!
//! Ties the tabular reader and the markup sanitizer together with column
//! mapping, value coercion and duplicate classification into a batch import
//! (`run_import`) against any [`reportkit_shared::ReportStore`].

pub mod classify;
pub mod coerce;
pub mod import;
pub mod mapping;
pub mod template;

pub use classify::{Classification, classify, find_existing};
pub use coerce::{CoercedRow, coerce_row, coerce_value};
pub use import::{
    CancelFlag, ImportReport, ImportRequest, ProgressReporter, SilentProgress, run_import,
};
pub use mapping::{CATALOGUE, ColumnMapping, FieldKind, FieldSpec, MappedColumn, map_columns};
pub use template::write_template;
