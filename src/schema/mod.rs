//! PostgreSQL schema script import.
//!
//! Scripts are split into statements, classified, rewritten through the
//! fixed schema rules plus one rule per declared enum, and executed against a
//! [`SchemaTarget`] inside a single transaction.

pub mod enums;
pub mod importer;
pub mod loader;

pub use enums::{EnumRegistry, EnumType};
pub use importer::{
    classify, statement_summary, FailureKind, ImportReport, SchemaImporter, SchemaTarget,
    StatementFailure, StatementKind,
};
pub use loader::{load_statements, split_statements};
