//! Table-driven reconciliation between entity tables and their sheets.
//!
//! One [`SyncEngine`] serves every entity; the per-entity differences live in
//! the [`EntityDescriptor`](crate::registry::EntityDescriptor) it is handed.

pub mod diagnostics;
pub mod engine;
pub mod result;

pub use diagnostics::{FieldDifference, RecordComparison, SheetHeaders};
pub use engine::{external_id, SyncEngine, SyncError, SyncOptions, SyncStatus};
pub use result::{FullMigrationReport, IssueKind, PassOutcome, RecordIssue, SyncReport, SyncResult};
