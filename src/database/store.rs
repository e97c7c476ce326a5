use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use super::record::{InternalRecord, NewRecord, RecordUpdate};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Record not found: {0}")]
    NotFound(Uuid),

    #[error("A record with sheet id '{0}' already exists")]
    DuplicateSheetId(String),

    #[error("Invalid table name: {0}")]
    InvalidTable(String),

    #[error("Query error: {0}")]
    QueryError(String),

    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

/// Persistence for one entity table.
///
/// `find_all` and `find_unsynced` return newest records first.
/// `sheet_id` is unique per table; inserting a duplicate fails with
/// [`StoreError::DuplicateSheetId`].
#[async_trait]
pub trait RecordStore: Send + Sync {
    fn table(&self) -> &str;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<InternalRecord>, StoreError>;

    async fn find_by_sheet_id(&self, sheet_id: &str) -> Result<Option<InternalRecord>, StoreError>;

    async fn find_all(&self, limit: Option<i64>, offset: Option<i64>) -> Result<Vec<InternalRecord>, StoreError>;

    async fn find_unsynced(&self) -> Result<Vec<InternalRecord>, StoreError>;

    async fn count(&self) -> Result<i64, StoreError>;

    async fn count_unsynced(&self) -> Result<i64, StoreError>;

    async fn create(&self, record: NewRecord) -> Result<InternalRecord, StoreError>;

    async fn update(&self, id: Uuid, update: RecordUpdate) -> Result<InternalRecord, StoreError>;

    /// Persist the sheet id about to be appended together with the attempt time
    async fn mark_sync_attempt(&self, id: Uuid, sheet_id: &str, at: DateTime<Utc>) -> Result<(), StoreError>;

    /// Flag the record as matching the sheet and clear any attempt marker,
    /// provided it was not edited after `seen_updated_at`.
    /// Returns false and leaves the record unsynced when it was.
    async fn mark_synced(&self, id: Uuid, seen_updated_at: DateTime<Utc>) -> Result<bool, StoreError>;

    /// Returns false when no record had this id
    async fn delete(&self, id: Uuid) -> Result<bool, StoreError>;
}
