use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::record::{InternalRecord, NewRecord, RecordUpdate};
use super::store::{RecordStore, StoreError};

/// In-process store for development and tests.
/// Records are kept in insertion order; reads return newest first.
pub struct MemoryRecordStore {
    table: String,
    records: RwLock<Vec<InternalRecord>>,
}

impl MemoryRecordStore {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            records: RwLock::new(Vec::new()),
        }
    }

    /// Snapshot of all records, oldest first
    pub async fn snapshot(&self) -> Vec<InternalRecord> {
        self.records.read().await.clone()
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    fn table(&self) -> &str {
        &self.table
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<InternalRecord>, StoreError> {
        let records = self.records.read().await;
        Ok(records.iter().find(|r| r.id == id).cloned())
    }

    async fn find_by_sheet_id(&self, sheet_id: &str) -> Result<Option<InternalRecord>, StoreError> {
        let records = self.records.read().await;
        Ok(records
            .iter()
            .find(|r| r.sheet_id.as_deref() == Some(sheet_id))
            .cloned())
    }

    async fn find_all(&self, limit: Option<i64>, offset: Option<i64>) -> Result<Vec<InternalRecord>, StoreError> {
        let records = self.records.read().await;
        let offset = offset.unwrap_or(0).max(0) as usize;
        let limit = limit.map(|l| l.max(0) as usize).unwrap_or(usize::MAX);
        Ok(records.iter().rev().skip(offset).take(limit).cloned().collect())
    }

    async fn find_unsynced(&self) -> Result<Vec<InternalRecord>, StoreError> {
        let records = self.records.read().await;
        Ok(records.iter().rev().filter(|r| !r.synced).cloned().collect())
    }

    async fn count(&self) -> Result<i64, StoreError> {
        Ok(self.records.read().await.len() as i64)
    }

    async fn count_unsynced(&self) -> Result<i64, StoreError> {
        let records = self.records.read().await;
        Ok(records.iter().filter(|r| !r.synced).count() as i64)
    }

    async fn create(&self, record: NewRecord) -> Result<InternalRecord, StoreError> {
        let mut records = self.records.write().await;
        if let Some(sheet_id) = &record.sheet_id {
            if records.iter().any(|r| r.sheet_id.as_ref() == Some(sheet_id)) {
                return Err(StoreError::DuplicateSheetId(sheet_id.clone()));
            }
        }

        let now = Utc::now();
        let created = InternalRecord {
            id: Uuid::new_v4(),
            sheet_id: record.sheet_id,
            synced: record.synced,
            sync_attempted_at: None,
            created_at: now,
            updated_at: now,
            fields: record.fields,
        };
        records.push(created.clone());
        Ok(created)
    }

    async fn update(&self, id: Uuid, update: RecordUpdate) -> Result<InternalRecord, StoreError> {
        let mut records = self.records.write().await;
        let record = records
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or(StoreError::NotFound(id))?;

        record.fields.extend(update.fields);
        if let Some(synced) = update.synced {
            record.synced = synced;
        }
        record.updated_at = Utc::now();
        Ok(record.clone())
    }

    async fn mark_sync_attempt(&self, id: Uuid, sheet_id: &str, at: DateTime<Utc>) -> Result<(), StoreError> {
        let mut records = self.records.write().await;
        if records
            .iter()
            .any(|r| r.id != id && r.sheet_id.as_deref() == Some(sheet_id))
        {
            return Err(StoreError::DuplicateSheetId(sheet_id.to_string()));
        }
        let record = records
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or(StoreError::NotFound(id))?;
        record.sheet_id = Some(sheet_id.to_string());
        record.sync_attempted_at = Some(at);
        Ok(())
    }

    async fn mark_synced(&self, id: Uuid, seen_updated_at: DateTime<Utc>) -> Result<bool, StoreError> {
        let mut records = self.records.write().await;
        let record = records
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or(StoreError::NotFound(id))?;
        if record.updated_at != seen_updated_at {
            return Ok(false);
        }
        record.synced = true;
        record.sync_attempted_at = None;
        record.updated_at = Utc::now();
        Ok(true)
    }

    async fn delete(&self, id: Uuid) -> Result<bool, StoreError> {
        let mut records = self.records.write().await;
        let before = records.len();
        records.retain(|r| r.id != id);
        Ok(records.len() < before)
    }
}
