use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use super::result::{FullMigrationReport, PassOutcome, SyncResult};
use crate::clock::Clock;
use crate::config::SyncConfig;
use crate::database::record::{InternalRecord, NewRecord, RecordUpdate};
use crate::database::store::StoreError;
use crate::mapping::MappingError;
use crate::registry::{EntityDescriptor, ImportPolicy};
use crate::sheets::{GatewayError, SheetSnapshot, SpreadsheetGateway};
use crate::types::{cell, is_blank_row, SheetRow};

pub const REASON_EMPTY_RECORD: &str = "empty record";
pub const REASON_ALREADY_EXISTS: &str = "already exists";
pub const REASON_APPEND_IN_FLIGHT: &str = "append already in flight";
pub const REASON_EDITED_DURING_SYNC: &str = "edited while syncing";

#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Gateway(#[from] GatewayError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Mapping(#[from] MappingError),
}

#[derive(Debug, Clone)]
pub struct SyncOptions {
    /// How long an unconfirmed append blocks a retry
    pub in_flight_window: Duration,
    /// Sample rows returned by sheet-headers
    pub sample_rows: usize,
    /// Characters kept per sample value before truncation
    pub sample_value_len: usize,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            in_flight_window: Duration::minutes(10),
            sample_rows: 3,
            sample_value_len: 50,
        }
    }
}

impl From<&SyncConfig> for SyncOptions {
    fn from(config: &SyncConfig) -> Self {
        Self {
            in_flight_window: Duration::seconds(config.in_flight_window_secs as i64),
            sample_rows: config.sample_rows,
            sample_value_len: config.sample_value_len,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStatus {
    pub total_in_database: i64,
    pub total_in_sheets: i64,
    pub synced_in_database: i64,
    pub unsynced_in_database: i64,
}

enum RowOutcome {
    Imported,
    Updated,
    Skipped(String),
}

enum RecordOutcome {
    Appended,
    Updated,
    InFlight,
    /// Written to the sheet, but the record changed meanwhile and stays unsynced
    Stale,
}

/// Reconciles any registered entity between its table and its sheet
pub struct SyncEngine {
    pub(super) gateway: Arc<dyn SpreadsheetGateway>,
    pub(super) clock: Arc<dyn Clock>,
    pub(super) options: SyncOptions,
}

impl SyncEngine {
    pub fn new(gateway: Arc<dyn SpreadsheetGateway>, clock: Arc<dyn Clock>, options: SyncOptions) -> Self {
        Self {
            gateway,
            clock,
            options,
        }
    }

    pub fn options(&self) -> &SyncOptions {
        &self.options
    }

    /// Sheet → database. Only the initial sheet fetch can fail the whole pass.
    pub async fn import_from_sheets(&self, entity: &EntityDescriptor) -> Result<SyncResult, SyncError> {
        info!("Importing {} from sheet '{}'", entity.kind, entity.sheet_name);

        let rows = self.gateway.get_rows(&entity.sheet_name).await.map_err(|e| {
            error!("Failed to fetch sheet '{}' for {}: {}", entity.sheet_name, entity.kind, e);
            e
        })?;

        let mut result = SyncResult::default();
        for (index, row) in rows.iter().enumerate() {
            // header is sheet row 1
            let line = index + 2;

            if is_blank_row(row) {
                result.skip(None, None, REASON_EMPTY_RECORD);
                continue;
            }

            let Some(sheet_id) = cell(row, &entity.identifier_column) else {
                warn!("{}: row {} has no {}", entity.kind, line, entity.identifier_column);
                result.skip(None, None, format!("missing external id (row {line})"));
                continue;
            };

            match self.import_row(entity, sheet_id, row).await {
                Ok(RowOutcome::Imported) => {
                    debug!("{}: imported {}", entity.kind, sheet_id);
                    result.imported += 1;
                }
                Ok(RowOutcome::Updated) => {
                    debug!("{}: updated {}", entity.kind, sheet_id);
                    result.updated += 1;
                }
                Ok(RowOutcome::Skipped(reason)) => {
                    debug!("{}: skipped {} ({})", entity.kind, sheet_id, reason);
                    result.skip(Some(sheet_id.to_string()), None, reason);
                }
                Err(e) => {
                    warn!("{}: failed to import {}: {}", entity.kind, sheet_id, e);
                    result.fail(Some(sheet_id.to_string()), None, e.to_string());
                }
            }
        }

        info!(
            "Import of {} finished: {} imported, {} updated, {} skipped, {} errors",
            entity.kind, result.imported, result.updated, result.skipped, result.errors
        );
        Ok(result)
    }

    async fn import_row(
        &self,
        entity: &EntityDescriptor,
        sheet_id: &str,
        row: &SheetRow,
    ) -> Result<RowOutcome, SyncError> {
        let existing = entity.store.find_by_sheet_id(sheet_id).await?;

        match (existing, entity.import_policy) {
            (Some(_), ImportPolicy::SkipExisting) => Ok(RowOutcome::Skipped(REASON_ALREADY_EXISTS.to_string())),
            (Some(record), ImportPolicy::UpdateExisting) => {
                let fields = entity.mapping.to_internal(row)?;
                entity
                    .store
                    .update(record.id, RecordUpdate::fields(fields).synced(true))
                    .await?;
                Ok(RowOutcome::Updated)
            }
            (None, _) => {
                let fields = entity.mapping.to_internal(row)?;
                entity.store.create(NewRecord::imported(sheet_id, fields)).await?;
                Ok(RowOutcome::Imported)
            }
        }
    }

    /// Database → sheet over every unsynced record, newest first.
    /// Only listing the unsynced records can fail the whole pass. The sheet is
    /// read once; when that read fails every record is counted as an error.
    pub async fn sync_to_sheets(&self, entity: &EntityDescriptor) -> Result<SyncResult, SyncError> {
        info!("Syncing {} to sheet '{}'", entity.kind, entity.sheet_name);

        let records = entity.store.find_unsynced().await.map_err(|e| {
            error!("Failed to list unsynced {} records: {}", entity.kind, e);
            e
        })?;

        let mut result = SyncResult::default();
        if records.is_empty() {
            debug!("{}: nothing to sync", entity.kind);
            return Ok(result);
        }

        let snapshot = match self.gateway.snapshot(&entity.sheet_name).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!("Failed to read sheet '{}' for {}: {}", entity.sheet_name, entity.kind, e);
                let message = e.to_string();
                for record in &records {
                    result.fail(Some(external_id(record)), Some(record.id), message.clone());
                }
                return Ok(result);
            }
        };

        for record in &records {
            let sheet_id = external_id(record);
            match self.sync_record(entity, &snapshot, record, &sheet_id).await {
                Ok(RecordOutcome::Appended) => {
                    debug!("{}: appended {} as {}", entity.kind, record.id, sheet_id);
                    result.imported += 1;
                }
                Ok(RecordOutcome::Updated) => {
                    debug!("{}: updated row {}", entity.kind, sheet_id);
                    result.updated += 1;
                }
                Ok(RecordOutcome::InFlight) => {
                    warn!("{}: append of {} still unconfirmed, not retrying yet", entity.kind, record.id);
                    result.skip(Some(sheet_id), Some(record.id), REASON_APPEND_IN_FLIGHT);
                }
                Ok(RecordOutcome::Stale) => {
                    warn!("{}: {} changed while syncing, left for the next pass", entity.kind, record.id);
                    result.skip(Some(sheet_id), Some(record.id), REASON_EDITED_DURING_SYNC);
                }
                Err(e) => {
                    warn!("{}: failed to sync {}: {}", entity.kind, record.id, e);
                    result.fail(Some(sheet_id), Some(record.id), e.to_string());
                }
            }
        }

        info!(
            "Sync of {} finished: {} appended, {} updated, {} skipped, {} errors",
            entity.kind, result.imported, result.updated, result.skipped, result.errors
        );
        Ok(result)
    }

    async fn sync_record(
        &self,
        entity: &EntityDescriptor,
        snapshot: &SheetSnapshot,
        record: &InternalRecord,
        sheet_id: &str,
    ) -> Result<RecordOutcome, SyncError> {
        let row = self.external_row(entity, record, sheet_id);

        if let Some(index) = snapshot.position(&entity.identifier_column, sheet_id) {
            self.gateway
                .update_row_at(&entity.sheet_name, snapshot, index, &entity.identifier_column, &row)
                .await?;
            return self.confirm(entity, record, RecordOutcome::Updated).await;
        }

        let now = self.clock.now();
        if record.append_in_flight(now, self.options.in_flight_window) {
            return Ok(RecordOutcome::InFlight);
        }

        entity.store.mark_sync_attempt(record.id, sheet_id, now).await?;
        self.gateway.append_row_to(&entity.sheet_name, snapshot, &row).await?;
        self.confirm(entity, record, RecordOutcome::Appended).await
    }

    /// Only the version that was written may be flagged synced
    async fn confirm(
        &self,
        entity: &EntityDescriptor,
        record: &InternalRecord,
        written: RecordOutcome,
    ) -> Result<RecordOutcome, SyncError> {
        if entity.store.mark_synced(record.id, record.updated_at).await? {
            Ok(written)
        } else {
            Ok(RecordOutcome::Stale)
        }
    }

    /// Mapped sheet view of a record with the identifier column first
    pub fn external_row(&self, entity: &EntityDescriptor, record: &InternalRecord, sheet_id: &str) -> SheetRow {
        let mut row = entity.mapping.to_external(&record.fields);
        row.shift_insert(0, entity.identifier_column.clone(), sheet_id.to_string());
        row
    }

    /// Import then sync. A failed import does not stop the sync pass.
    pub async fn full_migration(&self, entity: &EntityDescriptor) -> FullMigrationReport {
        let started = self.clock.now();

        let import = match self.import_from_sheets(entity).await {
            Ok(result) => PassOutcome::completed(result),
            Err(e) => PassOutcome::failed(e),
        };
        let sync = match self.sync_to_sheets(entity).await {
            Ok(result) => PassOutcome::completed(result),
            Err(e) => PassOutcome::failed(e),
        };

        let report = FullMigrationReport {
            entity: entity.kind,
            import,
            sync,
        };
        info!(
            "Full migration of {} finished in {}ms (success: {})",
            entity.kind,
            elapsed_ms(started, self.clock.now()),
            report.success()
        );
        report
    }

    pub async fn status(&self, entity: &EntityDescriptor) -> Result<SyncStatus, SyncError> {
        let total = entity.store.count().await?;
        let unsynced = entity.store.count_unsynced().await?;
        let rows = self.gateway.get_rows(&entity.sheet_name).await?;
        let in_sheets = rows.iter().filter(|row| !is_blank_row(row)).count() as i64;

        Ok(SyncStatus {
            total_in_database: total,
            total_in_sheets: in_sheets,
            synced_in_database: total - unsynced,
            unsynced_in_database: unsynced,
        })
    }
}

/// Sheet id a record is written under: its own, or its UUID when it has none yet
pub fn external_id(record: &InternalRecord) -> String {
    record
        .sheet_id
        .clone()
        .unwrap_or_else(|| record.id.to_string())
}

pub(crate) fn elapsed_ms(from: DateTime<Utc>, to: DateTime<Utc>) -> u64 {
    (to - from).num_milliseconds().max(0) as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SystemClock;
    use crate::database::memory::MemoryRecordStore;
    use crate::database::store::RecordStore;
    use crate::mapping::{FieldBinding, FieldMapping};
    use crate::registry::EntityKind;
    use crate::sheets::MemorySheetGateway;
    use serde_json::{json, Map, Value};

    fn row(pairs: &[(&str, &str)]) -> SheetRow {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    fn school(policy: ImportPolicy) -> (EntityDescriptor, Arc<MemoryRecordStore>) {
        let store = Arc::new(MemoryRecordStore::new("schools"));
        let descriptor = EntityDescriptor {
            kind: EntityKind::School,
            display_name: "Schools".into(),
            sheet_name: "Schools".into(),
            identifier_column: "ID".into(),
            import_policy: policy,
            mapping: FieldMapping::new(vec![
                FieldBinding::new("Name", "name"),
                FieldBinding::new("City", "city"),
            ])
            .unwrap(),
            store: store.clone(),
        };
        (descriptor, store)
    }

    fn engine(gateway: Arc<MemorySheetGateway>) -> SyncEngine {
        SyncEngine::new(gateway, Arc::new(SystemClock), SyncOptions::default())
    }

    fn fields(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap_or_default()
    }

    #[tokio::test]
    async fn update_existing_policy_overwrites_fields() {
        let gateway = Arc::new(MemorySheetGateway::new().with_sheet(
            "Schools",
            &["ID", "Name", "City"],
            vec![row(&[("ID", "S-1"), ("Name", "Renamed"), ("City", "Quito")])],
        ));
        let (entity, store) = school(ImportPolicy::UpdateExisting);
        let existing = store
            .create(NewRecord::imported("S-1", fields(json!({ "name": "Old", "city": "Quito" }))))
            .await
            .unwrap();
        store
            .update(existing.id, RecordUpdate::default().synced(false))
            .await
            .unwrap();

        let result = engine(gateway).import_from_sheets(&entity).await.unwrap();
        assert_eq!(result.updated, 1);
        assert_eq!(result.imported, 0);

        let record = store.find_by_id(existing.id).await.unwrap().unwrap();
        assert_eq!(record.field("name"), Some(&json!("Renamed")));
        assert!(record.synced);
    }

    #[tokio::test]
    async fn missing_sheet_fails_import_pass() {
        let gateway = Arc::new(MemorySheetGateway::new());
        let (entity, _) = school(ImportPolicy::SkipExisting);
        let err = engine(gateway).import_from_sheets(&entity).await.unwrap_err();
        assert!(matches!(err, SyncError::Gateway(GatewayError::SheetNotFound(_))));
    }

    #[tokio::test]
    async fn sync_assigns_uuid_as_sheet_id() {
        let gateway = Arc::new(MemorySheetGateway::new().with_sheet("Schools", &["ID", "Name", "City"], Vec::new()));
        let (entity, store) = school(ImportPolicy::SkipExisting);
        let created = store
            .create(NewRecord::unsynced(fields(json!({ "name": "Central" }))))
            .await
            .unwrap();

        let result = engine(gateway.clone()).sync_to_sheets(&entity).await.unwrap();
        assert_eq!(result.imported, 1);

        let record = store.find_by_id(created.id).await.unwrap().unwrap();
        assert_eq!(record.sheet_id, Some(created.id.to_string()));
        assert!(record.synced);
        assert_eq!(record.sync_attempted_at, None);

        let rows = gateway.rows("Schools").await;
        assert_eq!(rows[0]["ID"], created.id.to_string());
        assert_eq!(rows[0]["Name"], "Central");
    }

    #[tokio::test]
    async fn recent_unconfirmed_append_is_not_repeated() {
        let gateway = Arc::new(MemorySheetGateway::new().with_sheet("Schools", &["ID", "Name"], Vec::new()));
        let (entity, store) = school(ImportPolicy::SkipExisting);
        let created = store.create(NewRecord::unsynced(Map::new())).await.unwrap();
        store
            .mark_sync_attempt(created.id, "S-9", Utc::now() - Duration::minutes(1))
            .await
            .unwrap();

        let result = engine(gateway.clone()).sync_to_sheets(&entity).await.unwrap();
        assert_eq!(result.skipped, 1);
        assert_eq!(result.issues[0].reason, REASON_APPEND_IN_FLIGHT);
        assert!(gateway.rows("Schools").await.is_empty());
    }

    #[tokio::test]
    async fn stale_unconfirmed_append_is_retried() {
        let gateway = Arc::new(MemorySheetGateway::new().with_sheet("Schools", &["ID", "Name"], Vec::new()));
        let (entity, store) = school(ImportPolicy::SkipExisting);
        let created = store.create(NewRecord::unsynced(Map::new())).await.unwrap();
        store
            .mark_sync_attempt(created.id, "S-9", Utc::now() - Duration::minutes(30))
            .await
            .unwrap();

        let result = engine(gateway.clone()).sync_to_sheets(&entity).await.unwrap();
        assert_eq!(result.imported, 1);
        assert_eq!(gateway.rows("Schools").await[0]["ID"], "S-9");
    }

    #[tokio::test]
    async fn existing_row_is_updated_in_place() {
        let gateway = Arc::new(MemorySheetGateway::new().with_sheet(
            "Schools",
            &["ID", "Name", "City"],
            vec![row(&[("ID", "S-1"), ("Name", "Old"), ("City", "Loja")])],
        ));
        let (entity, store) = school(ImportPolicy::SkipExisting);
        let created = store
            .create(NewRecord::imported("S-1", fields(json!({ "name": "New" }))))
            .await
            .unwrap();
        store
            .update(created.id, RecordUpdate::default().synced(false))
            .await
            .unwrap();

        let result = engine(gateway.clone()).sync_to_sheets(&entity).await.unwrap();
        assert_eq!(result.updated, 1);

        let rows = gateway.rows("Schools").await;
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["Name"], "New");
        // unmapped-in-record cells are left alone
        assert_eq!(rows[0]["City"], "Loja");
    }
}
