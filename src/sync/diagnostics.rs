//! Read-only helpers operators use to audit drift between a table and its sheet.

use serde::Serialize;
use sha2::{Digest, Sha256};

use super::engine::{SyncEngine, SyncError};
use crate::database::record::InternalRecord;
use crate::registry::{EntityDescriptor, EntityKind};
use crate::types::SheetRow;

const ELLIPSIS: char = '…';

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SheetHeaders {
    pub entity: EntityKind,
    pub sheet: String,
    pub headers: Vec<String>,
    pub total_rows: usize,
    pub sample_rows: Vec<SheetRow>,
    pub identifier_column: String,
    pub identifier_present: bool,
    /// Sheet headers bound to a record field
    pub mapped_columns: Vec<String>,
    /// Sheet headers the mapping ignores
    pub unmapped_columns: Vec<String>,
    /// Mapped columns absent from the sheet
    pub missing_columns: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldDifference {
    pub column: String,
    pub field: String,
    pub database: String,
    pub sheet: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordComparison {
    pub sheet_id: String,
    pub exists_in_database: bool,
    pub exists_in_sheets: bool,
    pub internal_record: Option<InternalRecord>,
    pub external_record: Option<SheetRow>,
    /// Internal record rendered through the mapping
    pub mapped_internal: Option<SheetRow>,
    pub differences: Vec<FieldDifference>,
    pub database_fingerprint: Option<String>,
    pub sheet_fingerprint: Option<String>,
    pub in_sync: bool,
}

impl SyncEngine {
    pub async fn sheet_headers(&self, entity: &EntityDescriptor) -> Result<SheetHeaders, SyncError> {
        let headers = self.gateway.get_headers(&entity.sheet_name).await?;
        let rows = self.gateway.get_rows(&entity.sheet_name).await?;

        let sample_rows = rows
            .iter()
            .take(self.options.sample_rows)
            .map(|row| {
                row.iter()
                    .map(|(k, v)| (k.clone(), truncate(v, self.options.sample_value_len)))
                    .collect()
            })
            .collect();

        let (mapped_columns, unmapped_columns): (Vec<String>, Vec<String>) = headers
            .iter()
            .filter(|h| **h != entity.identifier_column)
            .cloned()
            .partition(|h| entity.mapping.binding_for_column(h).is_some());

        let missing_columns = entity
            .mapping
            .bindings()
            .iter()
            .map(|b| b.column.trim().to_string())
            .filter(|column| !headers.contains(column))
            .collect();

        Ok(SheetHeaders {
            entity: entity.kind,
            sheet: entity.sheet_name.clone(),
            identifier_present: headers.contains(&entity.identifier_column),
            identifier_column: entity.identifier_column.clone(),
            total_rows: rows.len(),
            sample_rows,
            mapped_columns,
            unmapped_columns,
            missing_columns,
            headers,
        })
    }

    pub async fn compare_record(&self, entity: &EntityDescriptor, sheet_id: &str) -> Result<RecordComparison, SyncError> {
        let sheet_id = sheet_id.trim();
        let internal = entity.store.find_by_sheet_id(sheet_id).await?;
        let external = self
            .gateway
            .find_row(&entity.sheet_name, &entity.identifier_column, sheet_id)
            .await?;

        let database_side = internal.as_ref().map(|r| entity.mapping.to_external(&r.fields));
        let sheet_side = external.as_ref().map(|row| entity.mapping.canonicalize(row));

        let differences = match (&database_side, &sheet_side) {
            (Some(database), Some(sheet)) => differences(entity, database, sheet),
            _ => Vec::new(),
        };
        let database_fingerprint = database_side.as_ref().map(|row| fingerprint(entity, row));
        let sheet_fingerprint = sheet_side.as_ref().map(|row| fingerprint(entity, row));
        let in_sync = database_fingerprint.is_some() && database_fingerprint == sheet_fingerprint;

        Ok(RecordComparison {
            sheet_id: sheet_id.to_string(),
            exists_in_database: internal.is_some(),
            exists_in_sheets: external.is_some(),
            internal_record: internal,
            external_record: external,
            mapped_internal: database_side,
            differences,
            database_fingerprint,
            sheet_fingerprint,
            in_sync,
        })
    }
}

fn differences(entity: &EntityDescriptor, database: &SheetRow, sheet: &SheetRow) -> Vec<FieldDifference> {
    entity
        .mapping
        .bindings()
        .iter()
        .filter_map(|binding| {
            let column = binding.column.trim();
            let in_database = database.get(column).map(String::as_str).unwrap_or_default();
            let in_sheet = sheet.get(column).map(String::as_str).unwrap_or_default();
            (in_database != in_sheet).then(|| FieldDifference {
                column: column.to_string(),
                field: binding.field.trim().to_string(),
                database: in_database.to_string(),
                sheet: in_sheet.to_string(),
            })
        })
        .collect()
}

/// SHA-256 over every mapped column in mapping order; a missing cell hashes as blank
fn fingerprint(entity: &EntityDescriptor, row: &SheetRow) -> String {
    let mut hasher = Sha256::new();
    for binding in entity.mapping.bindings() {
        let column = binding.column.trim();
        let value = row.get(column).map(String::as_str).unwrap_or_default();
        hasher.update(column.as_bytes());
        hasher.update(b"=");
        hasher.update(value.as_bytes());
        hasher.update(b"\n");
    }
    format!("{:x}", hasher.finalize())
}

fn truncate(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }
    let mut truncated: String = value.chars().take(max_chars).collect();
    truncated.push(ELLIPSIS);
    truncated
}
