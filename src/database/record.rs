use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::mapping::RESERVED_FIELDS;

/// Errors from turning API input into record fields
#[derive(Debug, thiserror::Error)]
pub enum RecordError {
    #[error("System field '{0}' cannot be set via API input")]
    SystemFieldNotAllowed(String),
    #[error("Invalid JSON format: {0}")]
    InvalidJson(String),
}

/// One row of an entity table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InternalRecord {
    pub id: Uuid,
    /// External row identifier; None until the record is first written to the sheet
    pub sheet_id: Option<String>,
    pub synced: bool,
    /// Set right before an append is sent, cleared once the row is confirmed
    pub sync_attempted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub fields: Map<String, Value>,
}

impl InternalRecord {
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// True when an append was sent less than `window` ago and never confirmed
    pub fn append_in_flight(&self, now: DateTime<Utc>, window: Duration) -> bool {
        match self.sync_attempted_at {
            Some(at) => now - at < window,
            None => false,
        }
    }
}

/// Insert payload
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NewRecord {
    pub sheet_id: Option<String>,
    pub synced: bool,
    pub fields: Map<String, Value>,
}

impl NewRecord {
    /// Record created by an API caller: not yet on the sheet
    pub fn unsynced(fields: Map<String, Value>) -> Self {
        Self {
            sheet_id: None,
            synced: false,
            fields,
        }
    }

    /// Record imported from a sheet row, already matching it
    pub fn imported(sheet_id: impl Into<String>, fields: Map<String, Value>) -> Self {
        Self {
            sheet_id: Some(sheet_id.into()),
            synced: true,
            fields,
        }
    }
}

/// Partial update. `fields` are merged over the stored ones.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordUpdate {
    pub fields: Map<String, Value>,
    pub synced: Option<bool>,
}

impl RecordUpdate {
    pub fn fields(fields: Map<String, Value>) -> Self {
        Self { fields, synced: None }
    }

    pub fn synced(mut self, synced: bool) -> Self {
        self.synced = Some(synced);
        self
    }
}

/// Parse an API payload into entity fields, rejecting store-owned keys
pub fn fields_from_api_input(json: Value) -> Result<Map<String, Value>, RecordError> {
    match json {
        Value::Object(map) => {
            if let Some(key) = map.keys().find(|k| is_system_field(k)) {
                return Err(RecordError::SystemFieldNotAllowed(key.clone()));
            }
            Ok(map)
        }
        _ => Err(RecordError::InvalidJson("Expected JSON object".to_string())),
    }
}

fn is_system_field(key: &str) -> bool {
    RESERVED_FIELDS.contains(&key)
        || matches!(key, "sheetId" | "syncAttemptedAt" | "createdAt" | "updatedAt")
}
