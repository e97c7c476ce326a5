use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::registry::EntityKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IssueKind {
    Skipped,
    Error,
}

/// One row or record that did not go through cleanly
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordIssue {
    pub kind: IssueKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sheet_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub record_id: Option<Uuid>,
    pub reason: String,
}

/// Counters for one import or sync pass.
///
/// For a sync pass `imported` counts rows appended to the sheet and
/// `updated` counts rows rewritten in place.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncResult {
    pub imported: u32,
    pub updated: u32,
    pub skipped: u32,
    pub errors: u32,
    pub issues: Vec<RecordIssue>,
}

impl SyncResult {
    pub fn success_count(&self) -> u32 {
        self.imported + self.updated
    }

    pub fn error_count(&self) -> u32 {
        self.errors
    }

    pub fn skip(&mut self, sheet_id: Option<String>, record_id: Option<Uuid>, reason: impl Into<String>) {
        self.skipped += 1;
        self.issues.push(RecordIssue {
            kind: IssueKind::Skipped,
            sheet_id,
            record_id,
            reason: reason.into(),
        });
    }

    pub fn fail(&mut self, sheet_id: Option<String>, record_id: Option<Uuid>, reason: impl Into<String>) {
        self.errors += 1;
        self.issues.push(RecordIssue {
            kind: IssueKind::Error,
            sheet_id,
            record_id,
            reason: reason.into(),
        });
    }

    pub fn report(self) -> SyncReport {
        SyncReport::from(self)
    }
}

/// Wire form of a [`SyncResult`] carrying the derived counts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncReport {
    #[serde(flatten)]
    pub result: SyncResult,
    pub success_count: u32,
    pub error_count: u32,
}

impl From<SyncResult> for SyncReport {
    fn from(result: SyncResult) -> Self {
        Self {
            success_count: result.success_count(),
            error_count: result.error_count(),
            result,
        }
    }
}

/// Outcome of one pass inside a full migration; a failed pass has no counts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PassOutcome {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<SyncReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl PassOutcome {
    pub fn completed(result: SyncResult) -> Self {
        Self {
            success: true,
            result: Some(result.report()),
            error: None,
        }
    }

    pub fn failed(error: impl ToString) -> Self {
        Self {
            success: false,
            result: None,
            error: Some(error.to_string()),
        }
    }

    pub fn counts(&self) -> Option<&SyncResult> {
        self.result.as_ref().map(|r| &r.result)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FullMigrationReport {
    pub entity: EntityKind,
    pub import: PassOutcome,
    pub sync: PassOutcome,
}

impl FullMigrationReport {
    pub fn success(&self) -> bool {
        self.import.success && self.sync.success
    }

    /// First pass-level failure, if any
    pub fn error(&self) -> Option<String> {
        match (&self.import.error, &self.sync.error) {
            (Some(import), Some(sync)) => Some(format!("import: {import}; sync: {sync}")),
            (Some(import), None) => Some(format!("import: {import}")),
            (None, Some(sync)) => Some(format!("sync: {sync}")),
            (None, None) => None,
        }
    }
}
