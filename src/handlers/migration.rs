//! Per-entity migration endpoints, mounted under `/<slug>-migration`.
//!
//! The router injects the entity kind as an extension, so every handler here
//! serves all registered entities.

use axum::extract::{Query, State};
use axum::Extension;
use serde::Deserialize;

use crate::app::AppState;
use crate::error::ApiError;
use crate::middleware::{ApiResponse, ApiResult};
use crate::registry::EntityKind;
use crate::sync::{FullMigrationReport, RecordComparison, SheetHeaders, SyncReport, SyncStatus};

/// POST /<slug>-migration/import-from-sheets
pub async fn import_from_sheets(
    State(state): State<AppState>,
    Extension(kind): Extension<EntityKind>,
) -> ApiResult<SyncReport> {
    let entity = state.entity(kind)?;
    let result = state.engine.import_from_sheets(&entity).await?;
    let message = format!(
        "Imported {} {} ({} updated, {} skipped, {} errors)",
        result.imported, entity.display_name, result.updated, result.skipped, result.errors
    );
    Ok(ApiResponse::success(result.report()).with_message(message))
}

/// POST /<slug>-migration/sync-to-sheets
pub async fn sync_to_sheets(
    State(state): State<AppState>,
    Extension(kind): Extension<EntityKind>,
) -> ApiResult<SyncReport> {
    let entity = state.entity(kind)?;
    let result = state.engine.sync_to_sheets(&entity).await?;
    let message = format!(
        "Synced {} {} to sheet ({} skipped, {} errors)",
        result.success_count(),
        entity.display_name,
        result.skipped,
        result.errors
    );
    Ok(ApiResponse::success(result.report()).with_message(message))
}

/// POST /<slug>-migration/full-migration
pub async fn full_migration(
    State(state): State<AppState>,
    Extension(kind): Extension<EntityKind>,
) -> ApiResult<FullMigrationReport> {
    let entity = state.entity(kind)?;
    let report = state.engine.full_migration(&entity).await;
    let message = match report.error() {
        None => format!("Full migration of {} completed", entity.display_name),
        Some(error) => format!("Full migration of {} completed with failures: {}", entity.display_name, error),
    };
    Ok(ApiResponse::success(report).with_message(message))
}

/// GET /<slug>-migration/status
pub async fn status(State(state): State<AppState>, Extension(kind): Extension<EntityKind>) -> ApiResult<SyncStatus> {
    let entity = state.entity(kind)?;
    Ok(ApiResponse::success(state.engine.status(&entity).await?))
}

/// GET /<slug>-migration/sheet-headers
pub async fn sheet_headers(
    State(state): State<AppState>,
    Extension(kind): Extension<EntityKind>,
) -> ApiResult<SheetHeaders> {
    let entity = state.entity(kind)?;
    Ok(ApiResponse::success(state.engine.sheet_headers(&entity).await?))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompareQuery {
    pub sheet_id: Option<String>,
}

/// GET /<slug>-migration/compare-record?sheetId=...
pub async fn compare_record(
    State(state): State<AppState>,
    Extension(kind): Extension<EntityKind>,
    Query(query): Query<CompareQuery>,
) -> ApiResult<RecordComparison> {
    let sheet_id = query
        .sheet_id
        .filter(|id| !id.trim().is_empty())
        .ok_or_else(|| ApiError::bad_request("Query parameter 'sheetId' is required"))?;

    let entity = state.entity(kind)?;
    Ok(ApiResponse::success(state.engine.compare_record(&entity, &sheet_id).await?))
}
