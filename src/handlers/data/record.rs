use axum::extract::{Path, State};
use axum::Json;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::app::AppState;
use crate::database::record::{fields_from_api_input, InternalRecord, RecordUpdate};
use crate::error::ApiError;
use crate::middleware::{ApiResponse, ApiResult};

fn parse_id(id: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(id).map_err(|_| ApiError::bad_request(format!("Invalid record id: {}", id)))
}

/// GET /api/data/:entity/:id - Get a single record by ID
pub async fn get(
    State(state): State<AppState>,
    Path((entity, id)): Path<(String, String)>,
) -> ApiResult<InternalRecord> {
    let entity = state.resolve(&entity)?;
    let id = parse_id(&id)?;

    match entity.store.find_by_id(id).await? {
        Some(record) => Ok(ApiResponse::success(record)),
        None => Err(ApiError::not_found(format!("record {} not found in {}", id, entity.kind))),
    }
}

/// PATCH /api/data/:entity/:id - merge fields; the record goes back to unsynced
pub async fn patch(
    State(state): State<AppState>,
    Path((entity, id)): Path<(String, String)>,
    Json(payload): Json<Value>,
) -> ApiResult<InternalRecord> {
    let entity = state.resolve(&entity)?;
    let id = parse_id(&id)?;
    let fields = entity.mapping.normalize(fields_from_api_input(payload)?)?;

    let record = entity
        .store
        .update(id, RecordUpdate::fields(fields).synced(false))
        .await?;
    Ok(ApiResponse::success(record))
}

/// DELETE /api/data/:entity/:id - Remove a record; its sheet row is left alone
pub async fn delete(
    State(state): State<AppState>,
    Path((entity, id)): Path<(String, String)>,
) -> ApiResult<Value> {
    let entity = state.resolve(&entity)?;
    let id = parse_id(&id)?;

    if !entity.store.delete(id).await? {
        return Err(ApiError::not_found(format!("record {} not found in {}", id, entity.kind)));
    }
    Ok(ApiResponse::success(json!({ "id": id, "deleted": true })))
}
