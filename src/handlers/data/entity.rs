use axum::extract::{Path, Query, State};
use axum::Json;
use serde::Deserialize;
use serde_json::Value;

use crate::app::AppState;
use crate::database::record::{fields_from_api_input, InternalRecord, NewRecord};
use crate::middleware::{ApiResponse, ApiResult};

const DEFAULT_LIMIT: i64 = 100;

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// GET /api/data/:entity - list records, newest first
pub async fn get(
    State(state): State<AppState>,
    Path(entity): Path<String>,
    Query(query): Query<ListQuery>,
) -> ApiResult<Vec<InternalRecord>> {
    let entity = state.resolve(&entity)?;
    let limit = query.limit.unwrap_or(DEFAULT_LIMIT).max(0);
    let records = entity.store.find_all(Some(limit), query.offset).await?;
    Ok(ApiResponse::success(records))
}

/// POST /api/data/:entity - create a record that the next sync pass writes to the sheet
pub async fn post(
    State(state): State<AppState>,
    Path(entity): Path<String>,
    Json(payload): Json<Value>,
) -> ApiResult<InternalRecord> {
    let entity = state.resolve(&entity)?;
    let fields = entity.mapping.normalize(fields_from_api_input(payload)?)?;
    let record = entity.store.create(NewRecord::unsynced(fields)).await?;
    Ok(ApiResponse::created(record))
}
