use axum::extract::{Query, State};
use serde::Deserialize;

use crate::app::AppState;
use crate::error::ApiError;
use crate::middleware::{ApiResponse, ApiResult};
use crate::scheduler::{AggregateResult, RunTrigger, SchedulerStatus};
use crate::sync::FullMigrationReport;

/// POST /migration-scheduler/run-all - start a manual run over every entity
pub async fn run_all(State(state): State<AppState>) -> ApiResult<AggregateResult> {
    let result = state.scheduler.run_all(RunTrigger::Manual).await?;
    let message = format!(
        "Migration run finished: {} succeeded, {} failed",
        result.totals.succeeded, result.totals.failed
    );
    Ok(ApiResponse::success(result).with_message(message))
}

#[derive(Debug, Deserialize)]
pub struct RunQuery {
    pub name: Option<String>,
}

/// POST /migration-scheduler/run?name=<entity> - run one entity's full migration
pub async fn run_one(State(state): State<AppState>, Query(query): Query<RunQuery>) -> ApiResult<FullMigrationReport> {
    let name = query
        .name
        .filter(|n| !n.trim().is_empty())
        .ok_or_else(|| ApiError::bad_request("Query parameter 'name' is required"))?;

    let report = state.scheduler.run_one(&name).await?;
    Ok(ApiResponse::success(report))
}

/// GET /migration-scheduler/status
pub async fn status(State(state): State<AppState>) -> ApiResult<SchedulerStatus> {
    Ok(ApiResponse::success(state.scheduler.status().await))
}
