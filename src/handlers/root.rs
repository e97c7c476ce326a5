use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json};
use serde_json::{json, Value};

use crate::app::AppState;

/// GET / - service info
pub async fn root(State(state): State<AppState>) -> Json<Value> {
    let version = env!("CARGO_PKG_VERSION");
    let entities: Vec<Value> = state
        .registry
        .iter()
        .map(|e| {
            json!({
                "entity": e.kind,
                "displayName": e.display_name,
                "sheet": e.sheet_name,
                "routes": format!("/{}-migration/*", e.kind.slug()),
            })
        })
        .collect();

    Json(json!({
        "success": true,
        "data": {
            "name": "Back-office Sync API",
            "version": version,
            "description": "Keeps the lending database and the legacy spreadsheet in two-way sync",
            "endpoints": {
                "home": "/",
                "health": "/health",
                "migration": "/<entity>-migration/{import-from-sheets, sync-to-sheets, full-migration, status, sheet-headers, compare-record}",
                "scheduler": "/migration-scheduler/{run-all, run?name=, status}",
                "data": "/api/data/:entity[/:id]",
            },
            "entities": entities,
        }
    }))
}

/// GET /health - database and registry
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let now = chrono::Utc::now();
    let entities = state.registry.len();

    let database = match &state.database {
        None => Ok("memory"),
        Some(db) => db.health_check().await.map(|_| "ok"),
    };

    match database {
        Ok(database) => (
            StatusCode::OK,
            Json(json!({
                "success": true,
                "data": {
                    "status": "ok",
                    "timestamp": now,
                    "database": database,
                    "entities": entities,
                    "schedulerRunning": state.scheduler.is_running(),
                }
            })),
        ),
        Err(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({
                "success": false,
                "error": "database unavailable",
                "data": {
                    "status": "degraded",
                    "timestamp": now,
                    "database_error": e.to_string(),
                    "entities": entities,
                }
            })),
        ),
    }
}
