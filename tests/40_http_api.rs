use anyhow::Result;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

use backoffice_sync::app::router;
use backoffice_sync::database::RecordStore;
use backoffice_sync::registry::EntityKind;
use backoffice_sync::scheduler::RunTrigger;
use backoffice_sync::testing::{row, Harness, RecordingTransport};

async fn send(app: &Router, method: Method, uri: &str, body: Option<Value>) -> Result<(StatusCode, Value)> {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(serde_json::to_vec(&body)?))?,
        None => builder.body(Body::empty())?,
    };

    let response = app.clone().oneshot(request).await?;
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await?;
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes)?
    };
    Ok((status, json))
}

#[tokio::test]
async fn health_and_root_describe_the_service() -> Result<()> {
    let harness = Harness::new();
    let app = router(harness.state());

    let (status, body) = send(&app, Method::GET, "/health", None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["database"], "memory");
    assert_eq!(body["data"]["entities"], EntityKind::ALL.len());

    let (status, body) = send(&app, Method::GET, "/", None).await?;
    assert_eq!(status, StatusCode::OK);
    let entities = body["data"]["entities"].as_array().cloned().unwrap_or_default();
    assert_eq!(entities.len(), EntityKind::ALL.len());
    assert_eq!(entities[0]["routes"], "/borrower-migration/*");
    Ok(())
}

#[tokio::test]
async fn import_endpoint_returns_counts() -> Result<()> {
    let harness = Harness::new();
    harness
        .sheets
        .insert_sheet(
            "Home Visits",
            &["ID", "Visitor"],
            vec![row(&[("ID", "HV-1"), ("Visitor", "Ana")]), row(&[("ID", ""), ("Visitor", "")])],
        )
        .await;
    let app = router(harness.state());

    let (status, body) = send(&app, Method::POST, "/home-visit-migration/import-from-sheets", None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["imported"], 1);
    assert_eq!(body["data"]["skipped"], 1);
    assert_eq!(body["data"]["successCount"], 1);
    assert_eq!(body["data"]["errorCount"], 0);

    let (status, body) = send(&app, Method::GET, "/home-visit-migration/status", None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body["data"],
        json!({
            "totalInDatabase": 1,
            "totalInSheets": 1,
            "syncedInDatabase": 1,
            "unsyncedInDatabase": 0,
        })
    );
    Ok(())
}

#[tokio::test]
async fn full_migration_endpoint_reports_per_pass() -> Result<()> {
    let harness = Harness::new();
    let app = router(harness.state());

    let (status, body) = send(&app, Method::POST, "/api/data/payments", Some(json!({ "amount": "350.00" }))).await?;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["data"]["synced"], false);

    let (status, body) = send(&app, Method::POST, "/payment-migration/full-migration", None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["entity"], "payment");
    assert_eq!(body["data"]["import"]["success"], true);
    assert_eq!(body["data"]["sync"]["result"]["imported"], 1);

    let rows = harness.sheets.rows("Payments").await;
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["Amount"], "350.00");
    Ok(())
}

#[tokio::test]
async fn compare_record_requires_sheet_id() -> Result<()> {
    let harness = Harness::new();
    harness
        .sheets
        .insert_sheet("Schools", &["ID", "Name", "City"], vec![row(&[("ID", "S-1"), ("Name", "Centro"), ("City", "Puebla")])])
        .await;
    let app = router(harness.state());

    let (status, body) = send(&app, Method::GET, "/school-migration/compare-record", None).await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);

    send(&app, Method::POST, "/school-migration/import-from-sheets", None).await?;
    let (status, body) = send(&app, Method::GET, "/school-migration/compare-record?sheetId=S-1", None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["existsInDatabase"], true);
    assert_eq!(body["data"]["existsInSheets"], true);
    assert_eq!(body["data"]["inSync"], true);

    let (status, body) = send(&app, Method::GET, "/school-migration/sheet-headers", None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["identifierPresent"], true);
    assert_eq!(body["data"]["totalRows"], 1);
    Ok(())
}

#[tokio::test]
async fn scheduler_endpoints_map_errors_to_statuses() -> Result<()> {
    let harness = Harness::new();
    let transport = Arc::new(RecordingTransport::new());
    let app = router(harness.state_with(transport.clone()));

    let (status, _) = send(&app, Method::POST, "/migration-scheduler/run", None).await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = send(&app, Method::POST, "/migration-scheduler/run?name=nonexistent", None).await?;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "NOT_FOUND");
    assert!(transport.calls().is_empty());

    let (status, body) = send(&app, Method::POST, "/migration-scheduler/run?name=Payroll", None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["entity"], "payroll");

    let (status, body) = send(&app, Method::POST, "/migration-scheduler/run-all", None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["trigger"], "manual");
    assert_eq!(body["data"]["totals"]["entities"], EntityKind::ALL.len());

    let (status, body) = send(&app, Method::GET, "/migration-scheduler/status", None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["transport"], "recording");
    assert_eq!(body["data"]["lastRun"]["trigger"], "manual");
    Ok(())
}

#[tokio::test]
async fn run_all_during_a_run_is_a_conflict() -> Result<()> {
    let harness = Harness::new();
    let transport = Arc::new(RecordingTransport::held());
    let state = harness.state_with(transport.clone());
    let app = router(state.clone());

    let background = {
        let scheduler = state.scheduler.clone();
        tokio::spawn(async move { scheduler.run_all(RunTrigger::Scheduled).await })
    };
    transport.wait_entered().await;

    let (status, body) = send(&app, Method::POST, "/migration-scheduler/run-all", None).await?;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["success"], false);

    transport.release();
    background.await??;
    Ok(())
}

#[tokio::test]
async fn data_api_round_trip() -> Result<()> {
    let harness = Harness::new();
    let app = router(harness.state());

    let (status, body) = send(&app, Method::POST, "/api/data/schools", Some(json!({ "name": "Centro" }))).await?;
    assert_eq!(status, StatusCode::CREATED);
    let id = body["data"]["id"].as_str().unwrap_or_default().to_string();

    let (status, body) = send(&app, Method::GET, "/api/data/schools", None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"].as_array().map(Vec::len), Some(1));

    let (status, body) = send(
        &app,
        Method::PATCH,
        &format!("/api/data/schools/{}", id),
        Some(json!({ "city": "Atlixco" })),
    )
    .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["fields"]["city"], "Atlixco");
    assert_eq!(body["data"]["fields"]["name"], "Centro");

    let (status, _) = send(&app, Method::POST, "/api/data/schools", Some(json!({ "sheetId": "X" }))).await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(&app, Method::DELETE, &format!("/api/data/schools/{}", id), None).await?;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = send(&app, Method::GET, &format!("/api/data/schools/{}", id), None).await?;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(&app, Method::GET, "/api/data/nonexistent", None).await?;
    assert_eq!(status, StatusCode::NOT_FOUND);
    Ok(())
}

#[tokio::test]
async fn data_api_stores_values_as_an_import_would() -> Result<()> {
    let harness = Harness::new();
    let app = router(harness.state());

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/data/borrowers",
        Some(json!({ "full_name": " Ana ", "monthly_income": 8500, "dependents": "3", "phone": "" })),
    )
    .await?;
    assert_eq!(status, StatusCode::CREATED);
    let fields = &body["data"]["fields"];
    assert_eq!(fields["full_name"], " Ana ");
    assert_eq!(fields["monthly_income"], "8500");
    assert_eq!(fields["dependents"], 3);
    assert_eq!(fields["phone"], Value::Null);

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/data/credit-applications",
        Some(json!({ "requested_amount": "lots" })),
    )
    .await?;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["success"], false);
    assert_eq!(harness.store(EntityKind::CreditApplication).count().await?, 0);
    Ok(())
}
