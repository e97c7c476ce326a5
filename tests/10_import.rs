use anyhow::Result;
use pretty_assertions::assert_eq;
use serde_json::{json, Map};
use std::sync::Arc;

use backoffice_sync::database::{NewRecord, RecordStore};
use backoffice_sync::registry::EntityKind;
use backoffice_sync::sheets::MemorySheetGateway;
use backoffice_sync::sync::IssueKind;
use backoffice_sync::testing::{row, Harness};

const HOME_VISIT_HEADERS: &[&str] = &[
    "ID",
    "Application ID",
    "Visit Date",
    "Visitor",
    "Housing Type",
    "Household Members",
    "Address Confirmed",
    "Observations",
    "Recommendation",
];

#[tokio::test]
async fn import_counts_new_existing_and_blank_rows() -> Result<()> {
    let harness = Harness::new();
    let store = harness.store(EntityKind::HomeVisit);
    store
        .create(NewRecord::imported("HV-2", Map::new()))
        .await?;

    harness
        .sheets
        .insert_sheet(
            "Home Visits",
            HOME_VISIT_HEADERS,
            vec![
                row(&[("ID", "HV-1"), ("Visitor", "Ana"), ("Visit Date", "04/03/2024")]),
                row(&[("ID", "HV-2"), ("Visitor", "Luis")]),
                row(&[("ID", " "), ("Visitor", "")]),
            ],
        )
        .await;

    let result = harness
        .engine
        .import_from_sheets(&harness.entity(EntityKind::HomeVisit))
        .await?;

    assert_eq!(result.imported, 1);
    assert_eq!(result.skipped, 2);
    assert_eq!(result.errors, 0);
    assert_eq!(result.success_count(), 1);
    assert!(result.issues.iter().all(|i| i.kind == IssueKind::Skipped));
    assert!(result.issues.iter().any(|i| i.reason == "already exists" && i.sheet_id.as_deref() == Some("HV-2")));
    assert!(result.issues.iter().any(|i| i.reason == "empty record"));

    let imported = store.find_by_sheet_id("HV-1").await?.expect("HV-1 imported");
    assert!(imported.synced);
    assert_eq!(imported.field("visitor"), Some(&json!("Ana")));
    assert_eq!(imported.field("visit_date"), Some(&json!("2024-03-04")));
    assert_eq!(imported.field("observations"), Some(&serde_json::Value::Null));
    Ok(())
}

#[tokio::test]
async fn reimport_is_idempotent() -> Result<()> {
    let harness = Harness::new();
    harness
        .sheets
        .insert_sheet(
            "References",
            &["ID", "Full Name", "Phone", "Verified"],
            vec![
                row(&[("ID", "R-1"), ("Full Name", "Marta"), ("Verified", "sí")]),
                row(&[("ID", "R-2"), ("Full Name", "Jorge"), ("Verified", "no")]),
            ],
        )
        .await;
    let entity = harness.entity(EntityKind::PersonalReference);

    let first = harness.engine.import_from_sheets(&entity).await?;
    let second = harness.engine.import_from_sheets(&entity).await?;

    assert_eq!(first.imported, 2);
    assert_eq!(second.imported, 0);
    assert_eq!(second.skipped, 2);
    assert_eq!(entity.store.count().await?, 2);

    let marta = entity.store.find_by_sheet_id("R-1").await?.expect("R-1 imported");
    assert_eq!(marta.field("verified"), Some(&json!("Y")));
    Ok(())
}

#[tokio::test]
async fn rows_without_an_id_are_skipped_with_their_line() -> Result<()> {
    let harness = Harness::new();
    harness
        .sheets
        .insert_sheet(
            "Promoters",
            &["ID", "Full Name", "Region"],
            vec![
                row(&[("ID", "P-1"), ("Full Name", "Rosa")]),
                row(&[("ID", ""), ("Full Name", "Nameless")]),
            ],
        )
        .await;

    let result = harness
        .engine
        .import_from_sheets(&harness.entity(EntityKind::Promoter))
        .await?;

    assert_eq!(result.imported, 1);
    assert_eq!(result.skipped, 1);
    assert_eq!(result.issues[0].reason, "missing external id (row 3)");
    Ok(())
}

#[tokio::test]
async fn update_policy_overwrites_existing_payroll_rows() -> Result<()> {
    let harness = Harness::new();
    let entity = harness.entity(EntityKind::Payroll);
    let mut fields = Map::new();
    fields.insert("employee_name".into(), json!("Old Name"));
    fields.insert("net_pay".into(), json!("100"));
    let existing = entity.store.create(NewRecord::imported("PAY-1", fields)).await?;

    harness
        .sheets
        .insert_sheet(
            "Payroll",
            &["ID", "Employee", "Gross Pay", "Net Pay"],
            vec![row(&[("ID", "PAY-1"), ("Employee", "New Name"), ("Gross Pay", "$1,250.50"), ("Net Pay", "1100")])],
        )
        .await;

    let result = harness.engine.import_from_sheets(&entity).await?;
    assert_eq!(result.updated, 1);
    assert_eq!(result.imported, 0);

    let record = entity.store.find_by_id(existing.id).await?.expect("still present");
    assert_eq!(record.field("employee_name"), Some(&json!("New Name")));
    assert_eq!(record.field("gross_pay"), Some(&json!("1250.50")));
    assert_eq!(entity.store.count().await?, 1);
    Ok(())
}

#[tokio::test]
async fn invalid_strict_cell_fails_only_that_row() -> Result<()> {
    let harness = Harness::new();
    harness
        .sheets
        .insert_sheet(
            "Credit Applications",
            &["ID", "Application Date", "Requested Amount", "Status"],
            vec![
                row(&[("ID", "CA-1"), ("Application Date", "01/02/2024"), ("Requested Amount", "lots")]),
                row(&[("ID", "CA-2"), ("Application Date", "01/02/2024"), ("Requested Amount", "15000")]),
            ],
        )
        .await;
    let entity = harness.entity(EntityKind::CreditApplication);

    let result = harness.engine.import_from_sheets(&entity).await?;

    assert_eq!(result.imported, 1);
    assert_eq!(result.errors, 1);
    let issue = &result.issues[0];
    assert_eq!(issue.kind, IssueKind::Error);
    assert_eq!(issue.sheet_id.as_deref(), Some("CA-1"));
    assert!(issue.reason.contains("Requested Amount"), "reason: {}", issue.reason);
    assert!(entity.store.find_by_sheet_id("CA-1").await?.is_none());
    Ok(())
}

#[tokio::test]
async fn missing_sheet_fails_the_pass() -> Result<()> {
    let harness = Harness::new();
    let engine = harness.engine_over(Arc::new(MemorySheetGateway::new()));

    let err = engine
        .import_from_sheets(&harness.entity(EntityKind::School))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("Schools"), "error: {}", err);
    Ok(())
}
