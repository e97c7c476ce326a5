use anyhow::Result;
use pretty_assertions::assert_eq;
use serde_json::{json, Map};

use backoffice_sync::database::{RecordStore, RecordUpdate};
use backoffice_sync::registry::EntityKind;
use backoffice_sync::testing::{row, Harness};

#[tokio::test]
async fn sheet_headers_classifies_columns() -> Result<()> {
    let harness = Harness::new();
    let long_note = "x".repeat(80);
    harness
        .sheets
        .insert_sheet(
            "Collections",
            &["ID", "Visit Date", "Collector", "Notes", "Legacy Column"],
            vec![
                row(&[("ID", "CV-1"), ("Notes", long_note.as_str())]),
                row(&[("ID", "CV-2")]),
                row(&[("ID", "CV-3")]),
                row(&[("ID", "CV-4")]),
            ],
        )
        .await;

    let headers = harness
        .engine
        .sheet_headers(&harness.entity(EntityKind::CollectionVisit))
        .await?;

    assert!(headers.identifier_present);
    assert_eq!(headers.total_rows, 4);
    assert_eq!(headers.sample_rows.len(), 3);
    assert_eq!(headers.sample_rows[0]["Notes"].chars().count(), 51);
    assert!(headers.sample_rows[0]["Notes"].ends_with('…'));
    assert_eq!(headers.mapped_columns, vec!["Visit Date", "Collector", "Notes"]);
    assert_eq!(headers.unmapped_columns, vec!["Legacy Column"]);
    assert_eq!(
        headers.missing_columns,
        vec!["Application ID", "Days Overdue", "Promise To Pay"]
    );
    Ok(())
}

#[tokio::test]
async fn compare_record_lists_drifted_columns() -> Result<()> {
    let harness = Harness::new();
    let entity = harness.entity(EntityKind::Guarantor);
    harness
        .sheets
        .insert_sheet(
            "Guarantors",
            &["ID", "Full Name", "Phone", "Monthly Income"],
            vec![row(&[("ID", "G-1"), ("Full Name", "Elena"), ("Phone", "555-0101"), ("Monthly Income", "12,000")])],
        )
        .await;
    harness.engine.import_from_sheets(&entity).await?;

    let clean = harness.engine.compare_record(&entity, "G-1").await?;
    assert!(clean.in_sync, "differences: {:?}", clean.differences);
    assert!(clean.differences.is_empty());

    let record = entity.store.find_by_sheet_id("G-1").await?.expect("imported");
    let mut edit = Map::new();
    edit.insert("phone".into(), json!("555-9999"));
    entity.store.update(record.id, RecordUpdate::fields(edit)).await?;

    let drifted = harness.engine.compare_record(&entity, " G-1 ").await?;
    assert!(!drifted.in_sync);
    assert_eq!(drifted.differences.len(), 1);
    assert_eq!(drifted.differences[0].column, "Phone");
    assert_eq!(drifted.differences[0].database, "555-9999");
    assert_eq!(drifted.differences[0].sheet, "555-0101");
    assert_ne!(drifted.database_fingerprint, drifted.sheet_fingerprint);
    Ok(())
}

#[tokio::test]
async fn compare_record_for_unknown_id() -> Result<()> {
    let harness = Harness::new();
    let comparison = harness
        .engine
        .compare_record(&harness.entity(EntityKind::Borrower), "B-404")
        .await?;

    assert!(!comparison.exists_in_database);
    assert!(!comparison.exists_in_sheets);
    assert!(!comparison.in_sync);
    assert!(comparison.internal_record.is_none());
    Ok(())
}
