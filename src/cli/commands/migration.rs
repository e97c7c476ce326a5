use serde_json::Value;

use super::migration_segment;
use crate::cli::client::ApiClient;
use crate::cli::utils::{counts_line, output_success, print_fields, print_issues, scalar};
use crate::cli::OutputFormat;

pub async fn import(client: &ApiClient, entity: &str, output_format: &OutputFormat) -> anyhow::Result<()> {
    let segment = migration_segment(entity)?;
    let report = client.post(&[segment.as_str(), "import-from-sheets"], &[]).await?;
    print_report(output_format, &format!("Import of {} finished", entity), report)
}

pub async fn sync(client: &ApiClient, entity: &str, output_format: &OutputFormat) -> anyhow::Result<()> {
    let segment = migration_segment(entity)?;
    let report = client.post(&[segment.as_str(), "sync-to-sheets"], &[]).await?;
    print_report(output_format, &format!("Sync of {} finished", entity), report)
}

pub async fn migrate(client: &ApiClient, entity: &str, output_format: &OutputFormat) -> anyhow::Result<()> {
    let segment = migration_segment(entity)?;
    let report = client.post(&[segment.as_str(), "full-migration"], &[]).await?;
    print_full_migration(output_format, &report)
}

pub async fn status(client: &ApiClient, entity: &str, output_format: &OutputFormat) -> anyhow::Result<()> {
    let segment = migration_segment(entity)?;
    let status = client.get(&[segment.as_str(), "status"], &[]).await?;
    match output_format {
        OutputFormat::Json => output_success(output_format, &format!("Status of {}", entity), Some(status)),
        OutputFormat::Text => {
            println!("{}", entity);
            print_fields(
                &status,
                &["totalInDatabase", "totalInSheets", "syncedInDatabase", "unsyncedInDatabase"],
            );
            Ok(())
        }
    }
}

pub async fn headers(client: &ApiClient, entity: &str, output_format: &OutputFormat) -> anyhow::Result<()> {
    let segment = migration_segment(entity)?;
    let headers = client.get(&[segment.as_str(), "sheet-headers"], &[]).await?;
    match output_format {
        OutputFormat::Json => output_success(output_format, &format!("Sheet headers of {}", entity), Some(headers)),
        OutputFormat::Text => {
            print_fields(&headers, &["sheet", "totalRows", "identifierColumn", "identifierPresent"]);
            for key in ["headers", "unmappedColumns", "missingColumns"] {
                let columns = string_list(&headers, key);
                println!("  {}: {}", key, if columns.is_empty() { "-".to_string() } else { columns.join(", ") });
            }
            Ok(())
        }
    }
}

pub async fn compare(
    client: &ApiClient,
    entity: &str,
    sheet_id: &str,
    output_format: &OutputFormat,
) -> anyhow::Result<()> {
    let segment = migration_segment(entity)?;
    let comparison = client
        .get(&[segment.as_str(), "compare-record"], &[("sheetId", sheet_id)])
        .await?;
    match output_format {
        OutputFormat::Json => output_success(output_format, &format!("Comparison of {}", sheet_id), Some(comparison)),
        OutputFormat::Text => {
            print_fields(&comparison, &["sheetId", "existsInDatabase", "existsInSheets", "inSync"]);
            if let Some(differences) = comparison.get("differences").and_then(Value::as_array) {
                for diff in differences {
                    println!(
                        "    {}: database={} sheet={}",
                        diff.get("column").map(scalar).unwrap_or_default(),
                        diff.get("database").map(scalar).unwrap_or_default(),
                        diff.get("sheet").map(scalar).unwrap_or_default(),
                    );
                }
            }
            Ok(())
        }
    }
}

fn print_report(output_format: &OutputFormat, message: &str, report: Value) -> anyhow::Result<()> {
    match output_format {
        OutputFormat::Json => output_success(output_format, message, Some(report)),
        OutputFormat::Text => {
            println!("✓ {}: {}", message, counts_line(&report));
            print_issues(&report);
            Ok(())
        }
    }
}

/// Renders `{entity, import, sync}` where each pass is `{success, result?, error?}`.
pub(super) fn print_full_migration(output_format: &OutputFormat, report: &Value) -> anyhow::Result<()> {
    let entity = report.get("entity").map(scalar).unwrap_or_default();
    match output_format {
        OutputFormat::Json => output_success(output_format, &format!("Full migration of {}", entity), Some(report.clone())),
        OutputFormat::Text => {
            println!("{}", entity);
            for pass in ["import", "sync"] {
                let Some(outcome) = report.get(pass) else {
                    continue;
                };
                let ok = outcome.get("success").and_then(Value::as_bool).unwrap_or(false);
                match (ok, outcome.get("result")) {
                    (true, Some(result)) => {
                        println!("  {}: {}", pass, counts_line(result));
                        print_issues(result);
                    }
                    _ => println!(
                        "  {}: failed ({})",
                        pass,
                        outcome.get("error").map(scalar).unwrap_or_default()
                    ),
                }
            }
            Ok(())
        }
    }
}

fn string_list(value: &Value, key: &str) -> Vec<String> {
    value
        .get(key)
        .and_then(Value::as_array)
        .map(|items| items.iter().map(scalar).collect())
        .unwrap_or_default()
}
