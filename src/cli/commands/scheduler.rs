use serde_json::Value;

use super::migration::print_full_migration;
use crate::cli::client::ApiClient;
use crate::cli::utils::{output_success, print_fields, scalar};
use crate::cli::OutputFormat;

pub async fn run_all(client: &ApiClient, output_format: &OutputFormat) -> anyhow::Result<()> {
    let result = client.post(&["migration-scheduler", "run-all"], &[]).await?;
    match output_format {
        OutputFormat::Json => output_success(output_format, "Migration run finished", Some(result)),
        OutputFormat::Text => {
            if let Some(entities) = result.get("entities").and_then(Value::as_array) {
                for entity in entities {
                    let ok = entity.get("success").and_then(Value::as_bool).unwrap_or(false);
                    println!(
                        "{} {} ({} ms){}",
                        if ok { "✓" } else { "✗" },
                        entity.get("displayName").map(scalar).unwrap_or_default(),
                        entity.get("durationMs").map(scalar).unwrap_or_default(),
                        entity
                            .get("error")
                            .filter(|e| !e.is_null())
                            .map(|e| format!(": {}", scalar(e)))
                            .unwrap_or_default(),
                    );
                }
            }
            if let Some(totals) = result.get("totals") {
                println!("Totals");
                print_fields(
                    totals,
                    &["entities", "succeeded", "failed", "imported", "updated", "synced", "skipped", "errors"],
                );
            }
            Ok(())
        }
    }
}

pub async fn run_one(client: &ApiClient, name: &str, output_format: &OutputFormat) -> anyhow::Result<()> {
    let report = client.post(&["migration-scheduler", "run"], &[("name", name)]).await?;
    print_full_migration(output_format, &report)
}

pub async fn status(client: &ApiClient, output_format: &OutputFormat) -> anyhow::Result<()> {
    let status = client.get(&["migration-scheduler", "status"], &[]).await?;
    match output_format {
        OutputFormat::Json => output_success(output_format, "Scheduler status", Some(status)),
        OutputFormat::Text => {
            println!("Scheduler");
            print_fields(
                &status,
                &["enabled", "running", "timezone", "transport", "entityDelayMs", "nextRunAt"],
            );
            if let Some(last) = status.get("lastRun").filter(|v| !v.is_null()) {
                println!("Last run");
                print_fields(last, &["trigger", "startedAt", "durationMs"]);
            }
            Ok(())
        }
    }
}
