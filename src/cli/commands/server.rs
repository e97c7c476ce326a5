use serde_json::Value;

use crate::cli::client::ApiClient;
use crate::cli::utils::{output_success, scalar};
use crate::cli::OutputFormat;

/// Lists entities from the API root endpoint.
pub async fn entities(client: &ApiClient, output_format: &OutputFormat) -> anyhow::Result<()> {
    let info = client.get(&[], &[]).await?;
    let entities = info.get("entities").cloned().unwrap_or(Value::Array(Vec::new()));
    match output_format {
        OutputFormat::Json => output_success(
            output_format,
            "Registered entities",
            Some(serde_json::json!({ "entities": entities })),
        ),
        OutputFormat::Text => {
            for entity in entities.as_array().into_iter().flatten() {
                println!(
                    "{:<22} {:<24} {}",
                    entity.get("entity").map(scalar).unwrap_or_default(),
                    entity.get("displayName").map(scalar).unwrap_or_default(),
                    entity.get("routes").map(scalar).unwrap_or_default(),
                );
            }
            Ok(())
        }
    }
}
