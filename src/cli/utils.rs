use serde_json::{json, Map, Value};

use crate::cli::OutputFormat;

/// Output a success message in the appropriate format
pub fn output_success(output_format: &OutputFormat, message: &str, data: Option<Value>) -> anyhow::Result<()> {
    match output_format {
        OutputFormat::Json => {
            let mut response = Map::new();
            response.insert("success".into(), json!(true));
            response.insert("message".into(), json!(message));
            match data {
                Some(Value::Object(fields)) => response.extend(fields),
                Some(other) => {
                    response.insert("data".into(), other);
                }
                None => {}
            }
            println!("{}", serde_json::to_string_pretty(&Value::Object(response))?);
        }
        OutputFormat::Text => {
            println!("✓ {}", message);
        }
    }
    Ok(())
}

/// Output an error message in the appropriate format
pub fn output_error(output_format: &OutputFormat, message: &str, error_code: Option<&str>) -> anyhow::Result<()> {
    match output_format {
        OutputFormat::Json => {
            let mut response = json!({
                "success": false,
                "error": message
            });
            if let Some(code) = error_code {
                response["error_code"] = json!(code);
            }
            println!("{}", serde_json::to_string_pretty(&response)?);
        }
        OutputFormat::Text => {
            eprintln!("Error: {}", message);
        }
    }
    Ok(())
}

/// Print `key: value` lines for the scalar fields of an object.
pub fn print_fields(value: &Value, keys: &[&str]) {
    for key in keys {
        if let Some(field) = value.get(*key) {
            println!("  {}: {}", key, scalar(field));
        }
    }
}

pub fn scalar(value: &Value) -> String {
    match value {
        Value::Null => "-".to_string(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Counts line for a sync report or pass outcome.
pub fn counts_line(report: &Value) -> String {
    let n = |key: &str| report.get(key).and_then(Value::as_u64).unwrap_or(0);
    format!(
        "imported {}, updated {}, skipped {}, errors {}",
        n("imported"),
        n("updated"),
        n("skipped"),
        n("errors")
    )
}

/// Print per-record issues beneath a report, if any.
pub fn print_issues(report: &Value) {
    let Some(issues) = report.get("issues").and_then(Value::as_array) else {
        return;
    };
    for issue in issues {
        let kind = issue.get("kind").map(scalar).unwrap_or_default();
        let id = issue
            .get("sheetId")
            .or_else(|| issue.get("recordId"))
            .map(scalar)
            .unwrap_or_else(|| "-".to_string());
        let reason = issue.get("reason").map(scalar).unwrap_or_default();
        println!("    [{}] {}: {}", kind, id, reason);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_line_defaults_missing_fields() {
        let line = counts_line(&json!({"imported": 3, "errors": 1}));
        assert_eq!(line, "imported 3, updated 0, skipped 0, errors 1");
    }

    #[test]
    fn scalar_renders_null_as_dash() {
        assert_eq!(scalar(&Value::Null), "-");
        assert_eq!(scalar(&json!("x")), "x");
        assert_eq!(scalar(&json!(true)), "true");
    }
}
