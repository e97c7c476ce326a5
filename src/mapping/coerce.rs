use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};
use std::str::FromStr;

use super::MappingError;

/// Lightweight value coercion applied per mapped column.
/// Cells that fail to coerce pass through as text unless the binding is strict.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Coercion {
    #[default]
    Text,
    /// Free-form yes/no answers normalized to "Y" / "N"
    YesNo,
    /// Numeric-looking strings become JSON numbers
    Number,
    /// Money amounts, stored as canonical decimal strings
    Decimal,
    /// Sheet dates (dd/mm/yyyy) stored as ISO yyyy-mm-dd
    Date,
}

const SHEET_DATE_FORMAT: &str = "%d/%m/%Y";
const ISO_DATE_FORMAT: &str = "%Y-%m-%d";
const ACCEPTED_DATE_FORMATS: &[&str] = &[SHEET_DATE_FORMAT, ISO_DATE_FORMAT, "%d-%m-%Y"];

impl Coercion {
    /// Human-readable name used in validation errors
    pub fn expected(&self) -> &'static str {
        match self {
            Coercion::Text => "text",
            Coercion::YesNo => "yes/no answer",
            Coercion::Number => "number",
            Coercion::Decimal => "decimal amount",
            Coercion::Date => "date",
        }
    }

    /// Convert a sheet cell into the internal value.
    /// Blank cells become `null`; text keeps the cell as written.
    pub fn parse_cell(&self, column: &str, raw: &str, strict: bool) -> Result<Value, MappingError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Ok(Value::Null);
        }
        if *self == Coercion::Text {
            return Ok(Value::String(raw.to_string()));
        }

        match self.coerce(trimmed) {
            Some(value) => Ok(value),
            None if strict => Err(MappingError::InvalidValue {
                column: column.to_string(),
                value: trimmed.to_string(),
                expected: self.expected(),
            }),
            None => Ok(Value::String(trimmed.to_string())),
        }
    }

    /// Render an internal value back into a sheet cell
    pub fn render(&self, value: &Value) -> String {
        match (self, value) {
            (_, Value::Null) => String::new(),
            (Coercion::Date, Value::String(s)) => NaiveDate::parse_from_str(s, ISO_DATE_FORMAT)
                .map(|d| d.format(SHEET_DATE_FORMAT).to_string())
                .unwrap_or_else(|_| s.clone()),
            (Coercion::YesNo, Value::Bool(b)) => (if *b { "Y" } else { "N" }).to_string(),
            (_, Value::String(s)) => s.clone(),
            (_, Value::Number(n)) => n.to_string(),
            (_, Value::Bool(b)) => b.to_string(),
            (_, other) => other.to_string(),
        }
    }

    fn coerce(&self, s: &str) -> Option<Value> {
        match self {
            Coercion::Text => Some(Value::String(s.to_string())),
            Coercion::YesNo => normalize_yes_no(s).map(|token| Value::String(token.to_string())),
            Coercion::Number => parse_number(s).map(Value::Number),
            Coercion::Decimal => parse_decimal(s).map(|d| Value::String(d.to_string())),
            Coercion::Date => parse_date(s).map(|d| Value::String(d.format(ISO_DATE_FORMAT).to_string())),
        }
    }
}

fn normalize_yes_no(s: &str) -> Option<&'static str> {
    match s.to_lowercase().as_str() {
        "y" | "yes" | "si" | "sí" | "true" | "1" | "x" => Some("Y"),
        "n" | "no" | "false" | "0" => Some("N"),
        _ => None,
    }
}

fn parse_number(s: &str) -> Option<Number> {
    let cleaned: String = s.chars().filter(|c| *c != ',').collect();
    let numeric_looking = !cleaned.is_empty()
        && cleaned.chars().any(|c| c.is_ascii_digit())
        && cleaned.chars().all(|c| c.is_ascii_digit() || matches!(c, '.' | '-' | '+'));
    if !numeric_looking {
        return None;
    }

    if let Ok(i) = cleaned.parse::<i64>() {
        return Some(Number::from(i));
    }
    cleaned
        .parse::<f64>()
        .ok()
        .filter(|f| f.is_finite())
        .and_then(Number::from_f64)
}

fn parse_decimal(s: &str) -> Option<Decimal> {
    let cleaned: String = s
        .chars()
        .filter(|c| !matches!(c, '$' | ',' | ' '))
        .collect();
    Decimal::from_str(&cleaned).ok()
}

fn parse_date(s: &str) -> Option<NaiveDate> {
    ACCEPTED_DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(s, fmt).ok())
}
