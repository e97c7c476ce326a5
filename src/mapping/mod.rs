//! Bidirectional sheet column ↔ record field dictionary.
//!
//! A mapping is a partial bijection: every column and every field appears at
//! most once. Keys outside the mapping are dropped in both directions without
//! error, since the spreadsheet layout drifts independently of the database.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use thiserror::Error;

use crate::types::SheetRow;

pub mod coerce;

pub use coerce::Coercion;

/// Record fields owned by the store; they never come from a sheet column
pub const RESERVED_FIELDS: &[&str] = &[
    "id",
    "sheet_id",
    "synced",
    "sync_attempted_at",
    "created_at",
    "updated_at",
];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MappingError {
    #[error("Column '{0}' is mapped more than once")]
    DuplicateColumn(String),

    #[error("Field '{0}' is mapped more than once")]
    DuplicateField(String),

    #[error("Field '{0}' is reserved and cannot be mapped")]
    ReservedField(String),

    #[error("Binding with empty column or field name")]
    EmptyName,

    #[error("Invalid value for column '{column}': '{value}' is not a valid {expected}")]
    InvalidValue {
        column: String,
        value: String,
        expected: &'static str,
    },
}

/// One sheet column bound to one record field
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldBinding {
    pub column: String,
    pub field: String,
    #[serde(default)]
    pub coerce: Coercion,
    /// Reject unparseable cells instead of passing them through as text
    #[serde(default)]
    pub strict: bool,
}

impl FieldBinding {
    pub fn new(column: impl Into<String>, field: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            field: field.into(),
            coerce: Coercion::Text,
            strict: false,
        }
    }

    pub fn coerce(mut self, coerce: Coercion) -> Self {
        self.coerce = coerce;
        self
    }

    pub fn strict(mut self) -> Self {
        self.strict = true;
        self
    }
}

#[derive(Debug, Clone)]
pub struct FieldMapping {
    bindings: Vec<FieldBinding>,
    by_column: HashMap<String, usize>,
    by_field: HashMap<String, usize>,
}

impl FieldMapping {
    /// Build a mapping, rejecting anything that would break the bijection
    pub fn new(bindings: Vec<FieldBinding>) -> Result<Self, MappingError> {
        let mut by_column = HashMap::new();
        let mut by_field = HashMap::new();

        for (index, binding) in bindings.iter().enumerate() {
            let column = binding.column.trim();
            let field = binding.field.trim();
            if column.is_empty() || field.is_empty() {
                return Err(MappingError::EmptyName);
            }
            if RESERVED_FIELDS.contains(&field) {
                return Err(MappingError::ReservedField(field.to_string()));
            }
            if by_column.insert(column.to_string(), index).is_some() {
                return Err(MappingError::DuplicateColumn(column.to_string()));
            }
            if by_field.insert(field.to_string(), index).is_some() {
                return Err(MappingError::DuplicateField(field.to_string()));
            }
        }

        Ok(Self {
            bindings,
            by_column,
            by_field,
        })
    }

    pub fn bindings(&self) -> &[FieldBinding] {
        &self.bindings
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    pub fn binding_for_column(&self, column: &str) -> Option<&FieldBinding> {
        self.by_column.get(column.trim()).map(|&i| &self.bindings[i])
    }

    pub fn binding_for_field(&self, field: &str) -> Option<&FieldBinding> {
        self.by_field.get(field).map(|&i| &self.bindings[i])
    }

    pub fn field_for_column(&self, column: &str) -> Option<&str> {
        self.binding_for_column(column).map(|b| b.field.as_str())
    }

    pub fn column_for_field(&self, field: &str) -> Option<&str> {
        self.binding_for_field(field).map(|b| b.column.as_str())
    }

    /// Sheet row → record fields. Strict bindings fail on unparseable cells.
    pub fn to_internal(&self, row: &SheetRow) -> Result<Map<String, Value>, MappingError> {
        self.translate_row(row, true)
    }

    /// Record fields → sheet row, in mapping (column) order
    pub fn to_external(&self, fields: &Map<String, Value>) -> SheetRow {
        let mut row = SheetRow::new();
        for binding in &self.bindings {
            if let Some(value) = fields.get(binding.field.trim()) {
                row.insert(binding.column.trim().to_string(), binding.coerce.render(value));
            }
        }
        row
    }

    /// Re-render a sheet row through the mapping so that formatting noise
    /// ("1,250" vs "1250") does not register as a difference
    pub fn canonicalize(&self, row: &SheetRow) -> SheetRow {
        match self.translate_row(row, false) {
            Ok(fields) => self.to_external(&fields),
            Err(_) => SheetRow::new(),
        }
    }

    /// Pass API-supplied fields through their bindings (render, then parse)
    /// so stored values are the ones an import of the written row would yield.
    /// Unmapped fields are kept untouched.
    pub fn normalize(&self, fields: Map<String, Value>) -> Result<Map<String, Value>, MappingError> {
        fields
            .into_iter()
            .map(|(field, value)| match self.binding_for_field(&field) {
                Some(binding) => {
                    let rendered = binding.coerce.render(&value);
                    let value = binding
                        .coerce
                        .parse_cell(binding.column.trim(), &rendered, binding.strict)?;
                    Ok((field, value))
                }
                None => Ok((field, value)),
            })
            .collect()
    }

    fn translate_row(&self, row: &SheetRow, honor_strict: bool) -> Result<Map<String, Value>, MappingError> {
        let mut fields = Map::new();
        for (column, raw) in row {
            let Some(binding) = self.binding_for_column(column) else {
                continue;
            };
            let value = binding
                .coerce
                .parse_cell(binding.column.trim(), raw, honor_strict && binding.strict)?;
            fields.insert(binding.field.trim().to_string(), value);
        }
        Ok(fields)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn borrower_mapping() -> FieldMapping {
        FieldMapping::new(vec![
            FieldBinding::new("Full Name", "full_name"),
            FieldBinding::new("Monthly Income", "monthly_income").coerce(Coercion::Decimal),
            FieldBinding::new("Dependents", "dependents").coerce(Coercion::Number),
            FieldBinding::new("Has Guarantor", "has_guarantor").coerce(Coercion::YesNo),
            FieldBinding::new("Birth Date", "birth_date").coerce(Coercion::Date),
        ])
        .unwrap()
    }

    fn row(pairs: &[(&str, &str)]) -> SheetRow {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn to_internal_drops_unmapped_columns() {
        let mapping = borrower_mapping();
        let fields = mapping
            .to_internal(&row(&[
                ("ID", "B-1"),
                ("Full Name", "Ana López"),
                ("Dependents", "2"),
                ("Comments", "call after 5pm"),
            ]))
            .unwrap();

        assert_eq!(
            Value::Object(fields),
            json!({ "full_name": "Ana López", "dependents": 2 })
        );
    }

    #[test]
    fn to_external_only_copies_present_fields() {
        let mapping = borrower_mapping();
        let fields = json!({ "full_name": "Ana", "internal_score": 700, "has_guarantor": "Y" });
        let external = mapping.to_external(fields.as_object().unwrap());

        assert_eq!(external, row(&[("Full Name", "Ana"), ("Has Guarantor", "Y")]));
    }

    #[test]
    fn round_trip_preserves_mapped_fields() {
        let mapping = borrower_mapping();
        let record = json!({
            "full_name": "Luis Pérez",
            "monthly_income": "8500.00",
            "dependents": 3,
            "has_guarantor": "N",
            "birth_date": "1999-11-30",
            "audit_note": "not mapped",
        });
        let original = record.as_object().unwrap();

        let back = mapping.to_internal(&mapping.to_external(original)).unwrap();
        for binding in mapping.bindings() {
            assert_eq!(back.get(&binding.field), original.get(&binding.field), "{}", binding.field);
        }
        assert!(!back.contains_key("audit_note"));
    }

    #[test]
    fn normalized_api_fields_survive_a_sheet_round_trip() {
        let mapping = borrower_mapping();
        let input = json!({
            "full_name": " Ana ",
            "monthly_income": 8500,
            "dependents": "3",
            "has_guarantor": "yes",
            "birth_date": "",
            "internal_score": 700,
        });

        let stored = mapping.normalize(input.as_object().unwrap().clone()).unwrap();
        assert_eq!(
            Value::Object(stored.clone()),
            json!({
                "full_name": " Ana ",
                "monthly_income": "8500",
                "dependents": 3,
                "has_guarantor": "Y",
                "birth_date": null,
                "internal_score": 700,
            })
        );

        let back = mapping.to_internal(&mapping.to_external(&stored)).unwrap();
        for binding in mapping.bindings() {
            assert_eq!(back.get(&binding.field), stored.get(&binding.field), "{}", binding.field);
        }
    }

    #[test]
    fn normalize_rejects_values_a_strict_binding_cannot_parse() {
        let mapping = FieldMapping::new(vec![
            FieldBinding::new("Requested Amount", "requested_amount")
                .coerce(Coercion::Decimal)
                .strict(),
        ])
        .unwrap();
        let input = json!({ "requested_amount": "lots" });

        let err = mapping.normalize(input.as_object().unwrap().clone()).unwrap_err();
        assert!(matches!(err, MappingError::InvalidValue { ref column, .. } if column == "Requested Amount"));
    }

    #[test]
    fn header_whitespace_is_ignored() {
        let mapping = borrower_mapping();
        let fields = mapping.to_internal(&row(&[(" Full Name ", "Ana")])).unwrap();
        assert_eq!(fields.get("full_name"), Some(&json!("Ana")));
    }

    #[test]
    fn rejects_non_bijective_mappings() {
        let dup_column = FieldMapping::new(vec![
            FieldBinding::new("Name", "name"),
            FieldBinding::new("Name", "other"),
        ]);
        assert_eq!(dup_column.unwrap_err(), MappingError::DuplicateColumn("Name".into()));

        let dup_field = FieldMapping::new(vec![
            FieldBinding::new("Name", "name"),
            FieldBinding::new("Nombre", "name"),
        ]);
        assert_eq!(dup_field.unwrap_err(), MappingError::DuplicateField("name".into()));

        let reserved = FieldMapping::new(vec![FieldBinding::new("Synced", "synced")]);
        assert_eq!(reserved.unwrap_err(), MappingError::ReservedField("synced".into()));
    }

    #[test]
    fn canonicalize_normalizes_formatting() {
        let mapping = borrower_mapping();
        let canonical = mapping.canonicalize(&row(&[
            ("Monthly Income", "$8,500.00"),
            ("Has Guarantor", "sí"),
            ("Extra", "x"),
        ]));
        assert_eq!(canonical, row(&[("Monthly Income", "8500.00"), ("Has Guarantor", "Y")]));
    }
}
