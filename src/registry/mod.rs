//! Ordered registry of entity descriptors.
//!
//! Definitions (sheet name, table, identifier column, field mapping, import
//! policy) are data, loaded from YAML. The built-in registry is embedded from
//! `entities.yaml`; deployments may point `REGISTRY_PATH` at an override file.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

use crate::database::store::RecordStore;
use crate::mapping::{FieldBinding, FieldMapping, MappingError};

pub mod kind;

pub use kind::{normalize_name, EntityKind, UnknownEntity};

const BUILTIN_REGISTRY: &str = include_str!("entities.yaml");

pub const DEFAULT_IDENTIFIER_COLUMN: &str = "ID";

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Failed to read registry file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid registry YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Entity '{0}' is registered more than once")]
    DuplicateEntity(EntityKind),

    #[error("Invalid table name for '{entity}': {table}")]
    InvalidTable { entity: EntityKind, table: String },

    #[error("Table '{0}' is used by more than one entity")]
    DuplicateTable(String),

    #[error("Entity '{entity}' has no sheet name")]
    MissingSheet { entity: EntityKind },

    #[error("Identifier column '{column}' of '{entity}' must not be a mapped column")]
    IdentifierMapped { entity: EntityKind, column: String },

    #[error("Invalid field mapping for '{entity}': {source}")]
    Mapping {
        entity: EntityKind,
        #[source]
        source: MappingError,
    },

    #[error("Entity not found: {0}")]
    EntityNotFound(String),
}

/// Whether import overwrites records that already exist for a sheet ID.
///
/// Both behaviours exist in production data flows; the registry records which
/// one each entity uses instead of standardizing silently.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImportPolicy {
    #[default]
    SkipExisting,
    UpdateExisting,
}

/// One entity as written in the registry file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityDefinition {
    pub kind: EntityKind,
    #[serde(default)]
    pub display_name: Option<String>,
    pub sheet: String,
    pub table: String,
    #[serde(default = "default_identifier_column")]
    pub identifier_column: String,
    #[serde(default)]
    pub import_policy: ImportPolicy,
    pub fields: Vec<FieldBinding>,
}

fn default_identifier_column() -> String {
    DEFAULT_IDENTIFIER_COLUMN.to_string()
}

impl EntityDefinition {
    pub fn display_name(&self) -> &str {
        self.display_name
            .as_deref()
            .unwrap_or_else(|| self.kind.default_display_name())
    }
}

#[derive(Debug, Deserialize)]
struct RegistryFile {
    entities: Vec<EntityDefinition>,
}

/// Everything the sync engine needs to reconcile one entity
pub struct EntityDescriptor {
    pub kind: EntityKind,
    pub display_name: String,
    pub sheet_name: String,
    pub identifier_column: String,
    pub import_policy: ImportPolicy,
    pub mapping: FieldMapping,
    pub store: Arc<dyn RecordStore>,
}

impl std::fmt::Debug for EntityDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntityDescriptor")
            .field("kind", &self.kind)
            .field("sheet_name", &self.sheet_name)
            .field("table", &self.store.table())
            .field("identifier_column", &self.identifier_column)
            .field("import_policy", &self.import_policy)
            .field("fields", &self.mapping.len())
            .finish()
    }
}

pub struct Registry {
    entities: Vec<Arc<EntityDescriptor>>,
}

impl Registry {
    /// Parse and validate registry YAML
    pub fn parse_definitions(yaml: &str) -> Result<Vec<EntityDefinition>, RegistryError> {
        let file: RegistryFile = serde_yaml::from_str(yaml)?;
        validate_definitions(&file.entities)?;
        Ok(file.entities)
    }

    pub fn builtin_definitions() -> Result<Vec<EntityDefinition>, RegistryError> {
        Self::parse_definitions(BUILTIN_REGISTRY)
    }

    pub fn load_definitions(path: impl AsRef<Path>) -> Result<Vec<EntityDefinition>, RegistryError> {
        let path = path.as_ref();
        let yaml = std::fs::read_to_string(path).map_err(|source| RegistryError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::parse_definitions(&yaml)
    }

    /// Attach a record store to each definition, preserving registry order
    pub fn build<F>(definitions: Vec<EntityDefinition>, mut store_for: F) -> Result<Self, RegistryError>
    where
        F: FnMut(&EntityDefinition) -> Arc<dyn RecordStore>,
    {
        let parts = definitions
            .into_iter()
            .map(|definition| {
                let store = store_for(&definition);
                (definition, store)
            })
            .collect();
        Self::assemble(parts)
    }

    /// Registry from definitions already paired with their stores
    pub fn assemble(parts: Vec<(EntityDefinition, Arc<dyn RecordStore>)>) -> Result<Self, RegistryError> {
        let definitions: Vec<EntityDefinition> = parts.iter().map(|(d, _)| d.clone()).collect();
        validate_definitions(&definitions)?;

        let mut entities = Vec::with_capacity(parts.len());
        for (definition, store) in parts {
            let mapping = FieldMapping::new(definition.fields.clone()).map_err(|source| {
                RegistryError::Mapping {
                    entity: definition.kind,
                    source,
                }
            })?;
            entities.push(Arc::new(EntityDescriptor {
                kind: definition.kind,
                display_name: definition.display_name().to_string(),
                sheet_name: definition.sheet.trim().to_string(),
                identifier_column: definition.identifier_column.trim().to_string(),
                import_policy: definition.import_policy,
                mapping,
                store,
            }));
        }

        Ok(Self { entities })
    }

    pub fn get(&self, kind: EntityKind) -> Option<Arc<EntityDescriptor>> {
        self.entities.iter().find(|e| e.kind == kind).cloned()
    }

    /// Case-insensitive lookup by key, slug or display name
    pub fn resolve(&self, name: &str) -> Result<Arc<EntityDescriptor>, RegistryError> {
        self.entities
            .iter()
            .find(|e| e.kind.matches_name(name, &e.display_name))
            .cloned()
            .ok_or_else(|| RegistryError::EntityNotFound(name.to_string()))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<EntityDescriptor>> {
        self.entities.iter()
    }

    pub fn kinds(&self) -> Vec<EntityKind> {
        self.entities.iter().map(|e| e.kind).collect()
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}

fn validate_definitions(definitions: &[EntityDefinition]) -> Result<(), RegistryError> {
    let mut kinds = HashSet::new();
    let mut tables = HashSet::new();

    for definition in definitions {
        if !kinds.insert(definition.kind) {
            return Err(RegistryError::DuplicateEntity(definition.kind));
        }
        if !is_valid_table_name(&definition.table) {
            return Err(RegistryError::InvalidTable {
                entity: definition.kind,
                table: definition.table.clone(),
            });
        }
        if !tables.insert(definition.table.as_str()) {
            return Err(RegistryError::DuplicateTable(definition.table.clone()));
        }
        if definition.sheet.trim().is_empty() {
            return Err(RegistryError::MissingSheet {
                entity: definition.kind,
            });
        }

        let identifier = definition.identifier_column.trim();
        if definition.fields.iter().any(|b| b.column.trim() == identifier) {
            return Err(RegistryError::IdentifierMapped {
                entity: definition.kind,
                column: identifier.to_string(),
            });
        }

        FieldMapping::new(definition.fields.clone()).map_err(|source| RegistryError::Mapping {
            entity: definition.kind,
            source,
        })?;
    }

    Ok(())
}

/// Table names are interpolated into SQL, so only lowercase identifiers pass
pub fn is_valid_table_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_lowercase() || c == '_' => {}
        _ => return false,
    }
    name.len() <= 63 && chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
}
