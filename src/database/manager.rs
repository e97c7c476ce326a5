use sqlx::{postgres::PgPoolOptions, PgPool};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::info;

use super::postgres::PgRecordStore;
use super::store::{RecordStore, StoreError};
use crate::config::DatabaseConfig;
use crate::registry::EntityDefinition;

/// Errors from DatabaseManager
#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("Missing configuration: {0}")]
    ConfigMissing(&'static str),

    #[error("Invalid database URL")]
    InvalidDatabaseUrl,

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

/// Owns the connection pool and hands out per-entity stores
#[derive(Clone)]
pub struct DatabaseManager {
    pool: PgPool,
}

impl DatabaseManager {
    /// Connect the pool described by DATABASE_URL
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, DatabaseError> {
        let url = config
            .url
            .as_deref()
            .ok_or(DatabaseError::ConfigMissing("DATABASE_URL"))?;
        let redacted = Self::redact_url(url)?;

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(config.connection_timeout))
            .connect(url)
            .await?;

        info!("Created database pool for: {}", redacted);
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Store for one entity table
    pub fn store_for(&self, definition: &EntityDefinition) -> Result<Arc<PgRecordStore>, DatabaseError> {
        Ok(Arc::new(PgRecordStore::new(definition.table.clone(), self.pool.clone())?))
    }

    /// Build stores for every definition, creating tables as needed
    pub async fn prepare_stores(
        &self,
        definitions: &[EntityDefinition],
    ) -> Result<Vec<(EntityDefinition, Arc<dyn RecordStore>)>, DatabaseError> {
        let mut stores = Vec::with_capacity(definitions.len());
        for definition in definitions {
            let store = self.store_for(definition)?;
            store.ensure_schema().await?;
            stores.push((definition.clone(), store as Arc<dyn RecordStore>));
        }
        Ok(stores)
    }

    /// Pings the pool to ensure connectivity
    pub async fn health_check(&self) -> Result<(), DatabaseError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
        info!("Closed database pool");
    }

    /// Connection string without the password, for logs
    fn redact_url(url: &str) -> Result<String, DatabaseError> {
        let mut parsed = url::Url::parse(url).map_err(|_| DatabaseError::InvalidDatabaseUrl)?;
        if parsed.password().is_some() {
            parsed
                .set_password(Some("****"))
                .map_err(|_| DatabaseError::InvalidDatabaseUrl)?;
        }
        Ok(parsed.into())
    }
}
