use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use sqlx::{postgres::PgRow, PgPool, Row};
use tracing::info;
use uuid::Uuid;

use super::record::{InternalRecord, NewRecord, RecordUpdate};
use super::store::{RecordStore, StoreError};
use crate::registry::is_valid_table_name;

const COLUMNS: &str = "id, sheet_id, synced, sync_attempted_at, created_at, updated_at, fields";

/// Postgres unique_violation
const UNIQUE_VIOLATION: &str = "23505";

/// Entity table with fixed system columns and a jsonb `fields` column
pub struct PgRecordStore {
    table: String,
    pool: PgPool,
}

impl PgRecordStore {
    pub fn new(table: impl Into<String>, pool: PgPool) -> Result<Self, StoreError> {
        let table = table.into();
        if !is_valid_table_name(&table) {
            return Err(StoreError::InvalidTable(table));
        }
        Ok(Self { table, pool })
    }

    /// Create the table and its partial unique index on sheet_id if missing
    pub async fn ensure_schema(&self) -> Result<(), StoreError> {
        let table = quote_identifier(&self.table);
        let create = format!(
            r#"CREATE TABLE IF NOT EXISTS {table} (
                id UUID PRIMARY KEY,
                sheet_id TEXT,
                synced BOOLEAN NOT NULL DEFAULT FALSE,
                sync_attempted_at TIMESTAMPTZ,
                created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
                updated_at TIMESTAMPTZ NOT NULL DEFAULT now(),
                fields JSONB NOT NULL DEFAULT '{{}}'::jsonb
            )"#
        );
        sqlx::query(&create).execute(&self.pool).await?;

        let index = format!(
            "CREATE UNIQUE INDEX IF NOT EXISTS {} ON {table} (sheet_id) WHERE sheet_id IS NOT NULL",
            quote_identifier(&format!("{}_sheet_id_key", self.table))
        );
        sqlx::query(&index).execute(&self.pool).await?;

        let unsynced = format!(
            "CREATE INDEX IF NOT EXISTS {} ON {table} (created_at DESC) WHERE synced = FALSE",
            quote_identifier(&format!("{}_unsynced_idx", self.table))
        );
        sqlx::query(&unsynced).execute(&self.pool).await?;

        info!("Ensured schema for table: {}", self.table);
        Ok(())
    }

    fn table_sql(&self) -> String {
        quote_identifier(&self.table)
    }
}

fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn record_from_row(row: &PgRow) -> Result<InternalRecord, sqlx::Error> {
    let fields: Value = row.try_get("fields")?;
    Ok(InternalRecord {
        id: row.try_get("id")?,
        sheet_id: row.try_get("sheet_id")?,
        synced: row.try_get("synced")?,
        sync_attempted_at: row.try_get("sync_attempted_at")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
        fields: match fields {
            Value::Object(map) => map,
            _ => Map::new(),
        },
    })
}

fn map_write_error(err: sqlx::Error, sheet_id: Option<&str>) -> StoreError {
    if let sqlx::Error::Database(db) = &err {
        if db.code().as_deref() == Some(UNIQUE_VIOLATION) {
            return StoreError::DuplicateSheetId(sheet_id.unwrap_or_default().to_string());
        }
    }
    StoreError::Sqlx(err)
}

#[async_trait]
impl RecordStore for PgRecordStore {
    fn table(&self) -> &str {
        &self.table
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<InternalRecord>, StoreError> {
        let sql = format!("SELECT {COLUMNS} FROM {} WHERE id = $1", self.table_sql());
        let row = sqlx::query(&sql).bind(id).fetch_optional(&self.pool).await?;
        Ok(row.as_ref().map(record_from_row).transpose()?)
    }

    async fn find_by_sheet_id(&self, sheet_id: &str) -> Result<Option<InternalRecord>, StoreError> {
        let sql = format!("SELECT {COLUMNS} FROM {} WHERE sheet_id = $1", self.table_sql());
        let row = sqlx::query(&sql).bind(sheet_id).fetch_optional(&self.pool).await?;
        Ok(row.as_ref().map(record_from_row).transpose()?)
    }

    async fn find_all(&self, limit: Option<i64>, offset: Option<i64>) -> Result<Vec<InternalRecord>, StoreError> {
        let sql = format!(
            "SELECT {COLUMNS} FROM {} ORDER BY created_at DESC LIMIT $1 OFFSET $2",
            self.table_sql()
        );
        let rows = sqlx::query(&sql)
            .bind(limit)
            .bind(offset.unwrap_or(0))
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.iter().map(record_from_row).collect::<Result<Vec<_>, sqlx::Error>>()?)
    }

    async fn find_unsynced(&self) -> Result<Vec<InternalRecord>, StoreError> {
        let sql = format!(
            "SELECT {COLUMNS} FROM {} WHERE synced = FALSE ORDER BY created_at DESC",
            self.table_sql()
        );
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;
        Ok(rows.iter().map(record_from_row).collect::<Result<Vec<_>, sqlx::Error>>()?)
    }

    async fn count(&self) -> Result<i64, StoreError> {
        let sql = format!("SELECT COUNT(*) FROM {}", self.table_sql());
        Ok(sqlx::query_scalar(&sql).fetch_one(&self.pool).await?)
    }

    async fn count_unsynced(&self) -> Result<i64, StoreError> {
        let sql = format!("SELECT COUNT(*) FROM {} WHERE synced = FALSE", self.table_sql());
        Ok(sqlx::query_scalar(&sql).fetch_one(&self.pool).await?)
    }

    async fn create(&self, record: NewRecord) -> Result<InternalRecord, StoreError> {
        let sql = format!(
            "INSERT INTO {} (id, sheet_id, synced, fields) VALUES ($1, $2, $3, $4) RETURNING {COLUMNS}",
            self.table_sql()
        );
        let row = sqlx::query(&sql)
            .bind(Uuid::new_v4())
            .bind(record.sheet_id.as_deref())
            .bind(record.synced)
            .bind(Value::Object(record.fields))
            .fetch_one(&self.pool)
            .await
            .map_err(|e| map_write_error(e, record.sheet_id.as_deref()))?;
        Ok(record_from_row(&row)?)
    }

    async fn update(&self, id: Uuid, update: RecordUpdate) -> Result<InternalRecord, StoreError> {
        let sql = format!(
            "UPDATE {} SET fields = fields || $2, synced = COALESCE($3, synced), updated_at = now() \
             WHERE id = $1 RETURNING {COLUMNS}",
            self.table_sql()
        );
        let row = sqlx::query(&sql)
            .bind(id)
            .bind(Value::Object(update.fields))
            .bind(update.synced)
            .fetch_optional(&self.pool)
            .await?;
        match row {
            Some(row) => Ok(record_from_row(&row)?),
            None => Err(StoreError::NotFound(id)),
        }
    }

    async fn mark_sync_attempt(&self, id: Uuid, sheet_id: &str, at: DateTime<Utc>) -> Result<(), StoreError> {
        let sql = format!(
            "UPDATE {} SET sheet_id = $2, sync_attempted_at = $3 WHERE id = $1",
            self.table_sql()
        );
        let result = sqlx::query(&sql)
            .bind(id)
            .bind(sheet_id)
            .bind(at)
            .execute(&self.pool)
            .await
            .map_err(|e| map_write_error(e, Some(sheet_id)))?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(id));
        }
        Ok(())
    }

    async fn mark_synced(&self, id: Uuid, seen_updated_at: DateTime<Utc>) -> Result<bool, StoreError> {
        let sql = format!(
            "UPDATE {} SET synced = TRUE, sync_attempted_at = NULL, updated_at = now() \
             WHERE id = $1 AND updated_at = $2",
            self.table_sql()
        );
        let result = sqlx::query(&sql)
            .bind(id)
            .bind(seen_updated_at)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() > 0 {
            return Ok(true);
        }
        // edited since it was listed, or gone
        match self.find_by_id(id).await? {
            Some(_) => Ok(false),
            None => Err(StoreError::NotFound(id)),
        }
    }

    async fn delete(&self, id: Uuid) -> Result<bool, StoreError> {
        let sql = format!("DELETE FROM {} WHERE id = $1", self.table_sql());
        let result = sqlx::query(&sql).bind(id).execute(&self.pool).await?;
        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quotes_identifiers() {
        assert_eq!(quote_identifier("borrowers"), "\"borrowers\"");
        assert_eq!(quote_identifier("a\"b"), "\"a\"\"b\"");
    }
}
