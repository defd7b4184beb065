use std::collections::HashMap;

use async_trait::async_trait;
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};

use crate::application::{AppError, AppResult, KeyValueStore};

/// Durable hash-of-strings store over one SQLite table. Each watcher
/// record is a set of (key, field, value) rows; no transactions needed
/// beyond the per-statement ones.
pub struct SqliteKvStore {
    pool: SqlitePool,
}

impl SqliteKvStore {
    /// db_url examples:
    /// - "sqlite:/data/state.db" (docker volume)
    /// - "sqlite:./state.db"
    pub async fn new(db_url: &str) -> AppResult<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(db_url)
            .await
            .map_err(|e| AppError::Storage(e.to_string()))?;

        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    async fn migrate(&self) -> AppResult<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS kv_hash (
              key TEXT NOT NULL,
              field TEXT NOT NULL,
              value TEXT NOT NULL,
              PRIMARY KEY (key, field)
            );
          "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::Storage(e.to_string()))?;

        Ok(())
    }
}

#[async_trait]
impl KeyValueStore for SqliteKvStore {
    async fn set_hash(&self, key: &str, fields: &HashMap<String, String>) -> AppResult<()> {
        // Replace the whole hash: stale fields must not outlive a save.
        sqlx::query("DELETE FROM kv_hash WHERE key = ?")
            .bind(key)
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::Storage(e.to_string()))?;

        for (field, value) in fields {
            sqlx::query(
                r#"
                INSERT INTO kv_hash(key, field, value) VALUES(?, ?, ?)
                ON CONFLICT(key, field) DO UPDATE SET value=excluded.value
                "#,
            )
            .bind(key)
            .bind(field)
            .bind(value)
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::Storage(e.to_string()))?;
        }

        Ok(())
    }

    async fn get_hash(&self, key: &str) -> AppResult<Option<HashMap<String, String>>> {
        let rows: Vec<(String, String)> =
            sqlx::query_as("SELECT field, value FROM kv_hash WHERE key = ?")
                .bind(key)
                .fetch_all(&self.pool)
                .await
                .map_err(|e| AppError::Storage(e.to_string()))?;

        if rows.is_empty() {
            return Ok(None);
        }
        Ok(Some(rows.into_iter().collect()))
    }

    async fn delete(&self, key: &str) -> AppResult<()> {
        sqlx::query("DELETE FROM kv_hash WHERE key = ?")
            .bind(key)
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::Storage(e.to_string()))?;
        Ok(())
    }

    async fn exists(&self, key: &str) -> AppResult<bool> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT key FROM kv_hash WHERE key = ? LIMIT 1")
                .bind(key)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| AppError::Storage(e.to_string()))?;
        Ok(row.is_some())
    }

    async fn keys_with_prefix(&self, prefix: &str) -> AppResult<Vec<String>> {
        // Escape LIKE wildcards so a literal '_' in a scope id cannot
        // match foreign keys.
        let escaped = prefix.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_");
        let rows: Vec<(String,)> = sqlx::query_as(
            "SELECT DISTINCT key FROM kv_hash WHERE key LIKE ? ESCAPE '\\'",
        )
        .bind(format!("{escaped}%"))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::Storage(e.to_string()))?;

        Ok(rows.into_iter().map(|r| r.0).collect())
    }
}
