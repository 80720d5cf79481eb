//! SQLite storage implementation.
//!
//! A file-based backend for every collaborator interface. Good for:
//! - Local runs of the `survey` binary
//! - Resuming the trend harvest across process restarts
//! - Testing with persistent data

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use std::time::Duration;
use uuid::Uuid;

use crate::error::{Result, SurveyError};
use crate::traits::{
    sink::{EntitySource, MetricsSink, RowSink, SeriesSink},
    store::{CacheStore, PropertyStore},
    trigger::{PendingTrigger, TriggerScheduler},
};
use crate::types::{
    harvest::TrendRow, metrics::MetricsRow, record::ResultRecord, target::SearchTarget,
};

/// SQLite-based store.
pub struct SqliteStore {
    pool: SqlitePool,
    name_limit: usize,
}

impl SqliteStore {
    /// Open (and migrate) a store.
    ///
    /// # Example URLs
    /// - `sqlite::memory:` - In-memory database (ephemeral)
    /// - `sqlite://survey.db?mode=rwc` - File-based, created if missing
    pub async fn new(database_url: &str) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect(database_url)
            .await
            .map_err(SurveyError::storage)?;

        let store = Self {
            pool,
            name_limit: 80,
        };
        store.run_migrations().await?;
        Ok(store)
    }

    /// In-memory store (for testing).
    pub async fn in_memory() -> Result<Self> {
        Self::new("sqlite::memory:").await
    }

    /// Cap applied to entity names when targets are loaded.
    pub fn with_name_limit(mut self, limit: usize) -> Self {
        self.name_limit = limit;
        self
    }

    async fn run_migrations(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS entities (
                position INTEGER PRIMARY KEY,
                name TEXT NOT NULL,
                identifier TEXT,
                error TEXT
            );

            CREATE TABLE IF NOT EXISTS cache (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                expires_at INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS properties (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(SurveyError::storage)?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS result_rows (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                record TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS metrics_rows (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                entity TEXT NOT NULL,
                row TEXT NOT NULL
            );
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(SurveyError::storage)?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS series_headers (
                series TEXT PRIMARY KEY,
                header TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS series_rows (
                series TEXT NOT NULL,
                row_index INTEGER NOT NULL,
                row TEXT NOT NULL,
                PRIMARY KEY (series, row_index)
            );

            CREATE TABLE IF NOT EXISTS triggers (
                id TEXT PRIMARY KEY,
                handler TEXT NOT NULL,
                due_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_triggers_handler ON triggers(handler);
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(SurveyError::storage)?;

        Ok(())
    }

    /// Replace the entity list with `(name, identifier)` pairs, in order.
    pub async fn import_entities(&self, entities: &[(String, Option<String>)]) -> Result<usize> {
        let mut tx = self.pool.begin().await.map_err(SurveyError::storage)?;

        sqlx::query("DELETE FROM entities")
            .execute(&mut *tx)
            .await
            .map_err(SurveyError::storage)?;

        for (position, (name, identifier)) in entities.iter().enumerate() {
            sqlx::query("INSERT INTO entities (position, name, identifier) VALUES (?, ?, ?)")
                .bind(position as i64)
                .bind(name)
                .bind(identifier)
                .execute(&mut *tx)
                .await
                .map_err(SurveyError::storage)?;
        }

        tx.commit().await.map_err(SurveyError::storage)?;
        Ok(entities.len())
    }

    /// Error annotations, by entity position.
    pub async fn annotations(&self) -> Result<Vec<(usize, String)>> {
        let rows: Vec<(i64, String)> = sqlx::query_as(
            "SELECT position, error FROM entities WHERE error IS NOT NULL ORDER BY position",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(SurveyError::storage)?;

        Ok(rows.into_iter().map(|(p, e)| (p as usize, e)).collect())
    }

    /// Get the underlying connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl EntitySource for SqliteStore {
    async fn load_targets(&self) -> Result<Vec<SearchTarget>> {
        let rows: Vec<(i64, String, Option<String>)> =
            sqlx::query_as("SELECT position, name, identifier FROM entities ORDER BY position")
                .fetch_all(&self.pool)
                .await
                .map_err(SurveyError::storage)?;

        Ok(rows
            .into_iter()
            .filter_map(|(position, name, identifier)| {
                let target = SearchTarget::new(&name, position as usize, self.name_limit);
                if target.is_none() {
                    tracing::warn!(position, raw = %name, "Skipping entity with empty name");
                }
                target.map(|t| match identifier {
                    Some(id) => t.with_identifier(id),
                    None => t,
                })
            })
            .collect())
    }

    async fn annotate_error(&self, position: usize, message: &str) -> Result<()> {
        sqlx::query("UPDATE entities SET error = ? WHERE position = ?")
            .bind(message)
            .bind(position as i64)
            .execute(&self.pool)
            .await
            .map_err(SurveyError::storage)?;
        Ok(())
    }
}

#[async_trait]
impl CacheStore for SqliteStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT value FROM cache WHERE key = ? AND expires_at > ?")
                .bind(key)
                .bind(Utc::now().timestamp_millis())
                .fetch_optional(&self.pool)
                .await
                .map_err(SurveyError::storage)?;
        Ok(row.map(|(value,)| value))
    }

    async fn put(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        let expires_at = Utc::now().timestamp_millis() + ttl.as_millis() as i64;
        sqlx::query(
            r#"
            INSERT INTO cache (key, value, expires_at) VALUES (?, ?, ?)
            ON CONFLICT(key) DO UPDATE SET value = excluded.value, expires_at = excluded.expires_at
            "#,
        )
        .bind(key)
        .bind(value)
        .bind(expires_at)
        .execute(&self.pool)
        .await
        .map_err(SurveyError::storage)?;
        Ok(())
    }
}

#[async_trait]
impl PropertyStore for SqliteStore {
    async fn get_property(&self, key: &str) -> Result<Option<String>> {
        let row: Option<(String,)> = sqlx::query_as("SELECT value FROM properties WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(SurveyError::storage)?;
        Ok(row.map(|(value,)| value))
    }

    async fn set_property(&self, key: &str, value: &str) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO properties (key, value) VALUES (?, ?)
            ON CONFLICT(key) DO UPDATE SET value = excluded.value
            "#,
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await
        .map_err(SurveyError::storage)?;
        Ok(())
    }

    async fn delete_property(&self, key: &str) -> Result<()> {
        sqlx::query("DELETE FROM properties WHERE key = ?")
            .bind(key)
            .execute(&self.pool)
            .await
            .map_err(SurveyError::storage)?;
        Ok(())
    }
}

#[async_trait]
impl RowSink for SqliteStore {
    async fn append(&self, records: &[ResultRecord]) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(SurveyError::storage)?;
        for record in records {
            sqlx::query("INSERT INTO result_rows (record) VALUES (?)")
                .bind(serde_json::to_string(record)?)
                .execute(&mut *tx)
                .await
                .map_err(SurveyError::storage)?;
        }
        tx.commit().await.map_err(SurveyError::storage)?;
        Ok(())
    }

    async fn read_all(&self) -> Result<Vec<ResultRecord>> {
        let rows: Vec<(String,)> = sqlx::query_as("SELECT record FROM result_rows ORDER BY seq")
            .fetch_all(&self.pool)
            .await
            .map_err(SurveyError::storage)?;

        rows.into_iter()
            .map(|(json,)| serde_json::from_str(&json).map_err(Into::into))
            .collect()
    }

    async fn rewrite(&self, records: &[ResultRecord]) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(SurveyError::storage)?;
        sqlx::query("DELETE FROM result_rows")
            .execute(&mut *tx)
            .await
            .map_err(SurveyError::storage)?;
        for record in records {
            sqlx::query("INSERT INTO result_rows (record) VALUES (?)")
                .bind(serde_json::to_string(record)?)
                .execute(&mut *tx)
                .await
                .map_err(SurveyError::storage)?;
        }
        tx.commit().await.map_err(SurveyError::storage)?;
        Ok(())
    }
}

#[async_trait]
impl MetricsSink for SqliteStore {
    async fn append_metrics(&self, row: &MetricsRow) -> Result<()> {
        sqlx::query("INSERT INTO metrics_rows (entity, row) VALUES (?, ?)")
            .bind(&row.entity)
            .bind(serde_json::to_string(row)?)
            .execute(&self.pool)
            .await
            .map_err(SurveyError::storage)?;
        Ok(())
    }

    async fn read_metrics(&self) -> Result<Vec<MetricsRow>> {
        let rows: Vec<(String,)> = sqlx::query_as("SELECT row FROM metrics_rows ORDER BY seq")
            .fetch_all(&self.pool)
            .await
            .map_err(SurveyError::storage)?;

        rows.into_iter()
            .map(|(json,)| serde_json::from_str(&json).map_err(Into::into))
            .collect()
    }
}

#[async_trait]
impl SeriesSink for SqliteStore {
    async fn clear_series(&self, series: &str) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(SurveyError::storage)?;
        sqlx::query("DELETE FROM series_rows WHERE series = ?")
            .bind(series)
            .execute(&mut *tx)
            .await
            .map_err(SurveyError::storage)?;
        sqlx::query("DELETE FROM series_headers WHERE series = ?")
            .bind(series)
            .execute(&mut *tx)
            .await
            .map_err(SurveyError::storage)?;
        tx.commit().await.map_err(SurveyError::storage)?;
        Ok(())
    }

    async fn write_header(&self, series: &str, header: &[String]) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO series_headers (series, header) VALUES (?, ?)
            ON CONFLICT(series) DO UPDATE SET header = excluded.header
            "#,
        )
        .bind(series)
        .bind(serde_json::to_string(header)?)
        .execute(&self.pool)
        .await
        .map_err(SurveyError::storage)?;
        Ok(())
    }

    async fn write_row(&self, series: &str, row_index: usize, row: &TrendRow) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO series_rows (series, row_index, row) VALUES (?, ?, ?)
            ON CONFLICT(series, row_index) DO UPDATE SET row = excluded.row
            "#,
        )
        .bind(series)
        .bind(row_index as i64)
        .bind(serde_json::to_string(row)?)
        .execute(&self.pool)
        .await
        .map_err(SurveyError::storage)?;
        Ok(())
    }

    async fn read_header(&self, series: &str) -> Result<Vec<String>> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT header FROM series_headers WHERE series = ?")
                .bind(series)
                .fetch_optional(&self.pool)
                .await
                .map_err(SurveyError::storage)?;

        match row {
            Some((json,)) => Ok(serde_json::from_str(&json)?),
            None => Ok(vec![]),
        }
    }

    async fn read_rows(&self, series: &str) -> Result<Vec<(usize, TrendRow)>> {
        let rows: Vec<(i64, String)> = sqlx::query_as(
            "SELECT row_index, row FROM series_rows WHERE series = ? ORDER BY row_index",
        )
        .bind(series)
        .fetch_all(&self.pool)
        .await
        .map_err(SurveyError::storage)?;

        rows.into_iter()
            .map(|(index, json)| Ok((index as usize, serde_json::from_str(&json)?)))
            .collect()
    }
}

#[async_trait]
impl TriggerScheduler for SqliteStore {
    async fn schedule_once(&self, handler: &str, after: Duration) -> Result<PendingTrigger> {
        let delay = chrono::Duration::from_std(after)
            .map_err(|e| SurveyError::storage(format!("invalid trigger delay: {}", e)))?;
        let trigger = PendingTrigger {
            id: Uuid::new_v4(),
            handler: handler.to_string(),
            due_at: Utc::now() + delay,
        };

        sqlx::query("INSERT INTO triggers (id, handler, due_at) VALUES (?, ?, ?)")
            .bind(trigger.id.to_string())
            .bind(&trigger.handler)
            .bind(trigger.due_at.to_rfc3339())
            .execute(&self.pool)
            .await
            .map_err(SurveyError::storage)?;

        Ok(trigger)
    }

    async fn pending(&self, handler: &str) -> Result<Vec<PendingTrigger>> {
        let rows: Vec<(String, String, String)> = sqlx::query_as(
            "SELECT id, handler, due_at FROM triggers WHERE handler = ? ORDER BY due_at",
        )
        .bind(handler)
        .fetch_all(&self.pool)
        .await
        .map_err(SurveyError::storage)?;

        rows.into_iter()
            .map(|(id, handler, due_at)| {
                let id = Uuid::parse_str(&id)
                    .map_err(|e| SurveyError::storage(format!("Invalid trigger id: {}", e)))?;
                let due_at = DateTime::parse_from_rfc3339(&due_at)
                    .map_err(|e| SurveyError::storage(format!("Invalid date: {}", e)))?
                    .with_timezone(&Utc);
                Ok(PendingTrigger {
                    id,
                    handler,
                    due_at,
                })
            })
            .collect()
    }

    async fn cancel(&self, id: Uuid) -> Result<()> {
        sqlx::query("DELETE FROM triggers WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .map_err(SurveyError::storage)?;
        Ok(())
    }
}
