//! In-memory storage implementation for testing and development.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::RwLock;
use std::time::{Duration, Instant};
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

#[derive(Debug, Default)]
struct Series {
    header: Vec<String>,
    rows: BTreeMap<usize, TrendRow>,
}

/// In-memory storage for every collaborator interface.
///
/// Useful for tests and dry runs. Data is lost on drop.
#[derive(Default)]
pub struct MemoryStore {
    targets: RwLock<Vec<SearchTarget>>,
    annotations: RwLock<HashMap<usize, String>>,
    cache: RwLock<HashMap<String, (String, Instant)>>,
    cache_writes: AtomicUsize,
    properties: RwLock<HashMap<String, String>>,
    rows: RwLock<Vec<ResultRecord>>,
    metrics: RwLock<Vec<MetricsRow>>,
    series: RwLock<HashMap<String, Series>>,
    triggers: RwLock<Vec<PendingTrigger>>,
}

fn poisoned<T>(_: T) -> SurveyError {
    SurveyError::storage("memory store lock poisoned")
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store seeded with targets built from raw names.
    pub fn with_entities<S: AsRef<str>>(names: &[S]) -> Self {
        let targets = names
            .iter()
            .enumerate()
            .filter_map(|(i, n)| SearchTarget::new(n.as_ref(), i, usize::MAX))
            .collect();
        Self {
            targets: RwLock::new(targets),
            ..Self::default()
        }
    }

    /// Replace the entity list.
    pub fn set_targets(&self, targets: Vec<SearchTarget>) -> Result<()> {
        *self.targets.write().map_err(poisoned)? = targets;
        Ok(())
    }

    /// Error annotation recorded for an entity position.
    pub fn annotation(&self, position: usize) -> Option<String> {
        self.annotations.read().ok()?.get(&position).cloned()
    }

    /// Number of cache writes since creation.
    pub fn cache_writes(&self) -> usize {
        self.cache_writes.load(Ordering::SeqCst)
    }

    /// Number of live and expired cache entries.
    pub fn cache_len(&self) -> usize {
        self.cache.read().map(|c| c.len()).unwrap_or(0)
    }

    pub fn row_count(&self) -> usize {
        self.rows.read().map(|r| r.len()).unwrap_or(0)
    }
}

#[async_trait]
impl EntitySource for MemoryStore {
    async fn load_targets(&self) -> Result<Vec<SearchTarget>> {
        Ok(self.targets.read().map_err(poisoned)?.clone())
    }

    async fn annotate_error(&self, position: usize, message: &str) -> Result<()> {
        self.annotations
            .write()
            .map_err(poisoned)?
            .insert(position, message.to_string());
        Ok(())
    }
}

#[async_trait]
impl CacheStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let cache = self.cache.read().map_err(poisoned)?;
        Ok(cache
            .get(key)
            .filter(|(_, expires_at)| Instant::now() < *expires_at)
            .map(|(value, _)| value.clone()))
    }

    async fn put(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        self.cache
            .write()
            .map_err(poisoned)?
            .insert(key.to_string(), (value.to_string(), Instant::now() + ttl));
        self.cache_writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[async_trait]
impl PropertyStore for MemoryStore {
    async fn get_property(&self, key: &str) -> Result<Option<String>> {
        Ok(self.properties.read().map_err(poisoned)?.get(key).cloned())
    }

    async fn set_property(&self, key: &str, value: &str) -> Result<()> {
        self.properties
            .write()
            .map_err(poisoned)?
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn delete_property(&self, key: &str) -> Result<()> {
        self.properties.write().map_err(poisoned)?.remove(key);
        Ok(())
    }
}

#[async_trait]
impl RowSink for MemoryStore {
    async fn append(&self, records: &[ResultRecord]) -> Result<()> {
        self.rows
            .write()
            .map_err(poisoned)?
            .extend_from_slice(records);
        Ok(())
    }

    async fn read_all(&self) -> Result<Vec<ResultRecord>> {
        Ok(self.rows.read().map_err(poisoned)?.clone())
    }

    async fn rewrite(&self, records: &[ResultRecord]) -> Result<()> {
        *self.rows.write().map_err(poisoned)? = records.to_vec();
        Ok(())
    }
}

#[async_trait]
impl MetricsSink for MemoryStore {
    async fn append_metrics(&self, row: &MetricsRow) -> Result<()> {
        self.metrics.write().map_err(poisoned)?.push(row.clone());
        Ok(())
    }

    async fn read_metrics(&self) -> Result<Vec<MetricsRow>> {
        Ok(self.metrics.read().map_err(poisoned)?.clone())
    }
}

#[async_trait]
impl SeriesSink for MemoryStore {
    async fn clear_series(&self, series: &str) -> Result<()> {
        self.series.write().map_err(poisoned)?.remove(series);
        Ok(())
    }

    async fn write_header(&self, series: &str, header: &[String]) -> Result<()> {
        self.series
            .write()
            .map_err(poisoned)?
            .entry(series.to_string())
            .or_default()
            .header = header.to_vec();
        Ok(())
    }

    async fn write_row(&self, series: &str, row_index: usize, row: &TrendRow) -> Result<()> {
        self.series
            .write()
            .map_err(poisoned)?
            .entry(series.to_string())
            .or_default()
            .rows
            .insert(row_index, row.clone());
        Ok(())
    }

    async fn read_header(&self, series: &str) -> Result<Vec<String>> {
        Ok(self
            .series
            .read()
            .map_err(poisoned)?
            .get(series)
            .map(|s| s.header.clone())
            .unwrap_or_default())
    }

    async fn read_rows(&self, series: &str) -> Result<Vec<(usize, TrendRow)>> {
        Ok(self
            .series
            .read()
            .map_err(poisoned)?
            .get(series)
            .map(|s| s.rows.iter().map(|(i, r)| (*i, r.clone())).collect())
            .unwrap_or_default())
    }
}

#[async_trait]
impl TriggerScheduler for MemoryStore {
    async fn schedule_once(&self, handler: &str, after: Duration) -> Result<PendingTrigger> {
        let delay = chrono::Duration::from_std(after)
            .map_err(|e| SurveyError::storage(format!("invalid trigger delay: {}", e)))?;
        let trigger = PendingTrigger {
            id: Uuid::new_v4(),
            handler: handler.to_string(),
            due_at: Utc::now() + delay,
        };
        self.triggers
            .write()
            .map_err(poisoned)?
            .push(trigger.clone());
        Ok(trigger)
    }

    async fn pending(&self, handler: &str) -> Result<Vec<PendingTrigger>> {
        Ok(self
            .triggers
            .read()
            .map_err(poisoned)?
            .iter()
            .filter(|t| t.handler == handler)
            .cloned()
            .collect())
    }

    async fn cancel(&self, id: Uuid) -> Result<()> {
        self.triggers.write().map_err(poisoned)?.retain(|t| t.id != id);
        Ok(())
    }
}
