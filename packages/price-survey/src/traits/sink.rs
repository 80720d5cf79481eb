//! Tabular collaborators: entity input, result rows, metrics and trend series.

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{
    harvest::TrendRow, metrics::MetricsRow, record::ResultRecord, target::SearchTarget,
};

/// Source entity list.
#[async_trait]
pub trait EntitySource: Send + Sync {
    /// Load every target, in list order.
    async fn load_targets(&self) -> Result<Vec<SearchTarget>>;

    /// Record a processing failure on the entity's input row.
    async fn annotate_error(&self, position: usize, message: &str) -> Result<()>;
}

/// Append-only result rows with a fixed 27-column header.
///
/// The header lives with the sink; `read_all`/`rewrite` cover data rows only.
#[async_trait]
pub trait RowSink: Send + Sync {
    async fn append(&self, records: &[ResultRecord]) -> Result<()>;

    /// Every data row, in append order.
    async fn read_all(&self) -> Result<Vec<ResultRecord>>;

    /// Replace every data row.
    async fn rewrite(&self, records: &[ResultRecord]) -> Result<()>;
}

/// Append-only per-entity metrics.
#[async_trait]
pub trait MetricsSink: Send + Sync {
    async fn append_metrics(&self, row: &MetricsRow) -> Result<()>;

    async fn read_metrics(&self) -> Result<Vec<MetricsRow>>;
}

/// Named trend series, one row per entity addressed by sheet row index.
#[async_trait]
pub trait SeriesSink: Send + Sync {
    /// Drop the header and every row of a series.
    async fn clear_series(&self, series: &str) -> Result<()>;

    async fn write_header(&self, series: &str, header: &[String]) -> Result<()>;

    /// Write (or overwrite) the row at `row_index`.
    async fn write_row(&self, series: &str, row_index: usize, row: &TrendRow) -> Result<()>;

    async fn read_header(&self, series: &str) -> Result<Vec<String>>;

    /// Rows ordered by row index.
    async fn read_rows(&self, series: &str) -> Result<Vec<(usize, TrendRow)>>;
}
