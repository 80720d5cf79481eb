//! Price observations and the per-entity metrics derived from them.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Percentile ladder: 0, 5, 10, ..., 100.
pub const PERCENTILE_STEPS: [u32; 21] = [
    0, 5, 10, 15, 20, 25, 30, 35, 40, 45, 50, 55, 60, 65, 70, 75, 80, 85, 90, 95, 100,
];

/// Numeric observations per entity, across every query variant.
#[derive(Debug, Clone, Default)]
pub struct PriceObservations {
    by_entity: IndexMap<String, Vec<f64>>,
}

impl PriceObservations {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an entity so it gets a metrics row even without observations.
    pub fn ensure(&mut self, entity: &str) {
        self.by_entity.entry(entity.to_string()).or_default();
    }

    /// Record one value. Non-finite values are dropped.
    pub fn record(&mut self, entity: &str, value: f64) {
        if !value.is_finite() {
            return;
        }
        self.by_entity
            .entry(entity.to_string())
            .or_default()
            .push(value);
    }

    /// Record several values for one entity.
    pub fn extend(&mut self, entity: &str, values: impl IntoIterator<Item = f64>) {
        for value in values {
            self.record(entity, value);
        }
    }

    pub fn get(&self, entity: &str) -> Option<&[f64]> {
        self.by_entity.get(entity).map(|v| v.as_slice())
    }

    /// Number of registered entities.
    pub fn len(&self) -> usize {
        self.by_entity.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_entity.is_empty()
    }

    /// Consume the accumulator.
    pub fn into_entries(self) -> impl Iterator<Item = (String, Vec<f64>)> {
        self.by_entity.into_iter()
    }
}

/// Summary statistics for one entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsRow {
    pub entity: String,
    pub sample_count: usize,
    /// Mean rounded to two decimals; `None` without observations.
    pub mean: Option<f64>,
    /// Values at [`PERCENTILE_STEPS`], rounded to two decimals.
    pub percentiles: Vec<Option<f64>>,
}

impl MetricsRow {
    /// Metrics row for an entity without observations.
    pub fn empty(entity: impl Into<String>) -> Self {
        Self {
            entity: entity.into(),
            sample_count: 0,
            mean: None,
            percentiles: vec![None; PERCENTILE_STEPS.len()],
        }
    }

    /// Value at a percentile step, if it is on the ladder.
    pub fn percentile(&self, step: u32) -> Option<f64> {
        PERCENTILE_STEPS
            .iter()
            .position(|s| *s == step)
            .and_then(|i| self.percentiles.get(i).copied().flatten())
    }

    /// Column header of the metrics sink.
    pub fn header() -> Vec<String> {
        let mut header = vec![
            "entity".to_string(),
            "sample_count".to_string(),
            "mean".to_string(),
        ];
        header.extend(PERCENTILE_STEPS.iter().map(|p| format!("p{}", p)));
        header
    }

    /// Render the row; empty cells for missing values, two decimals otherwise.
    pub fn to_row(&self) -> Vec<String> {
        fn cell(v: Option<f64>) -> String {
            v.map(|n| format!("{:.2}", n)).unwrap_or_default()
        }

        let mut row = vec![
            self.entity.clone(),
            self.sample_count.to_string(),
            cell(self.mean),
        ];
        row.extend(self.percentiles.iter().map(|p| cell(*p)));
        row
    }
}
