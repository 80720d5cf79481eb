//! Trend-harvest state: phases, checkpoints and series rows.

use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Sheet rows 1 and 2 hold header metadata; entity rows start here.
pub const FIRST_DATA_ROW: usize = 3;

/// Harvest window. Phases run in declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Phase {
    Days90,
    Days180,
    Days365,
}

impl Phase {
    pub const ALL: [Phase; 3] = [Phase::Days90, Phase::Days180, Phase::Days365];

    pub fn first() -> Self {
        Phase::Days90
    }

    /// Phase after this one, if any.
    pub fn next(&self) -> Option<Self> {
        match self {
            Phase::Days90 => Some(Phase::Days180),
            Phase::Days180 => Some(Phase::Days365),
            Phase::Days365 => None,
        }
    }

    pub fn days(&self) -> i64 {
        match self {
            Phase::Days90 => 90,
            Phase::Days180 => 180,
            Phase::Days365 => 365,
        }
    }

    /// Weekly columns covering the window.
    pub fn weeks(&self) -> usize {
        (self.days() as usize).div_ceil(7)
    }

    /// Property-store key of this phase's checkpoint.
    pub fn label(&self) -> &'static str {
        match self {
            Phase::Days90 => "trend_harvest_90d",
            Phase::Days180 => "trend_harvest_180d",
            Phase::Days365 => "trend_harvest_365d",
        }
    }

    /// Output series written by this phase.
    pub fn series_name(&self) -> &'static str {
        match self {
            Phase::Days90 => "Trends 90d",
            Phase::Days180 => "Trends 180d",
            Phase::Days365 => "Trends 365d",
        }
    }

    /// Parse a label back into a phase.
    pub fn from_label(label: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.label() == label)
    }

    /// Date range passed to the time-series engine, `start end`.
    pub fn date_range(&self, today: NaiveDate) -> String {
        let start = today - Duration::days(self.days());
        format!("{} {}", start.format("%Y-%m-%d"), today.format("%Y-%m-%d"))
    }

    /// Weekly column dates, oldest first.
    pub fn week_dates(&self, today: NaiveDate) -> Vec<NaiveDate> {
        let mut dates: Vec<NaiveDate> = (0..self.weeks())
            .map(|w| today - Duration::weeks(w as i64))
            .collect();
        dates.sort();
        dates.dedup();
        dates
    }

    /// Series header: name, identifier, one column per week.
    pub fn header(&self, today: NaiveDate) -> Vec<String> {
        let mut header = vec!["entity".to_string(), "identifier".to_string()];
        header.extend(
            self.week_dates(today)
                .into_iter()
                .map(|d| d.format("%Y-%m-%d").to_string()),
        );
        header
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-day", self.days())
    }
}

/// Persisted cursor of an unfinished phase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchCheckpoint {
    pub phase: Phase,
    pub series: String,
    /// Next unprocessed row (1-based, first entity at [`FIRST_DATA_ROW`]).
    pub next_row: usize,
}

impl BatchCheckpoint {
    /// Checkpoint at the first data row of a phase.
    pub fn fresh(phase: Phase) -> Self {
        Self::at(phase, FIRST_DATA_ROW)
    }

    pub fn at(phase: Phase, next_row: usize) -> Self {
        Self {
            phase,
            series: phase.series_name().to_string(),
            next_row,
        }
    }

    /// Entity index the cursor points at.
    pub fn entity_index(&self) -> usize {
        self.next_row.saturating_sub(FIRST_DATA_ROW)
    }
}

/// Harvested weekly values for one entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendSeries {
    pub name: String,
    pub identifier: Option<String>,
    /// Weekly values, most recent last. `None` marks a week without data.
    pub values: Vec<Option<f64>>,
}

/// A row written to a phase's series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TrendRow {
    Series(TrendSeries),
    /// Fetch failed or the series had no values at all.
    NoData {
        name: String,
        identifier: Option<String>,
    },
}

impl TrendRow {
    pub fn name(&self) -> &str {
        match self {
            TrendRow::Series(s) => &s.name,
            TrendRow::NoData { name, .. } => name,
        }
    }

    pub fn is_no_data(&self) -> bool {
        matches!(self, TrendRow::NoData { .. })
    }

    /// Render under a header with `columns` weekly columns. Values right-align
    /// so the most recent week lands in the last column.
    pub fn to_row(&self, columns: usize) -> Vec<String> {
        match self {
            TrendRow::Series(s) => {
                let mut row = vec![s.name.clone(), s.identifier.clone().unwrap_or_default()];
                let shown = &s.values[s.values.len().saturating_sub(columns)..];
                row.extend(std::iter::repeat(String::new()).take(columns - shown.len()));
                row.extend(
                    shown
                        .iter()
                        .map(|v| v.map(|n| n.to_string()).unwrap_or_default()),
                );
                row
            }
            TrendRow::NoData { name, identifier } => vec![
                name.clone(),
                identifier.clone().unwrap_or_default(),
                "No data".to_string(),
            ],
        }
    }
}
