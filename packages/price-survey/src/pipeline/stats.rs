//! Per-entity summary statistics.
//!
//! Percentiles use the nearest-rank rule: sort ascending, take index
//! `ceil(p/100 * n) - 1` clamped to the sample. No interpolation.

use crate::types::metrics::{MetricsRow, PriceObservations, PERCENTILE_STEPS};

/// Round half away from zero to two decimals.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Nearest-rank percentile of an ascending sample.
pub fn nearest_rank(sorted: &[f64], percentile: u32) -> Option<f64> {
    if sorted.is_empty() {
        return None;
    }
    let n = sorted.len();
    let p = percentile.min(100) as usize;
    // ceil(p * n / 100) in integers
    let rank = (p * n).div_ceil(100);
    let index = rank.saturating_sub(1).min(n - 1);
    Some(sorted[index])
}

/// Metrics row for one entity's observations.
pub fn summarize(entity: &str, values: &[f64]) -> MetricsRow {
    let mut sorted: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    if sorted.is_empty() {
        return MetricsRow::empty(entity);
    }
    sorted.sort_by(|a, b| a.total_cmp(b));

    let mean = sorted.iter().sum::<f64>() / sorted.len() as f64;
    MetricsRow {
        entity: entity.to_string(),
        sample_count: sorted.len(),
        mean: Some(round2(mean)),
        percentiles: PERCENTILE_STEPS
            .iter()
            .map(|p| nearest_rank(&sorted, *p).map(round2))
            .collect(),
    }
}

/// One row per entity, in the order entities were first observed.
pub fn aggregate(observations: PriceObservations) -> Vec<MetricsRow> {
    observations
        .into_entries()
        .map(|(entity, values)| summarize(&entity, &values))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_four_observations() {
        let row = summarize("Hoya kerrii", &[40.0, 10.0, 30.0, 20.0]);
        assert_eq!(row.sample_count, 4);
        assert_eq!(row.mean, Some(25.0));
        assert_eq!(row.percentile(0), Some(10.0));
        assert_eq!(row.percentile(50), Some(20.0));
        assert_eq!(row.percentile(100), Some(40.0));
        assert_eq!(row.percentile(25), Some(10.0));
        assert_eq!(row.percentile(75), Some(30.0));
    }

    #[test]
    fn test_rounding_happens_here() {
        let row = summarize("x", &[1.005, 2.111, 3.339]);
        assert_eq!(row.mean, Some(2.15));
        assert_eq!(row.percentile(100), Some(3.34));
        assert_eq!(row.to_row()[2], "2.15");
    }

    #[test]
    fn test_empty_entity_keeps_row() {
        let mut observations = PriceObservations::new();
        observations.ensure("Hoya kerrii");
        observations.record("Hoya carnosa", 12.0);

        let rows = aggregate(observations);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].entity, "Hoya kerrii");
        assert_eq!(rows[0].sample_count, 0);
        assert_eq!(rows[0].mean, None);
        assert!(rows[0].percentiles.iter().all(Option::is_none));
        assert_eq!(rows[1].percentile(50), Some(12.0));
    }

    #[test]
    fn test_single_value_everywhere() {
        let row = summarize("x", &[7.5]);
        assert!(row.percentiles.iter().all(|p| *p == Some(7.5)));
    }

    proptest! {
        #[test]
        fn prop_ladder_is_monotone_and_bounded(values in prop::collection::vec(0.0f64..10_000.0, 1..60)) {
            let row = summarize("x", &values);
            let ladder: Vec<f64> = row.percentiles.iter().map(|p| p.unwrap()).collect();
            let min = values.iter().cloned().fold(f64::INFINITY, f64::min);
            let max = values.iter().cloned().fold(f64::NEG_INFINITY, f64::max);

            prop_assert_eq!(ladder.len(), 21);
            prop_assert!(ladder.windows(2).all(|w| w[0] <= w[1]));
            prop_assert_eq!(ladder[0], round2(min));
            prop_assert_eq!(ladder[20], round2(max));
        }
    }
}
