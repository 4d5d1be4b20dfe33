//! Per-variable statistic calculators and the output row type.
//!
//! Each calculator is a pure function from a NaN-free array of daily values
//! (already in physical units: mm/day or °C) to a flat record of named
//! statistics, or `None` when no valid days exist. One module per variable.

pub mod precipitation;
pub mod tasmax;
pub mod tasmin;
pub mod temperature;

use serde::Serialize;

pub use precipitation::{compute_precipitation_stats, PrecipitationStats};
pub use tasmax::{compute_tasmax_stats, TasmaxStats};
pub use tasmin::{compute_tasmin_stats, TasminStats};
pub use temperature::{compute_temperature_stats, TemperatureStats};

/// One output row, keyed by (county_id, year, scenario). Rows are created
/// once by a calculator and never mutated; each key appears at most once per
/// run.
#[derive(Debug, Clone, Serialize)]
pub struct CountyYearStatistic {
    pub county_id: String,
    pub county_name: String,
    pub state: String,
    pub year: i32,
    pub scenario: String,
    #[serde(flatten)]
    pub values: StatValues,
}

/// Variable-specific statistic fields. Untagged so serialized rows stay flat,
/// matching the downstream merge step's column-per-field expectation.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum StatValues {
    Precipitation(PrecipitationStats),
    MeanTemperature(TemperatureStats),
    MaxTemperature(TasmaxStats),
    MinTemperature(TasminStats),
}

// ── Shared summary helpers ────────────────────────────────────────────────────

pub(crate) fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

pub(crate) fn min(values: &[f64]) -> f64 {
    values.iter().cloned().fold(f64::INFINITY, f64::min)
}

pub(crate) fn max(values: &[f64]) -> f64 {
    values.iter().cloned().fold(f64::NEG_INFINITY, f64::max)
}

/// Population standard deviation (ddof = 0).
pub(crate) fn std_dev(values: &[f64]) -> f64 {
    let m = mean(values);
    let var = values.iter().map(|&v| (v - m) * (v - m)).sum::<f64>() / values.len() as f64;
    var.sqrt()
}

/// Percentile with linear interpolation between closest ranks:
/// rank = q/100 × (n − 1) over the sorted sample.
pub(crate) fn percentile(values: &[f64], q: f64) -> f64 {
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap());

    let rank = q / 100.0 * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    if lo == hi {
        return sorted[lo];
    }
    let frac = rank - lo as f64;
    sorted[lo] * (1.0 - frac) + sorted[hi] * frac
}

/// Degree-days above `base`: sum of the positive part of (value − base).
pub(crate) fn degree_days_above(values: &[f64], base: f64) -> f64 {
    values.iter().map(|&v| (v - base).max(0.0)).sum()
}

/// Degree-days below `base`: sum of the positive part of (base − value).
pub(crate) fn degree_days_below(values: &[f64], base: f64) -> f64 {
    values.iter().map(|&v| (base - v).max(0.0)).sum()
}

pub(crate) fn count_above(values: &[f64], limit: f64) -> u32 {
    values.iter().filter(|&&v| v > limit).count() as u32
}

pub(crate) fn count_below(values: &[f64], limit: f64) -> u32 {
    values.iter().filter(|&&v| v < limit).count() as u32
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn percentile_interpolates_linearly() {
        let values = vec![1.0, 2.0, 3.0, 4.0];
        assert_relative_eq!(percentile(&values, 50.0), 2.5);
        assert_relative_eq!(percentile(&values, 0.0), 1.0);
        assert_relative_eq!(percentile(&values, 100.0), 4.0);
        assert_relative_eq!(percentile(&values, 95.0), 3.85, epsilon = 1e-12);
    }

    #[test]
    fn std_dev_is_population_not_sample() {
        let values = vec![2.0, 4.0];
        assert_relative_eq!(std_dev(&values), 1.0);
    }

    #[test]
    fn degree_day_sums_only_positive_part() {
        let values = vec![-10.0, -1.0, 0.0, 15.0, 25.0, 35.0];
        assert_relative_eq!(degree_days_above(&values, 10.0), 45.0);
        assert_relative_eq!(degree_days_below(&values, 18.0), 53.0);
    }

    #[test]
    fn flat_rows_serialize_variable_fields_at_top_level() {
        let stats = compute_precipitation_stats(&[1.0, 2.0], Some(25.4)).unwrap();
        let row = CountyYearStatistic {
            county_id: "01001".into(),
            county_name: "Autauga".into(),
            state: "AL".into(),
            year: 2001,
            scenario: "historical".into(),
            values: StatValues::Precipitation(stats),
        };
        let json = serde_json::to_value(&row).unwrap();
        assert_eq!(json["county_id"], "01001");
        assert_eq!(json["total_annual_precip_mm"], 3.0);
    }
}
