//! Annual daily-maximum-temperature statistics from daily values in °C.

use serde::Serialize;

use super::{count_above, degree_days_above, max, mean, min, std_dev};

#[derive(Debug, Clone, Serialize)]
pub struct TasmaxStats {
    pub mean_annual_tasmax_c: f64,
    pub min_tasmax_c: f64,
    pub max_tasmax_c: f64,
    pub tasmax_range_c: f64,
    pub tasmax_std_c: f64,
    /// Days strictly above the caller's hot-day threshold.
    pub days_above_threshold_c: u32,
    /// The threshold actually applied, in °C (0.0 when none was given).
    pub threshold_temp_c: f64,
    pub days_above_30c: u32,
    pub days_above_35c: u32,
    pub days_above_40c: u32,
    /// Base 10 °C.
    pub growing_degree_days_max: f64,
    /// Days above 32 °C (90 °F).
    pub heat_index_days: u32,
}

/// Compute daily-maximum-temperature statistics for one county-year.
/// `daily_c` must be NaN-free; returns `None` when it is empty.
pub fn compute_tasmax_stats(daily_c: &[f64], threshold_c: Option<f64>) -> Option<TasmaxStats> {
    if daily_c.is_empty() {
        return None;
    }

    let lo = min(daily_c);
    let hi = max(daily_c);

    Some(TasmaxStats {
        mean_annual_tasmax_c: mean(daily_c),
        min_tasmax_c: lo,
        max_tasmax_c: hi,
        tasmax_range_c: hi - lo,
        tasmax_std_c: std_dev(daily_c),
        days_above_threshold_c: threshold_c.map_or(0, |t| count_above(daily_c, t)),
        threshold_temp_c: threshold_c.unwrap_or(0.0),
        days_above_30c: count_above(daily_c, 30.0),
        days_above_35c: count_above(daily_c, 35.0),
        days_above_40c: count_above(daily_c, 40.0),
        growing_degree_days_max: degree_days_above(daily_c, 10.0),
        heat_index_days: count_above(daily_c, 32.0),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hot_day_counts_never_double_count() {
        let daily = vec![28.0, 31.0, 33.0, 36.0, 41.0];
        let stats = compute_tasmax_stats(&daily, Some(32.2)).unwrap();

        assert_eq!(stats.days_above_threshold_c, 3);
        assert_eq!(stats.days_above_30c, 4);
        assert_eq!(stats.days_above_35c, 2);
        assert_eq!(stats.days_above_40c, 1);
        assert_eq!(stats.heat_index_days, 3);
    }

    #[test]
    fn missing_threshold_reports_zero_count() {
        let stats = compute_tasmax_stats(&[30.0, 40.0], None).unwrap();
        assert_eq!(stats.days_above_threshold_c, 0);
        assert_eq!(stats.threshold_temp_c, 0.0);
    }

    #[test]
    fn empty_input_yields_no_record() {
        assert!(compute_tasmax_stats(&[], Some(32.2)).is_none());
    }
}
