//! Annual daily-minimum-temperature statistics from daily values in °C.

use serde::Serialize;

use super::{count_above, count_below, degree_days_above, degree_days_below, max, mean, min, std_dev};

#[derive(Debug, Clone, Serialize)]
pub struct TasminStats {
    pub mean_annual_tasmin_c: f64,
    pub min_tasmin_c: f64,
    pub max_tasmin_c: f64,
    pub tasmin_range_c: f64,
    pub tasmin_std_c: f64,
    /// Days below 0 °C.
    pub cold_days: u32,
    /// Days below −10 °C.
    pub extreme_cold_days: u32,
    /// Days below −20 °C.
    pub very_extreme_cold_days: u32,
    /// Days at or above 0 °C.
    pub days_above_freezing: u32,
    /// Days strictly above 0 °C.
    pub frost_free_days: u32,
    /// Base 0 °C.
    pub growing_degree_days_min: f64,
    /// Base 18 °C.
    pub heating_degree_days: f64,
}

/// Compute daily-minimum-temperature statistics for one county-year.
/// `daily_c` must be NaN-free; returns `None` when it is empty.
pub fn compute_tasmin_stats(daily_c: &[f64]) -> Option<TasminStats> {
    if daily_c.is_empty() {
        return None;
    }

    let lo = min(daily_c);
    let hi = max(daily_c);

    Some(TasminStats {
        mean_annual_tasmin_c: mean(daily_c),
        min_tasmin_c: lo,
        max_tasmin_c: hi,
        tasmin_range_c: hi - lo,
        tasmin_std_c: std_dev(daily_c),
        cold_days: count_below(daily_c, 0.0),
        extreme_cold_days: count_below(daily_c, -10.0),
        very_extreme_cold_days: count_below(daily_c, -20.0),
        days_above_freezing: daily_c.iter().filter(|&&v| v >= 0.0).count() as u32,
        frost_free_days: count_above(daily_c, 0.0),
        growing_degree_days_min: degree_days_above(daily_c, 0.0),
        heating_degree_days: degree_days_below(daily_c, 18.0),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn cold_day_tiers_and_frost_free_split() {
        let daily = vec![-25.0, -15.0, -5.0, 0.0, 5.0];
        let stats = compute_tasmin_stats(&daily).unwrap();

        assert_eq!(stats.cold_days, 3);
        assert_eq!(stats.extreme_cold_days, 2);
        assert_eq!(stats.very_extreme_cold_days, 1);
        assert_eq!(stats.days_above_freezing, 2); // 0.0 counts
        assert_eq!(stats.frost_free_days, 1); // 0.0 does not
        assert_relative_eq!(stats.growing_degree_days_min, 5.0);
    }

    #[test]
    fn empty_input_yields_no_record() {
        assert!(compute_tasmin_stats(&[]).is_none());
    }
}
