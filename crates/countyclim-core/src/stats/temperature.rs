//! Annual mean-temperature statistics from daily values in °C.

use serde::Serialize;

use super::{count_above, count_below, degree_days_above, degree_days_below, max, mean, min, std_dev};

#[derive(Debug, Clone, Serialize)]
pub struct TemperatureStats {
    pub mean_annual_temp_c: f64,
    pub min_temp_c: f64,
    pub max_temp_c: f64,
    pub temp_range_c: f64,
    pub temp_std_c: f64,
    pub days_below_freezing: u32,
    pub days_above_30c: u32,
    /// Base 10 °C.
    pub growing_degree_days: f64,
    /// Base 18 °C.
    pub cooling_degree_days: f64,
    /// Base 18 °C.
    pub heating_degree_days: f64,
}

/// Compute mean-temperature statistics for one county-year. `daily_c` must
/// be NaN-free; returns `None` when it is empty.
pub fn compute_temperature_stats(daily_c: &[f64]) -> Option<TemperatureStats> {
    if daily_c.is_empty() {
        return None;
    }

    let lo = min(daily_c);
    let hi = max(daily_c);

    Some(TemperatureStats {
        mean_annual_temp_c: mean(daily_c),
        min_temp_c: lo,
        max_temp_c: hi,
        temp_range_c: hi - lo,
        temp_std_c: std_dev(daily_c),
        days_below_freezing: count_below(daily_c, 0.0),
        days_above_30c: count_above(daily_c, 30.0),
        growing_degree_days: degree_days_above(daily_c, 10.0),
        cooling_degree_days: degree_days_above(daily_c, 18.0),
        heating_degree_days: degree_days_below(daily_c, 18.0),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn reference_six_day_sample() {
        let daily = vec![-10.0, -1.0, 0.0, 15.0, 25.0, 35.0];
        let stats = compute_temperature_stats(&daily).unwrap();

        assert_relative_eq!(stats.mean_annual_temp_c, 64.0 / 6.0, epsilon = 1e-12);
        assert_eq!(stats.days_below_freezing, 2); // 0.0 is not below freezing
        assert_eq!(stats.days_above_30c, 1);
        assert_relative_eq!(stats.growing_degree_days, 45.0); // 5 + 15 + 25
        assert_relative_eq!(stats.cooling_degree_days, 24.0); // 7 + 17
        assert_relative_eq!(stats.heating_degree_days, 18.0 + 28.0 + 19.0 + 18.0 + 3.0);
        assert_relative_eq!(stats.temp_range_c, 45.0);
    }

    #[test]
    fn empty_input_yields_no_record() {
        assert!(compute_temperature_stats(&[]).is_none());
    }
}
