//! Annual precipitation statistics from daily values in mm/day.

use serde::Serialize;

use super::{count_above, count_below, max, mean, percentile, std_dev};

/// Dry/wet day cutoff in mm/day.
const TRACE_MM: f64 = 0.1;

#[derive(Debug, Clone, Serialize)]
pub struct PrecipitationStats {
    pub total_annual_precip_mm: f64,
    /// Days with precipitation strictly above the caller's threshold.
    pub days_above_threshold: u32,
    pub mean_daily_precip_mm: f64,
    pub max_daily_precip_mm: f64,
    pub precip_std_mm: f64,
    /// Days below 0.1 mm.
    pub dry_days: u32,
    /// Days at or above 0.1 mm. dry_days + wet_days = valid days.
    pub wet_days: u32,
    pub precip_percentile_95: f64,
    pub precip_percentile_99: f64,
}

/// Compute precipitation statistics for one county-year. `daily_mm` must be
/// NaN-free; returns `None` when it is empty (no row for that county-year).
pub fn compute_precipitation_stats(
    daily_mm: &[f64],
    threshold_mm: Option<f64>,
) -> Option<PrecipitationStats> {
    if daily_mm.is_empty() {
        return None;
    }

    Some(PrecipitationStats {
        total_annual_precip_mm: daily_mm.iter().sum(),
        days_above_threshold: threshold_mm.map_or(0, |t| count_above(daily_mm, t)),
        mean_daily_precip_mm: mean(daily_mm),
        max_daily_precip_mm: max(daily_mm),
        precip_std_mm: std_dev(daily_mm),
        dry_days: count_below(daily_mm, TRACE_MM),
        wet_days: daily_mm.iter().filter(|&&v| v >= TRACE_MM).count() as u32,
        precip_percentile_95: percentile(daily_mm, 95.0),
        precip_percentile_99: percentile(daily_mm, 99.0),
    })
}
