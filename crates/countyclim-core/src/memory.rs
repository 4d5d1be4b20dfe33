//! System memory sampling and per-county memory estimation.
//!
//! The monitor is advisory: chunk sizes are fixed at construction time, and
//! pressure readings only gate log output. The estimator feeds the chunk
//! builder's memory budget.

use std::sync::Mutex;

use sysinfo::{System, SystemExt};

use crate::county::CountyRecord;
use crate::series::GriddedSeries;

const DEFAULT_WARNING_PERCENT: f64 = 80.0;
const DEFAULT_CRITICAL_PERCENT: f64 = 90.0;

/// Boundary-complexity scaling is capped here; beyond ~1000 exterior
/// vertices extra complexity stops translating into extra clip memory.
const MAX_COMPLEXITY_FACTOR: f64 = 2.0;

/// Snapshot of system memory at one sample point.
#[derive(Debug, Clone, Copy)]
pub struct MemoryStatus {
    pub percent_used: f64,
    pub available_bytes: u64,
    pub total_bytes: u64,
    pub used_bytes: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryPressure {
    Normal,
    Warning,
    Critical,
}

/// Samples system memory pressure against warning/critical thresholds.
/// Thread-safe: the chunked strategy polls it from worker threads.
pub struct MemoryMonitor {
    system: Mutex<System>,
    warning_threshold: f64,
    critical_threshold: f64,
}

impl MemoryMonitor {
    pub fn new() -> Self {
        Self::with_thresholds(DEFAULT_WARNING_PERCENT, DEFAULT_CRITICAL_PERCENT)
    }

    pub fn with_thresholds(warning_threshold: f64, critical_threshold: f64) -> Self {
        Self {
            system: Mutex::new(System::new()),
            warning_threshold,
            critical_threshold,
        }
    }

    /// Refresh and return the current memory snapshot.
    pub fn status(&self) -> MemoryStatus {
        let mut sys = self.system.lock().expect("memory monitor lock poisoned");
        sys.refresh_memory();

        let total = sys.total_memory();
        let used = sys.used_memory();
        let percent_used = if total == 0 {
            0.0
        } else {
            used as f64 / total as f64 * 100.0
        };

        MemoryStatus {
            percent_used,
            available_bytes: sys.available_memory(),
            total_bytes: total,
            used_bytes: used,
        }
    }

    pub fn pressure(&self) -> MemoryPressure {
        let percent = self.status().percent_used;
        if percent >= self.critical_threshold {
            MemoryPressure::Critical
        } else if percent >= self.warning_threshold {
            MemoryPressure::Warning
        } else {
            MemoryPressure::Normal
        }
    }

    /// True when chunk sizes should shrink under the current pressure.
    /// Advisory only in the current design; chunk sizing is static per run.
    pub fn should_shrink_chunks(&self) -> bool {
        matches!(
            self.pressure(),
            MemoryPressure::Warning | MemoryPressure::Critical
        )
    }

    /// Best-effort reclamation pass. There is no collector to invoke here,
    /// so this refreshes the sampled state and reports what it sees.
    pub fn force_cleanup(&self) {
        let status = self.status();
        log::debug!(
            "memory cleanup pass: {:.1}% used, {:.2} GiB available",
            status.percent_used,
            status.available_bytes as f64 / 1024f64.powi(3)
        );
    }
}

impl Default for MemoryMonitor {
    fn default() -> Self {
        Self::new()
    }
}

/// Estimate the bytes needed to process one county: bounding-box pixel count
/// × time steps × 8 bytes, scaled by boundary complexity (coastal counties
/// select more partial pixels and intermediate masks than their bbox alone
/// suggests).
pub fn estimate_county_memory(series: &GriddedSeries, county: &CountyRecord) -> f64 {
    let Some(bbox) = county.bounding_rect() else {
        return 0.0;
    };

    let (dy, dx) = series.cell_size();
    let (time_steps, _, _) = series.shape();

    let approx_pixels = (bbox.width() / dx) * (bbox.height() / dy);
    let complexity_factor = (1.0 + county.exterior_vertex_count() as f64 / 1000.0)
        .min(MAX_COMPLEXITY_FACTOR);

    approx_pixels.max(1.0) * time_steps as f64 * 8.0 * complexity_factor
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::county::rect_county;
    use crate::series::daily_index;
    use chrono::NaiveDate;

    fn series_10x10_one_year() -> GriddedSeries {
        let time = daily_index(
            NaiveDate::from_ymd_opt(2001, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(2001, 12, 31).unwrap(),
        );
        let axis: Vec<f64> = (0..10).map(|i| i as f64 + 0.5).collect();
        let n = time.len() * 100;
        GriddedSeries::new(vec![0.0; n], time, axis.clone(), axis, "EPSG:4326", "mm/day").unwrap()
    }

    #[test]
    fn monitor_reports_consistent_snapshot() {
        let monitor = MemoryMonitor::new();
        let status = monitor.status();
        assert!(status.total_bytes > 0);
        assert!(status.percent_used >= 0.0 && status.percent_used <= 100.0);
        assert!(status.available_bytes <= status.total_bytes);
    }

    #[test]
    fn forced_thresholds_drive_pressure() {
        // Thresholds of zero force Critical regardless of actual load.
        let monitor = MemoryMonitor::with_thresholds(0.0, 0.0);
        assert_eq!(monitor.pressure(), MemoryPressure::Critical);
        assert!(monitor.should_shrink_chunks());

        // Thresholds above 100% force Normal.
        let monitor = MemoryMonitor::with_thresholds(150.0, 200.0);
        assert_eq!(monitor.pressure(), MemoryPressure::Normal);
        assert!(!monitor.should_shrink_chunks());
    }

    #[test]
    fn larger_bbox_costs_more() {
        let series = series_10x10_one_year();
        let small = rect_county("001", "Small", "XX", 1, 0.0, 0.0, 2.0, 2.0);
        let large = rect_county("002", "Large", "XX", 2, 0.0, 0.0, 8.0, 8.0);

        assert!(estimate_county_memory(&series, &large) > estimate_county_memory(&series, &small));
        // 2x2 degrees at 1-degree cells over 365 days, simple 5-vertex ring:
        // 4 pixels x 365 x 8 bytes x (1 + 5/1000).
        let expected = 4.0 * 365.0 * 8.0 * 1.005;
        assert!((estimate_county_memory(&series, &small) - expected).abs() < 1e-6);
    }

    #[test]
    fn complexity_factor_is_capped() {
        use geo::{Coord, LineString, MultiPolygon, Polygon};
        let series = series_10x10_one_year();

        // Ring with several thousand vertices around the same square.
        let n = 4000;
        let ring: Vec<Coord<f64>> = (0..=n)
            .map(|i| {
                let angle = i as f64 / n as f64 * std::f64::consts::TAU;
                Coord {
                    x: 1.0 + angle.cos().abs(),
                    y: 1.0 + angle.sin().abs(),
                }
            })
            .collect();
        let county = crate::county::CountyRecord::new(
            "003",
            "Coastal",
            "XX",
            3,
            MultiPolygon(vec![Polygon::new(LineString(ring), vec![])]),
        );

        let plain = rect_county("004", "Plain", "XX", 4, 1.0, 1.0, 2.0, 2.0);
        let ratio =
            estimate_county_memory(&series, &county) / estimate_county_memory(&series, &plain);
        // Same bbox, so the ratio is exactly the complexity-factor ratio.
        assert!(ratio <= MAX_COMPLEXITY_FACTOR / 1.005 + 1e-9);
    }
}
