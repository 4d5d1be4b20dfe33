//! Aggregation strategies: the seam between "what to compute" (calculators)
//! and "how to sweep the county collection" (sequential vs. chunked
//! parallel). Both strategies produce value-equivalent results; chunking is
//! purely a performance optimization.

pub mod chunked;
pub mod vectorized;

use serde::Serialize;

use crate::clip::ClippedSeries;
use crate::cluster::ChunkingConfig;
use crate::county::CountyRecord;
use crate::error::AggregateError;
use crate::series::GriddedSeries;
use crate::stats::CountyYearStatistic;
use crate::variable::ClimateVariable;

pub use chunked::SpatialChunkedStrategy;
pub use vectorized::VectorizedStrategy;

/// A processing strategy: raster series + county collection → statistics
/// table. `workers` is advisory; the vectorized strategy ignores it.
pub trait Strategy: Send + Sync {
    fn process(
        &self,
        series: &GriddedSeries,
        counties: &[CountyRecord],
        variable: ClimateVariable,
        scenario: &str,
        threshold: Option<f64>,
        workers: usize,
    ) -> Result<AggregationResult, AggregateError>;
}

/// The two available strategies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrategyKind {
    Vectorized,
    SpatialChunked,
}

/// Processing regions. Only identity matters here: CONUS is the one region
/// large enough to warrant chunking.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Region {
    Conus,
    PuertoRico,
    Alaska,
    Hawaii,
    Guam,
}

impl Region {
    /// Fallback inference from county count when no region label is given.
    pub fn infer_from_count(county_count: usize) -> Self {
        if county_count > 2000 {
            Self::Conus
        } else if county_count > 50 {
            Self::PuertoRico
        } else if county_count > 20 {
            Self::Alaska
        } else if county_count > 10 {
            Self::Hawaii
        } else {
            Self::Guam
        }
    }

    pub fn strategy_kind(self) -> StrategyKind {
        match self {
            Self::Conus => StrategyKind::SpatialChunked,
            _ => StrategyKind::Vectorized,
        }
    }
}

/// Build the strategy for a region, fully configured. Never fails; the
/// chunked strategy's policy for CONUS is fixed (75% memory target, chunk
/// sizes 10..=50, cache on).
pub fn strategy_for_region(region: Region) -> Box<dyn Strategy> {
    match region.strategy_kind() {
        StrategyKind::SpatialChunked => {
            log::info!("using spatial-chunked strategy for {region:?}");
            Box::new(SpatialChunkedStrategy::new(ChunkingConfig::large_region()))
        }
        StrategyKind::Vectorized => {
            log::info!("using vectorized strategy for {region:?}");
            Box::new(VectorizedStrategy)
        }
    }
}

// ── Output table ──────────────────────────────────────────────────────────────

/// Per-run diagnostic counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ProcessingCounters {
    /// Counties that produced at least one row.
    pub successful: usize,
    /// Counties whose clip was empty under both touch policies.
    pub empty_clips: usize,
    /// Counties that hit a recoverable error and were skipped.
    pub failed: usize,
}

/// Why a county produced no output rows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DropReason {
    /// No pixels overlapped the county under either touch policy.
    EmptyClip,
    /// Pixels overlapped, but no year had a single valid day.
    NoValidDays,
    /// A recoverable per-county error (message attached).
    Failed(String),
}

/// A county that contributed zero rows, with the reason. Surfaced so callers
/// can reconcile output completeness without parsing logs.
#[derive(Debug, Clone, Serialize)]
pub struct DroppedCounty {
    pub county_id: String,
    pub county_name: String,
    pub reason: DropReason,
}

/// The full output of one strategy run: an unordered table of county-year
/// rows plus diagnostics.
#[derive(Debug, Clone, Default, Serialize)]
pub struct AggregationResult {
    pub rows: Vec<CountyYearStatistic>,
    pub counters: ProcessingCounters,
    pub dropped: Vec<DroppedCounty>,
}

impl AggregationResult {
    fn default_with_capacity(rows: usize) -> Self {
        Self {
            rows: Vec::with_capacity(rows),
            ..Self::default()
        }
    }
}

// ── Shared per-county algorithm ───────────────────────────────────────────────

/// Per-day reduction mode for the yearly spatial means.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ReductionMode {
    /// One pass over the pixels per day.
    Eager,
    /// Switch to a single pixel-major accumulation sweep when a year's
    /// selection is large. Same values, better locality.
    Adaptive,
}

/// A year's selection above this many elements takes the accumulated
/// reduction path under `ReductionMode::Adaptive`.
pub(crate) const LARGE_SELECTION_ELEMENTS: usize = 100_000;

/// Years processed per batch in the chunked strategy, bounding peak memory
/// for long time series.
pub(crate) const YEAR_BATCH_SIZE: usize = 10;

/// The clip-side algorithm shared by every strategy and the fallback pass:
/// for each calendar year present in the clipped series, reduce to valid
/// daily spatial means and run the variable's calculator. Years with zero
/// valid days produce no row.
#[allow(clippy::too_many_arguments)]
pub(crate) fn county_year_rows(
    clipped: &ClippedSeries<'_>,
    county: &CountyRecord,
    years: &[i32],
    unique_years: &[i32],
    variable: ClimateVariable,
    scenario: &str,
    threshold: Option<f64>,
    year_batch: Option<usize>,
    reduction: ReductionMode,
) -> Vec<CountyYearStatistic> {
    let mut rows = Vec::new();
    let batch = year_batch.unwrap_or(unique_years.len().max(1));

    for year_group in unique_years.chunks(batch) {
        for &year in year_group {
            let time_idx: Vec<usize> = years
                .iter()
                .enumerate()
                .filter_map(|(t, &y)| (y == year).then_some(t))
                .collect();
            if time_idx.is_empty() {
                continue;
            }

            let selection_elements = time_idx.len() * clipped.pixel_count();
            let means = match reduction {
                ReductionMode::Adaptive if selection_elements > LARGE_SELECTION_ELEMENTS => {
                    clipped.daily_means_accumulated(&time_idx)
                }
                _ => clipped.daily_means(&time_idx),
            };

            // Days where every pixel is missing drop out of the sample.
            let valid: Vec<f64> = means.into_iter().flatten().collect();
            if valid.is_empty() {
                continue;
            }

            if let Some(row) = variable.calculate(&valid, threshold, year, scenario, county) {
                rows.push(row);
            }
        }
    }

    rows
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn region_inference_matches_collection_sizes() {
        assert_eq!(Region::infer_from_count(3109), Region::Conus);
        assert_eq!(Region::infer_from_count(78), Region::PuertoRico);
        assert_eq!(Region::infer_from_count(30), Region::Alaska);
        assert_eq!(Region::infer_from_count(15), Region::Hawaii);
        assert_eq!(Region::infer_from_count(5), Region::Guam);
    }

    #[test]
    fn only_conus_gets_the_chunked_strategy() {
        assert_eq!(Region::Conus.strategy_kind(), StrategyKind::SpatialChunked);
        for region in [Region::PuertoRico, Region::Alaska, Region::Hawaii, Region::Guam] {
            assert_eq!(region.strategy_kind(), StrategyKind::Vectorized);
        }
    }
}
