//! Memory-aware, locality-aware parallel processing for large county
//! collections.
//!
//! Pipeline per invocation: memory budget → per-county estimates → spatial
//! chunk construction → bounded worker pool over chunks → sequential
//! fallback retry for failed chunks → assembly. Results are value-equivalent
//! to the vectorized strategy on the same input.

use std::any::Any;
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};

use rayon::prelude::*;
use rayon::ThreadPoolBuilder;

use crate::clip::{clip_with_fallback, ClippedSeries};
use crate::cluster::{build_spatial_chunks, Chunk, ChunkingConfig};
use crate::county::CountyRecord;
use crate::error::AggregateError;
use crate::memory::{estimate_county_memory, MemoryMonitor};
use crate::series::GriddedSeries;
use crate::variable::ClimateVariable;

use super::{
    county_year_rows, AggregationResult, DropReason, DroppedCounty, ReductionMode, Strategy,
    YEAR_BATCH_SIZE,
};

/// Memory-used percentage above which chunk completions log a warning.
const MEMORY_WARN_PERCENT: f64 = 85.0;

/// Clip-cache entry ceiling: selections that would materialize above this
/// are never cached.
const CACHE_ENTRY_MAX_BYTES: usize = 50 * 1024 * 1024;

/// Total clip-cache capacity per worker task.
const CACHE_CAPACITY_BYTES: usize = 256 * 1024 * 1024;

/// Bounded clip-result cache, scoped to one chunk's worker task so no
/// synchronization is needed. Evicts oldest entries on overflow.
struct ClipCache<'a> {
    entries: HashMap<CacheKey, ClippedSeries<'a>>,
    insertion_order: Vec<CacheKey>,
    total_bytes: usize,
}

type CacheKey = (u32, (usize, usize, usize));

impl<'a> ClipCache<'a> {
    fn new() -> Self {
        Self {
            entries: HashMap::new(),
            insertion_order: Vec::new(),
            total_bytes: 0,
        }
    }

    fn get(&self, key: &CacheKey) -> Option<ClippedSeries<'a>> {
        self.entries.get(key).cloned()
    }

    fn insert(&mut self, key: CacheKey, clipped: ClippedSeries<'a>) {
        let bytes = clipped.approx_bytes();
        if bytes >= CACHE_ENTRY_MAX_BYTES {
            return;
        }
        while self.total_bytes + bytes > CACHE_CAPACITY_BYTES && !self.insertion_order.is_empty() {
            let oldest = self.insertion_order.remove(0);
            if let Some(evicted) = self.entries.remove(&oldest) {
                self.total_bytes -= evicted.approx_bytes();
            }
        }
        self.total_bytes += bytes;
        self.insertion_order.push(key);
        self.entries.insert(key, clipped);
    }
}

/// Composes the clusterer, memory estimator and a bounded worker pool to
/// process large county collections in memory-bounded groups, with chunk
/// failure isolation and a sequential retry pass.
pub struct SpatialChunkedStrategy {
    config: ChunkingConfig,
    monitor: MemoryMonitor,
}

impl SpatialChunkedStrategy {
    pub fn new(config: ChunkingConfig) -> Self {
        Self {
            config,
            monitor: MemoryMonitor::new(),
        }
    }

    pub fn config(&self) -> &ChunkingConfig {
        &self.config
    }

    /// Process one chunk's counties in locality order, consulting the
    /// per-task clip cache, batching years, and switching to the deferred
    /// reduction for oversized year selections. Per-county errors are
    /// terminal for the county only.
    #[allow(clippy::too_many_arguments)]
    fn process_chunk(
        &self,
        chunk_id: usize,
        chunk: &Chunk,
        series: &GriddedSeries,
        counties: &[CountyRecord],
        variable: ClimateVariable,
        scenario: &str,
        threshold: Option<f64>,
        years: &[i32],
        unique_years: &[i32],
    ) -> AggregationResult {
        let mut part = AggregationResult::default();
        let mut cache = self.config.enable_spatial_cache.then(ClipCache::new);

        log::debug!(
            "processing chunk {chunk_id} with {} counties",
            chunk.indices.len()
        );

        for &idx in &chunk.indices {
            let county = &counties[idx];
            let key: CacheKey = (county.raster_id, series.shape());

            let clipped = match cache.as_ref().and_then(|c| c.get(&key)) {
                Some(hit) => hit,
                None => match clip_with_fallback(series, county) {
                    Ok(fresh) => {
                        if let Some(cache) = cache.as_mut() {
                            if !fresh.is_empty() {
                                cache.insert(key, fresh.clone());
                            }
                        }
                        fresh
                    }
                    Err(err) => {
                        part.counters.failed += 1;
                        log::error!(
                            "error processing county {} in chunk {chunk_id}: {err}",
                            county.county_id
                        );
                        part.dropped.push(DroppedCounty {
                            county_id: county.county_id.clone(),
                            county_name: county.county_name.clone(),
                            reason: DropReason::Failed(err.to_string()),
                        });
                        continue;
                    }
                },
            };

            if clipped.is_empty() {
                part.counters.empty_clips += 1;
                part.dropped.push(DroppedCounty {
                    county_id: county.county_id.clone(),
                    county_name: county.county_name.clone(),
                    reason: DropReason::EmptyClip,
                });
                continue;
            }

            let rows = county_year_rows(
                &clipped,
                county,
                years,
                unique_years,
                variable,
                scenario,
                threshold,
                Some(YEAR_BATCH_SIZE),
                ReductionMode::Adaptive,
            );
            if rows.is_empty() {
                part.dropped.push(DroppedCounty {
                    county_id: county.county_id.clone(),
                    county_name: county.county_name.clone(),
                    reason: DropReason::NoValidDays,
                });
            } else {
                part.rows.extend(rows);
                part.counters.successful += 1;
            }
        }

        log::debug!("chunk {chunk_id} complete: {} rows", part.rows.len());
        part
    }

    /// Strictly sequential retry for a failed chunk: no cache, no year
    /// batching. Per-county failures are caught and skipped as usual.
    #[allow(clippy::too_many_arguments)]
    fn process_chunk_fallback(
        &self,
        chunk: &Chunk,
        series: &GriddedSeries,
        counties: &[CountyRecord],
        variable: ClimateVariable,
        scenario: &str,
        threshold: Option<f64>,
        years: &[i32],
        unique_years: &[i32],
    ) -> AggregationResult {
        log::warn!(
            "fallback sequential processing for {} counties",
            chunk.indices.len()
        );

        let mut part = AggregationResult::default();
        for &idx in &chunk.indices {
            let county = &counties[idx];
            match clip_with_fallback(series, county) {
                Ok(clipped) if !clipped.is_empty() => {
                    let rows = county_year_rows(
                        &clipped,
                        county,
                        years,
                        unique_years,
                        variable,
                        scenario,
                        threshold,
                        None,
                        ReductionMode::Eager,
                    );
                    if rows.is_empty() {
                        part.dropped.push(DroppedCounty {
                            county_id: county.county_id.clone(),
                            county_name: county.county_name.clone(),
                            reason: DropReason::NoValidDays,
                        });
                    } else {
                        part.rows.extend(rows);
                        part.counters.successful += 1;
                    }
                }
                Ok(_) => {
                    part.counters.empty_clips += 1;
                    part.dropped.push(DroppedCounty {
                        county_id: county.county_id.clone(),
                        county_name: county.county_name.clone(),
                        reason: DropReason::EmptyClip,
                    });
                }
                Err(err) => {
                    part.counters.failed += 1;
                    log::error!("fallback failed for county {}: {err}", county.county_id);
                    part.dropped.push(DroppedCounty {
                        county_id: county.county_id.clone(),
                        county_name: county.county_name.clone(),
                        reason: DropReason::Failed(err.to_string()),
                    });
                }
            }
        }
        part
    }
}

impl Strategy for SpatialChunkedStrategy {
    fn process(
        &self,
        series: &GriddedSeries,
        counties: &[CountyRecord],
        variable: ClimateVariable,
        scenario: &str,
        threshold: Option<f64>,
        workers: usize,
    ) -> Result<AggregationResult, AggregateError> {
        if counties.is_empty() {
            return Ok(AggregationResult::default());
        }

        let years = series.years();
        let unique_years = series.unique_years();

        // 1. Memory budget from currently available system memory.
        let status = self.monitor.status();
        let budget_bytes = status.available_bytes as f64 * self.config.target_memory_usage;
        log::info!(
            "available memory {:.1} GiB, target budget {:.1} GiB ({:.0}%)",
            status.available_bytes as f64 / 1024f64.powi(3),
            budget_bytes / 1024f64.powi(3),
            self.config.target_memory_usage * 100.0
        );

        // 2-5. Estimates, clustering, refinement, locality ordering.
        let estimates: Vec<f64> = counties
            .iter()
            .map(|c| estimate_county_memory(series, c))
            .collect();
        let chunks = build_spatial_chunks(counties, &estimates, budget_bytes, &self.config);
        log::info!("created {} spatial chunks", chunks.len());

        // 6. Parallel execution over a bounded pool. A panic inside a chunk
        // marks the whole chunk failed; a county-level error inside a
        // successful chunk is absorbed by process_chunk.
        let pool_size = workers.max(1).min(chunks.len().max(1));
        let pool = ThreadPoolBuilder::new()
            .num_threads(pool_size)
            .build()
            .map_err(|e| AggregateError::WorkerPool(e.to_string()))?;

        let outcomes: Vec<(usize, Result<AggregationResult, String>)> = pool.install(|| {
            chunks
                .par_iter()
                .enumerate()
                .map(|(chunk_id, chunk)| {
                    let outcome = catch_unwind(AssertUnwindSafe(|| {
                        self.process_chunk(
                            chunk_id,
                            chunk,
                            series,
                            counties,
                            variable,
                            scenario,
                            threshold,
                            &years,
                            &unique_years,
                        )
                    }))
                    .map_err(panic_message);

                    let completion_status = self.monitor.status();
                    if completion_status.percent_used > MEMORY_WARN_PERCENT {
                        log::warn!(
                            "high memory usage ({:.1}%) after chunk {chunk_id}",
                            completion_status.percent_used
                        );
                    }

                    (chunk_id, outcome)
                })
                .collect()
        });

        // 7-8. Sequential fallback for failed chunks, then assembly.
        let mut result = AggregationResult::default_with_capacity(counties.len() * unique_years.len());
        let mut failed_chunks: Vec<usize> = Vec::new();

        for (chunk_id, outcome) in outcomes {
            match outcome {
                Ok(part) => merge_into(&mut result, part),
                Err(message) => {
                    log::error!("chunk {chunk_id} failed: {message}");
                    failed_chunks.push(chunk_id);
                }
            }
        }

        if !failed_chunks.is_empty() {
            log::warn!("retrying {} failed chunks sequentially", failed_chunks.len());
            for chunk_id in failed_chunks {
                let part = self.process_chunk_fallback(
                    &chunks[chunk_id],
                    series,
                    counties,
                    variable,
                    scenario,
                    threshold,
                    &years,
                    &unique_years,
                );
                merge_into(&mut result, part);
            }
        }

        log::info!(
            "spatial chunked processing complete: {} county-year rows",
            result.rows.len()
        );
        Ok(result)
    }
}

fn merge_into(result: &mut AggregationResult, part: AggregationResult) {
    result.rows.extend(part.rows);
    result.counters.successful += part.counters.successful;
    result.counters.empty_clips += part.counters.empty_clips;
    result.counters.failed += part.counters.failed;
    result.dropped.extend(part.dropped);
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_owned())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "chunk worker panicked".to_owned())
}
