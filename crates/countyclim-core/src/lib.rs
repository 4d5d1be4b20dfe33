//! County-level aggregation of gridded daily climate series.
//!
//! Takes a raster time series (daily values on a regular 2-D grid) and a
//! county collection, and produces one row of variable-specific statistics
//! per county per calendar year. Two interchangeable strategies do the
//! sweep: a sequential vectorized pass and a memory-aware spatially-chunked
//! parallel pass; their outputs are value-equivalent.

pub mod clip;
pub mod cluster;
pub mod county;
pub mod error;
pub mod memory;
pub mod series;
pub mod stats;
pub mod strategy;
pub mod variable;

pub use clip::{clip_series, clip_with_fallback, ClippedSeries, TouchPolicy};
pub use cluster::{build_spatial_chunks, Chunk, ChunkingConfig};
pub use county::{rect_county, CountyRecord};
pub use error::{AggregateError, CountyError};
pub use memory::{estimate_county_memory, MemoryMonitor, MemoryPressure, MemoryStatus};
pub use series::{daily_index, GriddedSeries};
pub use stats::{CountyYearStatistic, StatValues};
pub use strategy::{
    strategy_for_region, AggregationResult, DropReason, DroppedCounty, ProcessingCounters, Region,
    SpatialChunkedStrategy, Strategy, StrategyKind, VectorizedStrategy,
};
pub use variable::ClimateVariable;
