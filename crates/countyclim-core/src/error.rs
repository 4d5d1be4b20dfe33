use thiserror::Error;

/// Fatal, upfront errors. These abort an aggregation run before any output
/// is produced; everything recoverable is handled internally and surfaced
/// through counters and the dropped-county list instead.
#[derive(Debug, Error)]
pub enum AggregateError {
    #[error("unsupported climate variable '{0}' (expected pr, tas, tasmax or tasmin)")]
    UnsupportedVariable(String),

    #[error("gridded series has no time steps")]
    EmptySeries,

    #[error("gridded series spatial axes too small ({ny}x{nx}, need at least 2x2)")]
    DegenerateGrid { ny: usize, nx: usize },

    #[error("series data length {actual} does not match time x ny x nx = {expected}")]
    ShapeMismatch { expected: usize, actual: usize },

    #[error("failed to build worker pool: {0}")]
    WorkerPool(String),
}

/// Per-county recoverable errors. A county hitting one of these is logged,
/// skipped and reported in `AggregationResult::dropped`; the run continues.
#[derive(Debug, Clone, Error)]
pub enum CountyError {
    #[error("county polygon is empty")]
    EmptyPolygon,

    #[error("county polygon contains non-finite coordinates")]
    NonFiniteGeometry,
}
