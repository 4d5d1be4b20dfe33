//! Clip-and-reduce primitive: restrict a gridded series to the pixels
//! overlapping one county polygon, then reduce spatially per day.
//!
//! Two touch-inclusion policies are supported. The inclusive policy keeps
//! every pixel whose footprint rectangle intersects the polygon (needed for
//! coastal counties and counties smaller than one cell); the strict policy
//! keeps only pixels whose center falls inside. Clipping first tries the
//! inclusive policy, then retries strictly when nothing was selected.

use geo::{Contains, Intersects, Point, Rect};

use crate::county::CountyRecord;
use crate::error::CountyError;
use crate::series::GriddedSeries;

/// Pixel inclusion policy for clipping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TouchPolicy {
    /// Include every pixel whose cell footprint touches the polygon.
    AllTouched,
    /// Include only pixels whose center lies inside the polygon.
    CenterWithin,
}

/// The subset of a series overlapping one polygon: a pixel index list over a
/// borrowed series. No values are copied; reductions read through.
#[derive(Debug, Clone)]
pub struct ClippedSeries<'a> {
    series: &'a GriddedSeries,
    pixels: Vec<(usize, usize)>,
}

impl<'a> ClippedSeries<'a> {
    pub fn pixel_count(&self) -> usize {
        self.pixels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pixels.is_empty()
    }

    /// Element count of the full clipped selection (pixels × time steps).
    pub fn element_count(&self) -> usize {
        self.pixels.len() * self.series.shape().0
    }

    /// Approximate in-memory size of the selection if it were materialized
    /// as f64. Used for the cache byte ceiling.
    pub fn approx_bytes(&self) -> usize {
        self.element_count() * std::mem::size_of::<f64>()
    }

    /// Spatial mean across selected pixels for one time step, skipping
    /// missing values. `None` when every selected pixel is missing.
    pub fn daily_mean(&self, t: usize) -> Option<f64> {
        let mut sum = 0.0;
        let mut n = 0usize;
        for &(row, col) in &self.pixels {
            let v = self.series.value(t, row, col);
            if !v.is_nan() {
                sum += v;
                n += 1;
            }
        }
        (n > 0).then(|| sum / n as f64)
    }

    /// Per-day spatial means for the given time steps, one pass per day.
    pub fn daily_means(&self, time_idx: &[usize]) -> Vec<Option<f64>> {
        time_idx.iter().map(|&t| self.daily_mean(t)).collect()
    }

    /// Per-day spatial means computed pixel-major: a single accumulation
    /// sweep instead of one pass per day. Same results as `daily_means`;
    /// used when a year's selection is large enough that per-day passes
    /// thrash the cache.
    pub fn daily_means_accumulated(&self, time_idx: &[usize]) -> Vec<Option<f64>> {
        let mut sums = vec![0.0f64; time_idx.len()];
        let mut counts = vec![0usize; time_idx.len()];

        for &(row, col) in &self.pixels {
            for (i, &t) in time_idx.iter().enumerate() {
                let v = self.series.value(t, row, col);
                if !v.is_nan() {
                    sums[i] += v;
                    counts[i] += 1;
                }
            }
        }

        sums.iter()
            .zip(&counts)
            .map(|(&s, &n)| (n > 0).then(|| s / n as f64))
            .collect()
    }
}

/// Select the pixels of `series` overlapping `county` under `policy`.
pub fn clip_series<'a>(
    series: &'a GriddedSeries,
    county: &CountyRecord,
    policy: TouchPolicy,
) -> Result<ClippedSeries<'a>, CountyError> {
    county.validate_geometry()?;

    let Some(bbox) = county.bounding_rect() else {
        return Err(CountyError::EmptyPolygon);
    };

    let (dy, dx) = series.cell_size();
    let y = series.y_coords();
    let x = series.x_coords();

    // Candidate window: cell centers within half a cell of the bbox. Pixels
    // outside this window cannot touch the polygon under either policy.
    let rows: Vec<usize> = (0..y.len())
        .filter(|&r| y[r] >= bbox.min().y - dy / 2.0 && y[r] <= bbox.max().y + dy / 2.0)
        .collect();
    let cols: Vec<usize> = (0..x.len())
        .filter(|&c| x[c] >= bbox.min().x - dx / 2.0 && x[c] <= bbox.max().x + dx / 2.0)
        .collect();

    let mut pixels = Vec::new();
    for &row in &rows {
        for &col in &cols {
            let keep = match policy {
                TouchPolicy::AllTouched => {
                    let footprint = Rect::new(
                        geo::Coord {
                            x: x[col] - dx / 2.0,
                            y: y[row] - dy / 2.0,
                        },
                        geo::Coord {
                            x: x[col] + dx / 2.0,
                            y: y[row] + dy / 2.0,
                        },
                    );
                    county.polygon.intersects(&footprint)
                }
                TouchPolicy::CenterWithin => {
                    county.polygon.contains(&Point::new(x[col], y[row]))
                }
            };
            if keep {
                pixels.push((row, col));
            }
        }
    }

    Ok(ClippedSeries { series, pixels })
}

/// Clip inclusively, retrying with the strict policy when nothing was
/// selected. An empty result after both attempts is not an error; the caller
/// counts it as an empty clip and skips the county.
pub fn clip_with_fallback<'a>(
    series: &'a GriddedSeries,
    county: &CountyRecord,
) -> Result<ClippedSeries<'a>, CountyError> {
    let clipped = clip_series(series, county, TouchPolicy::AllTouched)?;
    if !clipped.is_empty() {
        return Ok(clipped);
    }
    log::debug!(
        "empty inclusive clip for {} ({}), retrying with strict policy",
        county.county_name,
        county.county_id
    );
    clip_series(series, county, TouchPolicy::CenterWithin)
}
