//! Gridded daily climate series: a 3-D (time × y × x) array of one variable.
//!
//! Values are `f64` with NaN as the missing-value sentinel. The series is
//! read-only for the duration of an aggregation run; unit conversion and
//! longitude normalization happen before the strategies see it.

use chrono::{Datelike, NaiveDate};

use crate::error::AggregateError;

/// One climate variable on a regular lat/lon grid with a daily time axis.
///
/// Storage is time-major row-major: `data[t * ny * nx + row * nx + col]`.
/// `y` and `x` hold cell-center coordinates, ascending.
#[derive(Debug, Clone)]
pub struct GriddedSeries {
    data: Vec<f64>,
    time: Vec<NaiveDate>,
    y: Vec<f64>,
    x: Vec<f64>,
    crs: String,
    units: String,
}

impl GriddedSeries {
    /// Build a series, validating shape consistency upfront.
    pub fn new(
        data: Vec<f64>,
        time: Vec<NaiveDate>,
        y: Vec<f64>,
        x: Vec<f64>,
        crs: impl Into<String>,
        units: impl Into<String>,
    ) -> Result<Self, AggregateError> {
        if time.is_empty() {
            return Err(AggregateError::EmptySeries);
        }
        if y.len() < 2 || x.len() < 2 {
            return Err(AggregateError::DegenerateGrid {
                ny: y.len(),
                nx: x.len(),
            });
        }
        let expected = time.len() * y.len() * x.len();
        if data.len() != expected {
            return Err(AggregateError::ShapeMismatch {
                expected,
                actual: data.len(),
            });
        }
        Ok(Self {
            data,
            time,
            y,
            x,
            crs: crs.into(),
            units: units.into(),
        })
    }

    /// (time steps, rows, columns).
    pub fn shape(&self) -> (usize, usize, usize) {
        (self.time.len(), self.y.len(), self.x.len())
    }

    pub fn crs(&self) -> &str {
        &self.crs
    }

    pub fn units(&self) -> &str {
        &self.units
    }

    pub fn time(&self) -> &[NaiveDate] {
        &self.time
    }

    pub fn y_coords(&self) -> &[f64] {
        &self.y
    }

    pub fn x_coords(&self) -> &[f64] {
        &self.x
    }

    #[inline]
    pub fn value(&self, t: usize, row: usize, col: usize) -> f64 {
        self.data[t * self.y.len() * self.x.len() + row * self.x.len() + col]
    }

    /// Absolute cell resolution (dy, dx) from the first coordinate pair.
    pub fn cell_size(&self) -> (f64, f64) {
        let dy = (self.y[1] - self.y[0]).abs();
        let dx = (self.x[1] - self.x[0]).abs();
        (dy, dx)
    }

    /// Calendar year of every time step, in time order.
    pub fn years(&self) -> Vec<i32> {
        self.time.iter().map(NaiveDate::year).collect()
    }

    /// Sorted, deduplicated calendar years present in the time index.
    pub fn unique_years(&self) -> Vec<i32> {
        let mut years = self.years();
        years.sort_unstable();
        years.dedup();
        years
    }

    /// Apply `f` to every value in place. Used for unit conversion before a
    /// run starts; strategies never mutate the series.
    pub fn map_values_in_place(&mut self, f: impl Fn(f64) -> f64) {
        for v in &mut self.data {
            if !v.is_nan() {
                *v = f(*v);
            }
        }
    }

    pub fn set_units(&mut self, units: impl Into<String>) {
        self.units = units.into();
    }

    /// Normalize a 0–360 longitude axis into −180–180, re-sorting columns so
    /// the x axis stays ascending. No-op when the axis is already in range.
    pub fn normalize_longitudes(&mut self) {
        let max_x = self.x.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        if max_x <= 180.0 {
            return;
        }

        let wrapped: Vec<f64> = self.x.iter().map(|&x| (x + 180.0) % 360.0 - 180.0).collect();
        let mut order: Vec<usize> = (0..wrapped.len()).collect();
        order.sort_by(|&a, &b| wrapped[a].total_cmp(&wrapped[b]));

        let (nt, ny, nx) = self.shape();
        let mut data = vec![f64::NAN; self.data.len()];
        for t in 0..nt {
            for row in 0..ny {
                for (new_col, &old_col) in order.iter().enumerate() {
                    data[t * ny * nx + row * nx + new_col] = self.value(t, row, old_col);
                }
            }
        }
        self.data = data;
        self.x = order.iter().map(|&i| wrapped[i]).collect();
    }
}

/// Build a daily date index covering `[start, end]` inclusive.
pub fn daily_index(start: NaiveDate, end: NaiveDate) -> Vec<NaiveDate> {
    let mut dates = Vec::new();
    let mut d = start;
    while d <= end {
        dates.push(d);
        d = d.succ_opt().expect("date overflow");
    }
    dates
}
