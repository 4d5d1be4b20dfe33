//! County records: the unit of spatial aggregation.

use geo::{BoundingRect, Centroid, MultiPolygon, Point, Rect};

use crate::error::CountyError;

/// One county polygon with its identifying attributes. The collection handed
/// to a strategy is an ordered `Vec<CountyRecord>`; order is only used as the
/// default iteration order of the vectorized strategy.
#[derive(Debug, Clone)]
pub struct CountyRecord {
    /// Stable identifier (GEOID / FIPS).
    pub county_id: String,
    pub county_name: String,
    pub state: String,
    /// Numeric grouping id, 1-based over the collection.
    pub raster_id: u32,
    pub polygon: MultiPolygon<f64>,
}

impl CountyRecord {
    pub fn new(
        county_id: impl Into<String>,
        county_name: impl Into<String>,
        state: impl Into<String>,
        raster_id: u32,
        polygon: MultiPolygon<f64>,
    ) -> Self {
        Self {
            county_id: county_id.into(),
            county_name: county_name.into(),
            state: state.into(),
            raster_id,
            polygon,
        }
    }

    /// Geometry sanity check used before clipping. Degenerate polygons are a
    /// per-county error, never a run-level one.
    pub fn validate_geometry(&self) -> Result<(), CountyError> {
        if self.polygon.0.is_empty() {
            return Err(CountyError::EmptyPolygon);
        }
        let finite = self.polygon.0.iter().all(|p| {
            p.exterior()
                .0
                .iter()
                .all(|c| c.x.is_finite() && c.y.is_finite())
        });
        if !finite {
            return Err(CountyError::NonFiniteGeometry);
        }
        Ok(())
    }

    pub fn bounding_rect(&self) -> Option<Rect<f64>> {
        self.polygon.bounding_rect()
    }

    pub fn centroid(&self) -> Option<Point<f64>> {
        self.polygon.centroid()
    }

    /// Total exterior-ring vertex count across all parts. Proxy for boundary
    /// complexity in the memory estimator.
    pub fn exterior_vertex_count(&self) -> usize {
        self.polygon.0.iter().map(|p| p.exterior().0.len()).sum()
    }
}

/// Axis-aligned rectangular county, used by tests and the offline harness.
pub fn rect_county(
    county_id: &str,
    county_name: &str,
    state: &str,
    raster_id: u32,
    min_x: f64,
    min_y: f64,
    max_x: f64,
    max_y: f64,
) -> CountyRecord {
    let rect = Rect::new(
        geo::Coord { x: min_x, y: min_y },
        geo::Coord { x: max_x, y: max_y },
    );
    CountyRecord::new(
        county_id,
        county_name,
        state,
        raster_id,
        MultiPolygon(vec![rect.to_polygon()]),
    )
}
