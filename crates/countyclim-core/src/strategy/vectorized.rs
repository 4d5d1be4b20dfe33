//! Sequential per-county processing. Always correct, no concurrency; the
//! baseline the chunked strategy must match value-for-value.

use crate::clip::clip_with_fallback;
use crate::county::CountyRecord;
use crate::error::AggregateError;
use crate::series::GriddedSeries;
use crate::variable::ClimateVariable;

use super::{
    county_year_rows, AggregationResult, DropReason, DroppedCounty, ReductionMode, Strategy,
};

/// Processes counties one at a time in collection order, with the inclusive
/// clip policy and strict-policy retry. Per-county failures are logged and
/// skipped; the run never aborts for one county.
pub struct VectorizedStrategy;

impl Strategy for VectorizedStrategy {
    fn process(
        &self,
        series: &GriddedSeries,
        counties: &[CountyRecord],
        variable: ClimateVariable,
        scenario: &str,
        threshold: Option<f64>,
        _workers: usize,
    ) -> Result<AggregationResult, AggregateError> {
        let years = series.years();
        let unique_years = series.unique_years();

        log::info!(
            "vectorized: processing {} counties over {} years ({variable}, scenario {scenario})",
            counties.len(),
            unique_years.len()
        );

        let mut result = AggregationResult::default_with_capacity(counties.len() * unique_years.len());

        for county in counties {
            match clip_with_fallback(series, county) {
                Ok(clipped) if !clipped.is_empty() => {
                    let rows = county_year_rows(
                        &clipped,
                        county,
                        &years,
                        &unique_years,
                        variable,
                        scenario,
                        threshold,
                        None,
                        ReductionMode::Eager,
                    );
                    if rows.is_empty() {
                        result.dropped.push(DroppedCounty {
                            county_id: county.county_id.clone(),
                            county_name: county.county_name.clone(),
                            reason: DropReason::NoValidDays,
                        });
                    } else {
                        result.rows.extend(rows);
                        result.counters.successful += 1;
                    }
                }
                Ok(_) => {
                    result.counters.empty_clips += 1;
                    log::warn!(
                        "no data found for {}, {}",
                        county.county_name,
                        county.state
                    );
                    result.dropped.push(DroppedCounty {
                        county_id: county.county_id.clone(),
                        county_name: county.county_name.clone(),
                        reason: DropReason::EmptyClip,
                    });
                }
                Err(err) => {
                    result.counters.failed += 1;
                    log::error!(
                        "error processing {}, {}: {err}",
                        county.county_name,
                        county.state
                    );
                    result.dropped.push(DroppedCounty {
                        county_id: county.county_id.clone(),
                        county_name: county.county_name.clone(),
                        reason: DropReason::Failed(err.to_string()),
                    });
                }
            }
        }

        log::info!(
            "vectorized complete: {} successful, {} empty clips, {} failed",
            result.counters.successful,
            result.counters.empty_clips,
            result.counters.failed
        );

        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::county::{rect_county, CountyRecord};
    use crate::series::daily_index;
    use crate::stats::StatValues;
    use approx::assert_relative_eq;
    use chrono::NaiveDate;
    use geo::MultiPolygon;

    /// Constant 10 mm/day over an 8x8 one-degree grid, 2004-2005 (leap then
    /// non-leap year).
    fn constant_precip_series() -> GriddedSeries {
        let time = daily_index(
            NaiveDate::from_ymd_opt(2004, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(2005, 12, 31).unwrap(),
        );
        let axis: Vec<f64> = (0..8).map(|i| i as f64 + 0.5).collect();
        let n = time.len() * 64;
        GriddedSeries::new(vec![10.0; n], time, axis.clone(), axis, "EPSG:4326", "mm/day").unwrap()
    }

    fn three_rect_counties() -> Vec<CountyRecord> {
        vec![
            rect_county("001", "West", "XX", 1, 0.0, 0.0, 2.0, 8.0),
            rect_county("002", "Middle", "XX", 2, 3.0, 0.0, 5.0, 8.0),
            rect_county("003", "East", "XX", 3, 6.0, 0.0, 8.0, 8.0),
        ]
    }

    #[test]
    fn constant_precip_scenario_totals_and_counts() {
        let series = constant_precip_series();
        let counties = three_rect_counties();

        let result = VectorizedStrategy
            .process(
                &series,
                &counties,
                ClimateVariable::Precipitation,
                "historical",
                Some(25.4),
                1,
            )
            .unwrap();

        // 3 counties x 2 years.
        assert_eq!(result.rows.len(), 6);
        assert_eq!(result.counters.successful, 3);
        assert!(result.dropped.is_empty());

        for row in &result.rows {
            let StatValues::Precipitation(ref stats) = row.values else {
                panic!("expected precipitation stats");
            };
            let expected_total = if row.year == 2004 { 3660.0 } else { 3650.0 };
            assert_relative_eq!(stats.total_annual_precip_mm, expected_total, epsilon = 1e-9);
            assert_eq!(stats.days_above_threshold, 0);
            assert_eq!(stats.dry_days, 0);
        }
    }

    #[test]
    fn zero_overlap_county_contributes_zero_rows_without_error() {
        let series = constant_precip_series();
        let counties = vec![
            rect_county("001", "In", "XX", 1, 0.0, 0.0, 4.0, 4.0),
            rect_county("404", "Nowhere", "XX", 2, 500.0, 500.0, 501.0, 501.0),
        ];

        let result = VectorizedStrategy
            .process(
                &series,
                &counties,
                ClimateVariable::Precipitation,
                "historical",
                Some(25.4),
                1,
            )
            .unwrap();

        assert_eq!(result.counters.empty_clips, 1);
        assert!(result.rows.iter().all(|r| r.county_id == "001"));
        assert_eq!(result.dropped.len(), 1);
        assert_eq!(result.dropped[0].county_id, "404");
        assert_eq!(result.dropped[0].reason, DropReason::EmptyClip);
    }

    #[test]
    fn degenerate_county_is_skipped_not_fatal() {
        let series = constant_precip_series();
        let counties = vec![
            CountyRecord::new("bad", "Broken", "XX", 1, MultiPolygon(vec![])),
            rect_county("002", "Fine", "XX", 2, 0.0, 0.0, 4.0, 4.0),
        ];

        let result = VectorizedStrategy
            .process(
                &series,
                &counties,
                ClimateVariable::Precipitation,
                "historical",
                None,
                1,
            )
            .unwrap();

        assert_eq!(result.counters.failed, 1);
        assert_eq!(result.counters.successful, 1);
        assert!(matches!(result.dropped[0].reason, DropReason::Failed(_)));
    }

    #[test]
    fn reruns_are_row_for_row_identical() {
        let series = constant_precip_series();
        let counties = three_rect_counties();

        let run = || {
            VectorizedStrategy
                .process(
                    &series,
                    &counties,
                    ClimateVariable::Precipitation,
                    "historical",
                    Some(25.4),
                    1,
                )
                .unwrap()
        };
        let a = serde_json::to_string(&run().rows).unwrap();
        let b = serde_json::to_string(&run().rows).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn unique_county_year_keys() {
        let series = constant_precip_series();
        let counties = three_rect_counties();
        let result = VectorizedStrategy
            .process(
                &series,
                &counties,
                ClimateVariable::Precipitation,
                "historical",
                None,
                1,
            )
            .unwrap();

        let mut keys: Vec<(String, i32)> = result
            .rows
            .iter()
            .map(|r| (r.county_id.clone(), r.year))
            .collect();
        let before = keys.len();
        keys.sort();
        keys.dedup();
        assert_eq!(keys.len(), before);
    }
}
