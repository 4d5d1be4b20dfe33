//! Offline strategy-equivalence harness.
//!
//! Builds a deterministic synthetic raster series and a grid of rectangular
//! counties, runs both aggregation strategies on the same input, and checks
//! that every county-year row matches field-for-field within tolerance.
//! Exits non-zero on any mismatch.

use std::collections::BTreeMap;
use std::process::ExitCode;
use std::str::FromStr;

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use clap::Parser;

use countyclim_core::{
    daily_index, rect_county, AggregationResult, ChunkingConfig, ClimateVariable, CountyRecord,
    GriddedSeries, SpatialChunkedStrategy, Strategy, VectorizedStrategy,
};

#[derive(Parser, Debug)]
#[command(name = "countyclim-test", about = "Strategy equivalence harness")]
struct Args {
    /// Climate variable: pr, tas, tasmax or tasmin.
    #[arg(short, long, default_value = "pr")]
    variable: String,

    /// Scenario label stamped into output rows.
    #[arg(short, long, default_value = "historical")]
    scenario: String,

    /// Optional threshold in the variable's native reporting unit.
    #[arg(short, long)]
    threshold: Option<f64>,

    /// Counties per side of the synthetic grid (total is the square).
    #[arg(long, default_value_t = 6)]
    counties_per_side: usize,

    /// First and last calendar year of the synthetic series.
    #[arg(long, default_value_t = 2001)]
    start_year: i32,
    #[arg(long, default_value_t = 2003)]
    end_year: i32,

    /// Worker threads for the chunked strategy.
    #[arg(short, long, default_value_t = 4)]
    workers: usize,

    /// Maximum absolute difference tolerated between matching fields.
    #[arg(long, default_value_t = 1e-9)]
    tolerance: f64,
}

fn main() -> ExitCode {
    env_logger::init();
    match run(Args::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("equivalence check failed: {err:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> Result<()> {
    let variable = ClimateVariable::from_str(&args.variable)?;
    if args.end_year < args.start_year {
        bail!("end year {} precedes start year {}", args.end_year, args.start_year);
    }

    let mut series = synthetic_series(variable, args.start_year, args.end_year, args.counties_per_side);
    variable.convert_series_units(&mut series);
    let counties = county_grid(args.counties_per_side);
    let threshold = variable.normalize_threshold(args.threshold);

    log::info!(
        "running both strategies: {} counties, {}-{}, variable {}",
        counties.len(),
        args.start_year,
        args.end_year,
        variable
    );

    let sequential = VectorizedStrategy
        .process(&series, &counties, variable, &args.scenario, threshold, 1)
        .context("vectorized strategy")?;

    let chunked_config = ChunkingConfig {
        min_chunk_size: 2,
        max_chunk_size: 8,
        ..ChunkingConfig::default()
    };
    let parallel = SpatialChunkedStrategy::new(chunked_config)
        .process(&series, &counties, variable, &args.scenario, threshold, args.workers)
        .context("spatial-chunked strategy")?;

    compare_results(&sequential, &parallel, args.tolerance)?;

    println!(
        "OK: {} county-year rows identical across strategies ({} counties successful, {} dropped)",
        sequential.rows.len(),
        sequential.counters.successful,
        sequential.dropped.len()
    );
    Ok(())
}

/// Daily values on a one-degree grid covering the county area, with a
/// deterministic spatial + seasonal pattern and scattered missing pixels.
/// Units are the native archive units so the conversion path is exercised.
fn synthetic_series(
    variable: ClimateVariable,
    start_year: i32,
    end_year: i32,
    counties_per_side: usize,
) -> GriddedSeries {
    let side = counties_per_side * 2;
    let time = daily_index(
        NaiveDate::from_ymd_opt(start_year, 1, 1).expect("valid start date"),
        NaiveDate::from_ymd_opt(end_year, 12, 31).expect("valid end date"),
    );
    let axis: Vec<f64> = (0..side).map(|i| i as f64 + 0.5).collect();

    let (units, base, amplitude) = match variable {
        // ~1e-4 kg/m2/s is roughly 9 mm/day.
        ClimateVariable::Precipitation => ("kg/m2/s", 5.0e-5, 4.0e-5),
        ClimateVariable::MeanTemperature => ("K", 285.0, 12.0),
        ClimateVariable::MaxTemperature => ("K", 293.0, 14.0),
        ClimateVariable::MinTemperature => ("K", 276.0, 12.0),
    };

    let mut values = Vec::with_capacity(time.len() * side * side);
    for (t, _) in time.iter().enumerate() {
        let season = (t as f64 / 365.25 * std::f64::consts::TAU).sin();
        for row in 0..side {
            for col in 0..side {
                if (t + row * 11 + col * 17) % 97 == 0 {
                    values.push(f64::NAN);
                } else {
                    let spatial = row as f64 * 0.02 + col as f64 * 0.01;
                    values.push(base + amplitude * (season * 0.5 + spatial) / 2.0);
                }
            }
        }
    }

    GriddedSeries::new(values, time, axis.clone(), axis, "EPSG:4326", units)
        .expect("synthetic series is well-formed")
}

/// Square counties tiling the grid, 2x2 degrees each.
fn county_grid(per_side: usize) -> Vec<CountyRecord> {
    let mut counties = Vec::with_capacity(per_side * per_side);
    for i in 0..per_side {
        for j in 0..per_side {
            let id = i * per_side + j;
            counties.push(rect_county(
                &format!("{id:05}"),
                &format!("County {id}"),
                "XX",
                id as u32 + 1,
                j as f64 * 2.0,
                i as f64 * 2.0,
                (j + 1) as f64 * 2.0,
                (i + 1) as f64 * 2.0,
            ));
        }
    }
    counties
}

/// Field-by-field comparison of two result tables keyed by (county, year).
fn compare_results(a: &AggregationResult, b: &AggregationResult, tolerance: f64) -> Result<()> {
    let rows_a = keyed_rows(a)?;
    let rows_b = keyed_rows(b)?;

    if rows_a.len() != rows_b.len() {
        bail!("row count differs: {} vs {}", rows_a.len(), rows_b.len());
    }

    for (key, fields_a) in &rows_a {
        let fields_b = rows_b
            .get(key)
            .with_context(|| format!("row {key:?} missing from chunked output"))?;
        for (name, value_a) in fields_a {
            let value_b = fields_b
                .get(name)
                .with_context(|| format!("field {name} missing from row {key:?}"))?;
            match (value_a, value_b) {
                (serde_json::Value::Number(x), serde_json::Value::Number(y)) => {
                    let (x, y) = (x.as_f64().unwrap_or(f64::NAN), y.as_f64().unwrap_or(f64::NAN));
                    if (x - y).abs() > tolerance {
                        bail!("row {key:?} field {name}: {x} vs {y}");
                    }
                }
                _ if value_a != value_b => {
                    bail!("row {key:?} field {name}: {value_a} vs {value_b}");
                }
                _ => {}
            }
        }
    }

    if a.counters != b.counters {
        bail!("counters differ: {:?} vs {:?}", a.counters, b.counters);
    }
    Ok(())
}

type RowKey = (String, i32);
type RowFields = serde_json::Map<String, serde_json::Value>;

fn keyed_rows(result: &AggregationResult) -> Result<BTreeMap<RowKey, RowFields>> {
    let mut keyed = BTreeMap::new();
    for row in &result.rows {
        let value = serde_json::to_value(row).context("serializing row")?;
        let serde_json::Value::Object(fields) = value else {
            bail!("row did not serialize to an object");
        };
        let key = (row.county_id.clone(), row.year);
        if keyed.insert(key.clone(), fields).is_some() {
            bail!("duplicate row for {key:?}");
        }
    }
    Ok(keyed)
}
