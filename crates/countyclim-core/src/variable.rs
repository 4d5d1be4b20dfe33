//! Climate variable tags: unit rules, threshold handling and calculator
//! dispatch, one variant per supported variable.

use std::fmt;
use std::str::FromStr;

use crate::county::CountyRecord;
use crate::error::AggregateError;
use crate::series::GriddedSeries;
use crate::stats::{
    compute_precipitation_stats, compute_tasmax_stats, compute_tasmin_stats,
    compute_temperature_stats, CountyYearStatistic, StatValues,
};

/// Seconds per day: converts a kg/m²/s precipitation flux to mm/day.
const FLUX_TO_MM_PER_DAY: f64 = 86_400.0;
const KELVIN_OFFSET: f64 = 273.15;

/// Supported climate variables. Each variant carries its raw-unit conversion
/// rule, threshold semantics and statistic calculator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClimateVariable {
    /// Daily precipitation (`pr`), raw flux in kg/m²/s.
    Precipitation,
    /// Daily mean temperature (`tas`), raw in Kelvin.
    MeanTemperature,
    /// Daily maximum temperature (`tasmax`), raw in Kelvin.
    MaxTemperature,
    /// Daily minimum temperature (`tasmin`), raw in Kelvin.
    MinTemperature,
}

impl ClimateVariable {
    pub fn canonical_name(self) -> &'static str {
        match self {
            Self::Precipitation => "pr",
            Self::MeanTemperature => "tas",
            Self::MaxTemperature => "tasmax",
            Self::MinTemperature => "tasmin",
        }
    }

    /// Convert a raw series into this variable's physical units, keyed off
    /// the declared units tag. Series already in physical units pass through.
    pub fn convert_series_units(self, series: &mut GriddedSeries) {
        match (self, series.units()) {
            (Self::Precipitation, "kg/m2/s" | "kg m-2 s-1") => {
                log::info!("converting precipitation units from kg/m2/s to mm/day");
                series.map_values_in_place(|v| v * FLUX_TO_MM_PER_DAY);
                series.set_units("mm/day");
            }
            (Self::MeanTemperature | Self::MaxTemperature | Self::MinTemperature, "K") => {
                log::info!("converting temperature units from K to C");
                series.map_values_in_place(|v| v - KELVIN_OFFSET);
                series.set_units("C");
            }
            (_, units) => {
                log::debug!("no unit conversion needed for {self} ({units})");
            }
        }
    }

    /// Normalize a caller-supplied threshold. A max-temperature threshold of
    /// ≈90 is taken to be Fahrenheit and converted to °C; everything else
    /// passes through untouched.
    pub fn normalize_threshold(self, threshold: Option<f64>) -> Option<f64> {
        match (self, threshold) {
            (Self::MaxTemperature, Some(t)) if (t - 90.0).abs() < 0.1 => {
                let celsius = (t - 32.0) * 5.0 / 9.0;
                log::info!("interpreting tasmax threshold {t} as Fahrenheit ({celsius:.1} C)");
                Some(celsius)
            }
            (_, t) => t,
        }
    }

    /// Run this variable's calculator on one county-year of valid daily
    /// samples. `None` when the sample is empty.
    pub fn calculate(
        self,
        daily: &[f64],
        threshold: Option<f64>,
        year: i32,
        scenario: &str,
        county: &CountyRecord,
    ) -> Option<CountyYearStatistic> {
        let values = match self {
            Self::Precipitation => {
                StatValues::Precipitation(compute_precipitation_stats(daily, threshold)?)
            }
            Self::MeanTemperature => {
                StatValues::MeanTemperature(compute_temperature_stats(daily)?)
            }
            Self::MaxTemperature => {
                StatValues::MaxTemperature(compute_tasmax_stats(daily, threshold)?)
            }
            Self::MinTemperature => StatValues::MinTemperature(compute_tasmin_stats(daily)?),
        };

        Some(CountyYearStatistic {
            county_id: county.county_id.clone(),
            county_name: county.county_name.clone(),
            state: county.state.clone(),
            year,
            scenario: scenario.to_owned(),
            values,
        })
    }
}

impl fmt::Display for ClimateVariable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.canonical_name())
    }
}

impl FromStr for ClimateVariable {
    type Err = AggregateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pr" => Ok(Self::Precipitation),
            "tas" => Ok(Self::MeanTemperature),
            "tasmax" => Ok(Self::MaxTemperature),
            "tasmin" => Ok(Self::MinTemperature),
            other => Err(AggregateError::UnsupportedVariable(other.to_owned())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::series::daily_index;
    use approx::assert_relative_eq;
    use chrono::NaiveDate;

    #[test]
    fn variable_names_round_trip() {
        for name in ["pr", "tas", "tasmax", "tasmin"] {
            let v: ClimateVariable = name.parse().unwrap();
            assert_eq!(v.canonical_name(), name);
        }
        assert!(matches!(
            "humidity".parse::<ClimateVariable>(),
            Err(AggregateError::UnsupportedVariable(_))
        ));
    }

    #[test]
    fn flux_series_converts_to_mm_per_day() {
        let time = daily_index(
            NaiveDate::from_ymd_opt(2001, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(2001, 1, 1).unwrap(),
        );
        let mut s = GriddedSeries::new(
            vec![1.0 / 86_400.0; 4],
            time,
            vec![0.0, 1.0],
            vec![0.0, 1.0],
            "EPSG:4326",
            "kg/m2/s",
        )
        .unwrap();

        ClimateVariable::Precipitation.convert_series_units(&mut s);
        assert_eq!(s.units(), "mm/day");
        assert_relative_eq!(s.value(0, 0, 0), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn ninety_fahrenheit_threshold_becomes_celsius() {
        let t = ClimateVariable::MaxTemperature.normalize_threshold(Some(90.0));
        assert_relative_eq!(t.unwrap(), 32.222222, epsilon = 1e-5);

        // A plausible Celsius threshold is left alone.
        let t = ClimateVariable::MaxTemperature.normalize_threshold(Some(35.0));
        assert_eq!(t, Some(35.0));
        // Precipitation thresholds are never reinterpreted.
        let t = ClimateVariable::Precipitation.normalize_threshold(Some(90.0));
        assert_eq!(t, Some(90.0));
    }
}
