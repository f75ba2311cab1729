//! Runtime configuration (environment + defaults)

use anyhow::{ensure, Context, Result};
use std::ops::RangeInclusive;
use std::path::PathBuf;
use std::str::FromStr;

use crate::source::{DateOrder, SourceLocation, SourceOptions, SourceSpec};

/// Reporting years accepted from the environment or the command line
pub const REPORTING_YEAR_RANGE: RangeInclusive<i32> = 1900..=2999;

/// The two years the star schema covers. `current` is the reporting year.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReportingYears {
    pub prior: i32,
    pub current: i32,
}

impl ReportingYears {
    pub fn ending(current: i32) -> Self {
        Self {
            prior: current.saturating_sub(1),
            current,
        }
    }

    /// Like [`ending`](Self::ending), but only for years in
    /// [`REPORTING_YEAR_RANGE`]
    pub fn checked_ending(current: i32) -> Option<Self> {
        REPORTING_YEAR_RANGE
            .contains(&current)
            .then(|| Self::ending(current))
    }

    pub fn contains(&self, year: i32) -> bool {
        year == self.prior || year == self.current
    }
}

impl FromStr for ReportingYears {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let year: i32 = s
            .trim()
            .parse()
            .map_err(|_| format!("'{s}' is not a year"))?;
        Self::checked_ending(year).ok_or_else(|| {
            format!(
                "reporting year {year} outside {}..={}",
                REPORTING_YEAR_RANGE.start(),
                REPORTING_YEAR_RANGE.end()
            )
        })
    }
}

impl Default for ReportingYears {
    fn default() -> Self {
        Self::ending(2023)
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub db_url: Option<String>,
    pub db_max_connections: u32,
    pub ev_source: SourceLocation,
    pub energy_source: SourceLocation,
    pub pollution_source: SourceLocation,
    pub output_dir: PathBuf,
    pub years: ReportingYears,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let years: ReportingYears = std::env::var("REPORTING_YEAR")
            .unwrap_or_else(|_| "2023".to_string())
            .parse()
            .map_err(anyhow::Error::msg)
            .context("REPORTING_YEAR must be a year, e.g. 2023")?;

        let db_max_connections =
            max_connections(std::env::var("DB_MAX_CONNECTIONS").ok().as_deref())?;

        Ok(Self {
            db_url: std::env::var("DB_URL").ok(),
            db_max_connections,
            ev_source: SourceLocation::parse(
                &std::env::var("EV_SOURCE")
                    .unwrap_or_else(|_| "data/Ev_Population.csv".to_string()),
            ),
            energy_source: SourceLocation::parse(
                &std::env::var("ENERGY_SOURCE")
                    .unwrap_or_else(|_| "data/Electricity_Consumption.csv".to_string()),
            ),
            pollution_source: SourceLocation::parse(
                &std::env::var("POLLUTION_SOURCE")
                    .unwrap_or_else(|_| "data/Pollution_Index.csv".to_string()),
            ),
            output_dir: PathBuf::from(
                std::env::var("OUTPUT_DIR").unwrap_or_else(|_| "extracted".to_string()),
            ),
            years,
        })
    }

    pub fn ev_spec(&self) -> SourceSpec {
        SourceSpec {
            name: "ev",
            location: self.ev_source.clone(),
            options: ev_options(),
        }
    }

    pub fn energy_spec(&self) -> SourceSpec {
        SourceSpec {
            name: "energy",
            location: self.energy_source.clone(),
            options: energy_options(),
        }
    }

    pub fn pollution_spec(&self) -> SourceSpec {
        SourceSpec {
            name: "pollution",
            location: self.pollution_source.clone(),
            options: pollution_options(),
        }
    }
}

fn max_connections(raw: Option<&str>) -> Result<u32> {
    let n: u32 = raw
        .unwrap_or("5")
        .trim()
        .parse()
        .context("DB_MAX_CONNECTIONS must be a positive integer")?;
    ensure!(n > 0, "DB_MAX_CONNECTIONS must be a positive integer");
    Ok(n)
}

/// EV registrations: semicolon export, header on the first line
pub fn ev_options() -> SourceOptions {
    SourceOptions {
        delimiter: b';',
        header_offset: 0,
        date_columns: Vec::new(),
        date_order: DateOrder::DayFirst,
    }
}

/// Electricity consumption: semicolon export, header on the first line
pub fn energy_options() -> SourceOptions {
    SourceOptions {
        delimiter: b';',
        header_offset: 0,
        date_columns: Vec::new(),
        date_order: DateOrder::DayFirst,
    }
}

/// Air quality: comma export with two banner lines above the header
pub fn pollution_options() -> SourceOptions {
    SourceOptions {
        delimiter: b',',
        header_offset: 2,
        date_columns: vec!["Date".to_string()],
        date_order: DateOrder::DayFirst,
    }
}
