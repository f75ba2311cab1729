//! NO2 levels per suburb for the two reporting years
//!
//! Station columns are read in long form (station, date, reading), filtered
//! to the reporting years and averaged per (suburb, year).

use chrono::Datelike;
use std::collections::BTreeMap;
use tracing::{info, warn};

use crate::config::ReportingYears;
use crate::error::Result;
use crate::normalize::NormalizedStations;
use crate::numeric::{pct_change, MeanAccumulator, Numeric};
use crate::source::RawField;

#[derive(Debug, Clone, PartialEq)]
pub struct PollutionMetrics {
    pub suburb: String,
    pub no2_prior: f64,
    pub no2_current: f64,
    pub no2_change: f64,
    pub no2_change_pct: f64,
}

#[derive(Default)]
struct YearPair {
    prior: MeanAccumulator,
    current: MeanAccumulator,
}

pub fn transform_pollution(
    normalized: &NormalizedStations<'_>,
    years: ReportingYears,
) -> Result<Vec<PollutionMetrics>> {
    let mut by_suburb: BTreeMap<&str, YearPair> = BTreeMap::new();
    let mut undated = 0usize;

    for record in &normalized.table.records {
        let year = match record.get(normalized.date_column) {
            RawField::Date(d) => d.year(),
            _ => {
                undated += 1;
                continue;
            }
        };
        if !years.contains(year) {
            continue;
        }

        for station in &normalized.stations {
            let reading = Numeric::parse(record.get(station.index).as_str());
            if reading == Numeric::Missing {
                continue;
            }
            let pair = by_suburb.entry(station.suburb.as_str()).or_default();
            if year == years.current {
                pair.current.push(reading);
            } else {
                pair.prior.push(reading);
            }
        }
    }

    if undated > 0 {
        warn!(rows = undated, "Skipped pollution rows without a parseable date");
    }

    let metrics: Vec<PollutionMetrics> = by_suburb
        .into_iter()
        .map(|(suburb, pair)| {
            let prior = pair.prior.mean_or_zero();
            let current = pair.current.mean_or_zero();
            PollutionMetrics {
                suburb: suburb.to_string(),
                no2_prior: prior,
                no2_current: current,
                no2_change: current - prior,
                no2_change_pct: pct_change(prior, current),
            }
        })
        .collect();

    info!(suburbs = metrics.len(), "Pollution metrics computed");
    Ok(metrics)
}
