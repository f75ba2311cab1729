//! Electricity consumption per suburb for the two reporting years

use std::collections::BTreeMap;
use tracing::{info, warn};

use crate::config::ReportingYears;
use crate::error::{EtlError, Result};
use crate::normalize::NormalizedTable;
use crate::numeric::{pct_change, Numeric};

#[derive(Debug, Clone, PartialEq)]
pub struct EnergyMetrics {
    pub suburb: String,
    pub consumption_prior: f64,
    pub consumption_current: f64,
    pub consumption_change_pct: f64,
}

/// A fiscal-year consumption column such as `F2022_23`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct FiscalColumn {
    start_year: i32,
    index: usize,
}

impl FiscalColumn {
    /// `F2022_23` reports the year ending in 2023
    fn end_year(&self) -> i32 {
        self.start_year + 1
    }
}

fn fiscal_header(end_year: i32) -> String {
    format!("F{}_{:02}", end_year - 1, end_year.rem_euclid(100))
}

/// The column for the fiscal year ending in `year`
fn column_ending(cols: &[FiscalColumn], year: i32) -> Result<FiscalColumn> {
    cols.iter()
        .rev()
        .find(|c| c.end_year() == year)
        .copied()
        .ok_or_else(|| EtlError::missing_column("energy", fiscal_header(year)))
}

/// Parse `F<yyyy>_<yy>` where the two-digit suffix is the following year
fn fiscal_start_year(header: &str) -> Option<i32> {
    let rest = header.trim().strip_prefix(|c: char| c.eq_ignore_ascii_case(&'F'))?;
    let (start, end) = rest.split_once('_')?;
    if start.len() != 4 || end.len() != 2 {
        return None;
    }
    let start: i32 = start.parse().ok()?;
    let end: i32 = end.parse().ok()?;
    ((start + 1) % 100 == end).then_some(start)
}

/// Columns holding annual consumption, oldest first
fn fiscal_columns(headers: &[String]) -> Vec<FiscalColumn> {
    let mut cols: Vec<FiscalColumn> = headers
        .iter()
        .enumerate()
        .filter_map(|(index, h)| {
            fiscal_start_year(h).map(|start_year| FiscalColumn { start_year, index })
        })
        .collect();
    cols.sort();
    cols
}

/// Read the fiscal columns ending in the prior and current reporting years
/// and compute the change between them. Rows that share a canonical suburb
/// are summed.
pub fn transform_energy(
    normalized: &NormalizedTable<'_>,
    years: ReportingYears,
) -> Result<Vec<EnergyMetrics>> {
    let cols = fiscal_columns(&normalized.table.headers);
    let prior_col = column_ending(&cols, years.prior)?;
    let current_col = column_ending(&cols, years.current)?;

    let mut by_suburb: BTreeMap<&str, (f64, f64, usize)> = BTreeMap::new();
    for row in &normalized.records {
        let prior = Numeric::parse(row.record.get(prior_col.index).as_str()).or_zero();
        let current = Numeric::parse(row.record.get(current_col.index).as_str()).or_zero();
        let entry = by_suburb.entry(row.suburb.as_str()).or_insert((0.0, 0.0, 0));
        entry.0 += prior;
        entry.1 += current;
        entry.2 += 1;
    }

    let metrics: Vec<EnergyMetrics> = by_suburb
        .into_iter()
        .map(|(suburb, (prior, current, rows))| {
            if rows > 1 {
                warn!(suburb, rows, "Summed energy rows sharing one suburb");
            }
            EnergyMetrics {
                suburb: suburb.to_string(),
                consumption_prior: prior,
                consumption_current: current,
                consumption_change_pct: pct_change(prior, current),
            }
        })
        .collect();

    info!(
        suburbs = metrics.len(),
        prior_column = %normalized.table.headers[prior_col.index],
        current_column = %normalized.table.headers[current_col.index],
        "Energy metrics computed"
    );
    Ok(metrics)
}
