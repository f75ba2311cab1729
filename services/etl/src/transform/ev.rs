//! EV adoption metrics per suburb

use std::collections::BTreeMap;
use tracing::{debug, info};

use crate::error::{EtlError, Result};
use crate::normalize::NormalizedTable;
use crate::numeric::{MeanAccumulator, Numeric};

pub const FUEL_TYPE_COLUMNS: &[&str] = &["FUEL_TYPE", "FUEL TYPE"];
pub const VEHICLE_TYPE_COLUMNS: &[&str] = &["VEHICLE_TYPE", "VEHICLE TYPE"];
pub const PRICE_COLUMNS: &[&str] = &["LISTED_PRICE", "LISTED PRICE ($AUD)", "LISTED PRICE"];
pub const RANGE_COLUMNS: &[&str] = &["RANGE", "RANGE (KM)", "RANGE_KM"];

pub const BEV: &str = "BEV";
pub const PHEV: &str = "PHEV";

#[derive(Debug, Clone, PartialEq)]
pub struct EvMetrics {
    pub suburb: String,
    pub total_evs: i64,
    pub bev_count: i64,
    pub phev_count: i64,
    pub avg_range_km: f64,
    pub avg_price: f64,
}

#[derive(Default)]
struct EvAccumulator {
    bev: i64,
    phev: i64,
    range: MeanAccumulator,
    price: MeanAccumulator,
}

fn column(table: &NormalizedTable<'_>, candidates: &[&str]) -> Result<usize> {
    table
        .table
        .find_column(candidates)
        .ok_or_else(|| EtlError::missing_column("ev", candidates[0]))
}

/// Count BEV/PHEV registrations and average their range and listed price.
/// Other fuel types are ignored; suburbs with none of either do not appear.
pub fn transform_ev(normalized: &NormalizedTable<'_>) -> Result<Vec<EvMetrics>> {
    let fuel_col = column(normalized, FUEL_TYPE_COLUMNS)?;
    let price_col = column(normalized, PRICE_COLUMNS)?;
    let range_col = column(normalized, RANGE_COLUMNS)?;

    let mut by_suburb: BTreeMap<&str, EvAccumulator> = BTreeMap::new();
    let mut skipped = 0usize;

    for row in &normalized.records {
        let fuel = row.record.get(fuel_col).as_str().trim().to_uppercase();
        let acc = match fuel.as_str() {
            BEV | PHEV => by_suburb.entry(row.suburb.as_str()).or_default(),
            _ => {
                skipped += 1;
                continue;
            }
        };
        if fuel == BEV {
            acc.bev += 1;
        } else {
            acc.phev += 1;
        }
        acc.range
            .push(Numeric::parse(row.record.get(range_col).as_str()));
        acc.price
            .push(Numeric::parse_price(row.record.get(price_col).as_str()));
    }

    if skipped > 0 {
        debug!(skipped, "Ignored non-BEV/PHEV registrations");
    }

    let metrics: Vec<EvMetrics> = by_suburb
        .into_iter()
        .map(|(suburb, acc)| EvMetrics {
            suburb: suburb.to_string(),
            total_evs: acc.bev + acc.phev,
            bev_count: acc.bev,
            phev_count: acc.phev,
            avg_range_km: acc.range.mean_or_zero(),
            avg_price: acc.price.mean_or_zero(),
        })
        .collect();

    info!(suburbs = metrics.len(), "EV metrics computed");
    Ok(metrics)
}
