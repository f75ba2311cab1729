//! Dimension Builder
//!
//! Surrogate keys are dense and 1-based. Natural keys are sorted before key
//! assignment, so two runs over the same input assign the same keys.

use std::collections::BTreeSet;
use tracing::{info, warn};

use crate::config::ReportingYears;
use crate::merge::WideRow;
use crate::schema::{
    Cell, TableRow, TableSpec, FUEL_TYPE_DIM, SUBURB_DIM, TIME_DIM, VEHICLE_TYPE_DIM,
};
use crate::source::{RawField, RawTable};
use crate::transform::ev::{BEV, PHEV, VEHICLE_TYPE_COLUMNS};

#[derive(Debug, Clone, PartialEq)]
pub struct TimeDimRow {
    pub time_key: i64,
    pub year: i64,
    pub is_current_year: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SuburbDimRow {
    pub suburb_key: i64,
    pub suburb_name: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VehicleTypeDimRow {
    pub vehicle_type_key: i64,
    pub vehicle_type: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FuelTypeDimRow {
    pub fuel_type_key: i64,
    pub fuel_type: String,
    pub description: String,
}

impl TableRow for TimeDimRow {
    const SPEC: &'static TableSpec = &TIME_DIM;

    fn cells(&self) -> Vec<Cell> {
        vec![
            Cell::Int(self.time_key),
            Cell::Int(self.year),
            Cell::Bool(self.is_current_year),
        ]
    }
}

impl TableRow for SuburbDimRow {
    const SPEC: &'static TableSpec = &SUBURB_DIM;

    fn cells(&self) -> Vec<Cell> {
        vec![
            Cell::Int(self.suburb_key),
            Cell::Text(self.suburb_name.clone()),
        ]
    }
}

impl TableRow for VehicleTypeDimRow {
    const SPEC: &'static TableSpec = &VEHICLE_TYPE_DIM;

    fn cells(&self) -> Vec<Cell> {
        vec![
            Cell::Int(self.vehicle_type_key),
            Cell::Text(self.vehicle_type.clone()),
        ]
    }
}

impl TableRow for FuelTypeDimRow {
    const SPEC: &'static TableSpec = &FUEL_TYPE_DIM;

    fn cells(&self) -> Vec<Cell> {
        vec![
            Cell::Int(self.fuel_type_key),
            Cell::Text(self.fuel_type.clone()),
            Cell::Text(self.description.clone()),
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Dimensions {
    pub time: Vec<TimeDimRow>,
    pub suburb: Vec<SuburbDimRow>,
    pub vehicle_type: Vec<VehicleTypeDimRow>,
    pub fuel_type: Vec<FuelTypeDimRow>,
}

impl Dimensions {
    pub fn suburb_key(&self, name: &str) -> Option<i64> {
        self.suburb
            .binary_search_by(|row| row.suburb_name.as_str().cmp(name))
            .ok()
            .map(|idx| self.suburb[idx].suburb_key)
    }

    pub fn time_key(&self, year: i32) -> Option<i64> {
        self.time
            .iter()
            .find(|row| row.year == i64::from(year))
            .map(|row| row.time_key)
    }
}

/// Assign dense 1-based keys in iteration order
fn keyed<T>(
    values: impl IntoIterator<Item = String>,
    make: impl Fn(i64, String) -> T,
) -> Vec<T> {
    values
        .into_iter()
        .zip(1i64..)
        .map(|(value, key)| make(key, value))
        .collect()
}

pub fn build_time_dim(years: ReportingYears) -> Vec<TimeDimRow> {
    vec![
        TimeDimRow {
            time_key: 1,
            year: i64::from(years.prior),
            is_current_year: false,
        },
        TimeDimRow {
            time_key: 2,
            year: i64::from(years.current),
            is_current_year: true,
        },
    ]
}

pub fn build_suburb_dim(wide: &[WideRow]) -> Vec<SuburbDimRow> {
    let names: BTreeSet<String> = wide.iter().map(|r| r.suburb.clone()).collect();
    keyed(names, |suburb_key, suburb_name| SuburbDimRow {
        suburb_key,
        suburb_name,
    })
}

/// Distinct vehicle categories as they appear in the EV source, unfiltered
/// by fuel type. A source without the column yields an empty dimension.
pub fn build_vehicle_type_dim(ev_raw: &RawTable) -> Vec<VehicleTypeDimRow> {
    let Some(column) = ev_raw.find_column(VEHICLE_TYPE_COLUMNS) else {
        warn!(
            source = %ev_raw.source,
            "No vehicle type column; vehicle_type_dim will be empty"
        );
        return Vec::new();
    };

    let values: BTreeSet<String> = ev_raw
        .records
        .iter()
        .filter_map(|r| match r.get(column) {
            RawField::Text(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
            _ => None,
        })
        .collect();

    keyed(values, |vehicle_type_key, vehicle_type| VehicleTypeDimRow {
        vehicle_type_key,
        vehicle_type,
    })
}

pub fn build_fuel_type_dim() -> Vec<FuelTypeDimRow> {
    vec![
        FuelTypeDimRow {
            fuel_type_key: 1,
            fuel_type: BEV.to_string(),
            description: "Battery Electric Vehicle".to_string(),
        },
        FuelTypeDimRow {
            fuel_type_key: 2,
            fuel_type: PHEV.to_string(),
            description: "Plug-in Hybrid Electric Vehicle".to_string(),
        },
    ]
}

pub fn build_dimensions(
    wide: &[WideRow],
    ev_raw: &RawTable,
    years: ReportingYears,
) -> Dimensions {
    let dims = Dimensions {
        time: build_time_dim(years),
        suburb: build_suburb_dim(wide),
        vehicle_type: build_vehicle_type_dim(ev_raw),
        fuel_type: build_fuel_type_dim(),
    };

    info!(
        time = dims.time.len(),
        suburb = dims.suburb.len(),
        vehicle_type = dims.vehicle_type.len(),
        fuel_type = dims.fuel_type.len(),
        "Dimensions built"
    );
    dims
}
