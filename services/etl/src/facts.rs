//! Fact Assembler
//!
//! Wide rows are joined to their suburb key. Every emitted float passes
//! through [`sanitize`] so facts are finite and rounded to 6dp.

use tracing::{info, warn};

use crate::config::ReportingYears;
use crate::dimensions::Dimensions;
use crate::error::{EtlError, Result};
use crate::merge::{ev_per_energy_unit, no2_per_ev, WideRow};
use crate::numeric::sanitize;
use crate::schema::{Cell, TableRow, TableSpec, ENERGY_FACT, EV_FACT};

#[derive(Debug, Clone, PartialEq)]
pub struct EvFactRow {
    pub suburb_key: i64,
    pub time_key: i64,
    pub total_evs: i64,
    pub bev_count: i64,
    pub phev_count: i64,
    pub avg_range_km: f64,
    pub avg_price: f64,
    pub ev_adoption_score: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EnergyFactRow {
    pub suburb_key: i64,
    pub time_key: i64,
    pub energy_consumption: f64,
    pub energy_change_pct: f64,
    pub no2_level: f64,
    pub no2_change: f64,
    pub no2_change_pct: f64,
    pub ev_per_energy_unit: f64,
    pub no2_per_ev: f64,
}

impl TableRow for EvFactRow {
    const SPEC: &'static TableSpec = &EV_FACT;

    fn cells(&self) -> Vec<Cell> {
        vec![
            Cell::Int(self.suburb_key),
            Cell::Int(self.time_key),
            Cell::Int(self.total_evs),
            Cell::Int(self.bev_count),
            Cell::Int(self.phev_count),
            Cell::Float(self.avg_range_km),
            Cell::Float(self.avg_price),
            Cell::Float(self.ev_adoption_score),
        ]
    }
}

impl TableRow for EnergyFactRow {
    const SPEC: &'static TableSpec = &ENERGY_FACT;

    fn cells(&self) -> Vec<Cell> {
        vec![
            Cell::Int(self.suburb_key),
            Cell::Int(self.time_key),
            Cell::Float(self.energy_consumption),
            Cell::Float(self.energy_change_pct),
            Cell::Float(self.no2_level),
            Cell::Float(self.no2_change),
            Cell::Float(self.no2_change_pct),
            Cell::Float(self.ev_per_energy_unit),
            Cell::Float(self.no2_per_ev),
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Facts {
    pub ev: Vec<EvFactRow>,
    pub energy: Vec<EnergyFactRow>,
}

fn require_time_key(dims: &Dimensions, year: i32) -> Result<i64> {
    dims.time_key(year)
        .ok_or(EtlError::DimensionResolution { dimension: "time_dim" })
}

pub fn build_facts(wide: &[WideRow], dims: &Dimensions, years: ReportingYears) -> Result<Facts> {
    if dims.time.is_empty() {
        return Err(EtlError::DimensionResolution { dimension: "time_dim" });
    }
    if dims.suburb.is_empty() {
        return Err(EtlError::DimensionResolution { dimension: "suburb_dim" });
    }
    let prior_key = require_time_key(dims, years.prior)?;
    let current_key = require_time_key(dims, years.current)?;

    let mut facts = Facts::default();
    let mut unresolved = 0usize;

    for row in wide {
        let Some(suburb_key) = dims.suburb_key(&row.suburb) else {
            warn!(suburb = %row.suburb, "No suburb key; dropping wide row");
            unresolved += 1;
            continue;
        };

        facts.ev.push(EvFactRow {
            suburb_key,
            time_key: current_key,
            total_evs: row.total_evs,
            bev_count: row.bev_count,
            phev_count: row.phev_count,
            avg_range_km: sanitize(row.avg_range_km),
            avg_price: sanitize(row.avg_price),
            ev_adoption_score: sanitize(row.ev_adoption_score),
        });

        // the prior year has no change baseline
        facts.energy.push(EnergyFactRow {
            suburb_key,
            time_key: prior_key,
            energy_consumption: sanitize(row.energy_consumption_prior),
            energy_change_pct: 0.0,
            no2_level: sanitize(row.no2_prior),
            no2_change: 0.0,
            no2_change_pct: 0.0,
            ev_per_energy_unit: sanitize(ev_per_energy_unit(
                row.total_evs,
                row.energy_consumption_prior,
            )),
            no2_per_ev: sanitize(no2_per_ev(row.no2_prior, row.total_evs)),
        });
        facts.energy.push(EnergyFactRow {
            suburb_key,
            time_key: current_key,
            energy_consumption: sanitize(row.energy_consumption),
            energy_change_pct: sanitize(row.energy_consumption_change_pct),
            no2_level: sanitize(row.no2_level),
            no2_change: sanitize(row.no2_change),
            no2_change_pct: sanitize(row.no2_change_pct),
            ev_per_energy_unit: sanitize(row.ev_per_energy_unit),
            no2_per_ev: sanitize(row.no2_per_ev),
        });
    }

    facts.ev.sort_by_key(|r| r.suburb_key);
    facts
        .energy
        .sort_by_key(|r| (r.suburb_key, r.time_key));

    info!(
        ev_fact = facts.ev.len(),
        energy_fact = facts.energy.len(),
        unresolved,
        "Facts assembled"
    );
    Ok(facts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dimensions::build_dimensions;
    use crate::source::text_table;

    fn rozelle() -> WideRow {
        WideRow {
            suburb: "Rozelle".into(),
            total_evs: 1,
            bev_count: 1,
            phev_count: 0,
            avg_range_km: 400.0,
            avg_price: 45000.0,
            energy_consumption_prior: 1000.0,
            energy_consumption: 1200.0,
            energy_consumption_change_pct: 20.0,
            no2_prior: 15.0,
            no2_level: 12.0,
            no2_change: -3.0,
            no2_change_pct: -20.0,
            ev_per_energy_unit: 1.0 / 0.0012,
            no2_per_ev: 12.0,
            ev_adoption_score: 1.2000000000000002,
        }
    }

    fn dims_for(wide: &[WideRow]) -> Dimensions {
        build_dimensions(wide, &text_table(&["SUBURB"], &[]), ReportingYears::default())
    }

    #[test]
    fn test_rozelle_facts() {
        let wide = vec![rozelle()];
        let facts = build_facts(&wide, &dims_for(&wide), ReportingYears::default()).unwrap();

        assert_eq!(facts.ev.len(), 1);
        assert_eq!(facts.ev[0].time_key, 2);
        assert_eq!(facts.ev[0].ev_adoption_score, 1.2);

        assert_eq!(facts.energy.len(), 2);
        let prior = &facts.energy[0];
        assert_eq!(prior.time_key, 1);
        assert_eq!(prior.energy_consumption, 1000.0);
        assert_eq!(prior.no2_level, 15.0);
        assert_eq!(prior.energy_change_pct, 0.0);
        assert_eq!(prior.no2_change, 0.0);
        assert_eq!(prior.no2_change_pct, 0.0);
        assert_eq!(prior.ev_per_energy_unit, 1000.0);

        let current = &facts.energy[1];
        assert_eq!(current.time_key, 2);
        assert_eq!(current.energy_change_pct, 20.0);
        assert_eq!(current.no2_change, -3.0);
        assert_eq!(current.ev_per_energy_unit, 833.333333);
    }

    #[test]
    fn test_non_finite_values_sanitized() {
        let mut row = rozelle();
        row.avg_price = f64::NAN;
        row.no2_change_pct = f64::INFINITY;
        row.ev_adoption_score = f64::NEG_INFINITY;
        let wide = vec![row];
        let facts = build_facts(&wide, &dims_for(&wide), ReportingYears::default()).unwrap();

        for ev in &facts.ev {
            for cell in ev.cells() {
                if let Cell::Float(v) = cell {
                    assert!(v.is_finite());
                }
            }
        }
        assert_eq!(facts.ev[0].avg_price, 0.0);
        assert_eq!(facts.energy[1].no2_change_pct, 0.0);
    }

    #[test]
    fn test_unresolved_suburb_dropped() {
        let wide = vec![rozelle()];
        let dims = dims_for(&wide);
        let mut extra = rozelle();
        extra.suburb = "Nowhere".into();
        let facts = build_facts(&[rozelle(), extra], &dims, ReportingYears::default()).unwrap();
        assert_eq!(facts.ev.len(), 1);
        assert_eq!(facts.energy.len(), 2);
    }

    #[test]
    fn test_empty_suburb_dimension_is_error() {
        let dims = dims_for(&[]);
        let err = build_facts(&[], &dims, ReportingYears::default()).unwrap_err();
        assert!(matches!(err, EtlError::DimensionResolution { dimension: "suburb_dim" }));
    }

    #[test]
    fn test_empty_time_dimension_is_error() {
        let wide = vec![rozelle()];
        let mut dims = dims_for(&wide);
        dims.time.clear();
        let err = build_facts(&wide, &dims, ReportingYears::default()).unwrap_err();
        assert!(matches!(err, EtlError::DimensionResolution { dimension: "time_dim" }));
    }

    #[test]
    fn test_energy_fact_ordering() {
        let mut glebe = rozelle();
        glebe.suburb = "Glebe".into();
        let wide = vec![glebe, rozelle()];
        let facts = build_facts(&wide, &dims_for(&wide), ReportingYears::default()).unwrap();
        let keys: Vec<(i64, i64)> = facts
            .energy
            .iter()
            .map(|r| (r.suburb_key, r.time_key))
            .collect();
        assert_eq!(keys, vec![(1, 1), (1, 2), (2, 1), (2, 2)]);
    }
}
