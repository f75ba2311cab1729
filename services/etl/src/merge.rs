//! Dataset Merger - full outer join of the per-domain metric sets
//!
//! A suburb present in any set yields exactly one wide row. Metrics from
//! sets it is absent from are zero. Composites are derived after the join.

use std::collections::BTreeMap;
use tracing::info;

use crate::numeric::clamped_div;
use crate::transform::{EnergyMetrics, EvMetrics, PollutionMetrics};

/// Consumption is reported in kWh; composites use GWh
const CONSUMPTION_UNIT: f64 = 1_000_000.0;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct WideRow {
    pub suburb: String,
    pub total_evs: i64,
    pub bev_count: i64,
    pub phev_count: i64,
    pub avg_range_km: f64,
    pub avg_price: f64,
    pub energy_consumption_prior: f64,
    pub energy_consumption: f64,
    pub energy_consumption_change_pct: f64,
    pub no2_prior: f64,
    pub no2_level: f64,
    pub no2_change: f64,
    pub no2_change_pct: f64,
    pub ev_per_energy_unit: f64,
    pub no2_per_ev: f64,
    pub ev_adoption_score: f64,
}

/// EVs per GWh consumed; a zero consumption term counts as 1
pub fn ev_per_energy_unit(total_evs: i64, consumption: f64) -> f64 {
    clamped_div(total_evs as f64, consumption / CONSUMPTION_UNIT)
}

pub fn no2_per_ev(no2: f64, total_evs: i64) -> f64 {
    no2 / (total_evs as f64).max(1.0)
}

pub fn ev_adoption_score(total_evs: i64, no2_change_pct: f64) -> f64 {
    total_evs as f64 * (1.0 - no2_change_pct / 100.0)
}

impl WideRow {
    fn derive_composites(&mut self) {
        self.ev_per_energy_unit = ev_per_energy_unit(self.total_evs, self.energy_consumption);
        self.no2_per_ev = no2_per_ev(self.no2_level, self.total_evs);
        self.ev_adoption_score = ev_adoption_score(self.total_evs, self.no2_change_pct);
    }
}

pub fn merge(
    ev: &[EvMetrics],
    energy: &[EnergyMetrics],
    pollution: &[PollutionMetrics],
) -> Vec<WideRow> {
    let mut rows: BTreeMap<&str, WideRow> = BTreeMap::new();

    fn row<'a, 'r>(rows: &'r mut BTreeMap<&'a str, WideRow>, suburb: &'a str) -> &'r mut WideRow {
        rows.entry(suburb).or_insert_with(|| WideRow {
            suburb: suburb.to_string(),
            ..Default::default()
        })
    }

    for m in ev {
        let r = row(&mut rows, &m.suburb);
        r.total_evs = m.total_evs;
        r.bev_count = m.bev_count;
        r.phev_count = m.phev_count;
        r.avg_range_km = m.avg_range_km;
        r.avg_price = m.avg_price;
    }
    for m in energy {
        let r = row(&mut rows, &m.suburb);
        r.energy_consumption_prior = m.consumption_prior;
        r.energy_consumption = m.consumption_current;
        r.energy_consumption_change_pct = m.consumption_change_pct;
    }
    for m in pollution {
        let r = row(&mut rows, &m.suburb);
        r.no2_prior = m.no2_prior;
        r.no2_level = m.no2_current;
        r.no2_change = m.no2_change;
        r.no2_change_pct = m.no2_change_pct;
    }

    let merged: Vec<WideRow> = rows
        .into_values()
        .map(|mut r| {
            r.derive_composites();
            r
        })
        .collect();

    info!(
        ev = ev.len(),
        energy = energy.len(),
        pollution = pollution.len(),
        merged = merged.len(),
        "Merged metric sets"
    );
    merged
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rozelle() -> (EvMetrics, EnergyMetrics, PollutionMetrics) {
        (
            EvMetrics {
                suburb: "Rozelle".into(),
                total_evs: 1,
                bev_count: 1,
                phev_count: 0,
                avg_range_km: 400.0,
                avg_price: 45000.0,
            },
            EnergyMetrics {
                suburb: "Rozelle".into(),
                consumption_prior: 1000.0,
                consumption_current: 1200.0,
                consumption_change_pct: 20.0,
            },
            PollutionMetrics {
                suburb: "Rozelle".into(),
                no2_prior: 15.0,
                no2_current: 12.0,
                no2_change: -3.0,
                no2_change_pct: -20.0,
            },
        )
    }

    #[test]
    fn test_rozelle_scenario() {
        let (ev, energy, pollution) = rozelle();
        let rows = merge(&[ev], &[energy], &[pollution]);
        assert_eq!(rows.len(), 1);
        let r = &rows[0];
        assert_eq!(r.total_evs, 1);
        assert_eq!(r.avg_price, 45000.0);
        assert_eq!(r.avg_range_km, 400.0);
        assert_eq!(r.energy_consumption_change_pct, 20.0);
        assert_eq!(r.no2_change, -3.0);
        assert_eq!(r.no2_change_pct, -20.0);
        assert!((r.ev_adoption_score - 1.2).abs() < 1e-9);
        assert!((r.ev_per_energy_unit - 1.0 / 0.0012).abs() < 1e-6);
        assert_eq!(r.no2_per_ev, 12.0);
    }

    #[test]
    fn test_pollution_only_suburb_is_zero_filled() {
        let (ev, energy, _) = rozelle();
        let sydney = PollutionMetrics {
            suburb: "Sydney".into(),
            no2_prior: 20.0,
            no2_current: 18.0,
            no2_change: -2.0,
            no2_change_pct: -10.0,
        };
        let rows = merge(&[ev], &[energy], &[sydney]);
        assert_eq!(rows.len(), 2);
        let s = rows.iter().find(|r| r.suburb == "Sydney").unwrap();
        assert_eq!(s.total_evs, 0);
        assert_eq!(s.energy_consumption, 0.0);
        assert_eq!(s.ev_per_energy_unit, 0.0);
        assert_eq!(s.no2_per_ev, 18.0);
        assert_eq!(s.ev_adoption_score, 0.0);
    }

    #[test]
    fn test_each_suburb_appears_once_sorted() {
        let (ev, energy, pollution) = rozelle();
        let mut glebe = ev.clone();
        glebe.suburb = "Glebe".into();
        let rows = merge(&[ev, glebe], &[energy], &[pollution]);
        let names: Vec<&str> = rows.iter().map(|r| r.suburb.as_str()).collect();
        assert_eq!(names, vec!["Glebe", "Rozelle"]);
    }

    #[test]
    fn test_zero_consumption_clamps_denominator() {
        let (mut ev, _, _) = rozelle();
        ev.total_evs = 5;
        let rows = merge(&[ev], &[], &[]);
        assert_eq!(rows[0].ev_per_energy_unit, 5.0);
    }
}
