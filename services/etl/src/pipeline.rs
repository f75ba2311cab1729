//! The single canonical pipeline
//!
//! read -> normalize -> transform -> merge -> dimensions + facts -> export/load
//!
//! [`build_star`] is pure: everything up to the store is computed in memory,
//! so dry runs and CSV-only runs share the exact code path of a full load.

use serde::Serialize;
use std::path::PathBuf;
use tracing::{info, info_span, Instrument};
use uuid::Uuid;

use crate::config::{Config, ReportingYears};
use crate::dimensions::{build_dimensions, Dimensions};
use crate::error::Result;
use crate::export::{render_all, write_all, TableFingerprint};
use crate::facts::{build_facts, Facts};
use crate::merge::{merge, WideRow};
use crate::normalize::{normalize_energy, normalize_ev, normalize_pollution};
use crate::source::{http_client, read_source, RawTable};
use crate::store::{LoadReport, StoreClient};
use crate::transform::{transform_energy, transform_ev, transform_pollution};

/// The three raw inputs
#[derive(Debug, Clone)]
pub struct Sources {
    pub ev: RawTable,
    pub energy: RawTable,
    pub pollution: RawTable,
}

impl Sources {
    /// Read all three sources, one after another
    pub async fn read(config: &Config) -> Result<Self> {
        let client = http_client()?;
        let ev = read_source(&client, &config.ev_spec()).await?;
        let energy = read_source(&client, &config.energy_spec()).await?;
        let pollution = read_source(&client, &config.pollution_spec()).await?;
        Ok(Self {
            ev,
            energy,
            pollution,
        })
    }
}

/// Everything the pipeline derives from one set of sources
#[derive(Debug, Clone, PartialEq)]
pub struct StarSchema {
    pub wide: Vec<WideRow>,
    pub dimensions: Dimensions,
    pub facts: Facts,
    pub unmapped_stations: Vec<String>,
}

pub fn build_star(sources: &Sources, years: ReportingYears) -> Result<StarSchema> {
    let ev = normalize_ev(&sources.ev)?;
    let energy = normalize_energy(&sources.energy)?;
    let pollution = normalize_pollution(&sources.pollution)?;
    info!(
        ev = ev.records.len(),
        ev_dropped = ev.dropped,
        energy = energy.records.len(),
        energy_dropped = energy.dropped,
        stations = pollution.stations.len(),
        "Normalized sources"
    );

    let ev_metrics = transform_ev(&ev)?;
    let energy_metrics = transform_energy(&energy, years)?;
    let pollution_metrics = transform_pollution(&pollution, years)?;

    let wide = merge(&ev_metrics, &energy_metrics, &pollution_metrics);
    let dimensions = build_dimensions(&wide, &sources.ev, years);
    let facts = build_facts(&wide, &dimensions, years)?;

    Ok(StarSchema {
        wide,
        dimensions,
        facts,
        unmapped_stations: pollution.unmapped,
    })
}

/// What to do with the star schema once built
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunMode {
    pub export: bool,
    pub load: bool,
}

#[derive(Debug, Serialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub prior_year: i32,
    pub current_year: i32,
    pub suburbs: usize,
    pub tables: Vec<TableFingerprint>,
    pub exported_to: Option<PathBuf>,
    pub load: Option<LoadReport>,
    pub unmapped_stations: Vec<String>,
}

/// Run the whole pipeline. `store` is required only when `mode.load` is set;
/// without it the load step is skipped.
pub async fn run(
    config: &Config,
    store: Option<&StoreClient>,
    mode: RunMode,
) -> Result<RunSummary> {
    let run_id = Uuid::new_v4();
    let span = info_span!("etl_run", run_id = %run_id);

    async move {
        info!(
            prior = config.years.prior,
            current = config.years.current,
            export = mode.export,
            load = mode.load,
            "Starting run"
        );

        let sources = Sources::read(config).await?;
        let star = build_star(&sources, config.years)?;

        let rendered = render_all(&star.dimensions, &star.facts, &star.wide)?;
        let tables: Vec<TableFingerprint> =
            rendered.iter().map(TableFingerprint::from).collect();
        for t in &tables {
            info!(table = t.table, rows = t.rows, sha256 = %t.sha256, "Fingerprint");
        }

        let exported_to = if mode.export {
            write_all(&config.output_dir, &rendered)?;
            Some(config.output_dir.clone())
        } else {
            None
        };

        let load = match (mode.load, store) {
            (true, Some(store)) => Some(store.load(&star.dimensions, &star.facts).await?),
            _ => None,
        };

        info!(suburbs = star.dimensions.suburb.len(), "Run complete");
        Ok(RunSummary {
            run_id,
            prior_year: config.years.prior,
            current_year: config.years.current,
            suburbs: star.dimensions.suburb.len(),
            tables,
            exported_to,
            load,
            unmapped_stations: star.unmapped_stations,
        })
    }
    .instrument(span)
    .await
}
