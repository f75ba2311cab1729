//! ETL Service - builds the EV / energy / pollution star schema
//!
//! Modes:
//! - default: export CSVs to OUTPUT_DIR and replace the tables in DB_URL
//! - --dry-run: compute and fingerprint everything, write nothing
//! - --no-export: load the store without writing CSVs
//! - --no-load: CSV-only, export without touching (or requiring) DB_URL

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tracing::{info, Level};
use tracing_subscriber::EnvFilter;

use etl::{Config, ReportingYears, RunMode, StoreClient};

#[derive(Parser, Debug)]
#[command(name = "etl", about = "Builds the EV / energy / pollution star schema")]
struct Args {
    /// Dry run - compute and fingerprint only, no CSVs and no database
    #[arg(long, default_value = "false")]
    dry_run: bool,

    /// Skip writing CSV exports
    #[arg(long, default_value = "false")]
    no_export: bool,

    /// Override OUTPUT_DIR
    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// Skip the database load (CSV-only run, DB_URL not needed)
    #[arg(long, default_value = "false")]
    no_load: bool,

    /// Override REPORTING_YEAR (the prior year is the one before)
    #[arg(long)]
    reporting_year: Option<ReportingYears>,
}

impl Args {
    fn run_mode(&self) -> RunMode {
        RunMode {
            export: !self.dry_run && !self.no_export,
            load: !self.dry_run && !self.no_load,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .init();

    let args = Args::parse();
    let mut config = Config::from_env()?;
    if let Some(dir) = args.output_dir.clone() {
        config.output_dir = dir;
    }
    if let Some(years) = args.reporting_year {
        config.years = years;
    }

    let mode = args.run_mode();
    info!(
        mode = if args.dry_run { "dry-run" } else { "live" },
        export = mode.export,
        load = mode.load,
        reporting_year = config.years.current,
        "=== EV / Energy / Pollution ETL ==="
    );

    let store = if mode.load {
        let db_url = config
            .db_url
            .as_deref()
            .context("DB_URL env var missing (use --no-load for a CSV-only run)")?;
        Some(
            StoreClient::open(db_url, config.db_max_connections)
                .await
                .context("Failed to connect to database")?,
        )
    } else {
        None
    };

    let result = etl::run(&config, store.as_ref(), mode).await;

    if let Some(store) = store {
        store.close().await;
    }

    let summary = result.context("ETL run failed")?;
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}
