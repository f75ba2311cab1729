//! End-to-end pipeline tests over the fixture extracts in tests/fixtures

use std::path::{Path, PathBuf};

use etl::source::SourceLocation;
use etl::{build_star, Config, EtlError, ReportingYears, RunMode, Sources};

fn fixture(name: &str) -> SourceLocation {
    SourceLocation::Path(
        Path::new(env!("CARGO_MANIFEST_DIR"))
            .join("tests")
            .join("fixtures")
            .join(name),
    )
}

fn config(output_dir: PathBuf) -> Config {
    Config {
        db_url: None,
        db_max_connections: 1,
        ev_source: fixture("ev.csv"),
        energy_source: fixture("energy.csv"),
        pollution_source: fixture("pollution.csv"),
        output_dir,
        years: ReportingYears::ending(2023),
    }
}

const CSV_ONLY: RunMode = RunMode {
    export: true,
    load: false,
};

#[tokio::test]
async fn test_star_schema_from_fixtures() {
    let cfg = config(PathBuf::from("unused"));
    let sources = Sources::read(&cfg).await.unwrap();
    let star = build_star(&sources, cfg.years).unwrap();

    let suburbs: Vec<(i64, &str)> = star
        .dimensions
        .suburb
        .iter()
        .map(|r| (r.suburb_key, r.suburb_name.as_str()))
        .collect();
    assert_eq!(suburbs, vec![(1, "Glebe"), (2, "Rozelle"), (3, "Sydney")]);

    let vehicle_types: Vec<&str> = star
        .dimensions
        .vehicle_type
        .iter()
        .map(|r| r.vehicle_type.as_str())
        .collect();
    assert_eq!(vehicle_types, vec!["Hatch", "SUV", "Sedan"]);
    assert_eq!(star.unmapped_stations, vec!["Liverpool".to_string()]);

    // Rozelle scenario
    let rozelle = star.wide.iter().find(|r| r.suburb == "Rozelle").unwrap();
    assert_eq!(rozelle.total_evs, 1);
    assert_eq!(rozelle.avg_price, 45000.0);
    assert_eq!(rozelle.avg_range_km, 400.0);
    assert_eq!(rozelle.energy_consumption_change_pct, 20.0);
    assert_eq!(rozelle.no2_change, -3.0);
    assert_eq!(rozelle.no2_change_pct, -20.0);
    assert!((rozelle.ev_adoption_score - 1.2).abs() < 1e-9);

    let glebe = star.wide.iter().find(|r| r.suburb == "Glebe").unwrap();
    assert_eq!((glebe.total_evs, glebe.bev_count, glebe.phev_count), (2, 1, 1));
    assert_eq!(glebe.avg_price, 55000.0);
    assert_eq!(glebe.energy_consumption_change_pct, 25.0);
    assert!((glebe.ev_per_energy_unit - 0.8).abs() < 1e-9);

    // pollution-only suburb
    let sydney = star.wide.iter().find(|r| r.suburb == "Sydney").unwrap();
    assert_eq!(sydney.total_evs, 0);
    assert_eq!(sydney.energy_consumption, 0.0);
    assert_eq!(sydney.ev_per_energy_unit, 0.0);
    assert_eq!(sydney.no2_level, 18.0);
    assert_eq!(sydney.no2_change_pct, -10.0);

    assert_eq!(star.facts.ev.len(), 3);
    assert!(star.facts.ev.iter().all(|r| r.time_key == 2));
    assert_eq!(star.facts.energy.len(), 6);
    let sydney_prior = star
        .facts
        .energy
        .iter()
        .find(|r| r.suburb_key == 3 && r.time_key == 1)
        .unwrap();
    assert_eq!(sydney_prior.no2_level, 20.0);
    assert_eq!(sydney_prior.no2_change_pct, 0.0);
}

#[tokio::test]
async fn test_every_fact_float_is_finite_and_rounded() {
    let cfg = config(PathBuf::from("unused"));
    let star = build_star(&Sources::read(&cfg).await.unwrap(), cfg.years).unwrap();

    let floats = star
        .facts
        .energy
        .iter()
        .flat_map(|r| {
            [
                r.energy_consumption,
                r.energy_change_pct,
                r.no2_level,
                r.no2_change,
                r.no2_change_pct,
                r.ev_per_energy_unit,
                r.no2_per_ev,
            ]
        })
        .chain(
            star.facts
                .ev
                .iter()
                .flat_map(|r| [r.avg_range_km, r.avg_price, r.ev_adoption_score]),
        );
    for v in floats {
        assert!(v.is_finite());
        assert_eq!((v * 1e6).round() / 1e6, v);
    }
}

#[tokio::test]
async fn test_two_runs_are_byte_identical() {
    let first = tempfile::tempdir().unwrap();
    let second = tempfile::tempdir().unwrap();

    let a = etl::run(&config(first.path().to_path_buf()), None, CSV_ONLY)
        .await
        .unwrap();
    let b = etl::run(&config(second.path().to_path_buf()), None, CSV_ONLY)
        .await
        .unwrap();

    assert_ne!(a.run_id, b.run_id);
    assert_eq!(a.tables, b.tables);
    assert_eq!(a.tables.len(), 7);
    assert!(a.load.is_none());

    for table in &a.tables {
        let file = format!("{}.csv", table.table);
        let left = std::fs::read(first.path().join(&file)).unwrap();
        let right = std::fs::read(second.path().join(&file)).unwrap();
        assert_eq!(left, right, "{file} differs between runs");
    }
}

#[tokio::test]
async fn test_dry_run_writes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("extracted");
    let summary = etl::run(
        &config(out.clone()),
        None,
        RunMode {
            export: false,
            load: false,
        },
    )
    .await
    .unwrap();

    assert!(summary.exported_to.is_none());
    assert_eq!(summary.suburbs, 3);
    assert!(!out.exists());
}

#[tokio::test]
async fn test_reporting_year_outside_energy_columns_fails() {
    let mut cfg = config(PathBuf::from("unused"));
    cfg.years = ReportingYears::ending(2025);
    let sources = Sources::read(&cfg).await.unwrap();
    match build_star(&sources, cfg.years).unwrap_err() {
        EtlError::TransformValidation { domain, column } => {
            assert_eq!(domain, "energy");
            assert_eq!(column, "F2023_24");
        }
        other => panic!("unexpected error: {other}"),
    }

    // the fixture's earlier fiscal years still line up
    cfg.years = ReportingYears::ending(2022);
    let star = build_star(&sources, cfg.years).unwrap();
    let rozelle = star.wide.iter().find(|r| r.suburb == "Rozelle").unwrap();
    assert_eq!(rozelle.energy_consumption_prior, 900.0);
    assert_eq!(rozelle.energy_consumption, 1000.0);
}

#[tokio::test]
async fn test_missing_source_is_unavailable() {
    let mut cfg = config(PathBuf::from("unused"));
    cfg.energy_source = fixture("does_not_exist.csv");
    let err = Sources::read(&cfg).await.unwrap_err();
    match err {
        EtlError::SourceUnavailable { source_name, .. } => assert_eq!(source_name, "energy"),
        other => panic!("unexpected error: {other}"),
    }
}
