//! CSV export and run fingerprints
//!
//! Tables are rendered to bytes first so the same bytes are hashed and
//! written. Min-max scaling exists only here, for the presentation dataset.

use serde::Serialize;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use tracing::info;

use crate::dimensions::Dimensions;
use crate::error::{EtlError, Result};
use crate::facts::Facts;
use crate::merge::WideRow;
use crate::numeric::sanitize;
use crate::schema::{Cell, TableRow};

pub const SCALED_DATASET: &str = "final_scaled_dataset";

const WIDE_COLUMNS: &[&str] = &[
    "suburb",
    "total_evs",
    "bev_count",
    "phev_count",
    "avg_range_km",
    "avg_price",
    "energy_consumption_prior",
    "energy_consumption",
    "energy_consumption_change_pct",
    "no2_prior",
    "no2_level",
    "no2_change",
    "no2_change_pct",
    "ev_per_energy_unit",
    "no2_per_ev",
    "ev_adoption_score",
];

/// Columns that get a `<name>_scaled` companion
const SCALED_COLUMNS: &[&str] = &[
    "total_evs",
    "avg_range_km",
    "avg_price",
    "energy_consumption",
    "no2_level",
    "ev_per_energy_unit",
    "no2_per_ev",
    "ev_adoption_score",
];

/// A table rendered to CSV bytes
#[derive(Debug, Clone)]
pub struct RenderedTable {
    pub name: &'static str,
    pub rows: usize,
    pub bytes: Vec<u8>,
}

impl RenderedTable {
    pub fn file_name(&self) -> String {
        format!("{}.csv", self.name)
    }

    pub fn sha256(&self) -> String {
        fingerprint(&self.bytes)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableFingerprint {
    pub table: &'static str,
    pub rows: usize,
    pub sha256: String,
}

impl From<&RenderedTable> for TableFingerprint {
    fn from(t: &RenderedTable) -> Self {
        Self {
            table: t.name,
            rows: t.rows,
            sha256: t.sha256(),
        }
    }
}

pub fn fingerprint(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

fn write_csv(
    name: &'static str,
    headers: &[&str],
    rows: impl Iterator<Item = Vec<Cell>>,
) -> Result<RenderedTable> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer
        .write_record(headers)
        .map_err(|e| EtlError::export(name, e))?;

    let mut count = 0;
    for cells in rows {
        writer
            .write_record(cells.iter().map(Cell::to_field))
            .map_err(|e| EtlError::export(name, e))?;
        count += 1;
    }

    let bytes = writer
        .into_inner()
        .map_err(|e| EtlError::export(name, e.error()))?;
    Ok(RenderedTable {
        name,
        rows: count,
        bytes,
    })
}

pub fn render_table<R: TableRow>(rows: &[R]) -> Result<RenderedTable> {
    let headers: Vec<&str> = R::SPEC.column_names().collect();
    write_csv(R::SPEC.name, &headers, rows.iter().map(|r| r.cells()))
}

fn wide_cells(r: &WideRow) -> Vec<Cell> {
    vec![
        Cell::Text(r.suburb.clone()),
        Cell::Int(r.total_evs),
        Cell::Int(r.bev_count),
        Cell::Int(r.phev_count),
        Cell::Float(sanitize(r.avg_range_km)),
        Cell::Float(sanitize(r.avg_price)),
        Cell::Float(sanitize(r.energy_consumption_prior)),
        Cell::Float(sanitize(r.energy_consumption)),
        Cell::Float(sanitize(r.energy_consumption_change_pct)),
        Cell::Float(sanitize(r.no2_prior)),
        Cell::Float(sanitize(r.no2_level)),
        Cell::Float(sanitize(r.no2_change)),
        Cell::Float(sanitize(r.no2_change_pct)),
        Cell::Float(sanitize(r.ev_per_energy_unit)),
        Cell::Float(sanitize(r.no2_per_ev)),
        Cell::Float(sanitize(r.ev_adoption_score)),
    ]
}

fn numeric_value(cell: &Cell) -> f64 {
    match cell {
        Cell::Int(v) => *v as f64,
        Cell::Float(v) => *v,
        _ => 0.0,
    }
}

/// Min-max scale to [0, 1]; a constant column scales to 0
pub fn min_max_scale(values: &[f64]) -> Vec<f64> {
    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let span = max - min;
    values
        .iter()
        .map(|v| {
            if span > 0.0 && span.is_finite() {
                sanitize((v - min) / span)
            } else {
                0.0
            }
        })
        .collect()
}

/// Wide rows plus presentation-only `*_scaled` columns
pub fn render_scaled_dataset(wide: &[WideRow]) -> Result<RenderedTable> {
    let mut rows: Vec<Vec<Cell>> = wide.iter().map(wide_cells).collect();

    let mut headers: Vec<String> = WIDE_COLUMNS.iter().map(|c| c.to_string()).collect();
    for column in SCALED_COLUMNS {
        let Some(idx) = WIDE_COLUMNS.iter().position(|c| c == column) else {
            continue;
        };
        let values: Vec<f64> = rows.iter().map(|r| numeric_value(&r[idx])).collect();
        for (row, scaled) in rows.iter_mut().zip(min_max_scale(&values)) {
            row.push(Cell::Float(scaled));
        }
        headers.push(format!("{column}_scaled"));
    }

    let headers: Vec<&str> = headers.iter().map(String::as_str).collect();
    write_csv(SCALED_DATASET, &headers, rows.into_iter())
}

/// Render every star schema table and the scaled dataset, in a fixed order
pub fn render_all(
    dims: &Dimensions,
    facts: &Facts,
    wide: &[WideRow],
) -> Result<Vec<RenderedTable>> {
    Ok(vec![
        render_table(&dims.time)?,
        render_table(&dims.suburb)?,
        render_table(&dims.vehicle_type)?,
        render_table(&dims.fuel_type)?,
        render_table(&facts.ev)?,
        render_table(&facts.energy)?,
        render_scaled_dataset(wide)?,
    ])
}

/// Write rendered tables into `dir`, creating it if needed
pub fn write_all(dir: &Path, tables: &[RenderedTable]) -> Result<Vec<PathBuf>> {
    std::fs::create_dir_all(dir).map_err(|e| EtlError::export(dir.display(), e))?;

    let mut written = Vec::with_capacity(tables.len());
    for table in tables {
        let path = dir.join(table.file_name());
        std::fs::write(&path, &table.bytes)
            .map_err(|e| EtlError::export(path.display(), e))?;
        info!(
            table = table.name,
            rows = table.rows,
            path = %path.display(),
            "Exported"
        );
        written.push(path);
    }
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dimensions::{build_suburb_dim, SuburbDimRow};

    fn wide(name: &str, total_evs: i64, no2: f64) -> WideRow {
        WideRow {
            suburb: name.into(),
            total_evs,
            no2_level: no2,
            ..Default::default()
        }
    }

    #[test]
    fn test_min_max_scale() {
        assert_eq!(min_max_scale(&[0.0, 5.0, 10.0]), vec![0.0, 0.5, 1.0]);
        assert_eq!(min_max_scale(&[3.0, 3.0]), vec![0.0, 0.0]);
        assert!(min_max_scale(&[]).is_empty());
    }

    #[test]
    fn test_render_table_csv() {
        let rows = vec![
            SuburbDimRow {
                suburb_key: 1,
                suburb_name: "Glebe".into(),
            },
            SuburbDimRow {
                suburb_key: 2,
                suburb_name: "Macquarie Park".into(),
            },
        ];
        let t = render_table(&rows).unwrap();
        assert_eq!(t.name, "suburb_dim");
        assert_eq!(t.rows, 2);
        assert_eq!(
            String::from_utf8(t.bytes).unwrap(),
            "suburb_key,suburb_name\n1,Glebe\n2,Macquarie Park\n"
        );
    }

    #[test]
    fn test_fingerprint_stable() {
        let rows = build_suburb_dim(&[wide("Glebe", 0, 0.0), wide("Rozelle", 0, 0.0)]);
        let a = render_table(&rows).unwrap();
        let b = render_table(&rows).unwrap();
        assert_eq!(a.sha256(), b.sha256());
        assert_eq!(a.sha256().len(), 64);
        assert_eq!(
            fingerprint(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn test_scaled_dataset_columns() {
        let rows = [wide("Glebe", 2, 10.0), wide("Rozelle", 4, 10.0)];
        let t = render_scaled_dataset(&rows).unwrap();
        let text = String::from_utf8(t.bytes).unwrap();
        let mut lines = text.lines();
        let header: Vec<&str> = lines.next().unwrap().split(',').collect();
        assert_eq!(header.len(), WIDE_COLUMNS.len() + SCALED_COLUMNS.len());
        assert_eq!(header[WIDE_COLUMNS.len()], "total_evs_scaled");

        let glebe: Vec<&str> = lines.next().unwrap().split(',').collect();
        let rozelle: Vec<&str> = lines.next().unwrap().split(',').collect();
        let evs_scaled = WIDE_COLUMNS.len();
        let no2_scaled = WIDE_COLUMNS.len() + 4;
        assert_eq!(glebe[evs_scaled], "0");
        assert_eq!(rozelle[evs_scaled], "1");
        // constant column
        assert_eq!(rozelle[no2_scaled], "0");
    }

    #[test]
    fn test_write_all_creates_files() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("extracted");
        let tables = vec![render_scaled_dataset(&[wide("Glebe", 1, 1.0)]).unwrap()];
        let written = write_all(&out, &tables).unwrap();
        assert_eq!(written, vec![out.join("final_scaled_dataset.csv")]);
        assert_eq!(std::fs::read(&written[0]).unwrap(), tables[0].bytes);
    }
}
