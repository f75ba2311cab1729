//! Entity Normalizer - one canonical suburb name per raw record
//!
//! - EV: trim + case normalization of the suburb column
//! - Energy: same, after keeping the first `+`-separated segment
//!   ("Rozelle+Annandale" -> "Rozelle")
//! - Pollution: suburbs come from column headers
//!   ("<Station> NO2 annual average"), mapped through a fixed allow-list
//!
//! Unmapped names are dropped, never defaulted.

use std::collections::BTreeSet;
use tracing::{debug, warn};

use crate::error::{EtlError, Result};
use crate::source::{RawField, RawRecord, RawTable};

pub const EV_SUBURB_COLUMNS: &[&str] = &["SUBURB"];
pub const ENERGY_NAME_COLUMNS: &[&str] = &["Name"];
pub const POLLUTION_DATE_COLUMNS: &[&str] = &["Date"];

/// Header suffix identifying a station NO2 column
pub const STATION_SUFFIX: &str = " NO2 annual average";

/// Monitoring station (title-cased) -> suburb. Stations not listed here are
/// excluded from every pollution metric.
pub const STATION_ALIASES: &[(&str, &str)] = &[
    ("Alexandria", "Alexandria"),
    ("Rozelle", "Rozelle"),
    ("Earlwood", "Earlwood"),
    ("Cook And Phillip", "Sydney"),
    ("Randwick", "Randwick"),
    ("Macquarie Park", "Macquarie Park"),
    ("Parramatta North", "Parramatta"),
];

/// A raw record annotated with its canonical suburb
#[derive(Debug, Clone)]
pub struct NormalizedRecord<'a> {
    pub suburb: String,
    pub record: &'a RawRecord,
}

#[derive(Debug)]
pub struct NormalizedTable<'a> {
    pub table: &'a RawTable,
    pub records: Vec<NormalizedRecord<'a>>,
    /// Records whose suburb field was blank
    pub dropped: usize,
}

/// A pollution station column mapped to a suburb
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StationColumn {
    pub index: usize,
    pub station: String,
    pub suburb: String,
}

#[derive(Debug)]
pub struct NormalizedStations<'a> {
    pub table: &'a RawTable,
    pub date_column: usize,
    pub stations: Vec<StationColumn>,
    /// Station names seen in headers but absent from the alias table
    pub unmapped: Vec<String>,
}

/// Python-style title casing: a letter is uppercased when the previous
/// character is not a letter, lowercased otherwise.
pub fn title_case(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut prev_is_letter = false;
    for c in raw.chars() {
        if c.is_alphabetic() {
            if prev_is_letter {
                out.extend(c.to_lowercase());
            } else {
                out.extend(c.to_uppercase());
            }
            prev_is_letter = true;
        } else {
            out.push(c);
            prev_is_letter = false;
        }
    }
    out
}

/// Canonical suburb key: whitespace trimmed and collapsed, title-cased.
/// Returns None for blank input.
pub fn canonical_suburb(raw: &str) -> Option<String> {
    let collapsed = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.is_empty() {
        None
    } else {
        Some(title_case(&collapsed))
    }
}

/// Energy names combine micro-areas with `+`; the first one names the row
pub fn energy_suburb(raw: &str) -> Option<String> {
    raw.split('+').next().and_then(canonical_suburb)
}

/// Extract the title-cased station name from a NO2 column header
pub fn station_name(header: &str) -> Option<String> {
    let pos = header.rfind(STATION_SUFFIX)?;
    let name = header[..pos].trim();
    if name.is_empty() {
        None
    } else {
        Some(title_case(name))
    }
}

/// Look up a station in the alias table
pub fn station_suburb(station: &str) -> Option<&'static str> {
    STATION_ALIASES
        .iter()
        .find(|(s, _)| *s == station)
        .map(|(_, suburb)| *suburb)
}

fn annotate<'a>(
    table: &'a RawTable,
    column: usize,
    canon: impl Fn(&str) -> Option<String>,
) -> NormalizedTable<'a> {
    let mut records = Vec::with_capacity(table.len());
    let mut dropped = 0;

    for record in &table.records {
        let suburb = match record.get(column) {
            RawField::Text(s) => canon(s),
            _ => None,
        };
        match suburb {
            Some(suburb) => records.push(NormalizedRecord { suburb, record }),
            None => {
                debug!(source = %table.source, line = record.line, "Dropping record with blank suburb");
                dropped += 1;
            }
        }
    }

    NormalizedTable {
        table,
        records,
        dropped,
    }
}

pub fn normalize_ev(table: &RawTable) -> Result<NormalizedTable<'_>> {
    let column = table
        .find_column(EV_SUBURB_COLUMNS)
        .ok_or_else(|| EtlError::missing_column("ev", EV_SUBURB_COLUMNS[0]))?;
    Ok(annotate(table, column, canonical_suburb))
}

pub fn normalize_energy(table: &RawTable) -> Result<NormalizedTable<'_>> {
    let column = table
        .find_column(ENERGY_NAME_COLUMNS)
        .ok_or_else(|| EtlError::missing_column("energy", ENERGY_NAME_COLUMNS[0]))?;
    Ok(annotate(table, column, energy_suburb))
}

/// Map station columns to suburbs. Every unmapped station is reported once
/// at warn level; its readings never reach the metrics.
pub fn normalize_pollution(table: &RawTable) -> Result<NormalizedStations<'_>> {
    let date_column = table
        .find_column(POLLUTION_DATE_COLUMNS)
        .ok_or_else(|| EtlError::missing_column("pollution", POLLUTION_DATE_COLUMNS[0]))?;

    let mut stations = Vec::new();
    let mut unmapped = BTreeSet::new();

    for (index, header) in table.headers.iter().enumerate() {
        let Some(station) = station_name(header) else {
            continue;
        };
        match station_suburb(&station) {
            Some(suburb) => stations.push(StationColumn {
                index,
                station,
                suburb: suburb.to_string(),
            }),
            None => {
                unmapped.insert(station);
            }
        }
    }

    for station in &unmapped {
        warn!(station = %station, "Station not in alias table; readings excluded");
    }

    Ok(NormalizedStations {
        table,
        date_column,
        stations,
        unmapped: unmapped.into_iter().collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::text_table as table;

    #[test]
    fn test_title_case() {
        assert_eq!(title_case("COOK AND PHILLIP"), "Cook And Phillip");
        assert_eq!(title_case("macquarie park"), "Macquarie Park");
        assert_eq!(title_case("parramatta-north"), "Parramatta-North");
    }

    #[test]
    fn test_canonical_suburb() {
        assert_eq!(canonical_suburb(" Rozelle "), Some("Rozelle".to_string()));
        assert_eq!(canonical_suburb("SURRY   HILLS"), Some("Surry Hills".to_string()));
        assert_eq!(canonical_suburb("   "), None);
    }

    #[test]
    fn test_energy_suburb_takes_first_segment() {
        assert_eq!(energy_suburb("Rozelle+Annandale"), Some("Rozelle".to_string()));
        assert_eq!(energy_suburb(" Glebe + Forest Lodge"), Some("Glebe".to_string()));
        assert_eq!(energy_suburb("+Annandale"), None);
    }

    #[test]
    fn test_station_name_extraction() {
        assert_eq!(
            station_name("ROZELLE NO2 annual average"),
            Some("Rozelle".to_string())
        );
        assert_eq!(
            station_name("COOK AND PHILLIP NO2 annual average"),
            Some("Cook And Phillip".to_string())
        );
        assert_eq!(station_name("Rozelle PM10 annual average"), None);
        assert_eq!(station_name("Date"), None);
    }

    #[test]
    fn test_station_alias_allow_list() {
        assert_eq!(station_suburb("Cook And Phillip"), Some("Sydney"));
        assert_eq!(station_suburb("Parramatta North"), Some("Parramatta"));
        assert_eq!(station_suburb("Liverpool"), None);
    }

    #[test]
    fn test_normalize_ev_drops_blank_suburbs() {
        let t = table(&["FUEL_TYPE", "SUBURB"], &[&["BEV", " Rozelle "], &["BEV", ""]]);
        let n = normalize_ev(&t).unwrap();
        assert_eq!(n.records.len(), 1);
        assert_eq!(n.records[0].suburb, "Rozelle");
        assert_eq!(n.dropped, 1);
    }

    #[test]
    fn test_normalize_ev_missing_suburb_column() {
        let t = table(&["FUEL_TYPE"], &[&["BEV"]]);
        let err = normalize_ev(&t).unwrap_err();
        assert!(matches!(err, EtlError::TransformValidation { domain: "ev", .. }));
    }

    #[test]
    fn test_normalize_energy() {
        let t = table(&["Name", "F2021_22"], &[&["Rozelle+Annandale", "1000"]]);
        let n = normalize_energy(&t).unwrap();
        assert_eq!(n.records[0].suburb, "Rozelle");
    }

    #[test]
    fn test_normalize_pollution_maps_and_reports_unmapped() {
        let t = table(
            &[
                "Date",
                "ROZELLE NO2 annual average",
                "LIVERPOOL NO2 annual average",
                "COOK AND PHILLIP NO2 annual average",
                "ROZELLE PM10 annual average",
            ],
            &[],
        );
        let n = normalize_pollution(&t).unwrap();
        assert_eq!(n.date_column, 0);
        assert_eq!(
            n.stations,
            vec![
                StationColumn {
                    index: 1,
                    station: "Rozelle".into(),
                    suburb: "Rozelle".into()
                },
                StationColumn {
                    index: 3,
                    station: "Cook And Phillip".into(),
                    suburb: "Sydney".into()
                },
            ]
        );
        assert_eq!(n.unmapped, vec!["Liverpool".to_string()]);
    }
}
