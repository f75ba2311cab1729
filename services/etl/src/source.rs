//! Source Readers - turn a named artifact into a table of raw records
//!
//! Reading is split in two so parsing stays deterministic and testable:
//! - `fetch_bytes` locates the artifact (filesystem or http) and returns bytes
//! - `parse_table` decodes and parses those bytes per `SourceOptions`
//!
//! There is no retry: a missing or malformed source aborts the run.

use chrono::{Datelike, NaiveDate, NaiveDateTime};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info};

use crate::error::{EtlError, Result};

/// Where a source artifact lives
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceLocation {
    Path(PathBuf),
    Url(String),
}

impl SourceLocation {
    pub fn parse(raw: &str) -> Self {
        if raw.starts_with("http://") || raw.starts_with("https://") {
            SourceLocation::Url(raw.to_string())
        } else {
            SourceLocation::Path(PathBuf::from(raw))
        }
    }
}

impl std::fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceLocation::Path(p) => write!(f, "{}", p.display()),
            SourceLocation::Url(u) => write!(f, "{}", u),
        }
    }
}

/// Convention for ambiguous numeric dates like 03/04/2023
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateOrder {
    DayFirst,
    MonthFirst,
}

/// Per-source parse configuration
#[derive(Debug, Clone)]
pub struct SourceOptions {
    pub delimiter: u8,
    /// Lines to skip before the header row
    pub header_offset: usize,
    /// Columns whose cells are parsed as dates
    pub date_columns: Vec<String>,
    pub date_order: DateOrder,
}

#[derive(Debug, Clone)]
pub struct SourceSpec {
    pub name: &'static str,
    pub location: SourceLocation,
    pub options: SourceOptions,
}

/// One cell as read from the source
#[derive(Debug, Clone, PartialEq)]
pub enum RawField {
    Empty,
    Text(String),
    Date(NaiveDate),
}

impl RawField {
    pub fn as_str(&self) -> &str {
        match self {
            RawField::Text(s) => s,
            _ => "",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RawRecord {
    /// 1-indexed line in the original file
    pub line: usize,
    pub fields: Vec<RawField>,
}

impl RawRecord {
    pub fn get(&self, idx: usize) -> &RawField {
        self.fields.get(idx).unwrap_or(&RawField::Empty)
    }
}

/// A parsed source: source-native headers plus raw records
#[derive(Debug, Clone, PartialEq)]
pub struct RawTable {
    pub source: String,
    pub headers: Vec<String>,
    pub records: Vec<RawRecord>,
}

impl RawTable {
    /// Find a column by comparing normalized headers against candidates.
    /// Matching is exact after normalization, not substring.
    pub fn find_column(&self, candidates: &[&str]) -> Option<usize> {
        for candidate in candidates {
            let wanted = normalize_header(candidate);
            if let Some(idx) = self
                .headers
                .iter()
                .position(|h| normalize_header(h) == wanted)
            {
                return Some(idx);
            }
        }
        None
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Header comparison form: trimmed, trailing delimiters dropped, uppercased
pub fn normalize_header(header: &str) -> String {
    header
        .trim()
        .trim_end_matches(';')
        .trim()
        .to_uppercase()
}

/// Fetch and parse one source
pub async fn read_source(client: &reqwest::Client, spec: &SourceSpec) -> Result<RawTable> {
    info!(source = spec.name, location = %spec.location, "Reading source");
    let bytes = fetch_bytes(client, spec.name, &spec.location).await?;
    let table = parse_table(spec.name, &bytes, &spec.options)?;
    info!(
        source = spec.name,
        records = table.len(),
        columns = table.headers.len(),
        "Extracted records"
    );
    Ok(table)
}

/// Build the HTTP client used for URL sources
pub fn http_client() -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(120))
        .user_agent("ev-energy-etl/0.1")
        .build()
        .map_err(|e| EtlError::unavailable("http", e))
}

pub async fn fetch_bytes(
    client: &reqwest::Client,
    name: &str,
    location: &SourceLocation,
) -> Result<Vec<u8>> {
    match location {
        SourceLocation::Path(path) => tokio::fs::read(path)
            .await
            .map_err(|e| EtlError::unavailable(name, format!("{}: {}", path.display(), e))),
        SourceLocation::Url(url) => {
            let resp = client
                .get(url)
                .send()
                .await
                .and_then(|r| r.error_for_status())
                .map_err(|e| EtlError::unavailable(name, e))?;
            let bytes = resp
                .bytes()
                .await
                .map_err(|e| EtlError::unavailable(name, e))?;
            Ok(bytes.to_vec())
        }
    }
}

/// Decode source bytes: UTF-8 (BOM stripped), falling back to Windows-1252
/// for spreadsheet exports that are not valid UTF-8.
pub fn decode_text(bytes: &[u8]) -> String {
    let (text, had_errors) = encoding_rs::UTF_8.decode_with_bom_removal(bytes);
    if !had_errors {
        return text.into_owned();
    }
    debug!("Source is not valid UTF-8, decoding as Windows-1252");
    let (text, _, _) = encoding_rs::WINDOWS_1252.decode(bytes);
    text.into_owned()
}

/// Parse decoded source bytes into a raw table.
/// This function is DETERMINISTIC: same bytes + options = same table.
pub fn parse_table(name: &str, bytes: &[u8], options: &SourceOptions) -> Result<RawTable> {
    let text = decode_text(bytes);
    let body = skip_lines(&text, options.header_offset).ok_or_else(|| {
        EtlError::malformed(
            name,
            format!(
                "expected at least {} lines before the header row",
                options.header_offset
            ),
        )
    })?;

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(options.delimiter)
        .flexible(true)
        .from_reader(body.as_bytes());

    let headers: Vec<String> = reader
        .headers()
        .map_err(|e| EtlError::malformed(name, format!("cannot read header row: {}", e)))?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();

    if headers.iter().all(|h| h.is_empty()) {
        return Err(EtlError::malformed(name, "header row is empty"));
    }

    let mut date_idx = Vec::with_capacity(options.date_columns.len());
    for col in &options.date_columns {
        let idx = headers
            .iter()
            .position(|h| h == col.trim())
            .ok_or_else(|| {
                EtlError::malformed(name, format!("expected date column '{}' not found", col))
            })?;
        date_idx.push(idx);
    }

    // header line number in the original file, 1-indexed
    let header_line = options.header_offset + 1;
    let mut records = Vec::new();

    for (idx, result) in reader.records().enumerate() {
        let record = result.map_err(|e| EtlError::malformed(name, e))?;
        let line = record
            .position()
            .map(|p| p.line() as usize + options.header_offset)
            .unwrap_or(header_line + idx + 1);

        if record.iter().all(|f| f.trim().is_empty()) {
            continue;
        }

        let fields = record
            .iter()
            .enumerate()
            .map(|(col, value)| {
                let value = value.trim();
                if value.is_empty() {
                    RawField::Empty
                } else if date_idx.contains(&col) {
                    match parse_date(value, options.date_order) {
                        Some(d) => RawField::Date(d),
                        None => RawField::Text(value.to_string()),
                    }
                } else {
                    RawField::Text(value.to_string())
                }
            })
            .collect();

        records.push(RawRecord { line, fields });
    }

    Ok(RawTable {
        source: name.to_string(),
        headers,
        records,
    })
}

fn skip_lines(text: &str, n: usize) -> Option<&str> {
    let mut rest = text;
    for _ in 0..n {
        let pos = rest.find('\n')?;
        rest = &rest[pos + 1..];
    }
    Some(rest)
}

const DAY_FIRST_DATES: &[&str] = &["%d/%m/%Y", "%d-%m-%Y", "%d.%m.%Y", "%Y-%m-%d", "%d/%m/%y"];
const MONTH_FIRST_DATES: &[&str] = &["%m/%d/%Y", "%m-%d-%Y", "%Y-%m-%d", "%m/%d/%y"];
const DAY_FIRST_DATETIMES: &[&str] = &["%d/%m/%Y %H:%M", "%d/%m/%Y %H:%M:%S", "%Y-%m-%d %H:%M:%S"];
const MONTH_FIRST_DATETIMES: &[&str] = &["%m/%d/%Y %H:%M", "%m/%d/%Y %H:%M:%S", "%Y-%m-%d %H:%M:%S"];

/// Parse a date cell under the given order convention
pub fn parse_date(raw: &str, order: DateOrder) -> Option<NaiveDate> {
    let (dates, datetimes) = match order {
        DateOrder::DayFirst => (DAY_FIRST_DATES, DAY_FIRST_DATETIMES),
        DateOrder::MonthFirst => (MONTH_FIRST_DATES, MONTH_FIRST_DATETIMES),
    };
    let raw = raw.trim();

    for fmt in dates {
        if let Ok(d) = NaiveDate::parse_from_str(raw, fmt) {
            // %Y happily accepts "23" as year 23; leave that to the %y formats
            if fmt.contains("%Y") && d.year() < 1000 {
                continue;
            }
            return Some(d);
        }
    }
    datetimes
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|dt| dt.date())
}

/// In-memory tables for unit tests in other modules
#[cfg(test)]
pub(crate) fn text_table(headers: &[&str], rows: &[&[&str]]) -> RawTable {
    RawTable {
        source: "test".into(),
        headers: headers.iter().map(|h| h.to_string()).collect(),
        records: rows
            .iter()
            .enumerate()
            .map(|(i, row)| RawRecord {
                line: i + 2,
                fields: row
                    .iter()
                    .map(|v| {
                        if v.trim().is_empty() {
                            RawField::Empty
                        } else {
                            RawField::Text(v.to_string())
                        }
                    })
                    .collect(),
            })
            .collect(),
    }
}
