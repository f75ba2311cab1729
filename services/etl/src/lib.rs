//! EV / Energy / Pollution ETL - core library
//!
//! Reads three fixed CSV extracts, conforms them on a canonical suburb key
//! and produces a small star schema (time, suburb, vehicle type and fuel
//! type dimensions; EV and energy facts), exported as CSV and/or loaded
//! into Postgres.
//!
//! CRITICAL: the pipeline is DETERMINISTIC.
//! Same inputs + same reporting year = byte-identical tables.

pub mod config;
pub mod dimensions;
pub mod error;
pub mod export;
pub mod facts;
pub mod merge;
pub mod normalize;
pub mod numeric;
pub mod pipeline;
pub mod schema;
pub mod source;
pub mod store;
pub mod transform;

pub use config::{Config, ReportingYears};
pub use error::{EtlError, Result};
pub use pipeline::{build_star, run, RunMode, RunSummary, Sources, StarSchema};
pub use store::StoreClient;
