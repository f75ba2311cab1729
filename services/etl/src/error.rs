//! Error taxonomy for the ETL core
//!
//! Any of these aborts the run. Constraint failures during load are NOT
//! errors; they are collected as [`crate::store::ConstraintWarning`] values.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, EtlError>;

#[derive(Error, Debug)]
pub enum EtlError {
    /// Source artifact could not be located, opened or fetched
    #[error("source '{source_name}' unavailable: {reason}")]
    SourceUnavailable { source_name: String, reason: String },

    /// Declared parse configuration does not match the file shape
    #[error("source '{source_name}' malformed: {reason}")]
    SourceMalformed { source_name: String, reason: String },

    /// A column the metric formulas depend on is absent after normalization
    #[error("{domain} data is missing required column '{column}'")]
    TransformValidation { domain: &'static str, column: String },

    /// A dimension ended up with no rows, so facts cannot reference it
    #[error("dimension '{dimension}' is empty; cannot assemble facts")]
    DimensionResolution { dimension: &'static str },

    #[error("store error: {0}")]
    Store(#[from] sqlx::Error),

    #[error("failed to export '{path}': {reason}")]
    Export { path: String, reason: String },
}

impl EtlError {
    pub fn unavailable(source_name: &str, reason: impl ToString) -> Self {
        Self::SourceUnavailable {
            source_name: source_name.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn malformed(source_name: &str, reason: impl ToString) -> Self {
        Self::SourceMalformed {
            source_name: source_name.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn missing_column(domain: &'static str, column: impl ToString) -> Self {
        Self::TransformValidation {
            domain,
            column: column.to_string(),
        }
    }

    pub fn export(path: impl ToString, reason: impl ToString) -> Self {
        Self::Export {
            path: path.to_string(),
            reason: reason.to_string(),
        }
    }
}
