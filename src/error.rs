use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum MatrixError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("invalid commodity code: {0}")]
    InvalidCommodity(String),

    #[error("invalid time period: {0}")]
    InvalidPeriod(String),

    #[error("unknown temporal resolution: {0} (expected annual or monthly)")]
    #[diagnostic(help("set temporal_resolution to \"annual\" or \"monthly\""))]
    InvalidResolution(String),

    #[error("country batch size must be positive, got {0}")]
    InvalidBatchSize(i64),

    #[error("start year {start} is after end year {end}")]
    InvalidYearRange { start: i32, end: i32 },

    #[error("year {0} is outside 1000..=9999")]
    #[diagnostic(help("start_year and end_year must be four-digit years"))]
    InvalidYear(i32),

    #[error("missing config file comtrade-matrix.json in current directory")]
    MissingConfig,

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("Comtrade request failed: {0}")]
    ComtradeHttp(String),

    #[error("Comtrade returned status {status}: {message}")]
    ComtradeStatus { status: u16, message: String },

    #[error("malformed Comtrade payload: {0}")]
    ComtradeParse(String),

    #[error("invalid country crosswalk: {0}")]
    Reference(String),

    #[error("matrix reconciliation failed: {0}")]
    #[diagnostic(help("the country crosswalk or the label merge produced an inconsistent matrix"))]
    Reconciliation(String),

    #[error("csv error: {0}")]
    Csv(String),

    #[error("filesystem error: {0}")]
    Filesystem(String),
}

impl MatrixError {
    /// Errors that are absorbed per batch by the fetch retry loop.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            MatrixError::ComtradeHttp(_)
                | MatrixError::ComtradeStatus { .. }
                | MatrixError::ComtradeParse(_)
        )
    }
}

impl From<csv::Error> for MatrixError {
    fn from(err: csv::Error) -> Self {
        MatrixError::Csv(err.to_string())
    }
}
