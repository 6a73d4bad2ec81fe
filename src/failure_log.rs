use std::fs::{self, OpenOptions};

use camino::{Utf8Path, Utf8PathBuf};
use serde::Serialize;

use crate::error::MatrixError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum LogStatus {
    #[serde(rename = "fail")]
    Fail,
    #[serde(rename = "no data")]
    NoData,
}

/// One row of the download log.
///
/// For batch-level entries `reporter` and `reporter_id` hold the whole
/// reporter set, comma separated.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LogEntry {
    pub reporter: String,
    pub reporter_id: String,
    pub commodity: String,
    pub period: String,
    pub status: LogStatus,
    pub message: String,
    pub time: String,
}

impl LogEntry {
    pub fn new(
        reporter: impl Into<String>,
        reporter_id: impl Into<String>,
        commodity: impl Into<String>,
        period: impl Into<String>,
        status: LogStatus,
        message: impl Into<String>,
    ) -> Self {
        Self {
            reporter: reporter.into(),
            reporter_id: reporter_id.into(),
            commodity: commodity.into(),
            period: period.into(),
            status,
            message: message.into(),
            time: chrono::Utc::now().to_rfc3339(),
        }
    }
}

pub trait FailureLog {
    fn record(&mut self, entry: LogEntry) -> Result<(), MatrixError>;
}

/// Append-only CSV log. An existing file is appended to, a new one gets a header.
pub struct CsvFailureLog {
    path: Utf8PathBuf,
    writer: csv::Writer<fs::File>,
}

impl CsvFailureLog {
    pub fn open(path: &Utf8Path) -> Result<Self, MatrixError> {
        if let Some(parent) = path.parent().filter(|parent| !parent.as_str().is_empty()) {
            fs::create_dir_all(parent.as_std_path())
                .map_err(|err| MatrixError::Filesystem(err.to_string()))?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path.as_std_path())
            .map_err(|err| MatrixError::Filesystem(format!("open log {path}: {err}")))?;
        let is_empty = file
            .metadata()
            .map_err(|err| MatrixError::Filesystem(format!("stat log {path}: {err}")))?
            .len()
            == 0;
        let writer = csv::WriterBuilder::new()
            .has_headers(is_empty)
            .from_writer(file);
        Ok(Self {
            path: path.to_path_buf(),
            writer,
        })
    }

    pub fn path(&self) -> &Utf8Path {
        &self.path
    }
}

impl FailureLog for CsvFailureLog {
    fn record(&mut self, entry: LogEntry) -> Result<(), MatrixError> {
        self.writer.serialize(&entry)?;
        self.writer
            .flush()
            .map_err(|err| MatrixError::Filesystem(err.to_string()))
    }
}

#[derive(Debug, Default)]
pub struct MemoryFailureLog {
    pub entries: Vec<LogEntry>,
}

impl FailureLog for MemoryFailureLog {
    fn record(&mut self, entry: LogEntry) -> Result<(), MatrixError> {
        self.entries.push(entry);
        Ok(())
    }
}
