use std::collections::HashSet;
use std::fs::File;
use std::io::Read;
use std::sync::OnceLock;

use camino::{Utf8Path, Utf8PathBuf};
use regex::Regex;
use serde::Deserialize;

use crate::domain::CountryCode;
use crate::error::MatrixError;

/// Source of the UN numeric to ISO3 crosswalk.
pub trait ReferenceLoader {
    /// Countries still valid on or after `start_year`, in crosswalk order.
    fn load(&self, start_year: i32) -> Result<Vec<CountryCode>, MatrixError>;
}

/// Reads `un_id,iso3,name,valid_from,valid_to` rows from a CSV file.
#[derive(Debug, Clone)]
pub struct CsvReferenceLoader {
    path: Utf8PathBuf,
}

impl CsvReferenceLoader {
    pub fn new(path: impl Into<Utf8PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Utf8Path {
        &self.path
    }
}

impl ReferenceLoader for CsvReferenceLoader {
    fn load(&self, start_year: i32) -> Result<Vec<CountryCode>, MatrixError> {
        let file = File::open(self.path.as_std_path()).map_err(|err| {
            MatrixError::Reference(format!("open crosswalk {}: {err}", self.path))
        })?;
        read_crosswalk(file, start_year)
    }
}

#[derive(Debug, Deserialize)]
struct CrosswalkRow {
    un_id: String,
    iso3: String,
    name: String,
    valid_from: i32,
    #[serde(default)]
    valid_to: Option<i32>,
}

pub fn read_crosswalk<R: Read>(reader: R, start_year: i32) -> Result<Vec<CountryCode>, MatrixError> {
    let mut csv_reader = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
    let mut seen = HashSet::new();
    let mut countries = Vec::new();
    for row in csv_reader.deserialize::<CrosswalkRow>() {
        let row = row?;
        if row.un_id.is_empty() || !row.un_id.chars().all(|ch| ch.is_ascii_digit()) {
            return Err(MatrixError::Reference(format!(
                "invalid UN id: {}",
                row.un_id
            )));
        }
        if !iso3_pattern().is_match(&row.iso3) {
            return Err(MatrixError::Reference(format!(
                "invalid ISO3 code for {}: {}",
                row.un_id, row.iso3
            )));
        }
        if !seen.insert(row.un_id.clone()) {
            return Err(MatrixError::Reference(format!(
                "duplicate UN id: {}",
                row.un_id
            )));
        }
        let valid_to = row.valid_to.unwrap_or(i32::MAX);
        if valid_to < start_year {
            continue;
        }
        countries.push(CountryCode {
            un_id: row.un_id,
            iso3: row.iso3,
            name: row.name,
            valid_from: row.valid_from,
            valid_to,
        });
    }
    Ok(countries)
}

fn iso3_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[A-Z]{3}$").expect("valid ISO3 regex"))
}
