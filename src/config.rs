use std::fs;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::domain::{CommodityCode, Frequency};
use crate::error::MatrixError;

pub const DEFAULT_CONFIG_FILE: &str = "comtrade-matrix.json";
pub const DEFAULT_COUNTRY_BATCH_SIZE: i64 = 5;
/// Periods are rendered as `YYYY` or `YYYYMM`, so years must have four digits.
pub const YEAR_RANGE: std::ops::RangeInclusive<i32> = 1000..=9999;
/// Largest number of codes a single `{from, to}` entry may expand to.
pub const MAX_COMMODITY_RANGE: u64 = 10_000;

#[derive(Debug, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    pub start_year: i32,
    pub end_year: i32,
    #[serde(default)]
    pub temporal_resolution: Option<String>,
    pub commodity_list: Vec<CommodityEntry>,
    #[serde(default)]
    pub country_batch_size: Option<i64>,
    #[serde(default)]
    pub credential: Option<String>,
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(untagged)]
pub enum CommodityEntry {
    Code(String),
    Number(u64),
    Range(CommodityRange),
}

/// Inclusive numeric range of commodity codes, e.g. `{"from": 6902, "to": 6903}`.
#[derive(Debug, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct CommodityRange {
    pub from: u64,
    pub to: u64,
}

#[derive(Debug, Clone)]
pub struct RunConfig {
    pub start_year: i32,
    pub end_year: i32,
    pub temporal_resolution: Frequency,
    pub commodities: Vec<CommodityCode>,
    pub country_batch_size: usize,
    pub credential: Option<String>,
}

impl RunConfig {
    pub fn years(&self) -> Vec<i32> {
        (self.start_year..=self.end_year).collect()
    }
}

pub struct ConfigLoader;

impl ConfigLoader {
    pub fn resolve(path: Option<&str>) -> Result<RunConfig, MatrixError> {
        let config_path = match path {
            Some(path) => PathBuf::from(path),
            None => PathBuf::from(DEFAULT_CONFIG_FILE),
        };

        if path.is_none() && !config_path.exists() {
            return Err(MatrixError::MissingConfig);
        }

        let content = fs::read_to_string(&config_path)
            .map_err(|_| MatrixError::ConfigRead(config_path.clone()))?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<RunConfig, MatrixError> {
        let config: Config = serde_json::from_str(content)
            .map_err(|err| MatrixError::ConfigParse(err.to_string()))?;
        Self::resolve_config(config)
    }

    pub fn resolve_config(config: Config) -> Result<RunConfig, MatrixError> {
        let temporal_resolution = match config.temporal_resolution.as_deref() {
            None => Frequency::Annual,
            Some(value) => match value.trim().to_ascii_lowercase().as_str() {
                "annual" => Frequency::Annual,
                "monthly" => Frequency::Monthly,
                _ => return Err(MatrixError::InvalidResolution(value.to_string())),
            },
        };

        let batch_size = config
            .country_batch_size
            .unwrap_or(DEFAULT_COUNTRY_BATCH_SIZE);
        if batch_size <= 0 {
            return Err(MatrixError::InvalidBatchSize(batch_size));
        }

        for year in [config.start_year, config.end_year] {
            if !YEAR_RANGE.contains(&year) {
                return Err(MatrixError::InvalidYear(year));
            }
        }
        if config.start_year > config.end_year {
            return Err(MatrixError::InvalidYearRange {
                start: config.start_year,
                end: config.end_year,
            });
        }

        let mut commodities = Vec::new();
        for entry in config.commodity_list {
            match entry {
                CommodityEntry::Code(value) => commodities.push(value.parse()?),
                CommodityEntry::Number(value) => commodities.push(value.to_string().parse()?),
                CommodityEntry::Range(range) => {
                    if range.from > range.to {
                        return Err(MatrixError::InvalidCommodity(format!(
                            "{}..{}",
                            range.from, range.to
                        )));
                    }
                    if range.to - range.from >= MAX_COMMODITY_RANGE {
                        return Err(MatrixError::InvalidCommodity(format!(
                            "{}..{} spans more than {MAX_COMMODITY_RANGE} codes",
                            range.from, range.to
                        )));
                    }
                    for value in range.from..=range.to {
                        commodities.push(value.to_string().parse()?);
                    }
                }
            }
        }
        if commodities.is_empty() {
            return Err(MatrixError::InvalidCommodity(
                "commodity_list is empty".to_string(),
            ));
        }

        let credential = config
            .credential
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty());

        Ok(RunConfig {
            start_year: config.start_year,
            end_year: config.end_year,
            temporal_resolution,
            commodities,
            country_batch_size: batch_size as usize,
            credential,
        })
    }
}
