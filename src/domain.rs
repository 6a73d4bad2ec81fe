use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::error::MatrixError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Frequency {
    Annual,
    Monthly,
}

impl Frequency {
    /// Value of the `freq` query parameter.
    pub fn api_code(self) -> &'static str {
        match self {
            Frequency::Annual => "A",
            Frequency::Monthly => "M",
        }
    }
}

impl fmt::Display for Frequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Frequency::Annual => write!(f, "annual"),
            Frequency::Monthly => write!(f, "monthly"),
        }
    }
}

impl FromStr for Frequency {
    type Err = MatrixError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "annual" | "a" => Ok(Frequency::Annual),
            "monthly" | "m" => Ok(Frequency::Monthly),
            _ => Err(MatrixError::InvalidResolution(value.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CommodityCode(String);

impl CommodityCode {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CommodityCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for CommodityCode {
    type Err = MatrixError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim();
        let is_valid = !normalized.is_empty()
            && normalized
                .chars()
                .all(|ch| ch.is_ascii_alphanumeric() || ch == '.');
        if !is_valid {
            return Err(MatrixError::InvalidCommodity(value.to_string()));
        }
        Ok(Self(normalized.to_string()))
    }
}

/// A reporting period, either a calendar year or a single month.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimePeriod {
    Year(i32),
    Month(i32, u32),
}

impl TimePeriod {
    pub fn year(self) -> i32 {
        match self {
            TimePeriod::Year(year) | TimePeriod::Month(year, _) => year,
        }
    }

    pub fn frequency(self) -> Frequency {
        match self {
            TimePeriod::Year(_) => Frequency::Annual,
            TimePeriod::Month(_, _) => Frequency::Monthly,
        }
    }

    /// Every period of `frequency` covering `years`, in chronological order.
    pub fn expand(years: &[i32], frequency: Frequency) -> Vec<TimePeriod> {
        match frequency {
            Frequency::Annual => years.iter().map(|&year| TimePeriod::Year(year)).collect(),
            Frequency::Monthly => years
                .iter()
                .flat_map(|&year| (1..=12).map(move |month| TimePeriod::Month(year, month)))
                .collect(),
        }
    }

    fn sort_key(self) -> (i32, u32) {
        match self {
            TimePeriod::Year(year) => (year, 0),
            TimePeriod::Month(year, month) => (year, month),
        }
    }
}

impl Ord for TimePeriod {
    fn cmp(&self, other: &Self) -> Ordering {
        self.sort_key().cmp(&other.sort_key())
    }
}

impl PartialOrd for TimePeriod {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for TimePeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimePeriod::Year(year) => write!(f, "{year:04}"),
            TimePeriod::Month(year, month) => write!(f, "{year:04}{month:02}"),
        }
    }
}

impl FromStr for TimePeriod {
    type Err = MatrixError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        if !trimmed.chars().all(|ch| ch.is_ascii_digit()) {
            return Err(MatrixError::InvalidPeriod(value.to_string()));
        }
        let invalid = || MatrixError::InvalidPeriod(value.to_string());
        match trimmed.len() {
            4 => Ok(TimePeriod::Year(trimmed.parse().map_err(|_| invalid())?)),
            6 => {
                let year = trimmed[..4].parse().map_err(|_| invalid())?;
                let month: u32 = trimmed[4..].parse().map_err(|_| invalid())?;
                if !(1..=12).contains(&month) {
                    return Err(invalid());
                }
                Ok(TimePeriod::Month(year, month))
            }
            _ => Err(invalid()),
        }
    }
}

impl Serialize for TimePeriod {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Row of the UN numeric to ISO3 crosswalk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountryCode {
    pub un_id: String,
    pub iso3: String,
    pub name: String,
    pub valid_from: i32,
    pub valid_to: i32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TradeRecord {
    pub reporter_un_id: String,
    pub partner_un_id: String,
    pub period: TimePeriod,
    pub net_weight: f64,
}
