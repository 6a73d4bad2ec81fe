use std::collections::{HashMap, HashSet};

use crate::domain::{CommodityCode, CountryCode, TimePeriod, TradeRecord};
use crate::error::MatrixError;
use crate::failure_log::{LogEntry, LogStatus};
use crate::fetch::Accumulation;

/// Square reporter x partner table. Both axes share `labels`; cells are
/// stored row-major, row = reporter, column = partner.
#[derive(Debug, Clone, PartialEq)]
pub struct TradeMatrix {
    labels: Vec<String>,
    values: Vec<f64>,
}

impl TradeMatrix {
    pub fn zeros(labels: Vec<String>) -> Self {
        let size = labels.len();
        Self {
            labels,
            values: vec![0.0; size * size],
        }
    }

    pub fn from_rows(labels: Vec<String>, rows: Vec<Vec<f64>>) -> Result<Self, MatrixError> {
        let size = labels.len();
        if rows.len() != size || rows.iter().any(|row| row.len() != size) {
            return Err(MatrixError::InvalidArgument(format!(
                "matrix with {size} labels needs {size}x{size} values"
            )));
        }
        Ok(Self {
            labels,
            values: rows.into_iter().flatten().collect(),
        })
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn size(&self) -> usize {
        self.labels.len()
    }

    pub fn value(&self, row: usize, col: usize) -> f64 {
        self.values[row * self.size() + col]
    }

    pub fn row(&self, row: usize) -> &[f64] {
        let size = self.size();
        &self.values[row * size..(row + 1) * size]
    }

    /// Cell lookup by label; the first matching label wins.
    pub fn get(&self, reporter: &str, partner: &str) -> Option<f64> {
        let row = self.labels.iter().position(|label| label == reporter)?;
        let col = self.labels.iter().position(|label| label == partner)?;
        Some(self.value(row, col))
    }

    pub fn has_duplicate_labels(&self) -> bool {
        let mut seen = HashSet::with_capacity(self.labels.len());
        !self.labels.iter().all(|label| seen.insert(label.as_str()))
    }

    pub(crate) fn add(&mut self, row: usize, col: usize, value: f64) {
        let size = self.size();
        self.values[row * size + col] += value;
    }
}

/// Build the UN-labelled matrix for one period.
///
/// Rows follow `countries` order. A reporter without records gets a zero row
/// and a `no data` log entry; partners outside `countries` are dropped.
pub fn build_period(
    acc: &Accumulation,
    countries: &[CountryCode],
    commodity: &CommodityCode,
    period: TimePeriod,
) -> (TradeMatrix, Vec<LogEntry>) {
    let index = countries
        .iter()
        .enumerate()
        .map(|(idx, country)| (country.un_id.as_str(), idx))
        .collect::<HashMap<_, _>>();

    let mut by_reporter: HashMap<&str, Vec<&TradeRecord>> = HashMap::new();
    for record in acc.records().iter().filter(|record| record.period == period) {
        by_reporter
            .entry(record.reporter_un_id.as_str())
            .or_default()
            .push(record);
    }

    let mut matrix = TradeMatrix::zeros(
        countries
            .iter()
            .map(|country| country.un_id.clone())
            .collect(),
    );
    let mut log = Vec::new();

    for (row, reporter) in countries.iter().enumerate() {
        let Some(records) = by_reporter.get(reporter.un_id.as_str()) else {
            let message = acc
                .note(&reporter.un_id, period.year())
                .unwrap_or("no records for reporter");
            log.push(LogEntry::new(
                &reporter.name,
                &reporter.un_id,
                commodity.as_str(),
                period.to_string(),
                LogStatus::NoData,
                message,
            ));
            continue;
        };
        for record in records {
            if let Some(&col) = index.get(record.partner_un_id.as_str()) {
                matrix.add(row, col, record.net_weight);
            }
        }
    }

    (matrix, log)
}
