use std::collections::HashMap;
use std::thread;
use std::time::Duration;

use tracing::{info, warn};

use crate::availability::{AvailabilityPlan, Resolution};
use crate::batch;
use crate::comtrade::{ComtradeClient, RawTradeEntry, TradeQuery};
use crate::domain::{CommodityCode, CountryCode, Frequency, TimePeriod, TradeRecord};
use crate::error::MatrixError;
use crate::failure_log::{FailureLog, LogEntry, LogStatus};

/// Years per request; the API rejects longer period lists.
pub const YEAR_BATCH_SIZE: usize = 5;

pub trait Backoff {
    fn delay(&self, attempt: usize) -> Duration;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoBackoff;

impl Backoff for NoBackoff {
    fn delay(&self, _attempt: usize) -> Duration {
        Duration::ZERO
    }
}

/// `base * (attempt + 1)`.
#[derive(Debug, Clone, Copy)]
pub struct LinearBackoff {
    pub base: Duration,
}

impl Backoff for LinearBackoff {
    fn delay(&self, attempt: usize) -> Duration {
        self.base * (attempt as u32 + 1)
    }
}

pub struct RetryPolicy {
    pub max_retries: usize,
    backoff: Box<dyn Backoff>,
}

impl RetryPolicy {
    pub fn new(max_retries: usize, backoff: impl Backoff + 'static) -> Self {
        Self {
            max_retries,
            backoff: Box::new(backoff),
        }
    }

    /// Run `op`, retrying transient failures up to `max_retries` times.
    pub fn run<T, F>(&self, mut op: F) -> Result<T, MatrixError>
    where
        F: FnMut() -> Result<T, MatrixError>,
    {
        let mut attempt = 0usize;
        loop {
            match op() {
                Ok(value) => return Ok(value),
                Err(err) if err.is_transient() && attempt < self.max_retries => {
                    let delay = self.backoff.delay(attempt);
                    warn!(attempt = attempt + 1, %err, "request failed, retrying");
                    if !delay.is_zero() {
                        thread::sleep(delay);
                    }
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(1, NoBackoff)
    }
}

/// Records fetched for one commodity, plus the message of the response (or
/// failure) that covered each (reporter, year).
#[derive(Debug, Clone, Default)]
pub struct Accumulation {
    records: Vec<TradeRecord>,
    notes: HashMap<(String, i32), String>,
}

impl Accumulation {
    pub fn from_records(records: Vec<TradeRecord>) -> Self {
        Self {
            records,
            notes: HashMap::new(),
        }
    }

    pub fn with_note(mut self, reporter: &str, year: i32, message: impl Into<String>) -> Self {
        self.notes
            .insert((reporter.to_string(), year), message.into());
        self
    }

    pub fn records(&self) -> &[TradeRecord] {
        &self.records
    }

    pub fn note(&self, reporter: &str, year: i32) -> Option<&str> {
        self.notes
            .get(&(reporter.to_string(), year))
            .map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

pub struct CommodityRequest<'a> {
    pub commodity: &'a CommodityCode,
    pub countries: &'a [CountryCode],
    pub years: &'a [i32],
    pub frequency: Frequency,
    pub country_batch_size: usize,
    pub credential: Option<&'a str>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FetchStats {
    pub requests: usize,
    pub failed: usize,
    pub empty: usize,
}

/// Pull every planned batch for one commodity.
///
/// Client errors never end the run. Transient ones are retried first, and a
/// batch that still fails is logged and skipped; its reporters simply have no
/// records in the returned accumulation.
pub fn fetch_commodity<C: ComtradeClient + ?Sized>(
    client: &C,
    retry: &RetryPolicy,
    plan: &AvailabilityPlan,
    request: &CommodityRequest<'_>,
    log: &mut dyn FailureLog,
) -> Result<(Accumulation, FetchStats), MatrixError> {
    let resolution = match request.frequency {
        Frequency::Annual => Resolution::Annual,
        Frequency::Monthly => Resolution::Monthly,
    };
    let commodity = request.commodity.as_str();
    let mut acc = Accumulation::default();
    let mut stats = FetchStats::default();

    for year_batch in batch::split(request.years, YEAR_BATCH_SIZE)? {
        for country in request.countries {
            for &year in &year_batch {
                if plan.resolution(&country.un_id, year) != resolution {
                    acc.notes.insert(
                        (country.un_id.clone(), year),
                        format!("no {} data available", request.frequency),
                    );
                }
            }
        }

        let planned = plan.countries_for(request.countries, &year_batch, resolution);
        let period_label = year_batch
            .iter()
            .map(|year| year.to_string())
            .collect::<Vec<_>>()
            .join(",");

        for country_batch in batch::split(&planned, request.country_batch_size)? {
            let query = TradeQuery {
                commodity: request.commodity.clone(),
                reporters: country_batch
                    .iter()
                    .map(|country| country.un_id.clone())
                    .collect(),
                years: year_batch.clone(),
                frequency: request.frequency,
                credential: request.credential.map(str::to_string),
            };
            let reporter_ids = query.reporters.join(",");
            let reporter_names = country_batch
                .iter()
                .map(|country| country.name.as_str())
                .collect::<Vec<_>>()
                .join(",");

            stats.requests += 1;
            let response = match retry.run(|| client.fetch_trade(&query)) {
                Ok(response) => response,
                Err(err) => {
                    stats.failed += 1;
                    warn!(
                        commodity,
                        reporters = %reporter_ids,
                        period = %period_label,
                        %err,
                        "batch failed, skipping"
                    );
                    let message = err.to_string();
                    log.record(LogEntry::new(
                        &reporter_names,
                        &reporter_ids,
                        commodity,
                        &period_label,
                        LogStatus::Fail,
                        &message,
                    ))?;
                    acc.note_batch(&query, &format!("fetch failed: {message}"));
                    continue;
                }
            };

            if response.records.is_empty() {
                stats.empty += 1;
                info!(
                    commodity,
                    reporters = %reporter_ids,
                    period = %period_label,
                    message = %response.validation_message,
                    "no data downloaded"
                );
                log.record(LogEntry::new(
                    &reporter_names,
                    &reporter_ids,
                    commodity,
                    &period_label,
                    LogStatus::NoData,
                    &response.validation_message,
                ))?;
                acc.note_batch(&query, &empty_note(&response.validation_message));
                continue;
            }

            acc.note_batch(&query, &empty_note(&response.validation_message));
            let before = acc.records.len();
            for entry in &response.records {
                if let Some(record) = accept(entry, &query, plan, resolution) {
                    acc.records.push(record);
                }
            }
            info!(
                commodity,
                reporters = %reporter_ids,
                period = %period_label,
                records = acc.records.len() - before,
                "batch downloaded"
            );
        }
    }

    Ok((acc, stats))
}

impl Accumulation {
    // Years a reporter was not planned for keep their availability note.
    fn note_batch(&mut self, query: &TradeQuery, message: &str) {
        for reporter in &query.reporters {
            for &year in &query.years {
                self.notes
                    .entry((reporter.clone(), year))
                    .or_insert_with(|| message.to_string());
            }
        }
    }
}

fn empty_note(validation_message: &str) -> String {
    if validation_message.trim().is_empty() {
        "no records returned".to_string()
    } else {
        validation_message.to_string()
    }
}

fn accept(
    entry: &RawTradeEntry,
    query: &TradeQuery,
    plan: &AvailabilityPlan,
    resolution: Resolution,
) -> Option<TradeRecord> {
    let period = match entry.period.parse::<TimePeriod>() {
        Ok(period) => period,
        Err(err) => {
            warn!(reporter = %entry.reporter, %err, "dropping record with bad period");
            return None;
        }
    };
    if period.frequency() != query.frequency
        || !query.years.contains(&period.year())
        || !query.reporters.contains(&entry.reporter)
        || plan.resolution(&entry.reporter, period.year()) != resolution
    {
        return None;
    }
    let net_weight = entry.net_weight.unwrap_or(0.0);
    if !net_weight.is_finite() || net_weight < 0.0 {
        warn!(
            reporter = %entry.reporter,
            partner = %entry.partner,
            net_weight,
            "dropping record with invalid net weight"
        );
        return None;
    }
    Some(TradeRecord {
        reporter_un_id: entry.reporter.clone(),
        partner_un_id: entry.partner.clone(),
        period,
        net_weight,
    })
}
