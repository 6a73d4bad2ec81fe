use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::info;

use crate::availability::{self, AvailabilityPlan, PlanSummary};
use crate::comtrade::ComtradeClient;
use crate::config::RunConfig;
use crate::domain::{CommodityCode, CountryCode, TimePeriod};
use crate::error::MatrixError;
use crate::failure_log::{FailureLog, LogEntry};
use crate::fetch::{self, Accumulation, CommodityRequest, RetryPolicy};
use crate::matrix::{self, TradeMatrix};
use crate::reconcile;
use crate::writer::MatrixWriter;

#[derive(Debug, Clone, Serialize)]
pub struct RunResult {
    pub plan: PlanSummary,
    pub commodities: Vec<CommodityResult>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CommodityResult {
    pub commodity: String,
    pub requests: usize,
    pub failed_batches: usize,
    pub empty_batches: usize,
    pub records: usize,
    pub files: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub message: String,
    pub elapsed: Option<Duration>,
}

pub trait ProgressSink {
    fn event(&self, event: ProgressEvent);
}

/// One reconciled matrix ready to be written, with the log entries its
/// assembly produced.
#[derive(Debug, Clone)]
pub struct PeriodMatrix {
    pub period: TimePeriod,
    pub matrix: TradeMatrix,
    pub log: Vec<LogEntry>,
}

pub struct App<C: ComtradeClient> {
    client: C,
    writer: MatrixWriter,
    retry: RetryPolicy,
}

impl<C: ComtradeClient> App<C> {
    pub fn new(client: C, writer: MatrixWriter) -> Self {
        Self {
            client,
            writer,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Query availability once and partition the run's country-year space.
    pub fn plan(
        &self,
        config: &RunConfig,
        countries: &[CountryCode],
        sink: &dyn ProgressSink,
    ) -> Result<AvailabilityPlan, MatrixError> {
        sink.event(ProgressEvent {
            message: "phase=Resolve; querying data availability".to_string(),
            elapsed: None,
        });
        let start = Instant::now();
        let records = self.retry.run(|| self.client.fetch_availability())?;
        let plan = availability::resolve(
            &records,
            countries,
            &config.years(),
            config.temporal_resolution.into(),
        );
        let summary = plan.summary();
        info!(
            annual = summary.annual,
            monthly = summary.monthly,
            no_data = summary.no_data,
            "availability resolved"
        );
        sink.event(ProgressEvent {
            message: format!(
                "availability annual={} monthly={} no_data={}",
                summary.annual, summary.monthly, summary.no_data
            ),
            elapsed: Some(start.elapsed()),
        });
        Ok(plan)
    }

    pub fn run(
        &self,
        config: &RunConfig,
        countries: &[CountryCode],
        log: &mut dyn FailureLog,
        sink: &dyn ProgressSink,
    ) -> Result<RunResult, MatrixError> {
        self.writer.ensure_output_dir()?;
        let plan = self.plan(config, countries, sink)?;
        let mut commodities = Vec::with_capacity(config.commodities.len());
        for commodity in &config.commodities {
            commodities.push(self.run_commodity(config, countries, &plan, commodity, log, sink)?);
        }
        Ok(RunResult {
            plan: plan.summary(),
            commodities,
        })
    }

    fn run_commodity(
        &self,
        config: &RunConfig,
        countries: &[CountryCode],
        plan: &AvailabilityPlan,
        commodity: &CommodityCode,
        log: &mut dyn FailureLog,
        sink: &dyn ProgressSink,
    ) -> Result<CommodityResult, MatrixError> {
        sink.event(ProgressEvent {
            message: format!("phase=Fetch; commodity {commodity}"),
            elapsed: None,
        });
        let start = Instant::now();
        let years = config.years();
        let request = CommodityRequest {
            commodity,
            countries,
            years: &years,
            frequency: config.temporal_resolution,
            country_batch_size: config.country_batch_size,
            credential: config.credential.as_deref(),
        };
        let (acc, stats) = fetch::fetch_commodity(&self.client, &self.retry, plan, &request, log)?;
        sink.event(ProgressEvent {
            message: format!(
                "comtrade.response requests={} failed={} records={}",
                stats.requests,
                stats.failed,
                acc.len()
            ),
            elapsed: Some(start.elapsed()),
        });

        sink.event(ProgressEvent {
            message: format!("phase=Assemble; commodity {commodity}"),
            elapsed: None,
        });
        let periods = TimePeriod::expand(&years, config.temporal_resolution);
        let mut files = Vec::with_capacity(periods.len());
        for period in periods {
            let assembled = assemble(&acc, countries, commodity, period)?;
            for entry in assembled.log {
                log.record(entry)?;
            }
            let path = self.writer.write(commodity, period, &assembled.matrix)?;
            info!(%commodity, %period, path = %path, "matrix written");
            files.push(path.to_string());
        }
        sink.event(ProgressEvent {
            message: format!("phase=Store; commodity {commodity} wrote {} files", files.len()),
            elapsed: Some(start.elapsed()),
        });

        Ok(CommodityResult {
            commodity: commodity.to_string(),
            requests: stats.requests,
            failed_batches: stats.failed,
            empty_batches: stats.empty,
            records: acc.len(),
            files,
        })
    }
}

/// Build and reconcile the matrix of one period. Pure: the same accumulation
/// and crosswalk always give the same matrix.
pub fn assemble(
    acc: &Accumulation,
    countries: &[CountryCode],
    commodity: &CommodityCode,
    period: TimePeriod,
) -> Result<PeriodMatrix, MatrixError> {
    let (raw, log) = matrix::build_period(acc, countries, commodity, period);
    let matrix = reconcile::reconcile(&raw, countries)?;
    Ok(PeriodMatrix {
        period,
        matrix,
        log,
    })
}
