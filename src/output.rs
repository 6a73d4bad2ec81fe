use std::io::{self, Write};

use serde::Serialize;

use crate::app::{ProgressEvent, ProgressSink, RunResult};
use crate::availability::{AvailabilityEntry, AvailabilityPlan, PlanSummary, Resolution};

#[derive(Debug, Clone, Copy)]
pub enum OutputMode {
    Interactive,
    NonInteractive,
}

#[derive(Debug, Serialize)]
pub struct PlanReport<'a> {
    pub summary: PlanSummary,
    pub entries: Vec<PlanRow<'a>>,
}

#[derive(Debug, Serialize)]
pub struct PlanRow<'a> {
    #[serde(flatten)]
    pub entry: &'a AvailabilityEntry,
    pub resolution: Resolution,
}

impl<'a> PlanReport<'a> {
    pub fn new(plan: &'a AvailabilityPlan) -> Self {
        let entries = plan
            .entries()
            .map(|entry| PlanRow {
                entry,
                resolution: plan.resolution(&entry.country, entry.year),
            })
            .collect();
        Self {
            summary: plan.summary(),
            entries,
        }
    }
}

pub struct JsonOutput;

impl JsonOutput {
    pub fn print_run(result: &RunResult) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_plan(report: &PlanReport<'_>) -> io::Result<()> {
        Self::print_json(report)
    }

    fn print_json<T: Serialize>(value: &T) -> io::Result<()> {
        let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
        let mut stdout = io::stdout();
        stdout.write_all(json.as_bytes())?;
        stdout.write_all(b"\n")?;
        Ok(())
    }
}

impl ProgressSink for JsonOutput {
    fn event(&self, _event: ProgressEvent) {}
}

/// Progress lines on stderr for interactive runs.
pub struct StderrProgress;

impl ProgressSink for StderrProgress {
    fn event(&self, event: ProgressEvent) {
        match event.elapsed {
            Some(elapsed) => eprintln!("{} ({} ms)", event.message, elapsed.as_millis()),
            None => eprintln!("{}", event.message),
        }
    }
}
