//! Decides, once per run, which temporal resolution to request for every
//! (country, year) pair.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use serde::Serialize;
use tracing::warn;

use crate::comtrade::AvailabilityRecord;
use crate::domain::{CountryCode, Frequency, TimePeriod};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AvailabilityEntry {
    pub country: String,
    pub year: i32,
    pub annual_available: bool,
    pub all_months_available: bool,
    pub partial_months_available: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Resolution {
    Annual,
    Monthly,
    NoData,
}

impl Resolution {
    pub fn frequency(self) -> Option<Frequency> {
        match self {
            Resolution::Annual => Some(Frequency::Annual),
            Resolution::Monthly => Some(Frequency::Monthly),
            Resolution::NoData => None,
        }
    }
}

/// Resolutions the run asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Requested {
    pub annual: bool,
    pub monthly: bool,
}

impl From<Frequency> for Requested {
    fn from(frequency: Frequency) -> Self {
        Self {
            annual: frequency == Frequency::Annual,
            monthly: frequency == Frequency::Monthly,
        }
    }
}

impl AvailabilityEntry {
    pub fn resolve(&self, requested: Requested) -> Resolution {
        if requested.annual && self.annual_available {
            Resolution::Annual
        } else if requested.monthly && (self.all_months_available || self.partial_months_available)
        {
            Resolution::Monthly
        } else {
            Resolution::NoData
        }
    }
}

/// Country-year partition shared by every commodity of a run.
#[derive(Debug, Clone, Default)]
pub struct AvailabilityPlan {
    entries: BTreeMap<(String, i32), AvailabilityEntry>,
    resolutions: HashMap<(String, i32), Resolution>,
}

impl AvailabilityPlan {
    pub fn resolution(&self, country: &str, year: i32) -> Resolution {
        self.resolutions
            .get(&(country.to_string(), year))
            .copied()
            .unwrap_or(Resolution::NoData)
    }

    pub fn entry(&self, country: &str, year: i32) -> Option<&AvailabilityEntry> {
        self.entries.get(&(country.to_string(), year))
    }

    /// Countries, in `countries` order, planned at `resolution` for any of `years`.
    pub fn countries_for<'a>(
        &self,
        countries: &'a [CountryCode],
        years: &[i32],
        resolution: Resolution,
    ) -> Vec<&'a CountryCode> {
        countries
            .iter()
            .filter(|country| {
                years
                    .iter()
                    .any(|&year| self.resolution(&country.un_id, year) == resolution)
            })
            .collect()
    }

    pub fn summary(&self) -> PlanSummary {
        let mut summary = PlanSummary::default();
        for resolution in self.resolutions.values() {
            match resolution {
                Resolution::Annual => summary.annual += 1,
                Resolution::Monthly => summary.monthly += 1,
                Resolution::NoData => summary.no_data += 1,
            }
        }
        summary
    }

    pub fn entries(&self) -> impl Iterator<Item = &AvailabilityEntry> {
        self.entries.values()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PlanSummary {
    pub annual: usize,
    pub monthly: usize,
    pub no_data: usize,
}

/// Classify every target (country, year) pair from a single availability listing.
pub fn resolve(
    records: &[AvailabilityRecord],
    countries: &[CountryCode],
    years: &[i32],
    requested: Requested,
) -> AvailabilityPlan {
    let mut annual = BTreeSet::new();
    let mut months: HashMap<(String, i32), BTreeSet<u32>> = HashMap::new();

    for record in records {
        let period = match record.period.parse::<TimePeriod>() {
            Ok(period) => period,
            Err(err) => {
                warn!(reporter = %record.reporter, %err, "skipping availability row");
                continue;
            }
        };
        let frequency = match record.frequency.parse::<Frequency>() {
            Ok(frequency) => frequency,
            Err(err) => {
                warn!(reporter = %record.reporter, %err, "skipping availability row");
                continue;
            }
        };
        match (frequency, period) {
            (Frequency::Annual, TimePeriod::Year(year)) => {
                annual.insert((record.reporter.clone(), year));
            }
            (Frequency::Monthly, TimePeriod::Month(year, month)) => {
                months
                    .entry((record.reporter.clone(), year))
                    .or_default()
                    .insert(month);
            }
            _ => {
                warn!(
                    reporter = %record.reporter,
                    period = %record.period,
                    "availability period does not match its frequency"
                );
            }
        }
    }

    let mut plan = AvailabilityPlan::default();
    for country in countries {
        for &year in years {
            let key = (country.un_id.clone(), year);
            let month_count = months.get(&key).map(BTreeSet::len).unwrap_or(0);
            let entry = AvailabilityEntry {
                country: country.un_id.clone(),
                year,
                annual_available: annual.contains(&key),
                all_months_available: month_count == 12,
                partial_months_available: (1..12).contains(&month_count),
            };
            plan.resolutions.insert(key.clone(), entry.resolve(requested));
            plan.entries.insert(key, entry);
        }
    }
    plan
}
