// Date-range filter resolution for incident queries
use chrono::{Datelike, Duration, Local, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown filter type: {0}")]
pub struct UnknownFilter(pub String);

/// Discrete date-filter selector from the dashboard filter bar
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DateFilter {
    Today,
    Yesterday,
    #[serde(rename = "last_7_days")]
    Last7Days,
    #[serde(rename = "last_30_days")]
    Last30Days,
    ThisMonth,
    LastMonth,
    CustomRange,
}

impl DateFilter {
    pub fn as_str(&self) -> &'static str {
        match self {
            DateFilter::Today => "today",
            DateFilter::Yesterday => "yesterday",
            DateFilter::Last7Days => "last_7_days",
            DateFilter::Last30Days => "last_30_days",
            DateFilter::ThisMonth => "this_month",
            DateFilter::LastMonth => "last_month",
            DateFilter::CustomRange => "custom_range",
        }
    }
}

impl fmt::Display for DateFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DateFilter {
    type Err = UnknownFilter;

    /// An unrecognized selector is a reported error, never a silent fallback
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "today" => Ok(DateFilter::Today),
            "yesterday" => Ok(DateFilter::Yesterday),
            "last_7_days" => Ok(DateFilter::Last7Days),
            "last_30_days" => Ok(DateFilter::Last30Days),
            "this_month" => Ok(DateFilter::ThisMonth),
            "last_month" => Ok(DateFilter::LastMonth),
            "custom_range" => Ok(DateFilter::CustomRange),
            other => Err(UnknownFilter(other.to_string())),
        }
    }
}

/// Inclusive start/end date pair for an incident query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn single(day: NaiveDate) -> Self {
        Self { start: day, end: day }
    }
}

/// Resolve a selector against today's local date
pub fn resolve(
    filter: DateFilter,
    custom_start: Option<NaiveDate>,
    custom_end: Option<NaiveDate>,
) -> DateRange {
    resolve_on(filter, Local::now().date_naive(), custom_start, custom_end)
}

/// Resolve a selector against an explicit reference date.
/// Month selectors use real calendar boundaries, not 30-day windows.
pub fn resolve_on(
    filter: DateFilter,
    reference: NaiveDate,
    custom_start: Option<NaiveDate>,
    custom_end: Option<NaiveDate>,
) -> DateRange {
    match filter {
        DateFilter::Today => DateRange::single(reference),
        DateFilter::Yesterday => DateRange::single(reference - Duration::days(1)),
        DateFilter::Last7Days => DateRange {
            start: reference - Duration::days(7),
            end: reference,
        },
        DateFilter::Last30Days => DateRange {
            start: reference - Duration::days(30),
            end: reference,
        },
        DateFilter::ThisMonth => DateRange {
            start: start_of_month(reference),
            end: reference,
        },
        DateFilter::LastMonth => previous_month(reference),
        DateFilter::CustomRange => DateRange {
            start: custom_start.unwrap_or(reference),
            end: custom_end.unwrap_or(reference),
        },
    }
}

fn start_of_month(date: NaiveDate) -> NaiveDate {
    date.with_day(1).unwrap_or(date)
}

fn previous_month(reference: NaiveDate) -> DateRange {
    let end = start_of_month(reference) - Duration::days(1);
    DateRange {
        start: start_of_month(end),
        end,
    }
}
