use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use chrono::{DateTime, Duration, TimeZone};
use regex::{Captures, Regex};
use serde::Deserialize;

use super::FilterError;

const UNITS: [(&str, fn(i64) -> Option<Duration>); 7] = [
    ("weeks", Duration::try_weeks),
    ("days", Duration::try_days),
    ("hours", Duration::try_hours),
    ("minutes", Duration::try_minutes),
    ("seconds", Duration::try_seconds),
    ("milliseconds", Duration::try_milliseconds),
    ("microseconds", microseconds),
];

fn microseconds(value: i64) -> Option<Duration> {
    Some(Duration::microseconds(value))
}

fn offset_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(concat!(
            r"^(?P<minus>-?)",
            r"(?:(?P<weeks>[0-9]+)w)?",
            r"(?:(?P<days>[0-9]+)d)?",
            r"(?:(?P<hours>[0-9]+)h)?",
            r"(?:(?P<minutes>[0-9]+)m)?",
            r"(?:(?P<seconds>[0-9]+)s)?",
            r"(?:(?P<milliseconds>[0-9]+)ms)?",
            r"(?:(?P<microseconds>[0-9]+)us)?$",
        ))
        .expect("valid regex")
    })
}

/// A signed duration relative to "now", written as `[-]<n>w<n>d<n>h<n>m<n>s<n>ms<n>us`.
///
/// Every component is optional but they must appear in that order with no
/// separators. The leading minus negates the whole duration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(try_from = "String")]
pub struct RelativeOffset {
    text: String,
    duration: Duration,
}

impl RelativeOffset {
    pub fn parse(text: &str) -> Result<Self, FilterError> {
        let invalid = || FilterError::InvalidDuration(text.to_string());
        let captures = offset_pattern().captures(text).ok_or_else(invalid)?;

        let mut duration = Duration::zero();
        for (unit, build) in UNITS {
            if let Some(component) = component(&captures, unit, build) {
                let component = component.ok_or_else(invalid)?;
                duration = duration.checked_add(&component).ok_or_else(invalid)?;
            }
        }
        if !captures["minus"].is_empty() {
            duration = -duration;
        }

        Ok(Self {
            text: text.to_string(),
            duration,
        })
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// Resolves the offset against `now`, failing if the result leaves chrono's range.
    pub fn resolve<Tz: TimeZone>(&self, now: &DateTime<Tz>) -> Result<DateTime<Tz>, FilterError> {
        now.clone()
            .checked_add_signed(self.duration)
            .ok_or_else(|| FilterError::InvalidDuration(self.text.clone()))
    }
}

fn component(
    captures: &Captures<'_>,
    unit: &str,
    build: fn(i64) -> Option<Duration>,
) -> Option<Option<Duration>> {
    let digits = captures.name(unit)?.as_str();
    Some(digits.parse::<i64>().ok().and_then(build))
}

impl FromStr for RelativeOffset {
    type Err = FilterError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::parse(value)
    }
}

impl TryFrom<String> for RelativeOffset {
    type Error = FilterError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl fmt::Display for RelativeOffset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}
