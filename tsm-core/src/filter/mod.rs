mod duration;
mod query;

use std::fmt;

use serde_json::Value;
use thiserror::Error;

pub use duration::RelativeOffset;
pub use query::{compile, QueryFilter, RangeFilter};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FilterError {
    #[error("invalid duration: \"{0}\"")]
    InvalidDuration(String),
}

/// Time-anchored fields of a live program that can be filtered relative to "now".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimeField {
    OpenTime,
    StartTime,
    LiveEndTime,
}

impl TimeField {
    pub const ALL: [TimeField; 3] = [
        TimeField::OpenTime,
        TimeField::StartTime,
        TimeField::LiveEndTime,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TimeField::OpenTime => "openTime",
            TimeField::StartTime => "startTime",
            TimeField::LiveEndTime => "liveEndTime",
        }
    }
}

impl fmt::Display for TimeField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TimeRange {
    pub from: Option<RelativeOffset>,
    pub to: Option<RelativeOffset>,
}

impl TimeRange {
    pub fn is_empty(&self) -> bool {
        self.from.is_none() && self.to.is_none()
    }
}

/// What to search for and how to narrow it down, fixed for the whole run.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterSpec {
    pub q: String,
    pub targets: Vec<String>,
    pub sort: String,
    pub json_filter: Option<Value>,
    pub open_time: TimeRange,
    pub start_time: TimeRange,
    pub live_end_time: TimeRange,
    /// Keep only pay-per-view programs (`true`) or only free ones (`false`).
    pub ppv: Option<bool>,
}

impl FilterSpec {
    pub const DEFAULT_SORT: &'static str = "+startTime";

    pub fn default_targets() -> Vec<String> {
        vec!["title".into(), "description".into(), "tags".into()]
    }

    pub fn time_range(&self, field: TimeField) -> &TimeRange {
        match field {
            TimeField::OpenTime => &self.open_time,
            TimeField::StartTime => &self.start_time,
            TimeField::LiveEndTime => &self.live_end_time,
        }
    }

    /// Whether compiling these filters needs a reference "now".
    pub fn needs_clock(&self) -> bool {
        TimeField::ALL
            .iter()
            .any(|field| !self.time_range(*field).is_empty())
    }
}

impl Default for FilterSpec {
    fn default() -> Self {
        Self {
            q: String::new(),
            targets: Self::default_targets(),
            sort: Self::DEFAULT_SORT.to_string(),
            json_filter: None,
            open_time: TimeRange::default(),
            start_time: TimeRange::default(),
            live_end_time: TimeRange::default(),
            ppv: None,
        }
    }
}
