use std::collections::HashSet;
use std::fmt;

use crate::service::ReservationRecord;

/// Reservations gained and lost between two snapshots, compared by video id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReservationDiff<'a> {
    pub added: Vec<&'a ReservationRecord>,
    pub removed: Vec<&'a ReservationRecord>,
}

impl ReservationDiff<'_> {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

pub fn diff<'a>(
    before: &'a [ReservationRecord],
    after: &'a [ReservationRecord],
) -> ReservationDiff<'a> {
    let before_ids: HashSet<&str> = before.iter().map(|ts| ts.vid.as_str()).collect();
    let after_ids: HashSet<&str> = after.iter().map(|ts| ts.vid.as_str()).collect();
    ReservationDiff {
        added: after
            .iter()
            .filter(|ts| !before_ids.contains(ts.vid.as_str()))
            .collect(),
        removed: before
            .iter()
            .filter(|ts| !after_ids.contains(ts.vid.as_str()))
            .collect(),
    }
}

impl fmt::Display for ReservationDiff<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for ts in &self.added {
            writeln!(f, "added: {}: {}", ts.vid, ts.title)?;
        }
        for ts in &self.removed {
            writeln!(f, "removed: {}: {}", ts.vid, ts.title)?;
        }
        Ok(())
    }
}
