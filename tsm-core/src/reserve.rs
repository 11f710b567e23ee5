use std::collections::HashSet;
use std::io::Write;
use std::time::Instant;

use serde::Serialize;
use tracing::{debug, info};

use crate::diff::{diff, ReservationDiff};
use crate::error::RunResult;
use crate::search::SearchCursor;
use crate::service::{with_login_retry, ContentService, ReservationRecord, ServiceError, ServiceResult};

/// Which skipped reservations are reported on the warning stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WarningPolicy {
    pub ts_not_supported: bool,
    pub ts_registration_expired: bool,
    pub ts_max_reservation: bool,
}

impl Default for WarningPolicy {
    fn default() -> Self {
        Self {
            ts_not_supported: true,
            ts_registration_expired: true,
            ts_max_reservation: true,
        }
    }
}

/// What the reservation loop does after a failed registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Skip { warn: bool },
    /// Every further attempt would fail the same way.
    Stop { warn: bool },
}

impl WarningPolicy {
    /// `None` means the failure is not a reservation outcome and must end the run.
    pub fn disposition(&self, error: &ServiceError) -> Option<Disposition> {
        match error {
            ServiceError::TsNotSupported(_) => Some(Disposition::Skip {
                warn: self.ts_not_supported,
            }),
            ServiceError::TsAlreadyRegistered(_) => Some(Disposition::Skip { warn: false }),
            ServiceError::TsRegistrationExpired(_) => Some(Disposition::Skip {
                warn: self.ts_registration_expired,
            }),
            ServiceError::TsMaxReservation(_) => Some(Disposition::Stop {
                warn: self.ts_max_reservation,
            }),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReserveStats {
    pub candidates: usize,
    pub already_reserved: usize,
    pub registered: usize,
    pub skipped: usize,
    pub warnings: usize,
    pub stopped_at_limit: bool,
    pub duration_ms: u64,
}

/// Reservation lists around one auto-reserve run.
#[derive(Debug, Clone)]
pub struct ReserveReport {
    pub before: Vec<ReservationRecord>,
    pub after: Vec<ReservationRecord>,
    pub stats: ReserveStats,
}

impl ReserveReport {
    pub fn diff(&self) -> ReservationDiff<'_> {
        diff(&self.before, &self.after)
    }
}

/// Reserves time-shift playback for every search hit not reserved yet.
pub struct ReservationEngine<'a, S: ?Sized> {
    service: &'a S,
    overwrite: bool,
    warnings: WarningPolicy,
}

impl<'a, S> ReservationEngine<'a, S>
where
    S: ContentService + ?Sized,
{
    pub fn new(service: &'a S, overwrite: bool, warnings: WarningPolicy) -> Self {
        Self {
            service,
            overwrite,
            warnings,
        }
    }

    pub async fn snapshot(&self) -> ServiceResult<Vec<ReservationRecord>> {
        let service = self.service;
        with_login_retry(service, || service.reservation_list()).await
    }

    /// Registers every hit of `cursor` missing from `before`.
    ///
    /// Warnings for skipped programs are written to `warnings`.
    pub async fn reserve_all<W: Write>(
        &self,
        cursor: &mut SearchCursor<'_, S>,
        before: &[ReservationRecord],
        warnings: &mut W,
    ) -> RunResult<ReserveStats> {
        let start = Instant::now();
        let reserved: HashSet<&str> = before.iter().map(|ts| ts.vid.as_str()).collect();
        let mut stats = ReserveStats::default();

        while let Some(content) = cursor.next().await? {
            let Some(content_id) = content.content_id() else {
                debug!("search hit without content id");
                continue;
            };
            stats.candidates += 1;
            if reserved.contains(content_id) {
                stats.already_reserved += 1;
                continue;
            }

            let service = self.service;
            let overwrite = self.overwrite;
            let error = match with_login_retry(service, || service.register(content_id, overwrite))
                .await
            {
                Ok(()) => {
                    stats.registered += 1;
                    continue;
                }
                Err(error) => error,
            };

            let Some(disposition) = self.warnings.disposition(&error) else {
                return Err(error.into());
            };
            let (warn, stop) = match disposition {
                Disposition::Skip { warn } => (warn, false),
                Disposition::Stop { warn } => (warn, true),
            };
            debug!(content_id, error = %error, stop, "reservation skipped");
            if warn {
                writeln!(warnings, "warning: {error}")?;
                stats.warnings += 1;
            }
            if stop {
                stats.stopped_at_limit = true;
                break;
            }
            stats.skipped += 1;
        }

        stats.duration_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);
        info!(
            candidates = stats.candidates,
            registered = stats.registered,
            skipped = stats.skipped,
            stopped_at_limit = stats.stopped_at_limit,
            "auto reservation finished"
        );
        Ok(stats)
    }
}
