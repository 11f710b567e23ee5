use std::io::{self, Write};

use chrono::{DateTime, FixedOffset, Local};
use tracing::{debug, error};

use crate::error::{RunError, RunResult};
use crate::filter::{compile, FilterSpec, QueryFilter};
use crate::reserve::{ReservationEngine, ReserveReport, WarningPolicy};
use crate::search::Searcher;
use crate::service::{with_login_retry, ContentService, ServiceResult, CONTENT_ID, TITLE};

/// Entry point of a run: searches and reserves against one service, reporting to two streams.
pub struct Machine<S, O = io::Stdout, E = io::Stderr> {
    service: S,
    filters: FilterSpec,
    overwrite: bool,
    warnings: WarningPolicy,
    page_size: usize,
    now: Option<DateTime<FixedOffset>>,
    stdout: O,
    stderr: E,
}

impl<S> Machine<S> {
    pub fn new(service: S, filters: FilterSpec) -> Self {
        Self {
            service,
            filters,
            overwrite: false,
            warnings: WarningPolicy::default(),
            page_size: crate::service::SearchRequest::DEFAULT_PAGE_SIZE,
            now: None,
            stdout: io::stdout(),
            stderr: io::stderr(),
        }
    }
}

impl<S, O, E> Machine<S, O, E> {
    pub fn with_output<O2, E2>(self, stdout: O2, stderr: E2) -> Machine<S, O2, E2> {
        Machine {
            service: self.service,
            filters: self.filters,
            overwrite: self.overwrite,
            warnings: self.warnings,
            page_size: self.page_size,
            now: self.now,
            stdout,
            stderr,
        }
    }

    /// Replace conflicting reservations instead of failing on them.
    pub fn with_overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }

    pub fn with_warnings(mut self, warnings: WarningPolicy) -> Self {
        self.warnings = warnings;
        self
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Pins "now" instead of asking the service for its clock.
    pub fn with_now(mut self, now: DateTime<FixedOffset>) -> Self {
        self.now = Some(now);
        self
    }

    pub fn service(&self) -> &S {
        &self.service
    }

    pub fn stdout(&self) -> &O {
        &self.stdout
    }

    pub fn stderr(&self) -> &E {
        &self.stderr
    }
}

impl<S, O, E> Machine<S, O, E>
where
    S: ContentService,
    O: Write,
    E: Write,
{
    /// Prints up to `limit` matching programs as `<contentId>: <title>`.
    ///
    /// Returns the process status: 0 on success, 1 after a reported failure.
    pub async fn run_search_only(&mut self, limit: usize) -> RunResult<i32> {
        let result = self.search_only(limit).await;
        self.exit_status(result)
    }

    /// Reserves every matching program and prints the reservation changes.
    ///
    /// Returns the process status: 0 on success, 1 after a reported failure.
    pub async fn run_auto_reserve(&mut self) -> RunResult<i32> {
        let result = self.auto_reserve().await.map(|_| ());
        self.exit_status(result)
    }

    pub async fn search_only(&mut self, limit: usize) -> RunResult<()> {
        if limit == 0 {
            return Ok(());
        }
        let filter = query_filter(&self.service, &self.filters, &mut self.now).await?;
        let searcher =
            Searcher::new(&self.service, &self.filters, filter).with_page_size(self.page_size);
        let mut cursor = searcher.search([CONTENT_ID, TITLE]);
        for content in cursor.take(limit).await? {
            writeln!(
                self.stdout,
                "{}: {}",
                content.content_id().unwrap_or_default(),
                content.get_str(TITLE).unwrap_or_default()
            )?;
        }
        Ok(())
    }

    /// Snapshots the reservations, reserves every hit, snapshots again and prints the changes.
    pub async fn auto_reserve(&mut self) -> RunResult<ReserveReport> {
        let engine = ReservationEngine::new(&self.service, self.overwrite, self.warnings);
        let before = engine.snapshot().await?;

        let filter = query_filter(&self.service, &self.filters, &mut self.now).await?;
        let searcher =
            Searcher::new(&self.service, &self.filters, filter).with_page_size(self.page_size);
        let mut cursor = searcher.search([CONTENT_ID]);
        let stats = engine
            .reserve_all(&mut cursor, &before, &mut self.stderr)
            .await?;

        let after = engine.snapshot().await?;
        let report = ReserveReport {
            before,
            after,
            stats,
        };
        write!(self.stdout, "{}", report.diff())?;
        Ok(report)
    }

    fn exit_status(&mut self, result: RunResult<()>) -> RunResult<i32> {
        match result {
            Ok(()) => Ok(0),
            Err(RunError::Service(err)) if err.is_reportable() => {
                error!(error = %err, "run failed");
                writeln!(self.stderr, "error: {err}")?;
                Ok(1)
            }
            Err(err) => Err(err),
        }
    }
}

async fn query_filter<S>(
    service: &S,
    filters: &FilterSpec,
    now: &mut Option<DateTime<FixedOffset>>,
) -> RunResult<Option<QueryFilter>>
where
    S: ContentService + ?Sized,
{
    let now = if filters.needs_clock() {
        server_now(service, now).await?
    } else {
        // Only time ranges consult the clock.
        Local::now().fixed_offset()
    };
    Ok(compile(filters, &now)?)
}

/// Server clock, fetched on first use and reused for the rest of the run.
async fn server_now<S>(
    service: &S,
    cached: &mut Option<DateTime<FixedOffset>>,
) -> ServiceResult<DateTime<FixedOffset>>
where
    S: ContentService + ?Sized,
{
    if let Some(now) = *cached {
        return Ok(now);
    }
    let now = with_login_retry(service, || service.server_time()).await?;
    debug!(now = %now, "resolved server time");
    *cached = Some(now);
    Ok(now)
}
