use std::collections::{BTreeSet, VecDeque};

use tracing::{debug, trace};

use crate::filter::{FilterSpec, QueryFilter};
use crate::service::{
    with_login_retry, ContentRecord, ContentService, SearchRequest, ServiceResult, CHANNEL_ID,
    CONTENT_ID,
};

/// Turns a [`FilterSpec`] and its compiled filter into lazy searches.
pub struct Searcher<'a, S: ?Sized> {
    service: &'a S,
    spec: &'a FilterSpec,
    filter: Option<QueryFilter>,
    page_size: usize,
}

impl<'a, S> Searcher<'a, S>
where
    S: ContentService + ?Sized,
{
    pub fn new(service: &'a S, spec: &'a FilterSpec, filter: Option<QueryFilter>) -> Self {
        Self {
            service,
            spec,
            filter,
            page_size: SearchRequest::DEFAULT_PAGE_SIZE,
        }
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Fields to ask the service for: the caller's, plus whatever the client-side filters read.
    pub fn request_fields(&self, fields: &BTreeSet<String>) -> BTreeSet<String> {
        let mut requested = fields.clone();
        requested.insert(CONTENT_ID.to_string());
        if self.spec.ppv.is_some() {
            requested.insert(CHANNEL_ID.to_string());
        }
        requested
    }

    /// Starts a new search yielding records restricted to `fields`.
    pub fn search<I, F>(&self, fields: I) -> SearchCursor<'a, S>
    where
        I: IntoIterator<Item = F>,
        F: Into<String>,
    {
        let fields: BTreeSet<String> = fields.into_iter().map(Into::into).collect();
        let request = SearchRequest {
            q: self.spec.q.clone(),
            service: SearchRequest::LIVE_SERVICE.to_string(),
            targets: self.spec.targets.clone(),
            fields: self.request_fields(&fields),
            filter: self.filter.clone(),
            sort: self.spec.sort.clone(),
            page_size: self.page_size,
        };
        debug!(q = %request.q, fields = ?request.fields, ppv = ?self.spec.ppv, "starting contents search");
        SearchCursor {
            service: self.service,
            request,
            ppv: self.spec.ppv,
            fields,
            buffer: VecDeque::new(),
            offset: 0,
            exhausted: false,
        }
    }
}

/// A search in progress. Pages are fetched on demand as records are pulled.
pub struct SearchCursor<'a, S: ?Sized> {
    service: &'a S,
    request: SearchRequest,
    ppv: Option<bool>,
    fields: BTreeSet<String>,
    buffer: VecDeque<ContentRecord>,
    offset: usize,
    exhausted: bool,
}

impl<'a, S> SearchCursor<'a, S>
where
    S: ContentService + ?Sized,
{
    pub fn request(&self) -> &SearchRequest {
        &self.request
    }

    /// Next matching record, or `None` once the result set is exhausted.
    pub async fn next(&mut self) -> ServiceResult<Option<ContentRecord>> {
        loop {
            let Some(record) = self.next_unfiltered().await? else {
                return Ok(None);
            };
            if self.matches_ppv(&record).await? {
                return Ok(Some(record.project(&self.fields)));
            }
            trace!(content_id = ?record.content_id(), "pay-per-view status mismatch");
        }
    }

    /// Pulls up to `limit` matching records.
    pub async fn take(&mut self, limit: usize) -> ServiceResult<Vec<ContentRecord>> {
        let mut records = Vec::new();
        while records.len() < limit {
            match self.next().await? {
                Some(record) => records.push(record),
                None => break,
            }
        }
        Ok(records)
    }

    async fn next_unfiltered(&mut self) -> ServiceResult<Option<ContentRecord>> {
        if self.buffer.is_empty() && !self.exhausted {
            self.fetch_page().await?;
        }
        Ok(self.buffer.pop_front())
    }

    async fn fetch_page(&mut self) -> ServiceResult<()> {
        let service = self.service;
        let request = &self.request;
        let offset = self.offset;
        let page = with_login_retry(service, || service.search_page(request, offset)).await?;

        trace!(offset, received = page.len(), "fetched search page");
        if page.len() < self.request.page_size {
            self.exhausted = true;
        }
        self.offset += page.len();
        self.buffer.extend(page);
        Ok(())
    }

    async fn matches_ppv(&self, record: &ContentRecord) -> ServiceResult<bool> {
        let Some(expected) = self.ppv else {
            return Ok(true);
        };
        let is_ppv = match (record.content_id(), record.channel_id()) {
            (Some(content_id), Some(channel_id)) => {
                let service = self.service;
                with_login_retry(service, || service.is_ppv(content_id, &channel_id)).await?
            }
            _ => false,
        };
        Ok(is_ppv == expected)
    }
}
