#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset};
use serde_json::Value;

use tsm_core::{
    ContentRecord, ContentService, ReservationRecord, SearchRequest, ServiceError, ServiceResult,
};

pub type ErrorFactory = fn(String) -> ServiceError;

#[derive(Default)]
pub struct MockState {
    pub credentials: bool,
    pub authenticated: bool,
    pub hits: Vec<ContentRecord>,
    pub ppv: HashSet<String>,
    pub reservations: Vec<ReservationRecord>,
    pub register_failures: HashMap<String, ErrorFactory>,
    pub search_failure: Option<fn() -> ServiceError>,
    pub server_time: Option<DateTime<FixedOffset>>,

    pub logins: usize,
    pub search_requests: Vec<(SearchRequest, usize)>,
    pub ppv_checks: Vec<String>,
    pub registered: Vec<(String, bool)>,
    pub time_requests: usize,
    /// Remote operations in the order they were served.
    pub calls: Vec<&'static str>,
}

/// In-memory stand-in for the remote platform.
///
/// When `authenticated` is false every call except `login` fails with
/// `LoginRequired`, mimicking an expired session.
pub struct MockService {
    state: Mutex<MockState>,
}

impl MockService {
    pub fn new(hits: Vec<Value>) -> Self {
        Self {
            state: Mutex::new(MockState {
                authenticated: true,
                hits: hits.into_iter().map(ContentRecord::from).collect(),
                ..MockState::default()
            }),
        }
    }

    pub fn with_reservations(self, reservations: &[(&str, &str)]) -> Self {
        self.state().reservations = reservations
            .iter()
            .map(|(vid, title)| ReservationRecord::new(*vid, *title))
            .collect();
        self
    }

    pub fn failing_registration(self, content_id: &str, error: ErrorFactory) -> Self {
        self.state()
            .register_failures
            .insert(content_id.to_string(), error);
        self
    }

    pub fn with_ppv(self, content_ids: &[&str]) -> Self {
        self.state()
            .ppv
            .extend(content_ids.iter().map(|id| id.to_string()));
        self
    }

    pub fn with_server_time(self, now: &str) -> Self {
        self.state().server_time = Some(DateTime::parse_from_rfc3339(now).unwrap());
        self
    }

    pub fn expired_session(self, credentials: bool) -> Self {
        {
            let mut state = self.state();
            state.authenticated = false;
            state.credentials = credentials;
        }
        self
    }

    pub fn failing_search(self, error: fn() -> ServiceError) -> Self {
        self.state().search_failure = Some(error);
        self
    }

    pub fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap()
    }

    fn authorize(&self) -> ServiceResult<MutexGuard<'_, MockState>> {
        let state = self.state();
        if state.authenticated {
            Ok(state)
        } else {
            Err(ServiceError::LoginRequired)
        }
    }
}

#[async_trait]
impl ContentService for MockService {
    fn has_credentials(&self) -> bool {
        self.state().credentials
    }

    async fn login(&self) -> ServiceResult<()> {
        let mut state = self.state();
        state.logins += 1;
        if !state.credentials {
            return Err(ServiceError::LoginFailed("no credentials".into()));
        }
        state.authenticated = true;
        Ok(())
    }

    async fn search_page(
        &self,
        request: &SearchRequest,
        offset: usize,
    ) -> ServiceResult<Vec<ContentRecord>> {
        let mut state = self.authorize()?;
        state.calls.push("search_page");
        state.search_requests.push((request.clone(), offset));
        if let Some(error) = state.search_failure {
            return Err(error());
        }
        Ok(state
            .hits
            .iter()
            .skip(offset)
            .take(request.page_size)
            .map(|hit| hit.clone().project(&request.fields))
            .collect())
    }

    async fn is_ppv(&self, content_id: &str, _channel_id: &str) -> ServiceResult<bool> {
        let mut state = self.authorize()?;
        state.ppv_checks.push(content_id.to_string());
        Ok(state.ppv.contains(content_id))
    }

    async fn reservation_list(&self) -> ServiceResult<Vec<ReservationRecord>> {
        let mut state = self.authorize()?;
        state.calls.push("reservation_list");
        Ok(state.reservations.clone())
    }

    async fn register(&self, content_id: &str, overwrite: bool) -> ServiceResult<()> {
        let mut state = self.authorize()?;
        state.registered.push((content_id.to_string(), overwrite));
        if let Some(error) = state.register_failures.get(content_id) {
            return Err(error(content_id.to_string()));
        }
        let title = state
            .hits
            .iter()
            .find(|hit| hit.content_id() == Some(content_id))
            .and_then(|hit| hit.get_str("title"))
            .unwrap_or_default()
            .to_string();
        state
            .reservations
            .push(ReservationRecord::new(content_id, title));
        Ok(())
    }

    async fn server_time(&self) -> ServiceResult<DateTime<FixedOffset>> {
        let mut state = self.authorize()?;
        state.calls.push("server_time");
        state.time_requests += 1;
        state
            .server_time
            .ok_or_else(|| ServiceError::InvalidResponse("no server time".into()))
    }
}

pub fn registered_ids(service: &MockService) -> Vec<String> {
    service
        .state()
        .registered
        .iter()
        .map(|(id, _)| id.clone())
        .collect()
}

pub fn output(buffer: &[u8]) -> String {
    String::from_utf8(buffer.to_vec()).unwrap()
}
