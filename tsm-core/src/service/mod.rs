mod error;
mod niconico;
mod retry;
mod session;

use std::collections::BTreeSet;

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::filter::QueryFilter;

pub use error::{ServiceError, ServiceResult};
pub use niconico::{parse_content_id, ClientOptions, NiconicoClient, ServiceEndpoints};
pub use retry::with_login_retry;
pub use session::{CookieJar, CookieJarError, Credentials, Session, SESSION_COOKIE};

pub const CONTENT_ID: &str = "contentId";
pub const CHANNEL_ID: &str = "channelId";
pub const TITLE: &str = "title";

/// One hit of the contents search API, keyed by field name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentRecord(Map<String, Value>);

impl ContentRecord {
    pub fn new(fields: Map<String, Value>) -> Self {
        Self(fields)
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    pub fn get_str(&self, field: &str) -> Option<&str> {
        self.get(field).and_then(Value::as_str)
    }

    pub fn content_id(&self) -> Option<&str> {
        self.get_str(CONTENT_ID)
    }

    /// Channel of the program, if it belongs to one. The API reports it as a number or a string.
    pub fn channel_id(&self) -> Option<String> {
        match self.get(CHANNEL_ID)? {
            Value::String(id) if !id.is_empty() => Some(id.clone()),
            Value::Number(id) => Some(id.to_string()),
            _ => None,
        }
    }

    /// Keeps only the given fields.
    pub fn project(mut self, fields: &BTreeSet<String>) -> Self {
        self.0.retain(|name, _| fields.contains(name));
        self
    }

    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }
}

impl From<Value> for ContentRecord {
    fn from(value: Value) -> Self {
        match value {
            Value::Object(fields) => Self(fields),
            _ => Self::default(),
        }
    }
}

/// A time-shift reservation as listed by the service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReservationRecord {
    pub vid: String,
    pub title: String,
}

impl ReservationRecord {
    pub fn new(vid: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            vid: vid.into(),
            title: title.into(),
        }
    }
}

/// Parameters of one contents search, shared by every page request.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchRequest {
    pub q: String,
    pub service: String,
    pub targets: Vec<String>,
    pub fields: BTreeSet<String>,
    pub filter: Option<QueryFilter>,
    pub sort: String,
    pub page_size: usize,
}

impl SearchRequest {
    pub const LIVE_SERVICE: &'static str = "live";
    pub const DEFAULT_PAGE_SIZE: usize = 100;
}

/// The remote platform: search, reservations and the session behind them.
///
/// Any operation may fail with [`ServiceError::LoginRequired`]; callers wrap
/// them in [`with_login_retry`].
#[async_trait]
pub trait ContentService: Send + Sync {
    fn has_credentials(&self) -> bool;

    async fn login(&self) -> ServiceResult<()>;

    async fn search_page(
        &self,
        request: &SearchRequest,
        offset: usize,
    ) -> ServiceResult<Vec<ContentRecord>>;

    async fn is_ppv(&self, content_id: &str, channel_id: &str) -> ServiceResult<bool>;

    async fn reservation_list(&self) -> ServiceResult<Vec<ReservationRecord>>;

    async fn register(&self, content_id: &str, overwrite: bool) -> ServiceResult<()>;

    async fn server_time(&self) -> ServiceResult<DateTime<FixedOffset>>;
}
