use std::sync::{PoisonError, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, Local};
use reqwest::header::{COOKIE, DATE, SET_COOKIE};
use reqwest::{redirect, Method, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::{debug, info, trace};
use url::Url;

use super::session::SESSION_COOKIE;
use super::{
    ContentRecord, ContentService, ReservationRecord, SearchRequest, ServiceError, ServiceResult,
    Session,
};

pub const DEFAULT_USER_AGENT: &str = concat!("tsm/", env!("CARGO_PKG_VERSION"));

/// Base URLs of the niconico services the client talks to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceEndpoints {
    pub account: Url,
    pub search: Url,
    pub live: Url,
    pub live_api: Url,
    pub channel: Url,
}

impl Default for ServiceEndpoints {
    fn default() -> Self {
        Self {
            account: endpoint("https://account.nicovideo.jp/"),
            search: endpoint("https://api.search.nicovideo.jp/"),
            live: endpoint("https://live.nicovideo.jp/"),
            live_api: endpoint("https://live2.nicovideo.jp/"),
            channel: endpoint("https://ch.nicovideo.jp/"),
        }
    }
}

fn endpoint(base: &str) -> Url {
    Url::parse(base).expect("valid endpoint url")
}

#[derive(Debug, Clone, Default)]
pub struct ClientOptions {
    pub timeout: Option<Duration>,
    pub user_agent: Option<String>,
    /// Sent as `_context` with every search so the operator can identify the caller.
    pub context: Option<String>,
    pub endpoints: ServiceEndpoints,
}

/// HTTP implementation of [`ContentService`] for niconico live.
pub struct NiconicoClient {
    http: reqwest::Client,
    options: ClientOptions,
    session: RwLock<Session>,
}

impl NiconicoClient {
    pub fn new(session: Session, options: ClientOptions) -> ServiceResult<Self> {
        let user_agent = options
            .user_agent
            .clone()
            .unwrap_or_else(|| DEFAULT_USER_AGENT.to_string());
        let mut builder = reqwest::Client::builder()
            .user_agent(user_agent)
            .redirect(redirect::Policy::none());
        if let Some(timeout) = options.timeout {
            builder = builder.timeout(timeout);
        }
        let http = builder.build()?;
        Ok(Self {
            http,
            options,
            session: RwLock::new(session),
        })
    }

    /// Current session, including any cookie obtained by [`ContentService::login`].
    pub fn session(&self) -> Session {
        self.session
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        let mut request = self.http.request(method, url);
        if let Some(cookie) = self.session().cookie_header() {
            request = request.header(COOKIE, cookie);
        }
        request
    }

    fn store_cookie(&self, value: String) {
        let mut session = self
            .session
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        session.user_session = Some(value);
    }
}

#[async_trait]
impl ContentService for NiconicoClient {
    fn has_credentials(&self) -> bool {
        self.session
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .credentials
            .is_some()
    }

    async fn login(&self) -> ServiceResult<()> {
        let Some(credentials) = self.session().credentials else {
            return Err(ServiceError::LoginFailed(
                "no credentials configured".to_string(),
            ));
        };
        let url = self.options.endpoints.account.join("api/v1/login")?;
        let response = self
            .http
            .post(url)
            .form(&[
                ("mail_tel", credentials.mail.as_str()),
                ("password", credentials.password.as_str()),
            ])
            .send()
            .await?
            .error_for_status()?;

        let cookies = response
            .headers()
            .get_all(SET_COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok());
        let cookie = extract_session_cookie(cookies).ok_or_else(|| {
            ServiceError::LoginFailed("login response carried no session cookie".to_string())
        })?;
        self.store_cookie(cookie);
        info!(mail = %credentials.mail, "logged in");
        Ok(())
    }

    async fn search_page(
        &self,
        request: &SearchRequest,
        offset: usize,
    ) -> ServiceResult<Vec<ContentRecord>> {
        let url = self
            .options
            .endpoints
            .search
            .join(&format!("api/v2/{}/contents/search", request.service))?;
        let mut query = vec![
            ("q", request.q.clone()),
            ("targets", request.targets.join(",")),
            (
                "fields",
                request
                    .fields
                    .iter()
                    .map(String::as_str)
                    .collect::<Vec<_>>()
                    .join(","),
            ),
            ("_sort", request.sort.clone()),
            ("_offset", offset.to_string()),
            ("_limit", request.page_size.to_string()),
        ];
        if let Some(filter) = &request.filter {
            query.push(("jsonFilter", filter.to_json().to_string()));
        }
        if let Some(context) = &self.options.context {
            query.push(("_context", context.clone()));
        }
        trace!(offset, limit = request.page_size, "requesting search page");

        let response = self.request(Method::GET, url).query(&query).send().await?;
        let status = response.status();
        let body = response.text().await?;
        decode_search(status, &body)
    }

    async fn is_ppv(&self, content_id: &str, channel_id: &str) -> ServiceResult<bool> {
        let channel = if channel_id.starts_with("ch") {
            channel_id.to_string()
        } else {
            format!("ch{channel_id}")
        };
        let url = self
            .options
            .endpoints
            .channel
            .join(&format!("ppv_live/{channel}/{content_id}"))?;
        let status = self.request(Method::GET, url).send().await?.status();
        trace!(content_id, channel_id, %status, "pay-per-view lookup");
        if requires_login(status) {
            Err(ServiceError::LoginRequired)
        } else if status.is_success() {
            Ok(true)
        } else if status == StatusCode::NOT_FOUND {
            Ok(false)
        } else {
            Err(ServiceError::InvalidResponse(format!(
                "pay-per-view lookup of {content_id} returned {status}"
            )))
        }
    }

    async fn reservation_list(&self) -> ServiceResult<Vec<ReservationRecord>> {
        let url = self
            .options
            .endpoints
            .live_api
            .join("api/v2/timeshift/reservations")?;
        let response = self.request(Method::GET, url).send().await?;
        let status = response.status();
        if requires_login(status) {
            return Err(ServiceError::LoginRequired);
        }
        if !status.is_success() {
            return Err(ServiceError::InvalidResponse(format!(
                "reservation list returned {status}"
            )));
        }
        let body = response.text().await?;
        let reservations = decode_reservations(&body)?;
        debug!(count = reservations.len(), "fetched reservation list");
        Ok(reservations)
    }

    async fn register(&self, content_id: &str, overwrite: bool) -> ServiceResult<()> {
        let content_id = parse_content_id(content_id)?;
        let url = self
            .options
            .endpoints
            .live_api
            .join(&format!("api/v2/programs/{content_id}/timeshift/reservation"))?;
        let response = self
            .request(Method::POST, url)
            .form(&[("overwrite", overwrite.to_string())])
            .send()
            .await?;
        let status = response.status();
        if requires_login(status) {
            return Err(ServiceError::LoginRequired);
        }
        if status.is_success() {
            info!(content_id = %content_id, overwrite, "registered timeshift reservation");
            return Ok(());
        }
        let body = response.text().await?;
        Err(registration_error(&content_id, status.as_u16(), &body))
    }

    async fn server_time(&self) -> ServiceResult<DateTime<FixedOffset>> {
        let response = self
            .request(Method::HEAD, self.options.endpoints.live.clone())
            .send()
            .await?;
        let header = response
            .headers()
            .get(DATE)
            .ok_or_else(|| ServiceError::InvalidResponse("missing Date header".to_string()))?
            .to_str()
            .map_err(|err| ServiceError::InvalidResponse(format!("unreadable Date header: {err}")))?;
        parse_http_date(header)
    }
}

/// Normalizes a live program id to its `lv<digits>` form.
pub fn parse_content_id(value: &str) -> ServiceResult<String> {
    let digits = value.strip_prefix("lv").unwrap_or(value);
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(ServiceError::InvalidContentId(value.to_string()));
    }
    Ok(format!("lv{digits}"))
}

fn requires_login(status: StatusCode) -> bool {
    status == StatusCode::UNAUTHORIZED || status.is_redirection()
}

fn extract_session_cookie<'a>(set_cookies: impl Iterator<Item = &'a str>) -> Option<String> {
    set_cookies
        .filter_map(|cookie| cookie.split(';').next())
        .filter_map(|pair| pair.trim().strip_prefix(SESSION_COOKIE)?.strip_prefix('='))
        .find(|value| !value.is_empty() && *value != "deleted")
        .map(str::to_string)
}

fn parse_http_date(value: &str) -> ServiceResult<DateTime<FixedOffset>> {
    let at = DateTime::parse_from_rfc2822(value)
        .map_err(|err| ServiceError::InvalidResponse(format!("invalid Date header {value:?}: {err}")))?;
    Ok(at.with_timezone(&Local).fixed_offset())
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    meta: SearchMeta,
    #[serde(default)]
    data: Vec<ContentRecord>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchMeta {
    status: u16,
    #[serde(default)]
    error_code: Option<String>,
    #[serde(default)]
    error_message: Option<String>,
}

fn decode_search(status: StatusCode, body: &str) -> ServiceResult<Vec<ContentRecord>> {
    let payload: SearchResponse =
        serde_json::from_str(body).map_err(|err| ServiceError::ContentSearch {
            status: status.as_u16(),
            code: "INVALID_RESPONSE".to_string(),
            message: err.to_string(),
        })?;
    if payload.meta.status != 200 {
        return Err(ServiceError::ContentSearch {
            status: payload.meta.status,
            code: payload.meta.error_code.unwrap_or_default(),
            message: payload.meta.error_message.unwrap_or_default(),
        });
    }
    Ok(payload.data)
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LiveApiMeta {
    #[serde(default)]
    error_code: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LiveApiResponse<T> {
    #[serde(default)]
    meta: LiveApiMeta,
    data: Option<T>,
}

#[derive(Debug, Deserialize)]
struct ReservationsData {
    #[serde(default)]
    items: Vec<WireReservation>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireReservation {
    program_id: String,
    #[serde(default)]
    title: String,
}

fn decode_live_api<T: DeserializeOwned>(body: &str) -> ServiceResult<LiveApiResponse<T>> {
    serde_json::from_str(body)
        .map_err(|err| ServiceError::InvalidResponse(format!("malformed live api response: {err}")))
}

fn decode_reservations(body: &str) -> ServiceResult<Vec<ReservationRecord>> {
    let payload: LiveApiResponse<ReservationsData> = decode_live_api(body)?;
    let items = payload.data.map(|data| data.items).unwrap_or_default();
    Ok(items
        .into_iter()
        .map(|item| ReservationRecord::new(item.program_id, item.title))
        .collect())
}

/// Maps a rejected reservation onto the failure kinds the reservation loop distinguishes.
fn registration_error(content_id: &str, status: u16, body: &str) -> ServiceError {
    let code = decode_live_api::<serde_json::Value>(body)
        .ok()
        .and_then(|payload| payload.meta.error_code)
        .unwrap_or_default();
    let upper = code.to_uppercase();
    let id = content_id.to_string();
    if upper.contains("DUPLICATE") {
        ServiceError::TsAlreadyRegistered(id)
    } else if upper.contains("EXPIRED") {
        ServiceError::TsRegistrationExpired(id)
    } else if upper.contains("LIMIT") || upper.contains("OVERFLOW") || upper.contains("MAX") {
        ServiceError::TsMaxReservation(id)
    } else if upper.contains("NOT_SUPPORTED")
        || upper.contains("NOT_FOUND")
        || upper.contains("DISABLED")
        || upper.contains("NOT_ALLOWED")
    {
        ServiceError::TsNotSupported(id)
    } else {
        ServiceError::InvalidResponse(format!(
            "reservation of {content_id} rejected with status {status} ({code})"
        ))
    }
}
