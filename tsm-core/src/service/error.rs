use thiserror::Error;

pub type ServiceResult<T> = Result<T, ServiceError>;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("login required")]
    LoginRequired,
    #[error("login failed: {0}")]
    LoginFailed(String),
    #[error("communication error: {0}")]
    Communication(String),
    #[error("timeout: {0}")]
    Timeout(String),
    #[error("contents search error: status {status}: {code}: {message}")]
    ContentSearch {
        status: u16,
        code: String,
        message: String,
    },
    #[error("invalid content id: {0}")]
    InvalidContentId(String),
    #[error("timeshift is not supported: {0}")]
    TsNotSupported(String),
    #[error("timeshift is already registered: {0}")]
    TsAlreadyRegistered(String),
    #[error("timeshift registration has expired: {0}")]
    TsRegistrationExpired(String),
    #[error("maximum number of timeshift reservations reached: {0}")]
    TsMaxReservation(String),
    #[error("unexpected response: {0}")]
    InvalidResponse(String),
}

impl ServiceError {
    /// Failures that end a run with a printed message and a non-zero status.
    ///
    /// A contents search rejected with status 400 means the query itself is
    /// malformed and is deliberately excluded.
    pub fn is_reportable(&self) -> bool {
        match self {
            ServiceError::LoginRequired
            | ServiceError::LoginFailed(_)
            | ServiceError::Communication(_)
            | ServiceError::Timeout(_) => true,
            ServiceError::ContentSearch { status, .. } => *status != 400,
            _ => false,
        }
    }
}

impl From<reqwest::Error> for ServiceError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ServiceError::Timeout(err.to_string())
        } else {
            ServiceError::Communication(err.to_string())
        }
    }
}

impl From<url::ParseError> for ServiceError {
    fn from(err: url::ParseError) -> Self {
        ServiceError::Communication(format!("invalid url: {err}"))
    }
}
