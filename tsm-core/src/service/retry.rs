use std::future::Future;

use tracing::{debug, warn};

use super::{ContentService, ServiceError, ServiceResult};

/// Runs `operation`, logging in and retrying exactly once if the session has expired.
///
/// Without stored credentials a `LoginRequired` failure is returned as is.
/// If the retried call still reports `LoginRequired`, the login is considered
/// to have failed. Any other failure of either attempt is returned unchanged.
pub async fn with_login_retry<S, F, Fut, T>(service: &S, mut operation: F) -> ServiceResult<T>
where
    S: ContentService + ?Sized,
    F: FnMut() -> Fut,
    Fut: Future<Output = ServiceResult<T>>,
{
    match operation().await {
        Err(ServiceError::LoginRequired) if service.has_credentials() => {
            debug!("session is not authenticated, logging in");
        }
        outcome => return outcome,
    }

    service.login().await?;

    match operation().await {
        Err(ServiceError::LoginRequired) => {
            warn!("still unauthenticated after a successful login");
            Err(ServiceError::LoginFailed(
                "session was rejected right after login".to_string(),
            ))
        }
        outcome => outcome,
    }
}
