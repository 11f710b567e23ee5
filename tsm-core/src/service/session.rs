use std::fmt;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// Name of the cookie that carries an authenticated niconico session.
pub const SESSION_COOKIE: &str = "user_session";

#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub mail: String,
    pub password: String,
}

impl Credentials {
    pub fn new(mail: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            mail: mail.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("mail", &self.mail)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Authentication state shared by every request of a run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Session {
    pub credentials: Option<Credentials>,
    pub user_session: Option<String>,
}

impl Session {
    pub fn new(credentials: Option<Credentials>) -> Self {
        Self {
            credentials,
            user_session: None,
        }
    }

    pub fn with_cookie(mut self, user_session: Option<String>) -> Self {
        self.user_session = user_session;
        self
    }

    pub fn cookie_header(&self) -> Option<String> {
        self.user_session
            .as_ref()
            .map(|value| format!("{SESSION_COOKIE}={value}"))
    }
}

#[derive(Debug, Error)]
pub enum CookieJarError {
    #[error("failed to access cookie jar {path}: {source}")]
    Io { source: io::Error, path: PathBuf },
    #[error("malformed cookie jar {path}: {source}")]
    Format {
        source: serde_json::Error,
        path: PathBuf,
    },
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoredCookies {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    user_session: Option<String>,
}

/// Keeps the session cookie on disk between runs.
#[derive(Debug, Clone)]
pub struct CookieJar {
    path: PathBuf,
}

impl CookieJar {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the stored session cookie; a missing file is an empty jar.
    pub fn load(&self) -> Result<Option<String>, CookieJarError> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(CookieJarError::Io {
                    source,
                    path: self.path.clone(),
                })
            }
        };
        if content.trim().is_empty() {
            return Ok(None);
        }
        let stored: StoredCookies =
            serde_json::from_str(&content).map_err(|source| CookieJarError::Format {
                source,
                path: self.path.clone(),
            })?;
        debug!(path = %self.path.display(), found = stored.user_session.is_some(), "loaded cookie jar");
        Ok(stored.user_session)
    }

    pub fn save(&self, session: &Session) -> Result<(), CookieJarError> {
        let io_error = |source: io::Error| CookieJarError::Io {
            source,
            path: self.path.clone(),
        };
        let stored = StoredCookies {
            user_session: session.user_session.clone(),
        };
        let content = serde_json::to_string_pretty(&stored).map_err(|source| {
            CookieJarError::Format {
                source,
                path: self.path.clone(),
            }
        })?;

        let mut options = OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }
        let mut file = options.open(&self.path).map_err(io_error)?;
        file.write_all(content.as_bytes()).map_err(io_error)?;
        file.write_all(b"\n").map_err(io_error)?;
        debug!(path = %self.path.display(), "saved cookie jar");
        Ok(())
    }
}
