use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::filter::FilterError;
use crate::service::ServiceError;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io { source: io::Error, path: PathBuf },
    #[error("failed to parse config {path}: {source}")]
    Parse {
        source: toml::de::Error,
        path: PathBuf,
    },
    #[error("invalid config {path}: {message}")]
    Invalid { path: PathBuf, message: String },
    #[error("failed to read jsonFilter {path}: {source}")]
    JsonFilterIo { source: io::Error, path: PathBuf },
    #[error("failed to parse jsonFilter {path}: {source}")]
    JsonFilter {
        source: serde_json::Error,
        path: PathBuf,
    },
}

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Failures that can end a search or reservation run.
#[derive(Debug, Error)]
pub enum RunError {
    #[error(transparent)]
    Service(#[from] ServiceError),
    #[error(transparent)]
    Filter(#[from] FilterError),
    #[error("failed to write report: {0}")]
    Io(#[from] io::Error),
}

pub type RunResult<T> = std::result::Result<T, RunError>;
