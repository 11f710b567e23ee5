use std::path::PathBuf;

use clap::Parser;
use thiserror::Error;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;
use tsm_core::{load_config, CookieJarError, Machine, NiconicoClient, Session};

pub type Result<T> = std::result::Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("config error: {0}")]
    Config(#[from] tsm_core::ConfigError),
    #[error("cookie jar error: {0}")]
    CookieJar(#[from] CookieJarError),
    #[error("{0}")]
    Service(#[from] tsm_core::ServiceError),
    #[error("{0}")]
    Run(#[from] tsm_core::RunError),
    #[error("no --config given and HOME is not set")]
    NoConfigPath,
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Reserve niconico live time-shifts matching a saved search", long_about = None)]
pub struct Cli {
    /// Configuration file (default: ~/.config/tsm/config.toml)
    #[arg(short, long)]
    pub config: Option<PathBuf>,
    /// Only print the first N search hits instead of reserving them
    #[arg(short, long, value_name = "N", num_args = 0..=1, default_missing_value = "10")]
    pub search: Option<usize>,
    /// Log debug output to stderr (RUST_LOG takes precedence)
    #[arg(short, long)]
    pub verbose: bool,
}

impl Cli {
    pub fn config_path(&self) -> Result<PathBuf> {
        if let Some(path) = &self.config {
            return Ok(path.clone());
        }
        let home = std::env::var_os("HOME").ok_or(AppError::NoConfigPath)?;
        Ok(PathBuf::from(home).join(".config/tsm/config.toml"))
    }
}

pub fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

/// Runs one search or auto-reserve pass and returns the process exit status.
pub async fn run(cli: Cli) -> Result<i32> {
    let path = cli.config_path()?;
    let config = load_config(&path)?;
    let filters = config.filter_spec()?;
    debug!(config = %path.display(), "configuration loaded");

    let jar = config.cookie_jar();
    let cookie = match &jar {
        Some(jar) => jar.load()?,
        None => None,
    };
    let session = Session::new(config.credentials()).with_cookie(cookie);
    let client = NiconicoClient::new(session, config.client_options())?;

    let mut machine = Machine::new(client, filters)
        .with_overwrite(config.misc.overwrite)
        .with_warnings(config.warnings());
    let outcome = match cli.search {
        Some(limit) => machine.run_search_only(limit).await,
        None => machine.run_auto_reserve().await,
    };

    // The session may have been refreshed even if the run failed.
    let saved = match &jar {
        Some(jar) => jar.save(&machine.service().session()).map(|()| {
            info!(path = %jar.path().display(), "session saved");
        }),
        None => Ok(()),
    };
    finish(outcome, saved)
}

/// Combines the run outcome with the session save; a failed run is reported first.
fn finish(
    outcome: tsm_core::RunResult<i32>,
    saved: std::result::Result<(), CookieJarError>,
) -> Result<i32> {
    match (outcome, saved) {
        (Ok(status), Ok(())) => Ok(status),
        (Ok(_), Err(err)) => Err(err.into()),
        (Err(err), Ok(())) => Err(err.into()),
        (Err(err), Err(save_err)) => {
            warn!(error = %save_err, "failed to save session");
            Err(err.into())
        }
    }
}
