use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::error::{ConfigError, Result};
use crate::filter::{FilterSpec, RelativeOffset, TimeRange};
use crate::reserve::WarningPolicy;
use crate::service::{ClientOptions, CookieJar, Credentials};

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct TsmConfig {
    #[serde(default)]
    pub login: LoginSection,
    pub search: SearchSection,
    #[serde(default)]
    pub warn: WarnSection,
    #[serde(default)]
    pub misc: MiscSection,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct LoginSection {
    pub mail: Option<String>,
    pub password: Option<String>,
    pub cookie_jar: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SearchSection {
    pub q: String,
    #[serde(default = "FilterSpec::default_targets")]
    pub targets: Vec<String>,
    #[serde(default = "default_sort")]
    pub sort: String,
    pub json_filter: Option<PathBuf>,
    pub open_time_from: Option<RelativeOffset>,
    pub open_time_to: Option<RelativeOffset>,
    pub start_time_from: Option<RelativeOffset>,
    pub start_time_to: Option<RelativeOffset>,
    pub live_end_time_from: Option<RelativeOffset>,
    pub live_end_time_to: Option<RelativeOffset>,
    pub ppv: Option<bool>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct WarnSection {
    #[serde(default = "enabled")]
    pub ts_not_supported: bool,
    #[serde(default = "enabled")]
    pub ts_registration_expired: bool,
    #[serde(default = "enabled")]
    pub ts_max_reservation: bool,
}

impl Default for WarnSection {
    fn default() -> Self {
        Self {
            ts_not_supported: true,
            ts_registration_expired: true,
            ts_max_reservation: true,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct MiscSection {
    #[serde(default)]
    pub overwrite: bool,
    /// Per-request timeout in seconds.
    pub timeout: Option<f64>,
    pub user_agent: Option<String>,
    pub context: Option<String>,
}

fn default_sort() -> String {
    FilterSpec::DEFAULT_SORT.to_string()
}

fn enabled() -> bool {
    true
}

impl TsmConfig {
    pub fn credentials(&self) -> Option<Credentials> {
        match (&self.login.mail, &self.login.password) {
            (Some(mail), Some(password)) => Some(Credentials::new(mail, password)),
            _ => None,
        }
    }

    pub fn cookie_jar(&self) -> Option<CookieJar> {
        self.login.cookie_jar.as_ref().map(CookieJar::new)
    }

    pub fn warnings(&self) -> WarningPolicy {
        WarningPolicy {
            ts_not_supported: self.warn.ts_not_supported,
            ts_registration_expired: self.warn.ts_registration_expired,
            ts_max_reservation: self.warn.ts_max_reservation,
        }
    }

    pub fn client_options(&self) -> ClientOptions {
        ClientOptions {
            timeout: self.misc.timeout.map(Duration::from_secs_f64),
            user_agent: self.misc.user_agent.clone(),
            context: self.misc.context.clone(),
            ..ClientOptions::default()
        }
    }

    /// Builds the search filters, reading the `jsonFilter` file if one is configured.
    pub fn filter_spec(&self) -> Result<FilterSpec> {
        let search = &self.search;
        let json_filter = match &search.json_filter {
            Some(path) => Some(load_json_filter(path)?),
            None => None,
        };
        Ok(FilterSpec {
            q: search.q.clone(),
            targets: search.targets.clone(),
            sort: search.sort.clone(),
            json_filter,
            open_time: TimeRange {
                from: search.open_time_from.clone(),
                to: search.open_time_to.clone(),
            },
            start_time: TimeRange {
                from: search.start_time_from.clone(),
                to: search.start_time_to.clone(),
            },
            live_end_time: TimeRange {
                from: search.live_end_time_from.clone(),
                to: search.live_end_time_to.clone(),
            },
            ppv: search.ppv,
        })
    }

    fn validate(&self, path: &Path) -> Result<()> {
        let invalid = |message: &str| ConfigError::Invalid {
            path: path.to_path_buf(),
            message: message.to_string(),
        };
        if self.login.mail.is_some() != self.login.password.is_some() {
            return Err(invalid("login.mail and login.password must be set together"));
        }
        if self.search.targets.is_empty() {
            return Err(invalid("search.targets must not be empty"));
        }
        if let Some(timeout) = self.misc.timeout {
            if !timeout.is_finite() || timeout <= 0.0 {
                return Err(invalid("misc.timeout must be a positive number of seconds"));
            }
        }
        Ok(())
    }

    fn resolve_paths(&mut self, base_dir: &Path) {
        let resolve = |candidate: &PathBuf| -> PathBuf {
            if candidate.is_absolute() {
                candidate.clone()
            } else {
                base_dir.join(candidate)
            }
        };
        self.login.cookie_jar = self.login.cookie_jar.as_ref().map(resolve);
        self.search.json_filter = self.search.json_filter.as_ref().map(resolve);
    }
}

/// Loads and validates the TOML configuration. Relative paths inside it
/// resolve against the directory containing the file.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<TsmConfig> {
    let path = path.as_ref();
    let mut config: TsmConfig = load_toml(path)?;
    config.validate(path)?;
    let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
    config.resolve_paths(base_dir);
    Ok(config)
}

fn load_json_filter(path: &Path) -> Result<serde_json::Value> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::JsonFilterIo {
        source,
        path: path.to_path_buf(),
    })?;
    serde_json::from_str(&content).map_err(|source| ConfigError::JsonFilter {
        source,
        path: path.to_path_buf(),
    })
}

fn load_toml<T, P>(path: P) -> Result<T>
where
    T: DeserializeOwned,
    P: AsRef<Path>,
{
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        source,
        path: path.to_path_buf(),
    })?;
    toml::from_str(&content).map_err(|source| ConfigError::Parse {
        source,
        path: path.to_path_buf(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn write_config(dir: &Path, content: &str) -> PathBuf {
        let path = dir.join("config.toml");
        std::fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn load_fixture_config() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("../configs/tsm.toml");
        let config = load_config(&path).expect("fixture config should parse");
        assert_eq!(config.search.q, "ゲーム");
        assert!(config.credentials().is_some());
        assert!(config.misc.overwrite);

        let spec = config.filter_spec().expect("fixture jsonFilter should parse");
        assert!(spec.json_filter.is_some());
        assert!(spec.needs_clock());
        assert_eq!(spec.ppv, Some(false));
    }

    #[test]
    fn minimal_config_uses_defaults() {
        let dir = tempdir().unwrap();
        let path = write_config(dir.path(), "[search]\nq = \"news\"\n");
        let config = load_config(&path).unwrap();

        assert!(config.credentials().is_none());
        assert!(config.cookie_jar().is_none());
        assert_eq!(config.warnings(), WarningPolicy::default());
        assert!(!config.misc.overwrite);

        let spec = config.filter_spec().unwrap();
        assert_eq!(spec.targets, ["title", "description", "tags"]);
        assert_eq!(spec.sort, "+startTime");
        assert!(spec.json_filter.is_none());
        assert!(!spec.needs_clock());
        assert_eq!(spec.ppv, None);
    }

    #[test]
    fn relative_paths_resolve_against_config_dir() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("filter.json"), r#"{"type":"equal"}"#).unwrap();
        let path = write_config(
            dir.path(),
            r#"
[login]
mail = "mail@example.com"
password = "secret"
cookieJar = "cookies.json"

[search]
q = "news"
jsonFilter = "filter.json"
"#,
        );
        let config = load_config(&path).unwrap();
        assert_eq!(
            config.cookie_jar().unwrap().path(),
            dir.path().join("cookies.json")
        );
        let spec = config.filter_spec().unwrap();
        assert_eq!(spec.json_filter, Some(serde_json::json!({"type": "equal"})));
    }

    #[test]
    fn time_offsets_are_validated_on_load() {
        let dir = tempdir().unwrap();
        let path = write_config(
            dir.path(),
            "[search]\nq = \"news\"\nstartTimeFrom = \"tomorrow\"\n",
        );
        let err = load_config(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
        assert!(err.to_string().contains("invalid duration"));
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let dir = tempdir().unwrap();
        let path = write_config(dir.path(), "[search]\nq = \"news\"\nquery = \"typo\"\n");
        assert!(matches!(
            load_config(&path).unwrap_err(),
            ConfigError::Parse { .. }
        ));
    }

    #[test]
    fn half_specified_credentials_are_rejected() {
        let dir = tempdir().unwrap();
        let path = write_config(
            dir.path(),
            "[login]\nmail = \"mail@example.com\"\n\n[search]\nq = \"news\"\n",
        );
        assert!(matches!(
            load_config(&path).unwrap_err(),
            ConfigError::Invalid { .. }
        ));
    }

    #[test]
    fn non_positive_timeout_is_rejected() {
        let dir = tempdir().unwrap();
        let path = write_config(dir.path(), "[search]\nq = \"news\"\n\n[misc]\ntimeout = 0\n");
        assert!(matches!(
            load_config(&path).unwrap_err(),
            ConfigError::Invalid { .. }
        ));
    }

    #[test]
    fn missing_json_filter_is_reported_on_use() {
        let dir = tempdir().unwrap();
        let path = write_config(
            dir.path(),
            "[search]\nq = \"news\"\njsonFilter = \"absent.json\"\n",
        );
        let config = load_config(&path).unwrap();
        assert!(matches!(
            config.filter_spec().unwrap_err(),
            ConfigError::JsonFilterIo { .. }
        ));
    }

    #[test]
    fn warnings_can_be_disabled() {
        let dir = tempdir().unwrap();
        let path = write_config(
            dir.path(),
            "[search]\nq = \"news\"\n\n[warn]\ntsNotSupported = false\n",
        );
        let warnings = load_config(&path).unwrap().warnings();
        assert!(!warnings.ts_not_supported);
        assert!(warnings.ts_registration_expired);
        assert!(warnings.ts_max_reservation);
    }
}
