// Report settings
// Loaded from ~/.config/kwreport/config.toml (or --config PATH)

use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_OUTPUT: &str = "gsc_keyword_report.csv";
pub const DEFAULT_API_BASE: &str = "https://searchconsole.googleapis.com";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config {path}: {message}")]
    Parse { path: PathBuf, message: String },
}

/// Credential file locations. Paths here count as explicitly supplied.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AuthSettings {
    pub service_account: Option<PathBuf>,
    pub delegated_user: Option<String>,
    pub oauth_client: Option<PathBuf>,
}

/// Exact-match phase pacing: pause `pause_ms` after every `batch` lookups.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PacingSettings {
    pub batch: usize,
    pub pause_ms: u64,
}

impl Default for PacingSettings {
    fn default() -> Self {
        Self {
            batch: 50,
            pause_ms: 1000,
        }
    }
}

impl PacingSettings {
    pub fn pause(&self) -> Duration {
        Duration::from_millis(self.pause_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HttpSettings {
    pub timeout_secs: u64,
    /// Retries for the single bulk request.
    pub bulk_retries: u32,
    /// Retries per exact-match lookup.
    pub exact_retries: u32,
    pub api_base: String,
    /// Replaces the token endpoint named in credential files.
    pub token_uri_override: Option<String>,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            bulk_retries: 3,
            exact_retries: 1,
            api_base: DEFAULT_API_BASE.to_string(),
            token_uri_override: None,
        }
    }
}

impl HttpSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    pub property: Option<String>,
    pub output: PathBuf,
    pub row_limit: u32,
    /// `first`, `detect`, or a header name.
    pub keyword_column: String,
    /// Report the last N days when no dates are given on the command line.
    pub days: Option<u32>,
    pub auth: AuthSettings,
    pub pacing: PacingSettings,
    pub http: HttpSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            property: None,
            output: PathBuf::from(DEFAULT_OUTPUT),
            row_limit: 25_000,
            keyword_column: "first".to_string(),
            days: None,
            auth: AuthSettings::default(),
            pacing: PacingSettings::default(),
            http: HttpSettings::default(),
        }
    }
}

impl Settings {
    /// Default settings file path
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("kwreport")
            .join("config.toml")
    }

    /// Load settings.
    ///
    /// An explicit path must exist. Without one, the default path is used
    /// when present and built-in defaults otherwise.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        match explicit {
            Some(path) => Self::from_file(path),
            None => {
                let path = Self::config_path();
                if path.exists() {
                    Self::from_file(&path)
                } else {
                    tracing::debug!(path = %path.display(), "no config file, using defaults");
                    Ok(Self::default())
                }
            }
        }
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let settings = Self::parse(&contents).map_err(|message| ConfigError::Parse {
            path: path.to_path_buf(),
            message,
        })?;
        tracing::debug!(path = %path.display(), "config loaded");
        Ok(settings)
    }

    pub fn parse(contents: &str) -> Result<Self, String> {
        let settings: Self = toml::from_str(contents).map_err(|e| e.to_string())?;
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<(), String> {
        if self.row_limit == 0 {
            return Err("row_limit must be at least 1".into());
        }
        if self.days == Some(0) {
            return Err("days must be at least 1".into());
        }
        if self.pacing.batch == 0 {
            return Err("pacing.batch must be at least 1".into());
        }
        if self.http.api_base.trim().is_empty() {
            return Err("http.api_base must not be empty".into());
        }
        Ok(())
    }
}
