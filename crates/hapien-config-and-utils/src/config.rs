//! Configuration management.
//!
//! Values come from `~/.hapien/config.json` when present, then environment
//! variables override them. The backend URL and publishable key are optional:
//! without them the app still runs, it just cannot see any profile records.

use crate::{CoreError, CoreResult, Paths};
use serde::{Deserialize, Serialize};
use std::path::Path;
use url::Url;

/// Default log level.
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Default web app origin used to build navigation URLs.
pub const DEFAULT_APP_URL: &str = "https://hapien.app";

const ENV_LOG_LEVEL: &str = "HAPIEN_LOG_LEVEL";
const ENV_SUPABASE_URL: &str = "HAPIEN_SUPABASE_URL";
const ENV_SUPABASE_PUBLISHABLE_KEY: &str = "HAPIEN_SUPABASE_PUBLISHABLE_KEY";
const ENV_APP_URL: &str = "HAPIEN_APP_URL";
const ENV_SESSION_STORAGE: &str = "HAPIEN_SESSION_STORAGE";

/// Where the auth session is persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStorageKind {
    /// OS keychain, falling back to the session file when unavailable.
    #[default]
    Keychain,
    /// Owner-only JSON file at `~/.hapien/session.json`.
    File,
}

impl std::str::FromStr for SessionStorageKind {
    type Err = CoreError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "keychain" => Ok(Self::Keychain),
            "file" => Ok(Self::File),
            other => Err(CoreError::Config(format!(
                "Unknown session storage '{}' (expected keychain or file)",
                other
            ))),
        }
    }
}

/// Backend endpoint and public API key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceCredentials {
    /// Supabase project URL, without a trailing slash.
    pub url: String,
    /// Supabase publishable (anon) key.
    pub publishable_key: String,
}

/// Application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Supabase project URL.
    #[serde(default)]
    pub supabase_url: Option<String>,
    /// Supabase publishable API key (public, safe to expose).
    #[serde(default)]
    pub supabase_publishable_key: Option<String>,
    /// Web app origin for navigation targets.
    #[serde(default = "default_app_url")]
    pub app_url: String,
    /// Session persistence backend.
    #[serde(default)]
    pub session_storage: SessionStorageKind,
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

fn default_app_url() -> String {
    DEFAULT_APP_URL.to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            supabase_url: None,
            supabase_publishable_key: None,
            app_url: default_app_url(),
            session_storage: SessionStorageKind::default(),
        }
    }
}

impl Config {
    /// Defaults overridden from the environment.
    pub fn new() -> Self {
        let mut config = Self::default();
        config.load_from_env(|name| std::env::var(name).ok());
        config
    }

    /// Load from the config file if it exists, then apply environment overrides.
    pub fn load(paths: &Paths) -> CoreResult<Self> {
        let config_path = paths.config_file();

        let mut config = if config_path.exists() {
            Self::load_from_file(&config_path)?
        } else {
            Self::default()
        };

        config.load_from_env(|name| std::env::var(name).ok());
        Ok(config)
    }

    /// Load configuration from a specific file.
    pub fn load_from_file(path: &Path) -> CoreResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to the config file.
    pub fn save(&self, paths: &Paths) -> CoreResult<()> {
        paths.ensure_dirs()?;
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(paths.config_file(), content)?;
        Ok(())
    }

    /// Apply overrides from a variable lookup. Blank values are ignored.
    fn load_from_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |name: &str| lookup(name).and_then(non_empty);

        if let Some(level) = read(ENV_LOG_LEVEL) {
            self.log_level = level;
        }
        if let Some(url) = read(ENV_SUPABASE_URL) {
            self.supabase_url = Some(url);
        }
        if let Some(key) = read(ENV_SUPABASE_PUBLISHABLE_KEY) {
            self.supabase_publishable_key = Some(key);
        }
        if let Some(app_url) = read(ENV_APP_URL) {
            self.app_url = app_url;
        }
        if let Some(raw) = read(ENV_SESSION_STORAGE) {
            match raw.parse() {
                Ok(kind) => self.session_storage = kind,
                Err(e) => tracing::warn!(error = %e, "Ignoring {}", ENV_SESSION_STORAGE),
            }
        }
    }

    /// Backend credentials, if both values are configured.
    pub fn credentials(&self) -> Option<ServiceCredentials> {
        let url = self.supabase_url.clone().and_then(non_empty)?;
        let publishable_key = self.supabase_publishable_key.clone().and_then(non_empty)?;

        Some(ServiceCredentials {
            url: url.trim_end_matches('/').to_string(),
            publishable_key,
        })
    }

    /// Parsed web app origin.
    pub fn app_url(&self) -> CoreResult<Url> {
        Url::parse(&self.app_url).map_err(CoreError::from)
    }

    /// Absolute URL for an app path such as `/feed`.
    pub fn app_link(&self, path: &str) -> CoreResult<Url> {
        Ok(self.app_url()?.join(path)?)
    }
}

fn non_empty(raw: String) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}
