//! Multi-tier TOML configuration for Rivulet.
//!
//! Reads connection defaults from multiple sources with precedence:
//! env vars > config file > defaults

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use rivulet_client::{EventSourceOptions, ReconnectConfig};
use rivulet_types::{ConfigError, CredentialsMode};
use serde::{Deserialize, Serialize};

/// Env var overriding the base reconnection delay, in milliseconds.
pub const ENV_RECONNECT_DELAY_MS: &str = "RIVULET_RECONNECT_DELAY_MS";

/// Env var overriding the maximum number of consecutive reconnection attempts.
pub const ENV_MAX_RECONNECT_ATTEMPTS: &str = "RIVULET_MAX_RECONNECT_ATTEMPTS";

/// Env var overriding the config directory.
pub const ENV_CONFIG_DIR: &str = "RIVULET_CONFIG_DIR";

/// Resolved configuration for event source connections.
#[derive(Debug, Clone)]
pub struct RivuletConfig {
    pub reconnect: ReconnectConfig,
    pub credentials: CredentialsMode,
    pub headers: BTreeMap<String, String>,
    pub config_dir: PathBuf,
}

/// Settings that can be read from a TOML config file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SettingsFile {
    #[serde(default)]
    pub reconnect: ReconnectSettings,
    #[serde(default)]
    pub request: RequestSettings,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReconnectSettings {
    pub delay_ms: Option<u64>,
    pub max_delay_ms: Option<u64>,
    pub backoff_factor: Option<f64>,
    pub jitter: Option<bool>,
    pub max_attempts: Option<u32>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RequestSettings {
    pub credentials: Option<CredentialsMode>,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
}

impl RivuletConfig {
    /// Load configuration from all sources, applying precedence rules.
    ///
    /// Precedence (highest to lowest):
    /// 1. Environment variables
    /// 2. Config file (`$RIVULET_CONFIG_DIR/config.toml` or `~/.rivulet/config.toml`)
    /// 3. Defaults
    pub fn load() -> Result<Self, ConfigError> {
        let config_dir = config_dir();
        let settings = load_settings_file(&config_dir.join("config.toml"));
        Self::resolve(settings, config_dir, |key| std::env::var(key).ok())
    }

    /// Load from an explicit config file, still honoring env overrides.
    ///
    /// Unlike [`load`](Self::load), a file that exists but fails to parse is
    /// an error.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let config_dir = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        let settings = read_settings_file(path)?.unwrap_or_default();
        Self::resolve(settings, config_dir, |key| std::env::var(key).ok())
    }

    fn resolve(
        settings: SettingsFile,
        config_dir: PathBuf,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let defaults = ReconnectConfig::default();

        // Resolve base delay: env > config file > default
        let initial_delay_ms = match env(ENV_RECONNECT_DELAY_MS) {
            Some(raw) => parse_env(ENV_RECONNECT_DELAY_MS, &raw)?,
            None => settings
                .reconnect
                .delay_ms
                .unwrap_or(defaults.initial_delay_ms),
        };

        // Resolve attempt limit: env > config file > unlimited
        let max_attempts = match env(ENV_MAX_RECONNECT_ATTEMPTS) {
            Some(raw) => Some(parse_env(ENV_MAX_RECONNECT_ATTEMPTS, &raw)?),
            None => settings.reconnect.max_attempts,
        };

        let backoff_factor = settings
            .reconnect
            .backoff_factor
            .unwrap_or(defaults.backoff_factor);
        if !backoff_factor.is_finite() || backoff_factor < 1.0 {
            return Err(ConfigError::InvalidValue {
                key: "reconnect.backoff_factor".into(),
                message: format!("must be a finite number >= 1.0, got {backoff_factor}"),
            });
        }

        let reconnect = ReconnectConfig {
            initial_delay_ms,
            max_delay_ms: settings
                .reconnect
                .max_delay_ms
                .unwrap_or(defaults.max_delay_ms),
            backoff_factor,
            jitter: settings.reconnect.jitter.unwrap_or(defaults.jitter),
            max_attempts,
        };

        Ok(RivuletConfig {
            reconnect,
            credentials: settings.request.credentials.unwrap_or_default(),
            headers: settings.request.headers,
            config_dir,
        })
    }

    /// Build connection options from the resolved configuration.
    pub fn event_source_options(&self) -> Result<EventSourceOptions, ConfigError> {
        let mut options = EventSourceOptions::new()
            .with_reconnect(self.reconnect.clone())
            .with_credentials(self.credentials);

        for (name, value) in &self.headers {
            options = options
                .with_header(name, value)
                .map_err(|e| ConfigError::InvalidValue {
                    key: format!("request.headers.{name}"),
                    message: e.to_string(),
                })?;
        }

        Ok(options)
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    raw.trim().parse().map_err(|e: T::Err| ConfigError::InvalidValue {
        key: key.to_string(),
        message: e.to_string(),
    })
}

/// Get the Rivulet config directory path (~/.rivulet/).
pub fn config_dir() -> PathBuf {
    if let Ok(dir) = std::env::var(ENV_CONFIG_DIR) {
        return PathBuf::from(dir);
    }
    dirs_next::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".rivulet")
}

/// Read and parse a TOML settings file. A missing file is `Ok(None)`.
fn read_settings_file(path: &Path) -> Result<Option<SettingsFile>, ConfigError> {
    let Ok(content) = std::fs::read_to_string(path) else {
        return Ok(None);
    };
    toml::from_str(&content)
        .map(Some)
        .map_err(|e| ConfigError::Parse {
            path: path.display().to_string(),
            message: e.to_string(),
        })
}

/// Load and parse a TOML settings file, returning defaults on any error.
fn load_settings_file(path: &Path) -> SettingsFile {
    match read_settings_file(path) {
        Ok(settings) => settings.unwrap_or_default(),
        Err(e) => {
            tracing::warn!("{e}");
            SettingsFile::default()
        }
    }
}
