//! Config load: voxgate.toml + env override for the path, defaults, validation.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::refresher::RefreshConfig;

const DEFAULT_DATABASE_PATH: &str = "voxgate.db";
const DEFAULT_CHECK_INTERVAL_MINUTES: u64 = 5;
const DEFAULT_EXPIRY_WINDOW_MINUTES: u64 = 15;
const DEFAULT_IDLE_TIMEOUT_MINUTES: u64 = 60;
const DEFAULT_SWEEP_INTERVAL_MINUTES: u64 = 5;

/// Root config: database path plus refresh and session timing sections.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Config {
    pub database_path: Option<String>,
    pub refresh: Option<RefreshSection>,
    pub session: Option<SessionSection>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct RefreshSection {
    pub check_interval_minutes: Option<u64>,
    pub expiry_window_minutes: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct SessionSection {
    pub idle_timeout_minutes: Option<u64>,
    pub sweep_interval_minutes: Option<u64>,
}

#[derive(Debug)]
pub enum ConfigError {
    Io(String),
    Parse(String),
    Validation(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(s) => write!(f, "config io: {}", s),
            ConfigError::Parse(s) => write!(f, "config parse: {}", s),
            ConfigError::Validation(s) => write!(f, "config validation: {}", s),
        }
    }
}

impl std::error::Error for ConfigError {}

/// `VOXGATE_CONFIG` if set, else `./voxgate.toml`.
pub fn default_config_path() -> PathBuf {
    std::env::var("VOXGATE_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("voxgate.toml"))
}

/// Load and validate config. A missing file yields the defaults.
pub fn load(path: &Path) -> Result<Config, ConfigError> {
    let cfg: Config = match std::fs::read_to_string(path) {
        Ok(s) => toml::from_str(&s).map_err(|e| ConfigError::Parse(e.to_string()))?,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Config::default(),
        Err(e) => return Err(ConfigError::Io(e.to_string())),
    };
    cfg.validate()?;
    Ok(cfg)
}

impl Config {
    fn validate(&self) -> Result<(), ConfigError> {
        if let Some(r) = &self.refresh {
            if r.check_interval_minutes == Some(0) {
                return Err(ConfigError::Validation(
                    "refresh.check-interval-minutes must be >= 1".into(),
                ));
            }
            if r.expiry_window_minutes == Some(0) {
                return Err(ConfigError::Validation(
                    "refresh.expiry-window-minutes must be >= 1".into(),
                ));
            }
        }
        if let Some(s) = &self.session {
            if s.idle_timeout_minutes == Some(0) || s.sweep_interval_minutes == Some(0) {
                return Err(ConfigError::Validation(
                    "session timers must be >= 1 minute".into(),
                ));
            }
        }
        Ok(())
    }

    pub fn database_path(&self) -> &str {
        self.database_path.as_deref().unwrap_or(DEFAULT_DATABASE_PATH)
    }

    pub fn refresh_config(&self) -> RefreshConfig {
        let check = self
            .refresh
            .as_ref()
            .and_then(|r| r.check_interval_minutes)
            .unwrap_or(DEFAULT_CHECK_INTERVAL_MINUTES);
        let window = self
            .refresh
            .as_ref()
            .and_then(|r| r.expiry_window_minutes)
            .unwrap_or(DEFAULT_EXPIRY_WINDOW_MINUTES);
        RefreshConfig {
            check_interval: Duration::from_secs(check * 60),
            expiry_window: Duration::from_secs(window * 60),
        }
    }

    pub fn idle_timeout(&self) -> Duration {
        let minutes = self
            .session
            .as_ref()
            .and_then(|s| s.idle_timeout_minutes)
            .unwrap_or(DEFAULT_IDLE_TIMEOUT_MINUTES);
        Duration::from_secs(minutes * 60)
    }

    pub fn sweep_interval(&self) -> Duration {
        let minutes = self
            .session
            .as_ref()
            .and_then(|s| s.sweep_interval_minutes)
            .unwrap_or(DEFAULT_SWEEP_INTERVAL_MINUTES);
        Duration::from_secs(minutes * 60)
    }
}
