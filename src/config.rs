//! TOML configuration for cronlog.
//!
//! Lookup order: the `CRONLOG_CONFIG` environment variable, `./cronlog.toml`,
//! then compiled-in defaults. A config file that is named but unusable is an
//! error.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::clock::{parse_timezone, DEFAULT_TIMEZONE};

/// Environment variable naming an explicit config file.
pub const CONFIG_ENV: &str = "CRONLOG_CONFIG";

const LOCAL_CONFIG: &str = "cronlog.toml";

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CronLogConfig {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub clock: ClockConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl CronLogConfig {
    /// Load configuration from a TOML file at `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;
        let config: Self = toml::from_str(&content)
            .with_context(|| format!("failed to parse config file: {}", path.display()))?;
        info!(path = %path.display(), "loaded cronlog configuration");
        Ok(config)
    }

    /// Load from `$CRONLOG_CONFIG`, then `./cronlog.toml`, then defaults.
    ///
    /// A file that is named or present but unreadable is an error rather
    /// than a silent fallback.
    pub fn load_or_default() -> Result<Self> {
        let env_path = std::env::var_os(CONFIG_ENV).map(PathBuf::from);
        Self::resolve(env_path.as_deref(), Path::new(LOCAL_CONFIG))
    }

    fn resolve(env_path: Option<&Path>, local_path: &Path) -> Result<Self> {
        if let Some(path) = env_path {
            return Self::load(path)
                .with_context(|| format!("{} points at an unusable config", CONFIG_ENV));
        }

        if local_path.exists() {
            return Self::load(local_path);
        }

        debug!("no config file found, using compiled-in defaults");
        Ok(Self::default())
    }
}

/// Where the `cron_log` table lives.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Path to the SQLite database file. Created if missing.
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("data/cronlog.db"),
        }
    }
}

/// Timezone that start and exit times are recorded in.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClockConfig {
    /// IANA timezone name.
    pub timezone: String,
}

impl ClockConfig {
    pub fn tz(&self) -> Result<Tz> {
        Ok(parse_timezone(&self.timezone)?)
    }
}

impl Default for ClockConfig {
    fn default() -> Self {
        Self {
            timezone: DEFAULT_TIMEZONE.name().to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Minimum tracing level (`trace`, `debug`, `info`, `warn`, `error`).
    /// `RUST_LOG` takes precedence.
    pub level: String,
    /// Emit JSON lines instead of human-readable output.
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}
