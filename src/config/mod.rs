//! Configuration management for trailgain
//!
//! Values come from built-in defaults, an optional TOML file and
//! `TRAILGAIN_*` environment variables, in that order of precedence.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub database: DatabaseConfig,
    pub platform: PlatformConfig,
    pub workers: WorkersConfig,
    pub reconcile: ReconcileConfig,
    pub ingest: IngestConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// SQLite database path
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("trailgain.db"),
        }
    }
}

/// Hiking platform client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlatformConfig {
    pub base_url: String,

    /// Rate limit shared by every request of one client
    pub requests_per_second: u32,

    pub timeout_secs: u64,

    /// Retries for transient failures (5xx, 429, connection errors)
    pub max_retries: u32,
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self {
            base_url: String::from("https://www.hiking-buddies.com"),
            requests_per_second: 1,
            timeout_secs: 30,
            max_retries: 2,
        }
    }
}

/// Worker scheduling configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkersConfig {
    pub event_ingest_interval_secs: u64,
    pub reconciliation_interval_secs: u64,
    pub route_cache_interval_secs: u64,
    pub route_cache_enabled: bool,

    /// Start the worker group together with the server
    pub autostart: bool,

    /// How long a cached login session stays usable
    pub session_ttl_secs: u64,
}

impl Default for WorkersConfig {
    fn default() -> Self {
        Self {
            event_ingest_interval_secs: 12 * 3600,
            reconciliation_interval_secs: 3600,
            route_cache_interval_secs: 3600,
            route_cache_enabled: true,
            autostart: true,
            session_ttl_secs: 3 * 3600,
        }
    }
}

/// Which pending records a reconciliation cycle looks at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReconcileWindow {
    /// From midnight of the target hour's day up to the target hour
    #[default]
    SameDay,
    /// Every pending record up to the target hour
    AllPending,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconcileConfig {
    /// Hours after an event until the platform has assigned final points
    pub delay_hours: u32,
    pub window: ReconcileWindow,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            delay_hours: 72,
            window: ReconcileWindow::SameDay,
        }
    }
}

/// How ingestion decides an event was already recorded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IngestGuard {
    /// Skip the whole event once any record exists for it
    #[default]
    Event,
    /// Skip only participants that already have a record
    Participant,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    pub guard: IngestGuard,

    /// Events that started longer ago than this are ignored
    pub max_event_age_hours: u32,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            guard: IngestGuard::Event,
            max_event_age_hours: 72,
        }
    }
}

/// Control surface configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: String::from("0.0.0.0"),
            port: 8080,
        }
    }
}

impl ServerConfig {
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log format (text, json)
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: String::from("info"),
            format: String::from("text"),
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.parse::<T>().ok())
}

impl Config {
    /// Defaults overridden by environment variables
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_env_overrides();
        Ok(config)
    }

    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse TOML config file: {}", path.display()))?;

        Ok(config)
    }

    /// File (when given) plus environment overrides, validated
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    pub fn apply_env_overrides(&mut self) {
        if let Ok(path) = std::env::var("TRAILGAIN_DB_PATH") {
            self.database.path = PathBuf::from(path);
        }
        if let Ok(url) = std::env::var("TRAILGAIN_BASE_URL") {
            self.platform.base_url = url;
        }
        if let Some(rps) = env_parse("TRAILGAIN_RPS") {
            self.platform.requests_per_second = rps;
        }
        if let Some(autostart) = env_parse("TRAILGAIN_AUTOSTART") {
            self.workers.autostart = autostart;
        }
        if let Ok(host) = std::env::var("TRAILGAIN_HOST") {
            self.server.host = host;
        }
        if let Some(port) = env_parse("TRAILGAIN_PORT") {
            self.server.port = port;
        }
        if let Ok(level) = std::env::var("TRAILGAIN_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Ok(format) = std::env::var("TRAILGAIN_LOG_FORMAT") {
            self.logging.format = format;
        }
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.platform.base_url.trim().is_empty() {
            anyhow::bail!("platform.base_url must not be empty");
        }

        if self.platform.requests_per_second == 0 {
            anyhow::bail!("platform.requests_per_second must be greater than 0");
        }

        if self.platform.timeout_secs == 0 {
            anyhow::bail!("platform.timeout_secs must be greater than 0");
        }

        if self.workers.event_ingest_interval_secs == 0
            || self.workers.reconciliation_interval_secs == 0
            || self.workers.route_cache_interval_secs == 0
        {
            anyhow::bail!("worker intervals must be greater than 0");
        }

        if self.workers.session_ttl_secs == 0 {
            anyhow::bail!("workers.session_ttl_secs must be greater than 0");
        }

        if self.reconcile.delay_hours == 0 {
            anyhow::bail!("reconcile.delay_hours must be greater than 0");
        }

        Ok(())
    }

    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.platform.timeout_secs)
    }

    #[must_use]
    pub fn session_ttl(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.workers.session_ttl_secs as i64)
    }
}
