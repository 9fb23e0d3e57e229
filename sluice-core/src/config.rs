//! Configuration file (`sluice.toml`) support.
//!
//! ```toml
//! [database]
//! url = "${DATABASE_URL:-sqlite://users.db}"
//!
//! [retry]
//! retries = 3
//! delay_ms = 2000
//!
//! [cache]
//! ttl_secs = 300
//! enabled = true
//!
//! [logging]
//! log_queries = true
//! max_sql_length = 500
//! ```
//!
//! `${VAR}` and `${VAR:-default}` are expanded from the environment before
//! parsing. Unset variables without a default are left as written.

use std::path::Path;
use std::time::Duration;

use regex_lite::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{SluiceError, SluiceResult};
use crate::middleware::{CacheConfig, LoggerConfig, RetryConfig};

/// Default configuration file name.
pub const CONFIG_FILE_NAME: &str = "sluice.toml";

/// Root configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SluiceConfig {
    /// Data store settings.
    pub database: DatabaseConfig,
    /// Retry settings.
    pub retry: RetrySettings,
    /// Result cache settings.
    pub cache: CacheSettings,
    /// Query logging settings.
    pub logging: LoggingSettings,
}

/// `[database]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Data store URL, e.g. `sqlite://users.db` or `sqlite::memory:`.
    pub url: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://users.db".to_string(),
        }
    }
}

/// `[retry]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    /// Total attempts, including the first.
    pub retries: u32,
    /// Delay between attempts, in milliseconds.
    pub delay_ms: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            retries: 3,
            delay_ms: 2000,
        }
    }
}

/// `[cache]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    /// Entry time-to-live, in seconds.
    pub ttl_secs: u64,
    /// Whether caching is active.
    pub enabled: bool,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            ttl_secs: 300,
            enabled: true,
        }
    }
}

/// `[logging]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Whether queries are logged.
    pub log_queries: bool,
    /// Truncate logged SQL to this many characters (0 = unlimited).
    pub max_sql_length: usize,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            log_queries: true,
            max_sql_length: 500,
        }
    }
}

impl SluiceConfig {
    /// Load configuration from a file.
    pub fn from_file(path: impl AsRef<Path>) -> SluiceResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            SluiceError::config(format!("cannot read {}", path.display())).with_source(e)
        })?;

        Self::from_str(&content)
    }

    /// Parse configuration from a TOML string.
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(content: &str) -> SluiceResult<Self> {
        let expanded = expand_env_vars(content, |name| std::env::var(name).ok())?;

        toml::from_str(&expanded).map_err(|e| {
            SluiceError::config("invalid configuration file")
                .with_help(e.message().to_string())
                .with_source(e)
        })
    }

    /// Defaults overlaid with `SLUICE_*` environment variables.
    pub fn from_env() -> SluiceResult<Self> {
        Self::default().with_env_overrides()
    }

    /// Load `path` if it exists (defaults otherwise), apply environment
    /// overrides, then validate.
    pub fn load(path: impl AsRef<Path>) -> SluiceResult<Self> {
        let path = path.as_ref();
        let config = if path.exists() {
            Self::from_file(path)?
        } else {
            Self::default()
        };
        let config = config.with_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Overlay `SLUICE_DATABASE_URL`, `SLUICE_RETRIES`,
    /// `SLUICE_RETRY_DELAY_MS` and `SLUICE_CACHE_TTL_SECS`.
    pub fn with_env_overrides(self) -> SluiceResult<Self> {
        self.with_overrides(|name| std::env::var(name).ok())
    }

    fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> SluiceResult<Self> {
        if let Some(url) = lookup("SLUICE_DATABASE_URL") {
            self.database.url = url;
        }
        if let Some(value) = lookup("SLUICE_RETRIES") {
            self.retry.retries = parse_override("SLUICE_RETRIES", &value)?;
        }
        if let Some(value) = lookup("SLUICE_RETRY_DELAY_MS") {
            self.retry.delay_ms = parse_override("SLUICE_RETRY_DELAY_MS", &value)?;
        }
        if let Some(value) = lookup("SLUICE_CACHE_TTL_SECS") {
            self.cache.ttl_secs = parse_override("SLUICE_CACHE_TTL_SECS", &value)?;
        }
        Ok(self)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> SluiceResult<()> {
        if self.database.url.trim().is_empty() {
            return Err(SluiceError::config("database.url must not be empty"));
        }
        self.retry_config().validate()
    }

    /// The database URL.
    pub fn database_url(&self) -> &str {
        &self.database.url
    }

    /// Settings for a [`RetryPolicy`](crate::middleware::RetryPolicy).
    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig::new()
            .retries(self.retry.retries)
            .delay(Duration::from_millis(self.retry.delay_ms))
    }

    /// Settings for a [`ResultCache`](crate::middleware::ResultCache).
    pub fn cache_config(&self) -> CacheConfig {
        CacheConfig::with_ttl(Duration::from_secs(self.cache.ttl_secs)).enabled(self.cache.enabled)
    }

    /// Settings for a [`QueryLogger`](crate::middleware::QueryLogger).
    pub fn logger_config(&self) -> LoggerConfig {
        LoggerConfig {
            enabled: self.logging.log_queries,
            max_sql_length: self.logging.max_sql_length,
        }
    }
}

fn parse_override<T: std::str::FromStr>(name: &str, value: &str) -> SluiceResult<T> {
    value.trim().parse().map_err(|_| {
        SluiceError::config(format!("{name} must be a non-negative integer, got '{value}'"))
    })
}

/// Expand `${VAR}` and `${VAR:-default}` using `lookup`.
fn expand_env_vars(content: &str, lookup: impl Fn(&str) -> Option<String>) -> SluiceResult<String> {
    let re = Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)(:-([^}]*))?\}")
        .map_err(|e| SluiceError::internal(format!("env pattern: {e}")))?;

    let expanded = re.replace_all(content, |caps: &regex_lite::Captures<'_>| {
        match (lookup(&caps[1]), caps.get(3)) {
            (Some(value), _) => value,
            (None, Some(default)) => default.as_str().to_string(),
            (None, None) => caps[0].to_string(),
        }
    });
    Ok(expanded.into_owned())
}
