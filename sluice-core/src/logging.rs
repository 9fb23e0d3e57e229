//! Logging setup.
//!
//! Every layer emits `tracing` events under its own target:
//!
//! | target                | emitted by                         |
//! |-----------------------|------------------------------------|
//! | `sluice::resource`    | `ResourceScope`                    |
//! | `sluice::transaction` | `TransactionBoundary`, `Session`   |
//! | `sluice::retry`       | `RetryPolicy`                      |
//! | `sluice::cache`       | `ResultCache`                      |
//! | `sluice::query`       | `QueryLogger` (via `TracingSink`)  |
//! | `sluice::cleanup`     | swallowed rollback/close failures  |
//! | `sluice::sqlite`      | the SQLite backend                 |
//!
//! Applications that already install a subscriber need nothing from this
//! module. Otherwise, with the `tracing-subscriber` feature, [`init`] installs
//! one driven by environment variables:
//!
//! - `SLUICE_DEBUG=true|1|yes` - debug-level logging
//! - `SLUICE_LOG_LEVEL=trace|debug|info|warn|error` - explicit level
//! - `SLUICE_LOG_FORMAT=json|pretty|compact` - output format (default: json)
//!
//! ```rust,no_run
//! sluice_core::logging::init();
//! ```

use std::env;
use std::sync::Once;

static INIT: Once = Once::new();

/// Check if debug logging is enabled via `SLUICE_DEBUG`.
#[inline]
pub fn is_debug_enabled() -> bool {
    env::var("SLUICE_DEBUG")
        .map(|v| parse_flag(&v))
        .unwrap_or(false)
}

/// The level from `SLUICE_LOG_LEVEL`, falling back on `SLUICE_DEBUG`.
pub fn get_log_level() -> &'static str {
    resolve_level(env::var("SLUICE_LOG_LEVEL").ok().as_deref(), is_debug_enabled())
}

/// The format from `SLUICE_LOG_FORMAT`.
pub fn get_log_format() -> &'static str {
    resolve_format(env::var("SLUICE_LOG_FORMAT").ok().as_deref())
}

fn parse_flag(value: &str) -> bool {
    matches!(value.to_lowercase().as_str(), "true" | "1" | "yes")
}

fn resolve_level(requested: Option<&str>, debug: bool) -> &'static str {
    let fallback = if debug { "debug" } else { "warn" };
    match requested.map(str::to_lowercase).as_deref() {
        Some("trace") => "trace",
        Some("debug") => "debug",
        Some("info") => "info",
        Some("warn") => "warn",
        Some("error") => "error",
        _ => fallback,
    }
}

fn resolve_format(requested: Option<&str>) -> &'static str {
    match requested.map(str::to_lowercase).as_deref() {
        Some("pretty") => "pretty",
        Some("compact") => "compact",
        _ => "json",
    }
}

/// Initialize logging from the environment.
///
/// Does nothing unless `SLUICE_DEBUG` or `SLUICE_LOG_LEVEL` is set. Only the
/// first call in a process has any effect.
pub fn init() {
    if !is_debug_enabled() && env::var("SLUICE_LOG_LEVEL").is_err() {
        return;
    }
    install(get_log_level(), get_log_format());
}

/// Initialize logging at `level`, ignoring the environment's level.
pub fn init_with_level(level: &str) {
    install(resolve_level(Some(level), false), get_log_format());
}

#[allow(unused_variables)]
fn install(level: &'static str, format: &'static str) {
    INIT.call_once(|| {
        #[cfg(feature = "tracing-subscriber")]
        {
            use tracing_subscriber::{EnvFilter, fmt, prelude::*};

            let filter = EnvFilter::try_new(format!("sluice={level},sluice_core={level},sluice_sqlite={level}"))
                .unwrap_or_else(|_| EnvFilter::new("warn"));

            let registry = tracing_subscriber::registry().with(filter);
            let installed = match format {
                "json" => registry.with(fmt::layer().json()).try_init(),
                "compact" => registry.with(fmt::layer().compact()).try_init(),
                _ => registry.with(fmt::layer().pretty()).try_init(),
            };

            if installed.is_ok() {
                tracing::info!(level, format, "sluice logging initialized");
            }
        }
    });
}
