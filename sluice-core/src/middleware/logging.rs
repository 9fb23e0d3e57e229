//! Query logging middleware.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::info;

use super::context::{KeyExtractor, OperationContext, default_key_extractor};
use super::types::{BoxFuture, Middleware, MiddlewareResult, Next, QueryResponse};

/// Logged when no query can be extracted from a call.
pub const NO_QUERY_PLACEHOLDER: &str = "<no query found>";

/// Receives one string per logged query.
pub trait QuerySink: Send + Sync {
    /// Record a query that is about to run.
    fn record(&self, query: &str);
}

/// The default sink: an `info` event on `sluice::query`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl QuerySink for TracingSink {
    fn record(&self, query: &str) {
        info!(target: "sluice::query", "Executing SQL: {}", query);
    }
}

/// Configuration for [`QueryLogger`].
#[derive(Debug, Clone)]
pub struct LoggerConfig {
    /// Whether the layer is active.
    pub enabled: bool,
    /// Maximum number of characters of SQL to log (0 = unlimited).
    pub max_sql_length: usize,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_sql_length: 500,
        }
    }
}

/// Middleware that records the query of each call before running it.
///
/// Has no effect on control flow. A call with no extractable query is logged
/// as [`NO_QUERY_PLACEHOLDER`].
///
/// # Example
///
/// ```rust
/// use sluice_core::middleware::QueryLogger;
///
/// let logger = QueryLogger::new().with_max_sql_length(120);
/// assert_eq!(logger.query_count(), 0);
/// ```
pub struct QueryLogger {
    config: LoggerConfig,
    sink: Arc<dyn QuerySink>,
    key_extractor: KeyExtractor,
    query_count: AtomicU64,
}

impl QueryLogger {
    /// Create a logger writing to [`TracingSink`].
    pub fn new() -> Self {
        Self::with_config(LoggerConfig::default())
    }

    /// Create with custom configuration.
    pub fn with_config(config: LoggerConfig) -> Self {
        Self {
            config,
            sink: Arc::new(TracingSink),
            key_extractor: default_key_extractor(),
            query_count: AtomicU64::new(0),
        }
    }

    /// Send records to `sink` instead.
    pub fn with_sink(mut self, sink: impl QuerySink + 'static) -> Self {
        self.sink = Arc::new(sink);
        self
    }

    /// Replace the key extraction rule.
    pub fn with_key_extractor(mut self, extractor: KeyExtractor) -> Self {
        self.key_extractor = extractor;
        self
    }

    /// Set the truncation length.
    pub fn with_max_sql_length(mut self, max: usize) -> Self {
        self.config.max_sql_length = max;
        self
    }

    /// Number of calls logged so far.
    pub fn query_count(&self) -> u64 {
        self.query_count.load(Ordering::Relaxed)
    }

    fn truncate_sql<'s>(&self, sql: &'s str) -> std::borrow::Cow<'s, str> {
        let max = self.config.max_sql_length;
        match sql.char_indices().nth(max) {
            Some((cut, _)) if max > 0 => format!("{}...", &sql[..cut]).into(),
            _ => sql.into(),
        }
    }
}

impl Default for QueryLogger {
    fn default() -> Self {
        Self::new()
    }
}

impl Middleware for QueryLogger {
    fn handle<'a>(
        &'a self,
        ctx: OperationContext,
        next: Next<'a>,
    ) -> BoxFuture<'a, MiddlewareResult<QueryResponse>> {
        Box::pin(async move {
            self.query_count.fetch_add(1, Ordering::Relaxed);
            match (self.key_extractor)(&ctx) {
                Some(query) => self.sink.record(&self.truncate_sql(&query)),
                None => self.sink.record(NO_QUERY_PLACEHOLDER),
            }
            next.run(ctx).await
        })
    }

    fn name(&self) -> &'static str {
        "QueryLogger"
    }

    fn enabled(&self) -> bool {
        self.config.enabled
    }
}
