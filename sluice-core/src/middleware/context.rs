//! Call context passed through the middleware chain.
//!
//! A context stands in for the argument list of one call. It has two named
//! channels that middleware look at first (`query` and `connection`) and an
//! ordered list of typed positional [`Argument`]s that they fall back to.
//!
//! Lookup rules:
//! - connection: the `connection` channel, else the first positional argument
//!   if it is an [`Argument::Connection`];
//! - query key: the `query` channel, else the first [`Argument::Text`];
//! - cache key: the query key, followed by the bound params as JSON when
//!   there are any.

use std::sync::Arc;
use std::time::Instant;

use crate::error::{SluiceError, SluiceResult};
use crate::store::{ConnectionHandle, Param};

/// A positional argument.
#[derive(Debug, Clone)]
pub enum Argument {
    /// A live connection.
    Connection(ConnectionHandle),
    /// A string argument, eligible as a query key.
    Text(String),
    /// Any other value.
    Value(serde_json::Value),
}

impl Argument {
    /// The connection, if this argument is one.
    pub fn as_connection(&self) -> Option<&ConnectionHandle> {
        match self {
            Self::Connection(handle) => Some(handle),
            _ => None,
        }
    }

    /// The string, if this argument is one.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            _ => None,
        }
    }

    /// The JSON value, if this argument is one.
    pub fn as_value(&self) -> Option<&serde_json::Value> {
        match self {
            Self::Value(value) => Some(value),
            _ => None,
        }
    }
}

/// Extracts a cache/log key from a call.
pub type KeyExtractor = Arc<dyn Fn(&OperationContext) -> Option<String> + Send + Sync>;

/// The default extractor: `query` channel first, then the first text argument.
pub fn default_key_extractor() -> KeyExtractor {
    Arc::new(|ctx: &OperationContext| ctx.query_key().map(str::to_owned))
}

/// The cache extractor: the query key, plus the bound params when present.
///
/// Two calls that share SQL text but bind different values must not share
/// a result.
pub fn cache_key_extractor() -> KeyExtractor {
    Arc::new(|ctx: &OperationContext| ctx.cache_key())
}

/// Context for one call through the chain.
#[derive(Debug, Clone)]
pub struct OperationContext {
    operation: Option<String>,
    query: Option<String>,
    connection: Option<ConnectionHandle>,
    args: Vec<Argument>,
    params: Vec<Param>,
    started_at: Instant,
}

impl Default for OperationContext {
    fn default() -> Self {
        Self::new()
    }
}

impl OperationContext {
    /// Create an empty context.
    pub fn new() -> Self {
        Self {
            operation: None,
            query: None,
            connection: None,
            args: Vec::new(),
            params: Vec::new(),
            started_at: Instant::now(),
        }
    }

    /// Create a context with the `query` channel set.
    pub fn for_query(sql: impl Into<String>) -> Self {
        Self::new().with_query(sql)
    }

    /// Set the operation name.
    pub fn with_operation(mut self, name: impl Into<String>) -> Self {
        self.operation = Some(name.into());
        self
    }

    /// Set the `query` channel.
    pub fn with_query(mut self, sql: impl Into<String>) -> Self {
        self.query = Some(sql.into());
        self
    }

    /// Supply a connection through the `connection` channel.
    ///
    /// The caller keeps ownership: no middleware will close it.
    pub fn with_connection(mut self, handle: ConnectionHandle) -> Self {
        self.connection = Some(handle);
        self
    }

    /// Append a positional argument.
    pub fn arg(mut self, arg: Argument) -> Self {
        self.args.push(arg);
        self
    }

    /// Append a text positional argument.
    pub fn arg_text(self, text: impl Into<String>) -> Self {
        self.arg(Argument::Text(text.into()))
    }

    /// Append a value positional argument.
    pub fn arg_value(self, value: impl Into<serde_json::Value>) -> Self {
        self.arg(Argument::Value(value.into()))
    }

    /// Append a bind parameter.
    pub fn bind(mut self, param: impl Into<Param>) -> Self {
        self.params.push(param.into());
        self
    }

    /// Replace the bind parameters.
    pub fn with_params(mut self, params: Vec<Param>) -> Self {
        self.params = params;
        self
    }

    /// Operation name, if set.
    pub fn operation(&self) -> Option<&str> {
        self.operation.as_deref()
    }

    /// Operation name or `"anonymous"`.
    pub fn operation_name(&self) -> &str {
        self.operation().unwrap_or("anonymous")
    }

    /// The `query` channel only.
    pub fn query(&self) -> Option<&str> {
        self.query.as_deref()
    }

    /// Positional arguments.
    pub fn args(&self) -> &[Argument] {
        &self.args
    }

    /// Bind parameters.
    pub fn params(&self) -> &[Param] {
        &self.params
    }

    /// Locate a connection: `connection` channel, else first positional argument.
    pub fn connection(&self) -> Option<&ConnectionHandle> {
        self.connection
            .as_ref()
            .or_else(|| self.args.first().and_then(Argument::as_connection))
    }

    /// Locate a connection or fail with [`ErrorCode::NoConnection`](crate::ErrorCode::NoConnection).
    pub fn require_connection(&self) -> SluiceResult<&ConnectionHandle> {
        self.connection()
            .ok_or_else(|| SluiceError::no_connection(self.operation_name()))
    }

    /// Locate the query key: `query` channel, else first text argument.
    ///
    /// Connection arguments are never strings, so a connection injected in
    /// front of the arguments is skipped naturally.
    pub fn query_key(&self) -> Option<&str> {
        self.query()
            .or_else(|| self.args.iter().find_map(Argument::as_text))
    }

    /// The result-cache key for this call.
    ///
    /// Without params this is the query key itself. With params the JSON
    /// encoding of the params is appended after a space.
    pub fn cache_key(&self) -> Option<String> {
        let key = self.query_key()?;
        if self.params.is_empty() {
            return Some(key.to_owned());
        }
        let params = serde_json::to_string(&self.params).ok()?;
        Some(format!("{key} {params}"))
    }

    /// The SQL a unit of work should run: same lookup as the query key.
    pub fn require_sql(&self) -> SluiceResult<&str> {
        self.query_key().ok_or_else(|| {
            SluiceError::operation(format!(
                "operation '{}' was called without a query",
                self.operation_name()
            ))
        })
    }

    /// Insert a connection in front of the positional arguments.
    pub(crate) fn prepend_connection(&mut self, handle: ConnectionHandle) {
        self.args.insert(0, Argument::Connection(handle));
    }

    /// Time since the context was created.
    pub fn elapsed(&self) -> std::time::Duration {
        self.started_at.elapsed()
    }
}
