//! Core middleware types and traits.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::error::SluiceError;
use crate::store::Row;

use super::context::OperationContext;

/// Result type for middleware operations.
pub type MiddlewareResult<T> = Result<T, SluiceError>;

/// A boxed future for async middleware operations.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Result of one call.
///
/// Rows are shared behind an [`Arc`]: a cached response and the response
/// handed to the caller point at the same rows, which nobody can mutate.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryResponse {
    /// Fetched rows.
    pub rows: Arc<Vec<Row>>,
    /// Number of rows affected (for statements).
    pub rows_affected: Option<u64>,
    /// Whether the response was served from a result cache.
    pub from_cache: bool,
}

impl QueryResponse {
    /// Create a response from fetched rows.
    pub fn from_rows(rows: Vec<Row>) -> Self {
        Self {
            rows: Arc::new(rows),
            rows_affected: None,
            from_cache: false,
        }
    }

    /// Create an empty response.
    pub fn empty() -> Self {
        Self::from_rows(Vec::new())
    }

    /// Create a response with affected rows count.
    pub fn with_affected(count: u64) -> Self {
        Self {
            rows: Arc::new(Vec::new()),
            rows_affected: Some(count),
            from_cache: false,
        }
    }

    /// Mark as served from cache.
    pub fn from_cache(mut self) -> Self {
        self.from_cache = true;
        self
    }

    /// Number of fetched rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether no rows were fetched.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// First fetched row.
    pub fn first(&self) -> Option<&Row> {
        self.rows.first()
    }
}

/// The rest of the chain after the current middleware.
///
/// `Next` can be run more than once; every run starts the inner layers from
/// scratch.
#[derive(Clone, Copy)]
pub struct Next<'a> {
    layers: &'a [SharedMiddleware],
    operation: &'a dyn Operation,
}

impl<'a> Next<'a> {
    pub(crate) fn new(layers: &'a [SharedMiddleware], operation: &'a dyn Operation) -> Self {
        Self { layers, operation }
    }

    /// Execute the next handler in the chain.
    pub fn run(&self, ctx: OperationContext) -> BoxFuture<'a, MiddlewareResult<QueryResponse>> {
        let mut layers = self.layers;
        while let Some((layer, rest)) = layers.split_first() {
            if layer.enabled() {
                return layer.handle(ctx, Next::new(rest, self.operation));
            }
            layers = rest;
        }
        self.operation.call(ctx)
    }
}

/// Middleware trait for wrapping calls.
///
/// A middleware may short-circuit (not call `next`), call it once, or call
/// it several times.
///
/// # Example
///
/// ```rust
/// use sluice_core::middleware::{
///     BoxFuture, Middleware, MiddlewareResult, Next, OperationContext, QueryResponse,
/// };
///
/// struct Tag;
///
/// impl Middleware for Tag {
///     fn handle<'a>(
///         &'a self,
///         ctx: OperationContext,
///         next: Next<'a>,
///     ) -> BoxFuture<'a, MiddlewareResult<QueryResponse>> {
///         Box::pin(async move {
///             let ctx = ctx.with_operation("tagged");
///             next.run(ctx).await
///         })
///     }
/// }
/// ```
pub trait Middleware: Send + Sync {
    /// Handle a call, optionally calling the next handler.
    fn handle<'a>(
        &'a self,
        ctx: OperationContext,
        next: Next<'a>,
    ) -> BoxFuture<'a, MiddlewareResult<QueryResponse>>;

    /// Name of this middleware (for debugging/logging).
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    /// Whether this middleware is enabled.
    fn enabled(&self) -> bool {
        true
    }
}

/// A middleware that can be shared across threads.
pub type SharedMiddleware = Arc<dyn Middleware>;

/// A unit of work: the innermost call that talks to the data store.
pub trait Operation: Send + Sync {
    /// Run the unit of work.
    fn call<'a>(&'a self, ctx: OperationContext) -> BoxFuture<'a, MiddlewareResult<QueryResponse>>;

    /// Name used in logs.
    fn name(&self) -> &str {
        "operation"
    }
}

/// An [`Operation`] built from a closure.
pub struct FnOperation<F> {
    name: String,
    f: F,
}

/// Build an [`Operation`] from an async closure.
///
/// ```rust
/// use sluice_core::middleware::{operation_fn, Operation, QueryResponse};
///
/// let fetch = operation_fn("fetch_all_users", |ctx| async move {
///     let conn = ctx.require_connection()?;
///     let rows = conn.query("SELECT * FROM users", ctx.params()).await?;
///     Ok(QueryResponse::from_rows(rows))
/// });
/// assert_eq!(fetch.name(), "fetch_all_users");
/// ```
pub fn operation_fn<F, Fut>(name: impl Into<String>, f: F) -> FnOperation<F>
where
    F: Fn(OperationContext) -> Fut + Send + Sync,
    Fut: Future<Output = MiddlewareResult<QueryResponse>> + Send + 'static,
{
    FnOperation {
        name: name.into(),
        f,
    }
}

impl<F, Fut> Operation for FnOperation<F>
where
    F: Fn(OperationContext) -> Fut + Send + Sync,
    Fut: Future<Output = MiddlewareResult<QueryResponse>> + Send + 'static,
{
    fn call<'a>(&'a self, ctx: OperationContext) -> BoxFuture<'a, MiddlewareResult<QueryResponse>> {
        Box::pin((self.f)(ctx))
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_query_response_rows() {
        let response = QueryResponse::from_rows(vec![json!({"id": 1}), json!({"id": 2})]);
        assert_eq!(response.len(), 2);
        assert_eq!(response.first(), Some(&json!({"id": 1})));
        assert!(!response.from_cache);
    }

    #[test]
    fn test_query_response_affected() {
        let response = QueryResponse::with_affected(5);
        assert_eq!(response.rows_affected, Some(5));
        assert!(response.is_empty());
    }

    #[test]
    fn test_from_cache_shares_rows() {
        let response = QueryResponse::from_rows(vec![json!({"id": 1})]);
        let cached = response.clone().from_cache();
        assert!(cached.from_cache);
        assert!(Arc::ptr_eq(&response.rows, &cached.rows));
    }

    #[tokio::test]
    async fn test_fn_operation_runs_closure() {
        let op = operation_fn("echo", |ctx| async move {
            let sql = ctx.require_sql()?.to_string();
            Ok(QueryResponse::from_rows(vec![json!({ "sql": sql })]))
        });

        let response = op
            .call(OperationContext::for_query("SELECT 1"))
            .await
            .unwrap();
        assert_eq!(response.first(), Some(&json!({"sql": "SELECT 1"})));
    }
}
