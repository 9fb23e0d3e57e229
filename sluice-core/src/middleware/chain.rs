//! Middleware stack and builder.

use std::sync::Arc;

use super::cache::ResultCache;
use super::context::OperationContext;
use super::logging::QueryLogger;
use super::resource::ResourceScope;
use super::retry::RetryPolicy;
use super::transaction::TransactionBoundary;
use super::types::{
    BoxFuture, Middleware, MiddlewareResult, Next, Operation, QueryResponse, SharedMiddleware,
};
use crate::store::DataStore;

/// An ordered stack of middleware around an [`Operation`].
///
/// Layers are stored outermost-first: the first layer added is the first to
/// see a call and the last to see its result. Each layer may:
/// - change the context before passing it on
/// - short-circuit by not calling the rest of the chain
/// - run the rest of the chain several times
///
/// The order is part of the stack's behavior. [`MiddlewareStack::layers`]
/// reports it so it can be asserted on.
#[derive(Clone, Default)]
pub struct MiddlewareStack {
    layers: Vec<SharedMiddleware>,
}

impl MiddlewareStack {
    /// Create a new empty stack.
    pub fn new() -> Self {
        Self::default()
    }

    /// The standard composition:
    ///
    /// ```text
    /// QueryLogger -> ResultCache -> RetryPolicy -> ResourceScope -> TransactionBoundary -> operation
    /// ```
    ///
    /// A cache hit returns before any connection is opened. Every retry
    /// opens a fresh connection and runs a fresh transaction.
    ///
    /// Repeating a cached call opens exactly one connection in total only
    /// because the cache sits outside the resource scope here. Stacks are
    /// applied outermost first, so a `ResourceScope` added before a
    /// `ResultCache` opens and closes a connection on every call, hit or miss.
    pub fn standard(store: impl DataStore + 'static, cache: ResultCache, retry: RetryPolicy) -> Self {
        Self::new()
            .with(QueryLogger::new())
            .with(cache)
            .with(retry)
            .with(ResourceScope::new(store))
            .with(TransactionBoundary::new())
    }

    /// Add an inner layer (builder pattern).
    pub fn with<M: Middleware + 'static>(self, middleware: M) -> Self {
        self.with_shared(Arc::new(middleware))
    }

    /// Add an inner layer that is also held elsewhere.
    pub fn with_shared(mut self, middleware: SharedMiddleware) -> Self {
        self.layers.push(middleware);
        self
    }

    /// Add an inner layer mutably.
    pub fn push<M: Middleware + 'static>(&mut self, middleware: M) -> &mut Self {
        self.layers.push(Arc::new(middleware));
        self
    }

    /// Add an outermost layer.
    pub fn prepend<M: Middleware + 'static>(&mut self, middleware: M) -> &mut Self {
        self.layers.insert(0, Arc::new(middleware));
        self
    }

    /// Get the number of layers.
    pub fn len(&self) -> usize {
        self.layers.len()
    }

    /// Check if the stack is empty.
    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    /// Layer names, outermost first.
    pub fn layers(&self) -> Vec<&'static str> {
        self.layers.iter().map(|layer| layer.name()).collect()
    }

    /// Run `operation` through every layer.
    pub fn execute<'a>(
        &'a self,
        ctx: OperationContext,
        operation: &'a dyn Operation,
    ) -> BoxFuture<'a, MiddlewareResult<QueryResponse>> {
        let ctx = if ctx.operation().is_some() {
            ctx
        } else {
            ctx.with_operation(operation.name())
        };
        Next::new(&self.layers, operation).run(ctx)
    }
}

impl std::fmt::Debug for MiddlewareStack {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MiddlewareStack")
            .field("layers", &self.layers())
            .finish()
    }
}

/// Builder for creating middleware stacks.
#[derive(Default)]
pub struct MiddlewareBuilder {
    layers: Vec<SharedMiddleware>,
}

impl MiddlewareBuilder {
    /// Create a new builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add middleware.
    pub fn with<M: Middleware + 'static>(mut self, middleware: M) -> Self {
        self.layers.push(Arc::new(middleware));
        self
    }

    /// Add middleware conditionally.
    pub fn with_if<M: Middleware + 'static>(self, condition: bool, middleware: M) -> Self {
        if condition {
            self.with(middleware)
        } else {
            self
        }
    }

    /// Build the stack.
    pub fn build(self) -> MiddlewareStack {
        MiddlewareStack {
            layers: self.layers,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middleware::{CacheConfig, MemoryStore, operation_fn};
    use crate::testing::MockStore;
    use parking_lot::Mutex;
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    const QUERY: &str = "SELECT * FROM users WHERE age > 25";

    struct Trace {
        label: &'static str,
        seen: Arc<Mutex<Vec<String>>>,
    }

    impl Middleware for Trace {
        fn handle<'a>(
            &'a self,
            ctx: OperationContext,
            next: Next<'a>,
        ) -> BoxFuture<'a, MiddlewareResult<QueryResponse>> {
            Box::pin(async move {
                self.seen.lock().push(format!("{} in", self.label));
                let result = next.run(ctx).await;
                self.seen.lock().push(format!("{} out", self.label));
                result
            })
        }

        fn name(&self) -> &'static str {
            self.label
        }
    }

    fn fetch() -> impl Operation {
        operation_fn("fetch", |ctx| async move {
            let conn = ctx.require_connection()?;
            Ok(QueryResponse::from_rows(
                conn.query(ctx.require_sql()?, ctx.params()).await?,
            ))
        })
    }

    fn cache() -> ResultCache {
        ResultCache::new(MemoryStore::shared(), CacheConfig::default())
    }

    #[test]
    fn test_middleware_stack_empty() {
        let stack = MiddlewareStack::new();
        assert!(stack.is_empty());
        assert_eq!(stack.len(), 0);
    }

    #[tokio::test]
    async fn test_outermost_runs_first() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let stack = MiddlewareStack::new()
            .with(Trace { label: "outer", seen: seen.clone() })
            .with(Trace { label: "inner", seen: seen.clone() });
        let op = operation_fn("op", |_ctx| async move { Ok(QueryResponse::empty()) });

        stack.execute(OperationContext::new(), &op).await.unwrap();

        assert_eq!(stack.layers(), vec!["outer", "inner"]);
        assert_eq!(*seen.lock(), vec!["outer in", "inner in", "inner out", "outer out"]);
    }

    #[tokio::test]
    async fn test_prepend_adds_outermost() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut stack = MiddlewareStack::new().with(Trace { label: "b", seen: seen.clone() });
        stack.prepend(Trace { label: "a", seen: seen.clone() });
        stack.push(Trace { label: "c", seen });

        assert_eq!(stack.layers(), vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_operation_name_fills_context() {
        let op = operation_fn("fetch_all_users", |ctx| async move {
            assert_eq!(ctx.operation(), Some("fetch_all_users"));
            Ok(QueryResponse::empty())
        });

        MiddlewareStack::new()
            .execute(OperationContext::new(), &op)
            .await
            .unwrap();
    }

    #[test]
    fn test_standard_order() {
        let stack = MiddlewareStack::standard(MockStore::new(), cache(), RetryPolicy::default());
        assert_eq!(
            stack.layers(),
            vec![
                "QueryLogger",
                "ResultCache",
                "RetryPolicy",
                "ResourceScope",
                "TransactionBoundary"
            ]
        );
    }

    #[tokio::test]
    async fn test_standard_cache_hit_opens_no_connection() {
        let store = MockStore::new();
        let stack = MiddlewareStack::standard(
            store.clone(),
            cache(),
            RetryPolicy::fixed(3, Duration::ZERO),
        );

        for _ in 0..2 {
            stack
                .execute(OperationContext::for_query(QUERY), &fetch())
                .await
                .unwrap();
        }

        assert_eq!(store.stats().opens, 1);
        assert_eq!(store.stats().queries, 1);
        assert_eq!(store.stats().commits, 1);
    }

    #[tokio::test]
    async fn test_standard_bound_repeat_opens_once() {
        let store = MockStore::new();
        let stack = MiddlewareStack::standard(
            store.clone(),
            cache(),
            RetryPolicy::fixed(3, Duration::ZERO),
        );
        let sql = "SELECT * FROM users WHERE age > ?";

        for _ in 0..3 {
            stack
                .execute(OperationContext::for_query(sql).bind(25), &fetch())
                .await
                .unwrap();
        }
        stack
            .execute(OperationContext::for_query(sql).bind(40), &fetch())
            .await
            .unwrap();

        assert_eq!(store.stats().opens, 2);
        assert_eq!(store.stats().closes, 2);
        assert_eq!(store.stats().queries, 2);
    }

    #[tokio::test]
    async fn test_resource_outside_cache_opens_per_call() {
        let store = MockStore::new();
        let stack = MiddlewareStack::new()
            .with(ResourceScope::new(store.clone()))
            .with(cache());

        for _ in 0..2 {
            stack
                .execute(OperationContext::for_query(QUERY), &fetch())
                .await
                .unwrap();
        }

        // The handle is injected in front of the arguments and the key is
        // still found; the hit skips the query but not the connection.
        assert_eq!(store.stats().opens, 2);
        assert_eq!(store.stats().closes, 2);
        assert_eq!(store.stats().queries, 1);
    }

    #[tokio::test]
    async fn test_positional_query_under_resource_scope() {
        let store = MockStore::new();
        let stack = MiddlewareStack::new()
            .with(ResourceScope::new(store.clone()))
            .with(cache());

        for _ in 0..2 {
            let ctx = OperationContext::new().arg_text(QUERY);
            stack.execute(ctx, &fetch()).await.unwrap();
        }

        assert_eq!(store.stats().queries, 1);
    }

    #[tokio::test]
    async fn test_retry_inside_resource_scope_reuses_connection() {
        let store = MockStore::new().fail_queries(2);
        let stack = MiddlewareStack::new()
            .with(ResourceScope::new(store.clone()))
            .with(RetryPolicy::fixed(3, Duration::ZERO));

        stack
            .execute(OperationContext::for_query(QUERY), &fetch())
            .await
            .unwrap();

        assert_eq!(store.stats().opens, 1);
        assert_eq!(store.stats().queries, 3);
    }

    #[test]
    fn test_middleware_builder() {
        let stack = MiddlewareBuilder::new()
            .with(QueryLogger::new())
            .with_if(true, TransactionBoundary::new())
            .with_if(false, RetryPolicy::default())
            .build();

        assert_eq!(stack.layers(), vec!["QueryLogger", "TransactionBoundary"]);
    }
}
