//! Middleware for data-store operations.
//!
//! Each layer wraps a unit of work ([`Operation`]) with one concern:
//!
//! - [`ResourceScope`] opens a connection for the call and closes it after
//! - [`TransactionBoundary`] wraps the call in BEGIN / COMMIT / ROLLBACK
//! - [`RetryPolicy`] re-runs everything it wraps on failure
//! - [`ResultCache`] serves repeated queries from a TTL cache
//! - [`QueryLogger`] records the query before it runs
//!
//! # Ordering
//!
//! Layers are applied in the order they are added to a [`MiddlewareStack`],
//! outermost first. The order changes behavior:
//!
//! - a [`ResultCache`] outside the [`ResourceScope`] answers hits without
//!   opening a connection; inside it, every call opens one;
//! - a [`RetryPolicy`] outside the [`ResourceScope`] re-opens the connection
//!   and re-runs the transaction on each attempt; inside it, attempts share
//!   one connection;
//! - a [`TransactionBoundary`] only starts a transaction when a connection is
//!   already present, so it belongs inside the [`ResourceScope`].
//!
//! [`MiddlewareStack::standard`] builds the recommended order:
//!
//! ```text
//! QueryLogger -> ResultCache -> RetryPolicy -> ResourceScope -> TransactionBoundary -> operation
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use sluice_core::middleware::{
//!     CacheConfig, MiddlewareStack, OperationContext, QueryResponse, ResultCache, RetryPolicy,
//!     operation_fn,
//! };
//!
//! let stack = MiddlewareStack::standard(
//!     store,
//!     ResultCache::global(CacheConfig::default()),
//!     RetryPolicy::default(),
//! );
//!
//! let fetch = operation_fn("fetch_users", |ctx| async move {
//!     let conn = ctx.require_connection()?;
//!     Ok(QueryResponse::from_rows(conn.query(ctx.require_sql()?, ctx.params()).await?))
//! });
//!
//! let users = stack
//!     .execute(OperationContext::for_query("SELECT * FROM users WHERE age > ?").bind(25), &fetch)
//!     .await?;
//! ```

mod cache;
mod chain;
mod context;
mod logging;
mod resource;
mod retry;
mod transaction;
mod types;

pub use cache::{
    CacheConfig, CacheEntry, CacheStats, CacheStore, DEFAULT_TTL, MemoryStore, ResultCache,
    SharedCacheStore, global_store, install_global_store, teardown_global_store,
};
pub use chain::{MiddlewareBuilder, MiddlewareStack};
pub use context::{
    Argument, KeyExtractor, OperationContext, cache_key_extractor, default_key_extractor,
};
pub use logging::{LoggerConfig, NO_QUERY_PLACEHOLDER, QueryLogger, QuerySink, TracingSink};
pub use resource::ResourceScope;
pub use retry::{RetryConfig, RetryPolicy, RetryPredicate, RetryableError};
pub use transaction::TransactionBoundary;
pub use types::{
    BoxFuture, FnOperation, Middleware, MiddlewareResult, Next, Operation, QueryResponse,
    SharedMiddleware, operation_fn,
};
