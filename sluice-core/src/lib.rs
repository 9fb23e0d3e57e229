//! # sluice-core
//!
//! Composable middleware for single-connection data-store calls.
//!
//! A unit of work ([`Operation`](middleware::Operation)) that talks to a data
//! store is wrapped by a [`MiddlewareStack`](middleware::MiddlewareStack) of
//! independent layers:
//! - [`ResourceScope`](middleware::ResourceScope): connection per call
//! - [`TransactionBoundary`](middleware::TransactionBoundary): BEGIN / COMMIT / ROLLBACK
//! - [`RetryPolicy`](middleware::RetryPolicy): fixed-delay retry of everything inside it
//! - [`ResultCache`](middleware::ResultCache): TTL cache keyed by query and params
//! - [`QueryLogger`](middleware::QueryLogger): records each query before it runs
//!
//! The data store itself is abstract ([`DataStore`], [`Connection`]); the
//! `sluice-sqlite` crate provides a SQLite backend.
//!
//! ## Calling through a stack
//!
//! ```rust
//! use sluice_core::prelude::*;
//!
//! # async fn demo(store: impl DataStore + 'static) -> SluiceResult<()> {
//! let stack = MiddlewareStack::standard(
//!     store,
//!     ResultCache::new(MemoryStore::shared(), CacheConfig::default()),
//!     RetryPolicy::default(),
//! );
//!
//! let fetch = operation_fn("fetch_users_older_than", |ctx| async move {
//!     let conn = ctx.require_connection()?;
//!     let rows = conn.query(ctx.require_sql()?, ctx.params()).await?;
//!     Ok(QueryResponse::from_rows(rows))
//! });
//!
//! let ctx = OperationContext::for_query("SELECT * FROM users WHERE age > ?").bind(25);
//! let users = stack.execute(ctx, &fetch).await?;
//! println!("{} users", users.len());
//! # Ok(())
//! # }
//! ```
//!
//! ## Sessions
//!
//! Outside a stack, [`Session::run`](session::Session::run) and
//! [`execute_query`](session::execute_query) give one-off scoped access to a
//! connection.

pub mod cleanup;
pub mod config;
pub mod driver;
pub mod error;
pub mod logging;
pub mod middleware;
pub mod session;
pub mod store;
#[cfg(any(test, feature = "testing"))]
pub mod testing;
pub mod transaction;

pub use config::SluiceConfig;
pub use error::{ErrorCode, ErrorContext, SluiceError, SluiceResult};
pub use store::{Connection, ConnectionHandle, DataStore, Param, Row, SharedStore};
pub use transaction::{TransactionConfig, TransactionMode};

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::config::SluiceConfig;
    pub use crate::driver::{Call, join_pair, run_all};
    pub use crate::error::{ErrorCode, SluiceError, SluiceResult};
    pub use crate::middleware::{
        Argument, CacheConfig, MemoryStore, Middleware, MiddlewareStack, Operation,
        OperationContext, QueryLogger, QueryResponse, ResourceScope, ResultCache, RetryConfig,
        RetryPolicy, TransactionBoundary, operation_fn,
    };
    pub use crate::session::{Session, execute_query};
    pub use crate::store::{Connection, ConnectionHandle, DataStore};
    pub use crate::transaction::TransactionMode;
}
