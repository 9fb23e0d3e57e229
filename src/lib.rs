//! # Sluice
//!
//! Composable middleware for single-connection data-store calls.
//!
//! Sluice wraps a unit of work with independent layers:
//! - Connection scope: one fresh connection per call, always released
//! - Transaction boundary: commit on success, roll back on failure
//! - Fixed-delay retry that re-runs everything it wraps
//! - TTL result cache keyed by query string and bound params
//! - Query logging
//!
//! The order of the layers is explicit and decides behavior, e.g. whether a
//! cache hit opens a connection at all.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use sluice::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> SluiceResult<()> {
//!     sluice::logging::init();
//!
//!     let config = SluiceConfig::load("sluice.toml")?;
//!     let store = SqliteStore::from_config(&config)?;
//!     let stack = MiddlewareStack::standard(
//!         store,
//!         ResultCache::new(MemoryStore::shared(), config.cache_config()),
//!         RetryPolicy::new(config.retry_config()),
//!     );
//!
//!     let fetch = operation_fn("fetch_users_older_than", |ctx| async move {
//!         let conn = ctx.require_connection()?;
//!         Ok(QueryResponse::from_rows(conn.query(ctx.require_sql()?, ctx.params()).await?))
//!     });
//!
//!     let ctx = OperationContext::for_query("SELECT * FROM users WHERE age > ?").bind(25);
//!     let users = stack.execute(ctx, &fetch).await?;
//!     println!("{} users", users.len());
//!     Ok(())
//! }
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

pub use sluice_core::{
    cleanup, config, driver, error, logging, middleware, session, store, transaction,
};

/// SQLite data store.
pub mod sqlite {
    pub use sluice_sqlite::*;
}

/// Prelude module for convenient imports.
pub mod prelude {
    pub use sluice_core::prelude::*;
    pub use sluice_sqlite::{SqliteConfig, SqliteStore};
}

// Re-export key types at the crate root
pub use sluice_core::{
    Connection, ConnectionHandle, DataStore, ErrorCode, SluiceConfig, SluiceError, SluiceResult,
};
pub use sluice_sqlite::SqliteStore;
