//! SQLite data store for sluice.
//!
//! Connections are opened through `tokio-rusqlite`, so every statement runs on
//! a dedicated background thread and never blocks the async runtime.
//!
//! # Example
//!
//! ```rust,ignore
//! use sluice_core::prelude::*;
//! use sluice_sqlite::SqliteStore;
//!
//! #[tokio::main]
//! async fn main() -> SluiceResult<()> {
//!     let store = SqliteStore::from_url("sqlite://./users.db")?;
//!     let rows = execute_query(&store, "SELECT * FROM users WHERE age > ?", &[25.into()]).await?;
//!     println!("{} users", rows.len());
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod connection;
pub mod error;
pub mod store;
pub mod types;

pub use config::{DatabasePath, JournalMode, SqliteConfig, SynchronousMode};
pub use connection::SqliteConnection;
pub use error::{SqliteError, SqliteResult};
pub use store::SqliteStore;
