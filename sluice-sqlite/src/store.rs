//! The SQLite data store.

use async_trait::async_trait;
use sluice_core::{ConnectionHandle, DataStore, SluiceConfig, SluiceError, SluiceResult};
use tracing::{debug, info};

use crate::config::SqliteConfig;
use crate::connection::SqliteConnection;
use crate::error::SqliteResult;

/// Opens a fresh SQLite connection for every call.
///
/// There is no pooling: each [`open`](DataStore::open) creates a connection
/// and applies the configured pragmas, and closing the handle closes it.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    config: SqliteConfig,
}

impl SqliteStore {
    /// Create a store from configuration.
    pub fn new(config: SqliteConfig) -> Self {
        info!(target: "sluice::sqlite", path = %config.path_str(), "SQLite store created");
        Self { config }
    }

    /// Create a store from a database URL.
    pub fn from_url(url: impl AsRef<str>) -> SluiceResult<Self> {
        Ok(Self::new(SqliteConfig::from_url(url)?))
    }

    /// Create a store from the `[database]` section of a sluice config.
    pub fn from_config(config: &SluiceConfig) -> SluiceResult<Self> {
        Self::from_url(config.database_url())
    }

    /// In-memory store. Every opened connection sees its own empty database.
    pub fn memory() -> Self {
        Self::new(SqliteConfig::memory())
    }

    /// The store's configuration.
    pub fn config(&self) -> &SqliteConfig {
        &self.config
    }

    async fn open_connection(&self) -> SqliteResult<tokio_rusqlite::Connection> {
        let conn = if self.config.path.is_memory() {
            tokio_rusqlite::Connection::open_in_memory().await?
        } else {
            tokio_rusqlite::Connection::open(self.config.path_str()).await?
        };

        let config = self.config.clone();
        conn.call(move |conn| {
            config.apply(conn)?;
            Ok(())
        })
        .await?;

        Ok(conn)
    }
}

#[async_trait]
impl DataStore for SqliteStore {
    async fn open(&self) -> SluiceResult<ConnectionHandle> {
        let conn = self.open_connection().await.map_err(|e| {
            SluiceError::acquisition(format!("{}: {}", self.config.path_str(), e)).with_source(e)
        })?;
        debug!(target: "sluice::sqlite", path = %self.config.path_str(), "connection opened");
        Ok(ConnectionHandle::new(SqliteConnection::new(conn)))
    }

    fn describe(&self) -> String {
        format!("sqlite:{}", self.config.path_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[tokio::test]
    async fn test_file_store_shares_data() {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteStore::new(SqliteConfig::file(dir.path().join("users.db")));

        let first = store.open().await.unwrap();
        first
            .execute("CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT)", &[])
            .await
            .unwrap();
        first
            .execute("INSERT INTO users (name) VALUES (?)", &[json!("Ada")])
            .await
            .unwrap();
        first.close().await.unwrap();

        let second = store.open().await.unwrap();
        let rows = second.query("SELECT name FROM users", &[]).await.unwrap();
        assert_eq!(rows, vec![json!({"name": "Ada"})]);
        second.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_memory_connections_are_private() {
        let store = SqliteStore::memory();

        let first = store.open().await.unwrap();
        first.execute("CREATE TABLE t (x INTEGER)", &[]).await.unwrap();

        let second = store.open().await.unwrap();
        let err = second.query("SELECT * FROM t", &[]).await.unwrap_err();
        assert!(err.message.contains("no such table"));
    }

    #[tokio::test]
    async fn test_open_failure_is_acquisition_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteStore::new(SqliteConfig::file(dir.path().join("missing/dir/users.db")));

        let err = store.open().await.unwrap_err();
        assert!(err.is_acquisition_failure());
    }

    #[tokio::test]
    async fn test_pragmas_applied() {
        let store = SqliteStore::new(SqliteConfig::memory().busy_timeout(1234));
        let conn = store.open().await.unwrap();

        let rows = conn.query("PRAGMA busy_timeout", &[]).await.unwrap();
        let timeout = rows
            .first()
            .and_then(|r| r.as_object())
            .and_then(|r| r.values().next().cloned());
        assert_eq!(timeout, Some(json!(1234)));
    }

    #[test]
    fn test_from_config() {
        let config = SluiceConfig::from_str("[database]\nurl = \"sqlite::memory:\"\n").unwrap();
        let store = SqliteStore::from_config(&config).unwrap();
        assert!(store.config().path.is_memory());
        assert_eq!(store.describe(), "sqlite::memory:");
    }
}
