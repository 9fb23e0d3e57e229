//! Data-store capability consumed by the middleware.
//!
//! The middleware never talk to a database directly. They see a [`DataStore`]
//! that can open connections, and a [`ConnectionHandle`] wrapping one live
//! [`Connection`]. Backends (see `sluice-sqlite`) implement the two traits.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use async_trait::async_trait;
use tracing::trace;

use crate::error::{SluiceError, SluiceResult};
use crate::transaction::TransactionMode;

/// A fetched row, as a JSON object keyed by column name.
pub type Row = serde_json::Value;

/// A bind parameter.
pub type Param = serde_json::Value;

/// One live connection to a data store.
///
/// Implementations do not need to guard against double close; the
/// [`ConnectionHandle`] wrapping them does.
#[async_trait]
pub trait Connection: Send + Sync {
    /// Execute a query and fetch all resulting rows.
    async fn query(&self, sql: &str, params: &[Param]) -> SluiceResult<Vec<Row>>;

    /// Execute a statement and return the number of affected rows.
    async fn execute(&self, sql: &str, params: &[Param]) -> SluiceResult<u64>;

    /// Issue an explicit transaction begin.
    async fn begin(&self, mode: TransactionMode) -> SluiceResult<()>;

    /// Commit the current transaction.
    async fn commit(&self) -> SluiceResult<()>;

    /// Roll back the current transaction.
    async fn rollback(&self) -> SluiceResult<()>;

    /// Close the connection.
    async fn close(&self) -> SluiceResult<()>;
}

/// Something that can open connections.
#[async_trait]
pub trait DataStore: Send + Sync {
    /// Open a new connection.
    async fn open(&self) -> SluiceResult<ConnectionHandle>;

    /// Short description used in log events (e.g. the database path).
    fn describe(&self) -> String {
        std::any::type_name::<Self>().to_string()
    }
}

/// A data store shared between middleware.
pub type SharedStore = Arc<dyn DataStore>;

static NEXT_HANDLE_ID: AtomicU64 = AtomicU64::new(1);

struct HandleInner {
    id: u64,
    conn: Box<dyn Connection>,
    closed: AtomicBool,
}

/// A cloneable handle to one live connection.
///
/// Clones refer to the same connection. The handle closes the underlying
/// connection at most once; later calls to [`close`](Self::close) are no-ops
/// and any other call on a closed handle fails with
/// [`ErrorCode::ConnectionClosed`](crate::ErrorCode::ConnectionClosed).
#[derive(Clone)]
pub struct ConnectionHandle {
    inner: Arc<HandleInner>,
}

impl ConnectionHandle {
    /// Wrap a backend connection.
    pub fn new(conn: impl Connection + 'static) -> Self {
        Self::from_boxed(Box::new(conn))
    }

    /// Wrap an already boxed backend connection.
    pub fn from_boxed(conn: Box<dyn Connection>) -> Self {
        let id = NEXT_HANDLE_ID.fetch_add(1, Ordering::Relaxed);
        trace!(target: "sluice::resource", handle = id, "connection handle created");
        Self {
            inner: Arc::new(HandleInner {
                id,
                conn,
                closed: AtomicBool::new(false),
            }),
        }
    }

    /// Process-unique handle id.
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    /// Whether [`close`](Self::close) has been called.
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    /// Whether two handles refer to the same connection.
    pub fn same_connection(&self, other: &ConnectionHandle) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    fn live(&self) -> SluiceResult<&dyn Connection> {
        if self.is_closed() {
            return Err(SluiceError::connection_closed());
        }
        Ok(self.inner.conn.as_ref())
    }

    /// Execute a query and fetch all rows.
    pub async fn query(&self, sql: &str, params: &[Param]) -> SluiceResult<Vec<Row>> {
        self.live()?.query(sql, params).await
    }

    /// Execute a statement and return the number of affected rows.
    pub async fn execute(&self, sql: &str, params: &[Param]) -> SluiceResult<u64> {
        self.live()?.execute(sql, params).await
    }

    /// Begin a transaction.
    pub async fn begin(&self, mode: TransactionMode) -> SluiceResult<()> {
        self.live()?.begin(mode).await
    }

    /// Commit the current transaction.
    pub async fn commit(&self) -> SluiceResult<()> {
        self.live()?.commit().await
    }

    /// Roll back the current transaction.
    pub async fn rollback(&self) -> SluiceResult<()> {
        self.live()?.rollback().await
    }

    /// Close the connection. Only the first call reaches the backend.
    pub async fn close(&self) -> SluiceResult<()> {
        if self.inner.closed.swap(true, Ordering::AcqRel) {
            trace!(target: "sluice::resource", handle = self.id(), "close skipped, already closed");
            return Ok(());
        }
        self.inner.conn.close().await
    }
}

impl fmt::Debug for ConnectionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionHandle")
            .field("id", &self.id())
            .field("closed", &self.is_closed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockStore;

    #[tokio::test]
    async fn test_close_reaches_backend_once() {
        let store = MockStore::new();
        let handle = store.open().await.unwrap();
        let clone = handle.clone();

        handle.close().await.unwrap();
        clone.close().await.unwrap();

        assert!(handle.is_closed());
        assert_eq!(store.stats().closes, 1);
    }

    #[tokio::test]
    async fn test_closed_handle_rejects_queries() {
        let store = MockStore::new();
        let handle = store.open().await.unwrap();
        handle.close().await.unwrap();

        let err = handle.query("SELECT 1", &[]).await.unwrap_err();
        assert_eq!(err.code, crate::ErrorCode::ConnectionClosed);
        assert_eq!(store.stats().queries, 0);
    }

    #[tokio::test]
    async fn test_clones_share_connection() {
        let store = MockStore::new();
        let a = store.open().await.unwrap();
        let b = store.open().await.unwrap();

        assert!(a.same_connection(&a.clone()));
        assert!(!a.same_connection(&b));
        assert_ne!(a.id(), b.id());
    }
}
