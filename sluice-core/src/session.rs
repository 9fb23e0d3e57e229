//! Scoped connection sessions outside a middleware stack.

use std::future::Future;

use tracing::debug;

use crate::cleanup::{CleanupStage, discard_cleanup_failure};
use crate::error::SluiceResult;
use crate::store::{ConnectionHandle, DataStore, Param, Row};
use crate::transaction::TransactionMode;

/// A connection held for the duration of one closure.
///
/// [`Session::run`] opens a connection and begins a transaction, runs the
/// body, then commits if the body returned `Ok` or rolls back if it returned
/// `Err`. The connection is closed either way. Failures while committing,
/// rolling back or closing are logged and dropped; the body's result is
/// always the one returned.
///
/// ```rust,ignore
/// use sluice_core::session::Session;
///
/// let rows = Session::run(&store, |conn| async move {
///     conn.execute("UPDATE users SET email = ? WHERE id = ?", &params).await?;
///     conn.query("SELECT * FROM users WHERE id = ?", &[1.into()]).await
/// })
/// .await?;
/// ```
#[derive(Debug, Clone, Copy)]
pub struct Session;

impl Session {
    /// Run `body` inside a deferred transaction on a fresh connection.
    pub async fn run<S, F, Fut, T>(store: &S, body: F) -> SluiceResult<T>
    where
        S: DataStore + ?Sized,
        F: FnOnce(ConnectionHandle) -> Fut,
        Fut: Future<Output = SluiceResult<T>>,
    {
        Self::run_with_mode(store, TransactionMode::Deferred, body).await
    }

    /// Run `body` inside a transaction with the given locking mode.
    pub async fn run_with_mode<S, F, Fut, T>(
        store: &S,
        mode: TransactionMode,
        body: F,
    ) -> SluiceResult<T>
    where
        S: DataStore + ?Sized,
        F: FnOnce(ConnectionHandle) -> Fut,
        Fut: Future<Output = SluiceResult<T>>,
    {
        let conn = store.open().await?;
        debug!(target: "sluice::transaction", handle = conn.id(), "session opened");

        if let Err(err) = conn.begin(mode).await {
            discard_cleanup_failure(CleanupStage::Release, conn.close().await);
            return Err(err);
        }

        let result = body(conn.clone()).await;
        match &result {
            Ok(_) => {
                discard_cleanup_failure(CleanupStage::Commit, conn.commit().await);
            }
            Err(err) => {
                debug!(target: "sluice::transaction", handle = conn.id(), error = %err, "session rolling back");
                discard_cleanup_failure(CleanupStage::Rollback, conn.rollback().await);
            }
        }
        discard_cleanup_failure(CleanupStage::Release, conn.close().await);
        result
    }
}

/// Run one query on its own connection and return every row.
///
/// Same lifecycle as [`Session::run`].
pub async fn execute_query<S>(store: &S, sql: &str, params: &[Param]) -> SluiceResult<Vec<Row>>
where
    S: DataStore + ?Sized,
{
    Session::run(store, |conn| async move { conn.query(sql, params).await }).await
}
