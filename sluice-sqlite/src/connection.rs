//! SQLite connection wrapper.

use async_trait::async_trait;
use sluice_core::{
    Connection, ErrorCode, Param, Row, SluiceError, SluiceResult, TransactionConfig,
    TransactionMode,
};
use tracing::{debug, trace};

use crate::error::{SqliteError, SqliteResult};
use crate::types::{params_to_sqlite, row_to_json};

/// One live SQLite connection.
///
/// Statements run on the connection's background thread via
/// [`tokio_rusqlite::Connection::call`].
pub struct SqliteConnection {
    conn: tokio_rusqlite::Connection,
}

impl SqliteConnection {
    /// Wrap an open connection.
    pub fn new(conn: tokio_rusqlite::Connection) -> Self {
        Self { conn }
    }

    /// The underlying connection.
    pub fn inner(&self) -> &tokio_rusqlite::Connection {
        &self.conn
    }

    async fn batch(&self, sql: &'static str) -> SqliteResult<()> {
        self.conn
            .call(move |conn| {
                conn.execute_batch(sql)?;
                Ok(())
            })
            .await
            .map_err(SqliteError::from)
    }

    async fn batch_owned(&self, sql: String) -> SqliteResult<()> {
        self.conn
            .call(move |conn| {
                conn.execute_batch(&sql)?;
                Ok(())
            })
            .await
            .map_err(SqliteError::from)
    }
}

#[async_trait]
impl Connection for SqliteConnection {
    async fn query(&self, sql: &str, params: &[Param]) -> SluiceResult<Vec<Row>> {
        debug!(target: "sluice::sqlite", sql = %sql, params = params.len(), "Executing query");
        let owned_sql = sql.to_string();
        let values = params_to_sqlite(params);

        self.conn
            .call(move |conn| {
                let mut stmt = conn.prepare(&owned_sql)?;
                let columns: Vec<String> = stmt
                    .column_names()
                    .iter()
                    .map(|s| s.to_string())
                    .collect();

                let rows = stmt.query_map(rusqlite::params_from_iter(values.iter()), |row| {
                    Ok(row_to_json(row, &columns))
                })?;

                let results: Result<Vec<_>, _> = rows.collect();
                Ok(results?)
            })
            .await
            .map_err(|e| SqliteError::from(e).into_sluice(Some(sql)))
    }

    async fn execute(&self, sql: &str, params: &[Param]) -> SluiceResult<u64> {
        debug!(target: "sluice::sqlite", sql = %sql, params = params.len(), "Executing statement");
        let owned_sql = sql.to_string();
        let values = params_to_sqlite(params);

        let affected = self
            .conn
            .call(move |conn| Ok(conn.execute(&owned_sql, rusqlite::params_from_iter(values.iter()))?))
            .await
            .map_err(|e| SqliteError::from(e).into_sluice(Some(sql)))?;

        Ok(affected as u64)
    }

    async fn begin(&self, mode: TransactionMode) -> SluiceResult<()> {
        let sql = TransactionConfig::new().mode(mode).to_begin_sql();
        trace!(target: "sluice::sqlite", sql = %sql, "begin");
        self.batch_owned(sql).await.map_err(|e| {
            SluiceError::transaction(ErrorCode::BeginFailed, e.to_string()).with_source(e)
        })
    }

    async fn commit(&self) -> SluiceResult<()> {
        trace!(target: "sluice::sqlite", "commit");
        self.batch(TransactionConfig::new().commit_sql())
            .await
            .map_err(|e| {
                SluiceError::transaction(ErrorCode::CommitFailed, e.to_string()).with_source(e)
            })
    }

    async fn rollback(&self) -> SluiceResult<()> {
        trace!(target: "sluice::sqlite", "rollback");
        self.batch(TransactionConfig::new().rollback_sql())
            .await
            .map_err(|e| {
                SluiceError::transaction(ErrorCode::RollbackFailed, e.to_string()).with_source(e)
            })
    }

    async fn close(&self) -> SluiceResult<()> {
        trace!(target: "sluice::sqlite", "close");
        self.conn.clone().close().await.map_err(|e| {
            let e = SqliteError::from(e);
            SluiceError::release(e.to_string()).with_source(e)
        })
    }
}
