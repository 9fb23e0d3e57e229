//! In-memory test doubles.
//!
//! [`MockStore`] counts every capability call and can be told to fail the
//! next N opens, queries, commits, rollbacks or closes. [`RecordingSink`]
//! captures what a query logger emits.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::json;

use crate::error::{SluiceError, SluiceResult};
use crate::middleware::QuerySink;
use crate::store::{Connection, ConnectionHandle, DataStore, Param, Row};
use crate::transaction::TransactionMode;

/// Counters for every capability call seen by a [`MockStore`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MockStats {
    /// Successful opens.
    pub opens: u32,
    /// Failed opens.
    pub open_failures: u32,
    /// Calls that reached the backend close.
    pub closes: u32,
    /// Transaction begins.
    pub begins: u32,
    /// Commits that reached the backend.
    pub commits: u32,
    /// Rollbacks that reached the backend.
    pub rollbacks: u32,
    /// Queries executed (including failed ones).
    pub queries: u32,
    /// Statements executed (including failed ones).
    pub executes: u32,
}

#[derive(Default)]
struct Failures {
    opens: u32,
    queries: u32,
    commits: u32,
    rollbacks: u32,
    closes: u32,
}

#[derive(Default)]
struct MockState {
    stats: MockStats,
    failures: Failures,
    events: Vec<String>,
    rows: HashMap<String, Vec<Row>>,
    query_delay: Option<Duration>,
}

/// A counting in-memory data store.
#[derive(Clone, Default)]
pub struct MockStore {
    state: Arc<Mutex<MockState>>,
}

impl MockStore {
    /// Create a store where every call succeeds.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `n` opens fail.
    pub fn fail_opens(self, n: u32) -> Self {
        self.state.lock().failures.opens = n;
        self
    }

    /// Make the next `n` queries and statements fail.
    pub fn fail_queries(self, n: u32) -> Self {
        self.state.lock().failures.queries = n;
        self
    }

    /// Make the next `n` commits fail.
    pub fn fail_commits(self, n: u32) -> Self {
        self.state.lock().failures.commits = n;
        self
    }

    /// Make the next `n` rollbacks fail.
    pub fn fail_rollbacks(self, n: u32) -> Self {
        self.state.lock().failures.rollbacks = n;
        self
    }

    /// Make the next `n` closes fail.
    pub fn fail_closes(self, n: u32) -> Self {
        self.state.lock().failures.closes = n;
        self
    }

    /// Return `rows` for `sql` instead of the default echo row.
    pub fn with_rows(self, sql: impl Into<String>, rows: Vec<Row>) -> Self {
        self.state.lock().rows.insert(sql.into(), rows);
        self
    }

    /// Sleep for `delay` inside every query.
    pub fn with_query_delay(self, delay: Duration) -> Self {
        self.state.lock().query_delay = Some(delay);
        self
    }

    /// Snapshot of the counters.
    pub fn stats(&self) -> MockStats {
        self.state.lock().stats
    }

    /// Ordered log of capability calls, e.g. `["open", "begin", "query", "commit", "close"]`.
    pub fn events(&self) -> Vec<String> {
        self.state.lock().events.clone()
    }
}

#[async_trait]
impl DataStore for MockStore {
    async fn open(&self) -> SluiceResult<ConnectionHandle> {
        let mut state = self.state.lock();
        if state.failures.opens > 0 {
            state.failures.opens -= 1;
            state.stats.open_failures += 1;
            state.events.push("open_failed".to_string());
            return Err(SluiceError::acquisition("mock store refused the connection"));
        }
        state.stats.opens += 1;
        state.events.push("open".to_string());
        drop(state);

        Ok(ConnectionHandle::new(MockConnection {
            state: Arc::clone(&self.state),
        }))
    }

    fn describe(&self) -> String {
        "mock".to_string()
    }
}

struct MockConnection {
    state: Arc<Mutex<MockState>>,
}

impl MockConnection {
    fn record(&self, event: &str) {
        self.state.lock().events.push(event.to_string());
    }
}

#[async_trait]
impl Connection for MockConnection {
    async fn query(&self, sql: &str, params: &[Param]) -> SluiceResult<Vec<Row>> {
        let delay = self.state.lock().query_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.state.lock();
        state.stats.queries += 1;
        state.events.push("query".to_string());
        if state.failures.queries > 0 {
            state.failures.queries -= 1;
            return Err(SluiceError::database(format!(
                "mock failure #{} for {}",
                state.stats.queries, sql
            )));
        }
        Ok(state
            .rows
            .get(sql)
            .cloned()
            .unwrap_or_else(|| vec![json!({ "sql": sql, "params": params })]))
    }

    async fn execute(&self, sql: &str, _params: &[Param]) -> SluiceResult<u64> {
        let mut state = self.state.lock();
        state.stats.executes += 1;
        state.events.push("execute".to_string());
        if state.failures.queries > 0 {
            state.failures.queries -= 1;
            return Err(SluiceError::database(format!("mock failure for {}", sql)));
        }
        Ok(1)
    }

    async fn begin(&self, _mode: TransactionMode) -> SluiceResult<()> {
        let mut state = self.state.lock();
        state.stats.begins += 1;
        state.events.push("begin".to_string());
        Ok(())
    }

    async fn commit(&self) -> SluiceResult<()> {
        let mut state = self.state.lock();
        state.events.push("commit".to_string());
        if state.failures.commits > 0 {
            state.failures.commits -= 1;
            return Err(SluiceError::transaction(
                crate::ErrorCode::CommitFailed,
                "mock commit failure",
            ));
        }
        state.stats.commits += 1;
        Ok(())
    }

    async fn rollback(&self) -> SluiceResult<()> {
        let mut state = self.state.lock();
        state.events.push("rollback".to_string());
        state.stats.rollbacks += 1;
        if state.failures.rollbacks > 0 {
            state.failures.rollbacks -= 1;
            return Err(SluiceError::transaction(
                crate::ErrorCode::RollbackFailed,
                "mock rollback failure",
            ));
        }
        Ok(())
    }

    async fn close(&self) -> SluiceResult<()> {
        self.record("close");
        let mut state = self.state.lock();
        state.stats.closes += 1;
        if state.failures.closes > 0 {
            state.failures.closes -= 1;
            return Err(SluiceError::release("mock close failure"));
        }
        Ok(())
    }
}

/// A [`QuerySink`] that keeps every recorded query.
#[derive(Clone, Default)]
pub struct RecordingSink {
    lines: Arc<Mutex<Vec<String>>>,
}

impl RecordingSink {
    /// Create an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything recorded so far.
    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().clone()
    }
}

impl QuerySink for RecordingSink {
    fn record(&self, query: &str) {
        self.lines.lock().push(query.to_string());
    }
}
