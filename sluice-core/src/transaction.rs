//! Transaction configuration.
//!
//! ```rust
//! use sluice_core::{TransactionConfig, TransactionMode};
//!
//! let config = TransactionConfig::new();
//! assert_eq!(config.mode, TransactionMode::Deferred);
//! assert_eq!(config.to_begin_sql(), "BEGIN");
//!
//! let config = TransactionConfig::new().mode(TransactionMode::Immediate);
//! assert_eq!(config.to_begin_sql(), "BEGIN IMMEDIATE");
//! ```

use tracing::debug;

/// How a transaction acquires its locks when it begins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TransactionMode {
    /// Locks are taken lazily on first access.
    #[default]
    Deferred,
    /// A write lock is taken immediately.
    Immediate,
    /// An exclusive lock is taken immediately.
    Exclusive,
}

impl TransactionMode {
    /// Get the SQL keyword for this mode.
    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::Deferred => "DEFERRED",
            Self::Immediate => "IMMEDIATE",
            Self::Exclusive => "EXCLUSIVE",
        }
    }
}

/// Configuration for a transaction boundary.
#[derive(Debug, Clone, Default)]
pub struct TransactionConfig {
    /// Locking mode.
    pub mode: TransactionMode,
}

impl TransactionConfig {
    /// Create a new transaction config with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the locking mode.
    pub fn mode(mut self, mode: TransactionMode) -> Self {
        self.mode = mode;
        self
    }

    /// Generate the BEGIN statement.
    ///
    /// The default mode produces a bare `BEGIN`.
    pub fn to_begin_sql(&self) -> String {
        let sql = match self.mode {
            TransactionMode::Deferred => "BEGIN".to_string(),
            mode => format!("BEGIN {}", mode.as_sql()),
        };
        debug!(mode = %self.mode.as_sql(), "Transaction BEGIN");
        sql
    }

    /// The COMMIT statement.
    pub fn commit_sql(&self) -> &'static str {
        "COMMIT"
    }

    /// The ROLLBACK statement.
    pub fn rollback_sql(&self) -> &'static str {
        "ROLLBACK"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_sql() {
        assert_eq!(TransactionMode::Deferred.as_sql(), "DEFERRED");
        assert_eq!(TransactionMode::Immediate.as_sql(), "IMMEDIATE");
        assert_eq!(TransactionMode::Exclusive.as_sql(), "EXCLUSIVE");
    }

    #[test]
    fn test_begin_sql() {
        assert_eq!(TransactionConfig::new().to_begin_sql(), "BEGIN");
        assert_eq!(
            TransactionConfig::new()
                .mode(TransactionMode::Exclusive)
                .to_begin_sql(),
            "BEGIN EXCLUSIVE"
        );
    }

    #[test]
    fn test_commit_and_rollback_sql() {
        let config = TransactionConfig::new();
        assert_eq!(config.commit_sql(), "COMMIT");
        assert_eq!(config.rollback_sql(), "ROLLBACK");
    }
}
