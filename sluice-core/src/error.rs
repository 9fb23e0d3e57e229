//! Error types for middleware and data-store operations.
//!
//! Every failure carries an [`ErrorCode`] for programmatic handling plus a
//! human readable message and optional context (operation name, SQL, help text).
//!
//! # Error Codes
//!
//! Error codes follow a pattern: S{category}{number}
//! - 1xxx: Connection errors (acquisition, closed handle, missing handle)
//! - 2xxx: Transaction errors (begin, commit)
//! - 3xxx: Execution errors (database, syntax, timeout, operation)
//! - 4xxx: Configuration errors
//! - 9xxx: Internal errors
//!
//! ```rust
//! use sluice_core::{ErrorCode, SluiceError};
//!
//! let err = SluiceError::acquisition("unable to open database file");
//! assert_eq!(err.code, ErrorCode::AcquisitionFailed);
//! assert!(err.is_acquisition_failure());
//! assert!(err.to_string().starts_with("[S1001]"));
//! ```
//!
//! # Propagation
//!
//! Middleware never wrap or rewrite an error coming from an inner layer: the
//! caller always sees the error the data store (or the unit of work) produced.
//! Failures raised while cleaning up (rollback, connection release) are routed
//! through [`crate::cleanup`] and never surface.

use std::fmt;
use thiserror::Error;

/// Result type for sluice operations.
pub type SluiceResult<T> = Result<T, SluiceError>;

/// Error codes for programmatic error handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    // Connection errors (1xxx)
    /// A connection could not be opened (S1001).
    AcquisitionFailed = 1001,
    /// The connection was already closed (S1002).
    ConnectionClosed = 1002,
    /// The operation required a connection but none was supplied (S1003).
    NoConnection = 1003,
    /// Closing a connection failed (S1004).
    ReleaseFailed = 1004,

    // Transaction errors (2xxx)
    /// BEGIN failed (S2001).
    BeginFailed = 2001,
    /// COMMIT failed (S2002).
    CommitFailed = 2002,
    /// ROLLBACK failed (S2003).
    RollbackFailed = 2003,

    // Execution errors (3xxx)
    /// General database error (S3001).
    DatabaseError = 3001,
    /// SQL syntax error (S3002).
    SqlSyntax = 3002,
    /// The data store reported it was busy or locked (S3003).
    Busy = 3003,
    /// The unit of work failed for a reason of its own (S3004).
    OperationFailed = 3004,

    // Configuration errors (4xxx)
    /// Invalid configuration (S4001).
    InvalidConfiguration = 4001,
    /// Invalid database URL (S4002).
    InvalidDatabaseUrl = 4002,

    // Internal errors (9xxx)
    /// Internal error (S9001).
    Internal = 9001,
}

impl ErrorCode {
    /// Get the error code string (e.g., "S1001").
    pub fn code(&self) -> String {
        format!("S{}", *self as u16)
    }

    /// Get a short description of the error code.
    pub fn description(&self) -> &'static str {
        match self {
            Self::AcquisitionFailed => "Connection acquisition failed",
            Self::ConnectionClosed => "Connection already closed",
            Self::NoConnection => "No connection available",
            Self::ReleaseFailed => "Connection release failed",
            Self::BeginFailed => "Transaction begin failed",
            Self::CommitFailed => "Transaction commit failed",
            Self::RollbackFailed => "Transaction rollback failed",
            Self::DatabaseError => "Database error",
            Self::SqlSyntax => "SQL syntax error",
            Self::Busy => "Database busy",
            Self::OperationFailed => "Operation failed",
            Self::InvalidConfiguration => "Invalid configuration",
            Self::InvalidDatabaseUrl => "Invalid database URL",
            Self::Internal => "Internal error",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Additional context for an error.
#[derive(Debug, Clone, Default)]
pub struct ErrorContext {
    /// The operation that was being performed.
    pub operation: Option<String>,
    /// The SQL query (if available).
    pub sql: Option<String>,
    /// Help text.
    pub help: Option<String>,
}

/// Errors that can occur while running a call through the middleware stack.
#[derive(Error, Debug)]
pub struct SluiceError {
    /// The error code.
    pub code: ErrorCode,
    /// The error message.
    pub message: String,
    /// Additional context.
    pub context: ErrorContext,
    /// The source error (if any).
    #[source]
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl fmt::Display for SluiceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code.code(), self.message)
    }
}

impl SluiceError {
    /// Create a new error with the given code and message.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            context: ErrorContext::default(),
            source: None,
        }
    }

    /// Add the operation name.
    pub fn with_operation(mut self, operation: impl Into<String>) -> Self {
        self.context.operation = Some(operation.into());
        self
    }

    /// Set the SQL query.
    pub fn with_sql(mut self, sql: impl Into<String>) -> Self {
        self.context.sql = Some(sql.into());
        self
    }

    /// Add help text.
    pub fn with_help(mut self, help: impl Into<String>) -> Self {
        self.context.help = Some(help.into());
        self
    }

    /// Set the source error.
    pub fn with_source<E: std::error::Error + Send + Sync + 'static>(mut self, source: E) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    // ============== Constructor Functions ==============

    /// Create an acquisition error (a connection could not be opened).
    pub fn acquisition(message: impl Into<String>) -> Self {
        let message = message.into();
        Self::new(
            ErrorCode::AcquisitionFailed,
            format!("Failed to open connection: {}", message),
        )
        .with_help("Check that the database path exists and is writable")
    }

    /// Create a closed-connection error.
    pub fn connection_closed() -> Self {
        Self::new(ErrorCode::ConnectionClosed, "Connection is already closed")
    }

    /// Create a missing-connection error.
    pub fn no_connection(operation: impl Into<String>) -> Self {
        let operation = operation.into();
        Self::new(
            ErrorCode::NoConnection,
            format!("Operation '{}' requires a connection but none was supplied", operation),
        )
        .with_operation(&operation)
        .with_help("Wrap the operation in a ResourceScope or pass a connection explicitly")
    }

    /// Create a release error.
    pub fn release(message: impl Into<String>) -> Self {
        let message = message.into();
        Self::new(ErrorCode::ReleaseFailed, format!("Failed to close connection: {}", message))
    }

    /// Create a transaction error for the given stage.
    pub fn transaction(code: ErrorCode, message: impl Into<String>) -> Self {
        let message = message.into();
        Self::new(code, format!("Transaction error: {}", message))
    }

    /// Create a general database error.
    pub fn database(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::DatabaseError, message)
    }

    /// Create an SQL syntax error.
    pub fn sql_syntax(message: impl Into<String>, sql: impl Into<String>) -> Self {
        let message = message.into();
        Self::new(ErrorCode::SqlSyntax, format!("SQL syntax error: {}", message)).with_sql(sql)
    }

    /// Create a busy/locked error.
    pub fn busy(message: impl Into<String>) -> Self {
        let message = message.into();
        Self::new(ErrorCode::Busy, format!("Database busy: {}", message))
    }

    /// Create an operation-level error raised by a unit of work.
    pub fn operation(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::OperationFailed, message)
    }

    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        let message = message.into();
        Self::new(ErrorCode::InvalidConfiguration, format!("Invalid configuration: {}", message))
    }

    /// Create an invalid-URL error.
    pub fn invalid_url(url: impl Into<String>, message: impl Into<String>) -> Self {
        let url = url.into();
        let message = message.into();
        Self::new(
            ErrorCode::InvalidDatabaseUrl,
            format!("Invalid database URL '{}': {}", url, message),
        )
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        let message = message.into();
        Self::new(ErrorCode::Internal, format!("Internal error: {}", message))
    }

    // ============== Error Checks ==============

    /// Check if this error means no connection could be acquired.
    pub fn is_acquisition_failure(&self) -> bool {
        self.code == ErrorCode::AcquisitionFailed
    }

    /// Check if this is a connection-level error.
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self.code,
            ErrorCode::AcquisitionFailed
                | ErrorCode::ConnectionClosed
                | ErrorCode::NoConnection
                | ErrorCode::ReleaseFailed
        )
    }

    /// Check if this is a transaction error.
    pub fn is_transaction_error(&self) -> bool {
        matches!(
            self.code,
            ErrorCode::BeginFailed | ErrorCode::CommitFailed | ErrorCode::RollbackFailed
        )
    }

    /// Check if this error is usually transient.
    pub fn is_transient(&self) -> bool {
        matches!(self.code, ErrorCode::AcquisitionFailed | ErrorCode::Busy)
    }

    /// Display the full error with all context.
    pub fn display_full(&self) -> String {
        let mut output = format!("Error [{}]: {}\n", self.code.code(), self.message);

        if let Some(ref op) = self.context.operation {
            output.push_str(&format!("  → While: {}\n", op));
        }
        if let Some(ref sql) = self.context.sql {
            let sql_display = if sql.len() > 200 {
                format!("{}...", &sql[..200])
            } else {
                sql.clone()
            };
            output.push_str(&format!("  → SQL: {}\n", sql_display));
        }
        if let Some(ref help) = self.context.help {
            output.push_str(&format!("\nHelp: {}\n", help));
        }

        output
    }
}
