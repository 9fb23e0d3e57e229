//! Error types for SQLite operations.

use std::fmt;

use rusqlite::ffi::ErrorCode as FfiCode;
use sluice_core::SluiceError;

/// Result type for SQLite operations.
pub type SqliteResult<T> = Result<T, SqliteError>;

/// Error raised by the SQLite driver.
///
/// Wraps the `tokio-rusqlite` error so that busy, syntax and closed-thread
/// failures can be classified before they reach the middleware.
#[derive(Debug)]
pub struct SqliteError(tokio_rusqlite::Error);

impl SqliteError {
    fn rusqlite(&self) -> Option<&rusqlite::Error> {
        match &self.0 {
            tokio_rusqlite::Error::Rusqlite(e) => Some(e),
            tokio_rusqlite::Error::Close((_, e)) => Some(e),
            _ => None,
        }
    }

    /// The database file is locked by another connection.
    pub fn is_busy(&self) -> bool {
        matches!(
            self.rusqlite(),
            Some(rusqlite::Error::SqliteFailure(
                rusqlite::ffi::Error {
                    code: FfiCode::DatabaseBusy | FfiCode::DatabaseLocked,
                    ..
                },
                _,
            ))
        )
    }

    /// The statement could not be parsed.
    pub fn is_syntax_error(&self) -> bool {
        match self.rusqlite() {
            Some(rusqlite::Error::SqlInputError { msg, .. }) => msg.contains("syntax error"),
            Some(rusqlite::Error::SqliteFailure(_, Some(msg))) => msg.contains("syntax error"),
            _ => false,
        }
    }

    /// Whether the background connection thread is gone.
    pub fn is_connection_closed(&self) -> bool {
        matches!(self.0, tokio_rusqlite::Error::ConnectionClosed)
    }

    /// Convert into the middleware error type, attaching the statement.
    pub fn into_sluice(self, sql: Option<&str>) -> SluiceError {
        let message = self.0.to_string();

        let err = if self.is_busy() {
            SluiceError::busy(message)
        } else if self.is_syntax_error() {
            SluiceError::sql_syntax(message, sql.unwrap_or_default())
        } else if self.is_connection_closed() {
            SluiceError::connection_closed()
        } else {
            SluiceError::database(message)
        };

        let err = match sql {
            Some(sql) if err.context.sql.is_none() => err.with_sql(sql),
            _ => err,
        };
        err.with_source(self)
    }
}

impl fmt::Display for SqliteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SQLite error: {}", self.0)
    }
}

impl std::error::Error for SqliteError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.0)
    }
}

impl From<tokio_rusqlite::Error> for SqliteError {
    fn from(err: tokio_rusqlite::Error) -> Self {
        Self(err)
    }
}

impl From<rusqlite::Error> for SqliteError {
    fn from(err: rusqlite::Error) -> Self {
        Self(tokio_rusqlite::Error::Rusqlite(err))
    }
}

impl From<SqliteError> for SluiceError {
    fn from(err: SqliteError) -> Self {
        err.into_sluice(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use sluice_core::ErrorCode;

    fn failure(code: FfiCode, extended: i32, msg: &str) -> SqliteError {
        rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error {
                code,
                extended_code: extended,
            },
            Some(msg.to_string()),
        )
        .into()
    }

    #[test]
    fn test_error_display() {
        let err = failure(FfiCode::CannotOpen, 14, "unable to open database file");
        assert!(err.to_string().starts_with("SQLite error: "));
        assert!(err.to_string().contains("unable to open database file"));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_busy_maps_to_busy() {
        let err = failure(FfiCode::DatabaseBusy, 5, "database is locked");
        assert!(err.is_busy());

        let converted = err.into_sluice(Some("UPDATE users SET age = 1"));
        assert_eq!(converted.code, ErrorCode::Busy);
        assert!(converted.is_transient());
        assert_eq!(converted.context.sql.as_deref(), Some("UPDATE users SET age = 1"));
    }

    #[test]
    fn test_syntax_error_keeps_sql() {
        let err = failure(FfiCode::Unknown, 1, "near \"SELEC\": syntax error");
        assert!(err.is_syntax_error());

        let converted = err.into_sluice(Some("SELEC * FROM users"));
        assert_eq!(converted.code, ErrorCode::SqlSyntax);
        assert_eq!(converted.context.sql.as_deref(), Some("SELEC * FROM users"));
    }

    #[test]
    fn test_other_failures_are_database_errors() {
        let err = failure(FfiCode::Unknown, 1, "no such table: users");
        let converted: SluiceError = err.into();
        assert_eq!(converted.code, ErrorCode::DatabaseError);
        assert!(converted.message.contains("no such table: users"));
    }

    #[test]
    fn test_closed_connection() {
        let err = SqliteError::from(tokio_rusqlite::Error::ConnectionClosed);
        assert_eq!(err.into_sluice(None).code, ErrorCode::ConnectionClosed);
    }
}
