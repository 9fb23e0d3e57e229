//! Retry middleware: re-run everything it wraps on failure.

use std::time::Duration;

use tracing::{debug, warn};

use super::context::OperationContext;
use super::types::{BoxFuture, Middleware, MiddlewareResult, Next, QueryResponse};
use crate::error::{ErrorCode, SluiceError, SluiceResult};

/// Configuration for retry behavior.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Total attempts, including the first. Always at least 1.
    pub retries: u32,
    /// Fixed delay between attempts.
    pub delay: Duration,
    /// Predicate to determine if an error is retryable.
    pub retry_on: RetryPredicate,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            retries: 3,
            delay: Duration::from_secs(2),
            retry_on: RetryPredicate::Always,
        }
    }
}

impl RetryConfig {
    /// Create a new retry config.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set total attempts.
    pub fn retries(mut self, n: u32) -> Self {
        self.retries = n;
        self
    }

    /// Set the delay between attempts.
    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Set retry predicate.
    pub fn retry_on(mut self, predicate: RetryPredicate) -> Self {
        self.retry_on = predicate;
        self
    }

    /// Reject configurations that could never run the operation.
    pub fn validate(&self) -> SluiceResult<()> {
        if self.retries == 0 {
            return Err(SluiceError::config("retries must be at least 1")
                .with_help("retries counts total attempts, including the first"));
        }
        Ok(())
    }
}

/// Predicate for determining if an error should trigger another attempt.
#[derive(Debug, Clone, Default)]
pub enum RetryPredicate {
    /// Retry on any error.
    #[default]
    Always,
    /// Never retry.
    Never,
    /// Retry only on connection errors.
    ConnectionOnly,
    /// Retry only on errors that are usually transient (busy, acquisition).
    TransientOnly,
    /// Custom list of error kinds to retry.
    Custom(Vec<RetryableError>),
}

impl RetryPredicate {
    /// Check if an error should be retried.
    pub fn should_retry(&self, error: &SluiceError) -> bool {
        match self {
            Self::Always => true,
            Self::Never => false,
            Self::ConnectionOnly => error.is_connection_error(),
            Self::TransientOnly => error.is_transient(),
            Self::Custom(kinds) => kinds.iter().any(|kind| kind.matches(error)),
        }
    }
}

/// Kinds of errors that can be configured for retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryableError {
    /// Connection errors.
    Connection,
    /// Database busy or locked.
    Busy,
    /// Errors raised by the data store while executing a statement.
    Database,
    /// Transaction errors.
    Transaction,
    /// Errors raised by the unit of work itself.
    Operation,
}

impl RetryableError {
    /// Check if this kind matches the given error.
    pub fn matches(&self, error: &SluiceError) -> bool {
        match self {
            Self::Connection => error.is_connection_error(),
            Self::Busy => error.code == ErrorCode::Busy,
            Self::Database => matches!(error.code, ErrorCode::DatabaseError | ErrorCode::SqlSyntax),
            Self::Transaction => error.is_transaction_error(),
            Self::Operation => error.code == ErrorCode::OperationFailed,
        }
    }
}

/// Middleware that re-runs the rest of the chain when it fails.
///
/// Each attempt runs every inner layer from scratch, so a policy placed
/// outside a [`ResourceScope`](super::ResourceScope) opens a new connection
/// and starts a new transaction on every attempt. After the last attempt the
/// last error is returned unchanged.
///
/// The delay uses [`tokio::time::sleep`] and only suspends the current call.
///
/// # Example
///
/// ```rust
/// use sluice_core::middleware::{RetryConfig, RetryPolicy};
/// use std::time::Duration;
///
/// let retry = RetryPolicy::new(
///     RetryConfig::new()
///         .retries(5)
///         .delay(Duration::from_millis(50)),
/// );
/// assert_eq!(retry.config().retries, 5);
/// ```
pub struct RetryPolicy {
    config: RetryConfig,
}

impl RetryPolicy {
    /// Create a new retry policy with the given config.
    ///
    /// A `retries` of zero is treated as one attempt.
    pub fn new(mut config: RetryConfig) -> Self {
        config.retries = config.retries.max(1);
        Self { config }
    }

    /// Shorthand for `retries` attempts with a fixed `delay`.
    pub fn fixed(retries: u32, delay: Duration) -> Self {
        Self::new(RetryConfig::new().retries(retries).delay(delay))
    }

    /// Get the retry configuration.
    pub fn config(&self) -> &RetryConfig {
        &self.config
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(RetryConfig::default())
    }
}

impl Middleware for RetryPolicy {
    fn handle<'a>(
        &'a self,
        ctx: OperationContext,
        next: Next<'a>,
    ) -> BoxFuture<'a, MiddlewareResult<QueryResponse>> {
        Box::pin(async move {
            let retries = self.config.retries;
            let mut attempt = 1;
            loop {
                let error = match next.run(ctx.clone()).await {
                    Ok(response) => {
                        if attempt > 1 {
                            debug!(
                                target: "sluice::retry",
                                operation = ctx.operation_name(),
                                attempt,
                                "succeeded after retry"
                            );
                        }
                        return Ok(response);
                    }
                    Err(error) => error,
                };

                if attempt >= retries || !self.config.retry_on.should_retry(&error) {
                    warn!(
                        target: "sluice::retry",
                        operation = ctx.operation_name(),
                        attempt,
                        retries,
                        error = %error,
                        "giving up"
                    );
                    return Err(error);
                }

                warn!(
                    target: "sluice::retry",
                    operation = ctx.operation_name(),
                    attempt,
                    retries,
                    delay_ms = self.config.delay.as_millis() as u64,
                    error = %error,
                    "attempt failed, retrying"
                );
                if !self.config.delay.is_zero() {
                    tokio::time::sleep(self.config.delay).await;
                }
                attempt += 1;
            }
        })
    }

    fn name(&self) -> &'static str {
        "RetryPolicy"
    }
}
