//! Transaction boundary middleware.

use tracing::{debug, warn};

use super::context::OperationContext;
use super::types::{BoxFuture, Middleware, MiddlewareResult, Next, QueryResponse};
use crate::cleanup::{CleanupStage, discard_cleanup_failure};
use crate::transaction::{TransactionConfig, TransactionMode};

/// Middleware that wraps a call in BEGIN / COMMIT / ROLLBACK.
///
/// Transactions are opt-in on the presence of a connection: if the call
/// carries none, the inner layers run without a transaction. To always get
/// one, nest this layer inside a [`ResourceScope`](super::ResourceScope).
///
/// On success the transaction is committed. If the inner layers fail, or the
/// commit itself fails, the transaction is rolled back and the original error
/// is returned unchanged. Rollback failures are swallowed.
#[derive(Debug, Clone, Default)]
pub struct TransactionBoundary {
    config: TransactionConfig,
}

impl TransactionBoundary {
    /// Create a boundary with default settings (`BEGIN DEFERRED`).
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a boundary with the given configuration.
    pub fn with_config(config: TransactionConfig) -> Self {
        Self { config }
    }

    /// Set the locking mode.
    pub fn mode(mut self, mode: TransactionMode) -> Self {
        self.config.mode = mode;
        self
    }

    /// Get the configuration.
    pub fn config(&self) -> &TransactionConfig {
        &self.config
    }
}

impl Middleware for TransactionBoundary {
    fn handle<'a>(
        &'a self,
        ctx: OperationContext,
        next: Next<'a>,
    ) -> BoxFuture<'a, MiddlewareResult<QueryResponse>> {
        Box::pin(async move {
            let Some(conn) = ctx.connection().cloned() else {
                debug!(
                    target: "sluice::transaction",
                    operation = ctx.operation_name(),
                    "no connection, running without a transaction"
                );
                return next.run(ctx).await;
            };

            conn.begin(self.config.mode).await?;
            debug!(
                target: "sluice::transaction",
                handle = conn.id(),
                mode = self.config.mode.as_sql(),
                "transaction started"
            );

            let outcome = match next.run(ctx).await {
                Ok(response) => match conn.commit().await {
                    Ok(()) => {
                        debug!(target: "sluice::transaction", handle = conn.id(), "committed");
                        return Ok(response);
                    }
                    Err(err) => err,
                },
                Err(err) => err,
            };

            warn!(
                target: "sluice::transaction",
                handle = conn.id(),
                error = %outcome,
                "rolling back"
            );
            discard_cleanup_failure(CleanupStage::Rollback, conn.rollback().await);
            Err(outcome)
        })
    }

    fn name(&self) -> &'static str {
        "TransactionBoundary"
    }
}
