//! Resource scope: one connection per call.

use std::sync::Arc;

use tracing::{debug, trace, warn};

use super::context::OperationContext;
use super::types::{BoxFuture, Middleware, MiddlewareResult, Next, QueryResponse};
use crate::cleanup::{CleanupStage, discard_cleanup_failure};
use crate::store::{ConnectionHandle, DataStore, SharedStore};

/// Middleware that opens a connection for the duration of a call.
///
/// If the call already carries a connection (see
/// [`OperationContext::connection`]) it is passed through untouched and this
/// layer neither opens nor closes anything. Otherwise a fresh connection is
/// opened, inserted in front of the positional arguments, and closed once the
/// inner layers finish, whatever their outcome.
///
/// An open failure is returned to the caller as is. A close failure is
/// swallowed.
///
/// If the call is dropped before the inner layers finish, for example by a
/// `tokio::time::timeout` around [`MiddlewareStack::execute`] or by a panic in
/// the operation, the connection is closed on a task spawned onto the current
/// Tokio runtime.
///
/// [`MiddlewareStack::execute`]: super::MiddlewareStack::execute
///
/// # Example
///
/// ```rust,ignore
/// use sluice_core::middleware::{MiddlewareStack, ResourceScope};
///
/// let stack = MiddlewareStack::new().with(ResourceScope::new(store));
/// ```
pub struct ResourceScope {
    store: SharedStore,
}

impl ResourceScope {
    /// Create a resource scope over the given store.
    pub fn new(store: impl DataStore + 'static) -> Self {
        Self::shared(Arc::new(store))
    }

    /// Create a resource scope over an already shared store.
    pub fn shared(store: SharedStore) -> Self {
        Self { store }
    }

    /// The underlying store.
    pub fn store(&self) -> &SharedStore {
        &self.store
    }
}

impl Middleware for ResourceScope {
    fn handle<'a>(
        &'a self,
        mut ctx: OperationContext,
        next: Next<'a>,
    ) -> BoxFuture<'a, MiddlewareResult<QueryResponse>> {
        Box::pin(async move {
            if let Some(handle) = ctx.connection() {
                trace!(
                    target: "sluice::resource",
                    handle = handle.id(),
                    operation = ctx.operation_name(),
                    "caller supplied a connection"
                );
                return next.run(ctx).await;
            }

            let handle = self.store.open().await?;
            debug!(
                target: "sluice::resource",
                handle = handle.id(),
                store = %self.store.describe(),
                operation = ctx.operation_name(),
                "connection opened"
            );

            let mut guard = CloseOnDrop::new(handle.clone());
            ctx.prepend_connection(handle.clone());
            let result = next.run(ctx).await;
            guard.disarm();

            if discard_cleanup_failure(CleanupStage::Release, handle.close().await) {
                debug!(target: "sluice::resource", handle = handle.id(), "connection closed");
            }
            result
        })
    }

    fn name(&self) -> &'static str {
        "ResourceScope"
    }
}

/// Closes a scoped connection when the call owning it is dropped mid-flight.
struct CloseOnDrop {
    handle: Option<ConnectionHandle>,
}

impl CloseOnDrop {
    fn new(handle: ConnectionHandle) -> Self {
        Self {
            handle: Some(handle),
        }
    }

    fn disarm(&mut self) {
        self.handle = None;
    }
}

impl Drop for CloseOnDrop {
    fn drop(&mut self) {
        let Some(handle) = self.handle.take() else {
            return;
        };
        if handle.is_closed() {
            return;
        }

        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                debug!(
                    target: "sluice::resource",
                    handle = handle.id(),
                    "call dropped, closing connection in background"
                );
                runtime.spawn(async move {
                    if discard_cleanup_failure(CleanupStage::Release, handle.close().await) {
                        debug!(target: "sluice::resource", handle = handle.id(), "connection closed");
                    }
                });
            }
            Err(_) => warn!(
                target: "sluice::resource",
                handle = handle.id(),
                "call dropped outside a runtime, connection not closed"
            ),
        }
    }
}
