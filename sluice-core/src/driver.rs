//! Running several top-level calls concurrently through one stack.
//!
//! Calls are awaited together on the current task; they share nothing but
//! the stack's layers (and so the result cache store).

use futures::future::join_all;

use crate::middleware::{MiddlewareResult, MiddlewareStack, Operation, OperationContext, QueryResponse};

/// One top-level call: a unit of work and its context.
pub struct Call<'a> {
    /// The unit of work.
    pub operation: &'a dyn Operation,
    /// Its arguments.
    pub ctx: OperationContext,
}

impl<'a> Call<'a> {
    /// Pair an operation with its context.
    pub fn new(operation: &'a dyn Operation, ctx: OperationContext) -> Self {
        Self { operation, ctx }
    }
}

/// Run two calls concurrently and return both results, in order.
pub async fn join_pair<'a>(
    stack: &'a MiddlewareStack,
    first: Call<'a>,
    second: Call<'a>,
) -> (MiddlewareResult<QueryResponse>, MiddlewareResult<QueryResponse>) {
    tokio::join!(
        stack.execute(first.ctx, first.operation),
        stack.execute(second.ctx, second.operation),
    )
}

/// Run every call concurrently and return the results in input order.
pub async fn run_all<'a>(
    stack: &'a MiddlewareStack,
    calls: impl IntoIterator<Item = Call<'a>>,
) -> Vec<MiddlewareResult<QueryResponse>> {
    join_all(
        calls
            .into_iter()
            .map(|call| stack.execute(call.ctx, call.operation)),
    )
    .await
}
