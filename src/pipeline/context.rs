//! Interceptor trait and the `proceed` continuation handed to each interceptor.

use std::{future::Future, sync::Arc};

use futures::future::{self, BoxFuture};
use tracing::trace;

use super::Phase;
use crate::error::CallError;

/// Unit of call-processing logic registered in a [`Phase`].
///
/// Closures of the form `Fn(PipelineContext<C>) -> impl Future` implement this
/// trait automatically; implement it by hand for reusable interceptors that
/// carry their own state.
pub trait Interceptor<C>: Send + Sync + 'static {
    /// Handle the call, optionally continuing the chain via
    /// [`PipelineContext::proceed`].
    fn intercept(&self, ctx: PipelineContext<C>) -> BoxFuture<'static, Result<(), CallError>>;
}

impl<C, F, Fut> Interceptor<C> for F
where
    C: 'static,
    F: Fn(PipelineContext<C>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), CallError>> + Send + 'static,
{
    fn intercept(&self, ctx: PipelineContext<C>) -> BoxFuture<'static, Result<(), CallError>> {
        Box::pin(self(ctx))
    }
}

/// One interceptor in the flattened execution order, tagged with its phase.
pub(super) struct Link<C> {
    pub(super) phase: Phase,
    pub(super) interceptor: Arc<dyn Interceptor<C>>,
}

/// Execution cursor handed to an interceptor.
///
/// The context owns a shared snapshot of the flattened chain and the position
/// of the interceptor it was created for. [`proceed`](Self::proceed) runs
/// everything after that position; an interceptor that returns without
/// proceeding ends the chain for this call.
pub struct PipelineContext<C> {
    call: Arc<C>,
    chain: Arc<[Link<C>]>,
    index: usize,
    proceeded: bool,
}

impl<C> PipelineContext<C>
where
    C: Send + Sync + 'static,
{
    /// The subject being processed.
    #[must_use]
    pub fn call(&self) -> &Arc<C> { &self.call }

    /// Phase of the interceptor holding this context.
    #[must_use]
    pub fn phase(&self) -> &Phase { &self.chain[self.index].phase }

    /// Returns `true` once [`proceed`](Self::proceed) has been called.
    #[must_use]
    pub fn has_proceeded(&self) -> bool { self.proceeded }

    /// Run the rest of the pipeline and return when it has finished.
    ///
    /// Only the first call runs the downstream chain; later calls return
    /// `Ok(())` immediately.
    ///
    /// # Errors
    ///
    /// Returns the first error raised by any downstream interceptor.
    pub async fn proceed(&mut self) -> Result<(), CallError> {
        if std::mem::replace(&mut self.proceeded, true) {
            return Ok(());
        }
        run_chain(
            Arc::clone(&self.call),
            Arc::clone(&self.chain),
            self.index + 1,
        )
        .await
    }
}

/// Start the interceptor at `index`, or finish immediately past the end.
pub(super) fn run_chain<C>(
    call: Arc<C>,
    chain: Arc<[Link<C>]>,
    index: usize,
) -> BoxFuture<'static, Result<(), CallError>>
where
    C: Send + Sync + 'static,
{
    let Some(link) = chain.get(index) else {
        return Box::pin(future::ready(Ok(())));
    };
    let interceptor = Arc::clone(&link.interceptor);
    trace!(phase = %link.phase, index, "running interceptor");
    interceptor.intercept(PipelineContext {
        call,
        chain,
        index,
        proceeded: false,
    })
}
