use async_trait::async_trait;
use futures::future::BoxFuture;

use crate::context::SagaContext;
use crate::error::StepError;

/// An asynchronous operation run against the saga context.
///
/// Forward actions and compensations share this capability. Implementations
/// typically call out to a repository, a remote service or a message broker;
/// the saga treats them as opaque.
#[async_trait]
pub trait Action: Send + Sync {
    /// Run the operation.
    ///
    /// # Errors
    ///
    /// Returns a [`StepError`] if the operation could not complete.
    async fn run(&self, ctx: &mut SagaContext) -> Result<(), StepError>;
}

/// An [`Action`] backed by a closure returning a boxed future.
///
/// Created with [`action_fn`].
pub struct FnAction<F> {
    f: F,
}

#[async_trait]
impl<F> Action for FnAction<F>
where
    F: for<'a> Fn(&'a mut SagaContext) -> BoxFuture<'a, Result<(), StepError>> + Send + Sync,
{
    async fn run(&self, ctx: &mut SagaContext) -> Result<(), StepError> {
        (self.f)(ctx).await
    }
}

/// Wrap a closure as an [`Action`].
///
/// ```
/// use saga_engine::{StepError, action_fn};
///
/// let reserve = action_fn(|ctx| {
///     Box::pin(async move {
///         ctx.set("reservation", serde_json::json!("r-1"));
///         Ok::<(), StepError>(())
///     })
/// });
/// # let _ = reserve;
/// ```
pub fn action_fn<F>(f: F) -> FnAction<F>
where
    F: for<'a> Fn(&'a mut SagaContext) -> BoxFuture<'a, Result<(), StepError>> + Send + Sync,
{
    FnAction { f }
}
