use async_trait::async_trait;
use std::future::Future;
use crate::application::errors::HandlerError;
use crate::application::messaging::Invocation;

/// Handler result
pub type HandlerResult = Result<(), HandlerError>;

/// Handler trait - what a fragment hands to the registry
#[async_trait]
pub trait Handler: Send + Sync {
    async fn handle(&self, invocation: Invocation) -> HandlerResult;
}

#[async_trait]
impl<F, Fut> Handler for F
where
    F: Fn(Invocation) -> Fut + Send + Sync,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    async fn handle(&self, invocation: Invocation) -> HandlerResult {
        (self)(invocation).await
    }
}
