use std::future::Future;

use futures::future::BoxFuture;

use crate::error::HandlerError;

/// Processes the payload of one event key.
///
/// Returning `Ok` deletes the event. [`HandlerError::StopRetry`] drops it
/// after logging; any other error schedules a retry.
pub trait EventHandler: Send + Sync {
    fn handle(&self, payload: String) -> BoxFuture<'static, Result<(), HandlerError>>;
}

impl<F, Fut> EventHandler for F
where
    F: Fn(String) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
{
    fn handle(&self, payload: String) -> BoxFuture<'static, Result<(), HandlerError>> {
        Box::pin(self(payload))
    }
}
