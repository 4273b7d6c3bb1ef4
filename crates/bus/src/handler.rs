use crate::BusMessage;

use std::error::Error;

use async_trait::async_trait;

/// Marker trait for handler errors
pub trait HandlerError: Error + Send + Sync + 'static {}

/// Processes messages delivered by a subscription.
#[async_trait]
pub trait MessageHandler
where
    Self: Clone + Send + Sync + 'static,
{
    /// The error type for the handler.
    type Error: HandlerError;

    /// Handles a single message.
    async fn handle(&self, message: BusMessage) -> Result<(), Self::Error>;
}
