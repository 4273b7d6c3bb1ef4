//! Abstract interface for the partitioned message bus.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod handler;
mod message;
mod subscription;
mod topics;

pub use handler::{HandlerError, MessageHandler};
pub use message::BusMessage;
pub use subscription::Subscription;
pub use topics::{GATEWAY_CONSUMER_GROUP, ORCHESTRATOR_CONSUMER_GROUP, Topics};

use std::error::Error;

use async_trait::async_trait;
use bytes::Bytes;
use txflow_envelope::{EncodeError, EventEnvelope};

/// Marker trait for bus errors.
pub trait BusError: Error + Send + Sync + 'static {
    /// Whether the error means the bus has been closed for good.
    fn is_closed(&self) -> bool;
}

/// A partitioned, at-least-once message bus.
///
/// Messages published with the same key land on the same partition, so any
/// single consumer observes them in publish order.
#[async_trait]
pub trait Bus
where
    Self: Clone + Send + Sync + 'static,
{
    /// The error type for the bus.
    type Error: BusError + From<EncodeError>;

    /// Handle returned by [`Bus::subscribe`].
    type Subscription: Subscription;

    /// Makes the bus usable. Every other operation fails before this.
    async fn open(&self) -> Result<(), Self::Error>;

    /// Waits for in-flight publishes, stops every consumer loop and rejects
    /// all further operations.
    async fn close(&self) -> Result<(), Self::Error>;

    /// Publishes raw bytes.
    ///
    /// Without a key the bus picks a partition itself.
    async fn publish_bytes(
        &self,
        topic: &str,
        key: Option<&str>,
        payload: Bytes,
    ) -> Result<(), Self::Error>;

    /// Encodes an envelope and publishes it with `key` as partition key.
    async fn publish(
        &self,
        topic: &str,
        key: &str,
        envelope: &EventEnvelope,
    ) -> Result<(), Self::Error> {
        let payload = txflow_envelope::encode(envelope)?;
        self.publish_bytes(topic, Some(key), payload).await
    }

    /// Starts delivering messages of `topic` to `handler` on behalf of
    /// `consumer_group`.
    ///
    /// The handler is called once per message, sequentially within a
    /// partition and concurrently across partitions. Handler errors are
    /// logged and never stop delivery.
    async fn subscribe<H>(
        &self,
        topic: &str,
        consumer_group: &str,
        handler: H,
    ) -> Result<Self::Subscription, Self::Error>
    where
        H: MessageHandler;
}
