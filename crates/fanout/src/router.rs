use crate::{Error, SubscriptionRegistry};

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, info, warn};
use txflow_bus::{Bus, BusMessage, GATEWAY_CONSUMER_GROUP, MessageHandler};
use txflow_envelope::{DecodeError, EventEnvelope};

/// Feeds domain events from the bus into a [`SubscriptionRegistry`].
#[derive(Clone, Debug)]
pub struct EventRouter {
    registry: Arc<SubscriptionRegistry>,
}

impl EventRouter {
    /// Creates a router delivering to `registry`.
    #[must_use]
    pub const fn new(registry: Arc<SubscriptionRegistry>) -> Self {
        Self { registry }
    }

    /// Subscribes the router to `topic` as the gateway consumer group.
    ///
    /// # Errors
    /// Returns the bus error if the subscription cannot be created.
    pub async fn start<B>(&self, bus: &B, topic: &str) -> Result<B::Subscription, B::Error>
    where
        B: Bus,
    {
        let subscription = bus
            .subscribe(topic, GATEWAY_CONSUMER_GROUP, self.clone())
            .await?;

        info!("routing events from {topic} to real-time clients");

        Ok(subscription)
    }
}

/// Decodes an event, taking the transaction id from the bus key when the
/// envelope lacks one.
fn decode_event(message: &BusMessage) -> Result<EventEnvelope, DecodeError> {
    match message.envelope() {
        Err(DecodeError::MissingField("transactionId")) if message.key.is_some() => {
            let mut value: Value = serde_json::from_slice(&message.payload)?;
            if let (Some(object), Some(key)) = (value.as_object_mut(), &message.key) {
                object.insert("transactionId".to_string(), Value::String(key.clone()));
            }
            txflow_envelope::decode(&serde_json::to_vec(&value)?)
        }
        result => result,
    }
}

#[async_trait]
impl MessageHandler for EventRouter {
    type Error = Error;

    async fn handle(&self, message: BusMessage) -> Result<(), Self::Error> {
        let event = match decode_event(&message) {
            Ok(event) => event,
            Err(e) => {
                warn!(
                    "dropping undecodable event {}[{}]@{}: {e}",
                    message.topic, message.partition, message.offset
                );
                return Ok(());
            }
        };

        let report = self.registry.route(&event);

        if report.delivered > 0 {
            info!(
                "{} ({}) broadcast to {} client(s)",
                event.event_type, event.transaction_id, report.delivered
            );
        } else {
            debug!(
                "{} ({}) has no subscribers",
                event.event_type, event.transaction_id
            );
        }

        if report.pruned > 0 {
            debug!("pruned {} dead client(s)", report.pruned);
        }

        Ok(())
    }
}
