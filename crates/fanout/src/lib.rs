//! Subscription registry and fan-out of domain events to real-time clients.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod error;
mod protocol;
mod registry;
mod router;

pub use error::{DeliveryError, Error};
pub use protocol::{
    ClientCommand, ServerMessage, SubscriptionKind, SubscriptionRequest, SubscriptionTarget,
};
pub use registry::{RegistryStats, RouteReport, Subscription, SubscriptionRegistry};
pub use router::EventRouter;

/// A live connection the registry can push messages to.
///
/// Delivery must not block; implementations queue the message and report
/// [`DeliveryError`] when they cannot.
pub trait ClientSink
where
    Self: Send + Sync + 'static,
{
    /// Queues a message for the client.
    ///
    /// # Errors
    /// Returns why the message could not be queued; the registry then drops
    /// the connection.
    fn deliver(&self, message: ServerMessage) -> Result<(), DeliveryError>;
}
