use thiserror::Error;
use txflow_bus::BusError;
use txflow_envelope::EncodeError;

/// Errors that can occur in this crate.
#[derive(Debug, Error)]
pub enum Error {
    /// The bus has been closed.
    #[error("bus is closed")]
    Closed,

    /// Envelope could not be encoded.
    #[error(transparent)]
    Encode(#[from] EncodeError),

    /// The consumer group already has a live subscription on the topic.
    #[error("consumer group `{group}` is already subscribed to `{topic}`")]
    GroupAlreadySubscribed {
        /// The topic.
        topic: String,

        /// The consumer group.
        group: String,
    },

    /// The bus has not been opened yet.
    #[error("bus is not open")]
    NotOpen,

    /// An injected fault rejected the publish.
    #[error("publish to `{0}` rejected")]
    Rejected(String),

    /// The publish did not complete within the publish timeout.
    #[error("publish to `{0}` timed out")]
    Timeout(String),
}

impl BusError for Error {
    fn is_closed(&self) -> bool {
        matches!(self, Self::Closed)
    }
}
