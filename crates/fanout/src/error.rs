use thiserror::Error;
use txflow_bus::HandlerError;

/// Errors that can occur in this crate.
#[derive(Debug, Error)]
pub enum Error {
    /// A client frame is not valid JSON of the expected shape.
    #[error("malformed frame: {0}")]
    MalformedFrame(#[from] serde_json::Error),

    /// A subscribe request named neither a transaction nor a user.
    #[error("Please provide transactionId or userId")]
    NothingToSubscribe,

    /// The connection is not registered.
    #[error("Client not found")]
    UnknownConnection(String),

    /// A client sent an event name the protocol does not define.
    #[error("unknown event `{0}`")]
    UnknownEvent(String),
}

impl HandlerError for Error {}

/// Why a message could not be handed to a connection.
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
pub enum DeliveryError {
    /// The connection is gone.
    #[error("connection closed")]
    Closed,

    /// The connection is not keeping up with its outbound queue.
    #[error("outbound queue full")]
    Full,
}
