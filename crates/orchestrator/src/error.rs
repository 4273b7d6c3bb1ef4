use crate::InvalidTransition;

use std::error::Error as StdError;

use thiserror::Error;
use txflow_bus::HandlerError;
use txflow_envelope::{DecodeError, EventType, PayloadError};

/// Errors that can occur in this crate.
#[derive(Debug, Error)]
pub enum Error {
    /// The command could not be decoded.
    #[error(transparent)]
    Decode(#[from] DecodeError),

    /// The command payload is not a valid `txn.TransactionInitiated`.
    #[error("invalid command payload: {0}")]
    InvalidCommand(#[from] PayloadError),

    /// Probability outside `[0, 1]`.
    #[error("probability must be between 0 and 1, got {0}")]
    InvalidProbability(f64),

    /// A saga step could not publish its event.
    #[error("failed to publish {event_type}: {source}")]
    Publish {
        /// The event that was being published.
        event_type: EventType,

        /// The bus error.
        source: Box<dyn StdError + Send + Sync>,
    },

    /// The saga tried to take an illegal step.
    #[error(transparent)]
    Transition(#[from] InvalidTransition),
}

impl HandlerError for Error {}
