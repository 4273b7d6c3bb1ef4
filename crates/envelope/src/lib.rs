//! Event envelope, payload kinds and wire codec shared by every txflow component.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod codec;
mod dead_letter;
mod envelope;
mod error;
mod payload;

pub use codec::{decode, encode};
pub use dead_letter::{DeadLetterRecord, OriginalEncoding};
pub use envelope::{EventEnvelope, SCHEMA_VERSION, new_id, now_millis};
pub use error::{DecodeError, EncodeError, PayloadError};
pub use payload::{
    Committed, EventType, FraudChecked, FundsReserved, Notified, Payload, Reversed, Risk,
    TransactionInitiated,
};
