use bytes::Bytes;
use txflow_envelope::{DecodeError, EventEnvelope};

/// A message as delivered to a consumer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BusMessage {
    /// Topic the message was published to.
    pub topic: String,

    /// Partition within the topic.
    pub partition: u32,

    /// Position within the partition.
    pub offset: u64,

    /// Partition key, if the producer set one.
    pub key: Option<String>,

    /// Raw message bytes.
    pub payload: Bytes,

    /// Append time in epoch milliseconds.
    pub timestamp: i64,
}

impl BusMessage {
    /// Decodes the payload as an event envelope.
    ///
    /// # Errors
    /// See [`txflow_envelope::decode`].
    pub fn envelope(&self) -> Result<EventEnvelope, DecodeError> {
        txflow_envelope::decode(&self.payload)
    }
}
