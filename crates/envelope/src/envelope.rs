use crate::{DecodeError, EncodeError, EventType, Payload, PayloadError};

use bytes::Bytes;
use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Schema version stamped on every envelope this build produces.
pub const SCHEMA_VERSION: u32 = 1;

/// Generates a fresh message or entity identifier.
#[must_use]
pub fn new_id() -> String {
    Uuid::new_v4().to_string()
}

/// Current wall-clock time in epoch milliseconds.
#[must_use]
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// The sole message shape carried on the bus.
///
/// The payload is kept as raw JSON so that envelopes with unknown types or
/// extra payload fields survive decoding. Use [`EventEnvelope::payload`] to
/// interpret it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "RawEnvelope")]
pub struct EventEnvelope {
    /// Unique message identifier.
    pub id: String,

    /// Type tag.
    #[serde(rename = "type")]
    pub event_type: EventType,

    /// Schema version.
    pub version: u32,

    /// Creation time in epoch milliseconds.
    #[serde(rename = "ts")]
    pub timestamp: i64,

    /// Transaction the message belongs to; also the partition key.
    pub transaction_id: String,

    /// Owner of the transaction, empty when unknown.
    pub user_id: String,

    /// Type specific body.
    pub payload: Value,

    /// Identifier tying the message to the command that caused it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
}

impl EventEnvelope {
    /// Builds a new envelope around a typed payload.
    ///
    /// The type tag is taken from the payload variant.
    ///
    /// # Errors
    /// Returns an error if the payload cannot be serialized.
    pub fn new(
        transaction_id: impl Into<String>,
        user_id: impl Into<String>,
        payload: &Payload,
    ) -> Result<Self, EncodeError> {
        Ok(Self {
            id: new_id(),
            event_type: payload.event_type(),
            version: SCHEMA_VERSION,
            timestamp: now_millis(),
            transaction_id: transaction_id.into(),
            user_id: user_id.into(),
            payload: payload.to_value()?,
            correlation_id: None,
        })
    }

    /// Sets the correlation identifier.
    #[must_use]
    pub fn with_correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = Some(correlation_id.into());
        self
    }

    /// Interprets the raw payload according to the type tag.
    ///
    /// # Errors
    /// See [`Payload::from_value`].
    pub fn payload(&self) -> Result<Payload, PayloadError> {
        Payload::from_value(&self.event_type, &self.payload)
    }

    /// Reads the raw payload as one specific payload struct, whatever the
    /// type tag says.
    ///
    /// # Errors
    /// Returns [`PayloadError::Invalid`] when the payload does not have the
    /// shape of `T`.
    pub fn payload_as<T>(&self) -> Result<T, PayloadError>
    where
        T: DeserializeOwned,
    {
        T::deserialize(&self.payload).map_err(|source| PayloadError::Invalid {
            event_type: self.event_type.to_string(),
            source,
        })
    }
}

impl TryFrom<Bytes> for EventEnvelope {
    type Error = DecodeError;

    fn try_from(bytes: Bytes) -> Result<Self, Self::Error> {
        crate::decode(&bytes)
    }
}

impl TryFrom<&EventEnvelope> for Bytes {
    type Error = EncodeError;

    fn try_from(envelope: &EventEnvelope) -> Result<Self, Self::Error> {
        crate::encode(envelope)
    }
}

/// Lenient wire shape used to report precisely which field is missing.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawEnvelope {
    id: Option<String>,

    #[serde(rename = "type")]
    event_type: Option<String>,

    version: Option<u32>,

    #[serde(rename = "ts", alias = "timestamp")]
    timestamp: Option<i64>,

    transaction_id: Option<String>,

    user_id: Option<String>,

    #[serde(default)]
    payload: Value,

    correlation_id: Option<String>,
}

fn required(value: Option<String>, field: &'static str) -> Result<String, DecodeError> {
    value
        .filter(|value| !value.is_empty())
        .ok_or(DecodeError::MissingField(field))
}

impl TryFrom<RawEnvelope> for EventEnvelope {
    type Error = DecodeError;

    fn try_from(raw: RawEnvelope) -> Result<Self, Self::Error> {
        Ok(Self {
            id: required(raw.id, "id")?,
            event_type: EventType::from(required(raw.event_type, "type")?),
            version: raw.version.unwrap_or(SCHEMA_VERSION),
            timestamp: raw.timestamp.unwrap_or_default(),
            transaction_id: required(raw.transaction_id, "transactionId")?,
            user_id: raw.user_id.unwrap_or_default(),
            payload: raw.payload,
            correlation_id: raw.correlation_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Committed, FraudChecked, Risk, TransactionInitiated};

    #[test]
    fn test_type_tag_follows_payload_variant() {
        let envelope = EventEnvelope::new(
            "tx-1",
            "u1",
            &Payload::FraudChecked(FraudChecked { risk: Risk::Low }),
        )
        .unwrap();

        assert_eq!(envelope.event_type, EventType::FraudChecked);
        assert_eq!(envelope.version, SCHEMA_VERSION);
        assert!(!envelope.id.is_empty());
        assert!(envelope.correlation_id.is_none());
    }

    #[test]
    fn test_payload_interpretation() {
        let envelope = EventEnvelope::new(
            "tx-1",
            "u1",
            &Payload::Committed(Committed {
                ledger_tx_id: "l-9".to_string(),
            }),
        )
        .unwrap()
        .with_correlation_id("tx-1");

        assert_eq!(envelope.correlation_id.as_deref(), Some("tx-1"));
        assert_eq!(
            envelope.payload().unwrap(),
            Payload::Committed(Committed {
                ledger_tx_id: "l-9".to_string()
            })
        );
    }

    #[test]
    fn test_typed_payload_access() {
        let envelope = EventEnvelope::new(
            "tx-1",
            "u1",
            &Payload::Committed(Committed {
                ledger_tx_id: "l-9".to_string(),
            }),
        )
        .unwrap();

        let committed: Committed = envelope.payload_as().unwrap();
        assert_eq!(committed.ledger_tx_id, "l-9");

        match envelope.payload_as::<TransactionInitiated>() {
            Err(PayloadError::Invalid { event_type, .. }) => {
                assert_eq!(event_type, "txn.Committed");
            }
            other => panic!("expected an invalid payload, got {other:?}"),
        }
    }

    #[test]
    fn test_ids_are_unique() {
        assert_ne!(new_id(), new_id());
    }
}
