use crate::envelope::RawEnvelope;
use crate::{DecodeError, EncodeError, EventEnvelope};

use bytes::Bytes;

/// Serializes an envelope to its JSON wire form.
///
/// # Errors
/// Returns an error if the payload holds values JSON cannot represent.
pub fn encode(envelope: &EventEnvelope) -> Result<Bytes, EncodeError> {
    Ok(Bytes::from(serde_json::to_vec(envelope)?))
}

/// Parses an envelope from its JSON wire form.
///
/// Only the envelope itself is validated. The payload is not checked against
/// the type tag, and unknown tags are accepted.
///
/// # Errors
/// Returns [`DecodeError::Malformed`] for bytes that are not a JSON object of
/// the right shape and [`DecodeError::MissingField`] when `id`, `type` or
/// `transactionId` is absent or empty.
pub fn decode(bytes: &[u8]) -> Result<EventEnvelope, DecodeError> {
    let raw: RawEnvelope = serde_json::from_slice(bytes)?;
    EventEnvelope::try_from(raw)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{EventType, FundsReserved, Payload};

    use rust_decimal_macros::dec;
    use serde_json::{Value, json};

    fn funds_reserved() -> EventEnvelope {
        EventEnvelope::new(
            "tx-42",
            "u1",
            &Payload::FundsReserved(FundsReserved {
                ok: true,
                hold_id: "h-1".to_string(),
                amount: dec!(100),
            }),
        )
        .unwrap()
        .with_correlation_id("tx-42")
    }

    #[test]
    fn test_encode_uses_wire_field_names() {
        let bytes = encode(&funds_reserved()).unwrap();
        let value: Value = serde_json::from_slice(&bytes).unwrap();

        assert_eq!(value["type"], "txn.FundsReserved");
        assert_eq!(value["transactionId"], "tx-42");
        assert_eq!(value["correlationId"], "tx-42");
        assert_eq!(value["version"], 1);
        assert!(value["ts"].is_i64());
        assert_eq!(value["payload"]["holdId"], "h-1");
        assert_eq!(value["payload"]["amount"], 100.0);
    }

    #[test]
    fn test_absent_correlation_id_is_omitted() {
        let mut envelope = funds_reserved();
        envelope.correlation_id = None;

        let value: Value = serde_json::from_slice(&encode(&envelope).unwrap()).unwrap();
        assert!(value.get("correlationId").is_none());
    }

    #[test]
    fn test_decode_inverts_encode() {
        let envelope = funds_reserved();
        let decoded = decode(&encode(&envelope).unwrap()).unwrap();
        assert_eq!(decoded, envelope);
    }

    #[test]
    fn test_decode_accepts_timestamp_alias_and_unknown_type() {
        let bytes = serde_json::to_vec(&json!({
            "id": "m-1",
            "type": "txn.LedgerAudited",
            "timestamp": 1_700_000_000_000_i64,
            "transactionId": "tx-1",
            "payload": { "anything": true }
        }))
        .unwrap();

        let envelope = decode(&bytes).unwrap();
        assert_eq!(envelope.timestamp, 1_700_000_000_000);
        assert_eq!(
            envelope.event_type,
            EventType::Other("txn.LedgerAudited".to_string())
        );
        assert_eq!(envelope.user_id, "");
        assert_eq!(envelope.version, 1);
        assert!(envelope.correlation_id.is_none());
    }

    #[test]
    fn test_decode_rejects_missing_transaction_id() {
        let bytes = serde_json::to_vec(&json!({
            "id": "m-1",
            "type": "txn.TransactionInitiated",
            "ts": 1,
            "payload": {}
        }))
        .unwrap();

        assert!(matches!(
            decode(&bytes),
            Err(DecodeError::MissingField("transactionId"))
        ));
    }

    #[test]
    fn test_decode_rejects_empty_id() {
        let bytes = serde_json::to_vec(&json!({
            "id": "",
            "type": "txn.TransactionInitiated",
            "transactionId": "tx-1"
        }))
        .unwrap();

        assert!(matches!(decode(&bytes), Err(DecodeError::MissingField("id"))));
    }

    #[test]
    fn test_decode_rejects_malformed_json() {
        assert!(matches!(
            decode(b"{not json"),
            Err(DecodeError::Malformed(_))
        ));
        assert!(matches!(decode(b"[1,2]"), Err(DecodeError::Malformed(_))));
    }

    #[test]
    fn test_try_from_bytes() {
        let bytes = encode(&funds_reserved()).unwrap();
        let envelope = EventEnvelope::try_from(bytes).unwrap();
        assert_eq!(envelope.transaction_id, "tx-42");
    }
}
