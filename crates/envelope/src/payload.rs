use crate::PayloadError;

use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;

fn default_currency() -> String {
    "USD".to_string()
}

/// Command asking the orchestrator to move funds between two accounts.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionInitiated {
    /// Account the funds leave.
    pub from_account: String,

    /// Account the funds arrive at.
    pub to_account: String,

    /// Amount to transfer, carried as a JSON number.
    #[serde(with = "rust_decimal::serde::float")]
    pub amount: Decimal,

    /// ISO currency code.
    #[serde(default = "default_currency")]
    pub currency: String,

    /// Owner of the transaction.
    #[serde(default)]
    pub user_id: String,
}

/// Funds were placed on hold for the transaction.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FundsReserved {
    /// Always `true`; there is no hold backend that can refuse.
    pub ok: bool,

    /// Identifier of the hold.
    pub hold_id: String,

    /// Amount held, echoed from the command.
    #[serde(with = "rust_decimal::serde::float")]
    pub amount: Decimal,
}

/// Risk classification of a transaction.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Risk {
    /// Safe to commit.
    Low,

    /// Must be reversed.
    High,
}

impl fmt::Display for Risk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Low => write!(f, "LOW"),
            Self::High => write!(f, "HIGH"),
        }
    }
}

/// Outcome of the risk check.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FraudChecked {
    /// The assigned classification.
    pub risk: Risk,
}

/// The transfer was written to the ledger.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Committed {
    /// Ledger entry identifier.
    pub ledger_tx_id: String,
}

/// The transfer was rolled back.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reversed {
    /// Human readable cause.
    pub reason: String,
}

/// The owner was notified.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notified {
    /// Channels used, in delivery order.
    pub channels: Vec<String>,
}

/// Type tag of an envelope.
///
/// Unknown tags are kept verbatim in [`EventType::Other`] so that newer
/// producers never break older consumers at decode time.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum EventType {
    /// `txn.TransactionInitiated`
    TransactionInitiated,

    /// `txn.FundsReserved`
    FundsReserved,

    /// `txn.FraudChecked`
    FraudChecked,

    /// `txn.Committed`
    Committed,

    /// `txn.Reversed`
    Reversed,

    /// `txn.Notified`
    Notified,

    /// Any other tag.
    Other(String),
}

impl EventType {
    /// Returns the wire representation of the tag.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::TransactionInitiated => "txn.TransactionInitiated",
            Self::FundsReserved => "txn.FundsReserved",
            Self::FraudChecked => "txn.FraudChecked",
            Self::Committed => "txn.Committed",
            Self::Reversed => "txn.Reversed",
            Self::Notified => "txn.Notified",
            Self::Other(tag) => tag,
        }
    }
}

impl From<&str> for EventType {
    fn from(tag: &str) -> Self {
        match tag {
            "txn.TransactionInitiated" => Self::TransactionInitiated,
            "txn.FundsReserved" => Self::FundsReserved,
            "txn.FraudChecked" => Self::FraudChecked,
            "txn.Committed" => Self::Committed,
            "txn.Reversed" => Self::Reversed,
            "txn.Notified" => Self::Notified,
            other => Self::Other(other.to_string()),
        }
    }
}

impl From<String> for EventType {
    fn from(tag: String) -> Self {
        Self::from(tag.as_str())
    }
}

impl From<EventType> for String {
    fn from(event_type: EventType) -> Self {
        match event_type {
            EventType::Other(tag) => tag,
            known => known.as_str().to_string(),
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Typed payload of an envelope, one variant per known event kind.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Payload {
    /// See [`TransactionInitiated`].
    TransactionInitiated(TransactionInitiated),

    /// See [`FundsReserved`].
    FundsReserved(FundsReserved),

    /// See [`FraudChecked`].
    FraudChecked(FraudChecked),

    /// See [`Committed`].
    Committed(Committed),

    /// See [`Reversed`].
    Reversed(Reversed),

    /// See [`Notified`].
    Notified(Notified),
}

impl Payload {
    /// The type tag an envelope carrying this payload must use.
    #[must_use]
    pub const fn event_type(&self) -> EventType {
        match self {
            Self::TransactionInitiated(_) => EventType::TransactionInitiated,
            Self::FundsReserved(_) => EventType::FundsReserved,
            Self::FraudChecked(_) => EventType::FraudChecked,
            Self::Committed(_) => EventType::Committed,
            Self::Reversed(_) => EventType::Reversed,
            Self::Notified(_) => EventType::Notified,
        }
    }

    /// Serializes the payload body to JSON.
    ///
    /// # Errors
    /// Returns an error if a field cannot be represented as JSON.
    pub fn to_value(&self) -> Result<Value, serde_json::Error> {
        match self {
            Self::TransactionInitiated(body) => serde_json::to_value(body),
            Self::FundsReserved(body) => serde_json::to_value(body),
            Self::FraudChecked(body) => serde_json::to_value(body),
            Self::Committed(body) => serde_json::to_value(body),
            Self::Reversed(body) => serde_json::to_value(body),
            Self::Notified(body) => serde_json::to_value(body),
        }
    }

    /// Interprets a raw JSON body according to its type tag.
    ///
    /// # Errors
    /// Returns [`PayloadError::UnknownType`] for tags outside the closed set and
    /// [`PayloadError::Invalid`] when the body does not fit the tag.
    pub fn from_value(event_type: &EventType, value: &Value) -> Result<Self, PayloadError> {
        let invalid = |source| PayloadError::Invalid {
            event_type: event_type.to_string(),
            source,
        };

        match event_type {
            EventType::TransactionInitiated => TransactionInitiated::deserialize(value)
                .map(Self::TransactionInitiated)
                .map_err(invalid),
            EventType::FundsReserved => FundsReserved::deserialize(value)
                .map(Self::FundsReserved)
                .map_err(invalid),
            EventType::FraudChecked => FraudChecked::deserialize(value)
                .map(Self::FraudChecked)
                .map_err(invalid),
            EventType::Committed => Committed::deserialize(value)
                .map(Self::Committed)
                .map_err(invalid),
            EventType::Reversed => Reversed::deserialize(value)
                .map(Self::Reversed)
                .map_err(invalid),
            EventType::Notified => Notified::deserialize(value)
                .map(Self::Notified)
                .map_err(invalid),
            EventType::Other(tag) => Err(PayloadError::UnknownType(tag.clone())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use rust_decimal_macros::dec;
    use serde_json::json;

    #[test]
    fn test_event_type_round_trips_known_and_unknown_tags() {
        assert_eq!(EventType::from("txn.Committed"), EventType::Committed);
        assert_eq!(
            EventType::from("txn.SomethingNew"),
            EventType::Other("txn.SomethingNew".to_string())
        );
        assert_eq!(String::from(EventType::FraudChecked), "txn.FraudChecked");
    }

    #[test]
    fn test_amount_is_a_json_number() {
        let body = TransactionInitiated {
            from_account: "A1".to_string(),
            to_account: "A2".to_string(),
            amount: dec!(100),
            currency: "USD".to_string(),
            user_id: "u1".to_string(),
        };

        let value = serde_json::to_value(&body).unwrap();
        assert!(value["amount"].is_number());
        assert_eq!(value["fromAccount"], "A1");
        assert_eq!(value["userId"], "u1");
    }

    #[test]
    fn test_risk_wire_format() {
        let value = serde_json::to_value(FraudChecked { risk: Risk::High }).unwrap();
        assert_eq!(value, json!({ "risk": "HIGH" }));
    }

    #[test]
    fn test_unknown_payload_fields_are_ignored() {
        let value = json!({ "ledgerTxId": "l-1", "shard": 7 });
        let payload = Payload::from_value(&EventType::Committed, &value).unwrap();
        assert_eq!(
            payload,
            Payload::Committed(Committed {
                ledger_tx_id: "l-1".to_string()
            })
        );
    }

    #[test]
    fn test_mismatched_payload_is_invalid() {
        let value = json!({ "reason": "nope" });
        let err = Payload::from_value(&EventType::FraudChecked, &value).unwrap_err();
        assert!(matches!(err, PayloadError::Invalid { .. }));
    }

    #[test]
    fn test_unknown_type_is_rejected_at_interpretation() {
        let err = Payload::from_value(&EventType::from("txn.Audit"), &json!({})).unwrap_err();
        assert!(matches!(err, PayloadError::UnknownType(tag) if tag == "txn.Audit"));
    }

    #[test]
    fn test_currency_defaults_to_usd() {
        let value = json!({ "fromAccount": "A1", "toAccount": "A2", "amount": 5.5 });
        let Payload::TransactionInitiated(body) =
            Payload::from_value(&EventType::TransactionInitiated, &value).unwrap()
        else {
            panic!("expected a TransactionInitiated payload");
        };
        assert_eq!(body.currency, "USD");
        assert_eq!(body.amount, dec!(5.5));
        assert_eq!(body.user_id, "");
    }
}
