use crate::{Error, RegistryStats};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use txflow_envelope::EventEnvelope;

/// Which id a subscription refers to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SubscriptionKind {
    /// A transaction id.
    TransactionId,

    /// A user id.
    UserId,
}

/// One id added to or removed from a subscription.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SubscriptionTarget {
    /// The dimension.
    pub kind: SubscriptionKind,

    /// The id.
    pub value: String,
}

/// Body of `subscribeToTx` and `unsubscribeFromTx`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionRequest {
    /// Transaction to follow.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction_id: Option<String>,

    /// User to follow.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
}

impl SubscriptionRequest {
    /// Requests a single transaction.
    #[must_use]
    pub fn transaction(transaction_id: impl Into<String>) -> Self {
        Self {
            transaction_id: Some(transaction_id.into()),
            user_id: None,
        }
    }

    /// Requests every transaction of a user.
    #[must_use]
    pub fn user(user_id: impl Into<String>) -> Self {
        Self {
            transaction_id: None,
            user_id: Some(user_id.into()),
        }
    }

    /// The requested ids in protocol order, empty strings dropped.
    #[must_use]
    pub fn targets(&self) -> Vec<SubscriptionTarget> {
        [
            (SubscriptionKind::TransactionId, &self.transaction_id),
            (SubscriptionKind::UserId, &self.user_id),
        ]
        .into_iter()
        .filter_map(|(kind, value)| {
            value
                .as_deref()
                .filter(|value| !value.is_empty())
                .map(|value| SubscriptionTarget {
                    kind,
                    value: value.to_string(),
                })
        })
        .collect()
    }
}

/// A frame sent by a client.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ClientCommand {
    /// `subscribeToTx`
    SubscribeToTx(SubscriptionRequest),

    /// `unsubscribeFromTx`
    UnsubscribeFromTx(SubscriptionRequest),

    /// `getStats`
    GetStats,
}

#[derive(Deserialize)]
struct RawFrame {
    event: String,

    #[serde(default)]
    data: Value,
}

impl ClientCommand {
    /// Parses a `{"event": .., "data": ..}` text frame. A missing or null
    /// `data` is treated as an empty object.
    ///
    /// # Errors
    /// Returns [`Error::MalformedFrame`] for invalid JSON and
    /// [`Error::UnknownEvent`] for event names outside the protocol.
    pub fn parse(text: &str) -> Result<Self, Error> {
        let frame: RawFrame = serde_json::from_str(text)?;

        let request = || -> Result<SubscriptionRequest, Error> {
            if frame.data.is_null() {
                Ok(SubscriptionRequest::default())
            } else {
                Ok(SubscriptionRequest::deserialize(&frame.data)?)
            }
        };

        match frame.event.as_str() {
            "subscribeToTx" => Ok(Self::SubscribeToTx(request()?)),
            "unsubscribeFromTx" => Ok(Self::UnsubscribeFromTx(request()?)),
            "getStats" => Ok(Self::GetStats),
            other => Err(Error::UnknownEvent(other.to_string())),
        }
    }
}

/// A frame sent to a client.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum ServerMessage {
    /// Greeting sent once a connection is registered.
    Connected {
        /// Greeting text.
        message: String,

        /// The connection id assigned by the server.
        #[serde(rename = "socketId")]
        socket_id: String,
    },

    /// Acknowledges one subscribed id.
    Subscribed {
        /// The dimension.
        #[serde(rename = "type")]
        kind: SubscriptionKind,

        /// The id.
        value: String,

        /// Human readable confirmation.
        message: String,
    },

    /// Acknowledges one unsubscribed id.
    Unsubscribed {
        /// The dimension.
        #[serde(rename = "type")]
        kind: SubscriptionKind,

        /// The id.
        value: String,
    },

    /// A request could not be served.
    Error {
        /// What went wrong.
        message: String,
    },

    /// Registry statistics.
    Stats(RegistryStats),

    /// A domain event the connection subscribed to.
    TransactionEvent(EventEnvelope),
}

impl ServerMessage {
    /// The greeting for a new connection.
    #[must_use]
    pub fn connected(socket_id: impl Into<String>) -> Self {
        Self::Connected {
            message: "Connected to WebSocket gateway".to_string(),
            socket_id: socket_id.into(),
        }
    }

    /// The acknowledgement for a subscribed id.
    #[must_use]
    pub fn subscribed(target: SubscriptionTarget) -> Self {
        let message = match target.kind {
            SubscriptionKind::TransactionId => format!("Subscribed to transaction: {}", target.value),
            SubscriptionKind::UserId => format!("Subscribed to user: {}", target.value),
        };

        Self::Subscribed {
            kind: target.kind,
            value: target.value,
            message,
        }
    }

    /// The acknowledgement for an unsubscribed id.
    #[must_use]
    pub fn unsubscribed(target: SubscriptionTarget) -> Self {
        Self::Unsubscribed {
            kind: target.kind,
            value: target.value,
        }
    }

    /// An error reply.
    #[must_use]
    pub fn error(error: &Error) -> Self {
        Self::Error {
            message: error.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    #[test]
    fn test_parse_subscribe() {
        let command =
            ClientCommand::parse(r#"{"event":"subscribeToTx","data":{"transactionId":"T1"}}"#)
                .unwrap();
        assert_eq!(
            command,
            ClientCommand::SubscribeToTx(SubscriptionRequest::transaction("T1"))
        );
    }

    #[test]
    fn test_parse_get_stats_without_data() {
        assert_eq!(
            ClientCommand::parse(r#"{"event":"getStats"}"#).unwrap(),
            ClientCommand::GetStats
        );
        assert_eq!(
            ClientCommand::parse(r#"{"event":"getStats","data":{}}"#).unwrap(),
            ClientCommand::GetStats
        );
    }

    #[test]
    fn test_parse_errors() {
        assert!(matches!(
            ClientCommand::parse("nope"),
            Err(Error::MalformedFrame(_))
        ));
        assert!(matches!(
            ClientCommand::parse(r#"{"event":"dance"}"#),
            Err(Error::UnknownEvent(event)) if event == "dance"
        ));
    }

    #[test]
    fn test_empty_ids_are_not_targets() {
        let request = SubscriptionRequest {
            transaction_id: Some(String::new()),
            user_id: Some("u1".to_string()),
        };

        assert_eq!(
            request.targets(),
            vec![SubscriptionTarget {
                kind: SubscriptionKind::UserId,
                value: "u1".to_string(),
            }]
        );
    }

    #[test]
    fn test_server_message_wire_format() {
        let value = serde_json::to_value(ServerMessage::subscribed(SubscriptionTarget {
            kind: SubscriptionKind::TransactionId,
            value: "T1".to_string(),
        }))
        .unwrap();

        assert_eq!(
            value,
            json!({
                "event": "subscribed",
                "data": {
                    "type": "transactionId",
                    "value": "T1",
                    "message": "Subscribed to transaction: T1"
                }
            })
        );

        let value = serde_json::to_value(ServerMessage::connected("c-1")).unwrap();
        assert_eq!(value["event"], "connected");
        assert_eq!(value["data"]["socketId"], "c-1");
    }
}
