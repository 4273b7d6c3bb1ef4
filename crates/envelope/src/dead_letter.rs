use crate::{DecodeError, EncodeError};

use std::fmt::Display;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// How [`DeadLetterRecord::original_message`] is encoded.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OriginalEncoding {
    /// The raw message was valid UTF-8 and is stored as is.
    #[default]
    Utf8,

    /// The raw message was binary and is stored base64 encoded.
    Base64,
}

impl OriginalEncoding {
    const fn is_utf8(&self) -> bool {
        matches!(self, Self::Utf8)
    }
}

/// A message that could not be processed, published to the dead-letter topic.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeadLetterRecord {
    /// Topic the message was consumed from.
    pub original_topic: String,

    /// The raw message.
    pub original_message: String,

    /// Encoding of `original_message`; omitted on the wire for UTF-8.
    #[serde(default, skip_serializing_if = "OriginalEncoding::is_utf8")]
    pub original_encoding: OriginalEncoding,

    /// Description of the failure.
    pub error: String,

    /// When the message was dead-lettered.
    pub timestamp: DateTime<Utc>,
}

impl DeadLetterRecord {
    /// Wraps raw message bytes together with the failure that rejected them.
    pub fn new(original_topic: impl Into<String>, raw: &[u8], error: impl Display) -> Self {
        let (original_message, original_encoding) = match std::str::from_utf8(raw) {
            Ok(text) => (text.to_string(), OriginalEncoding::Utf8),
            Err(_) => (STANDARD.encode(raw), OriginalEncoding::Base64),
        };

        Self {
            original_topic: original_topic.into(),
            original_message,
            original_encoding,
            error: error.to_string(),
            timestamp: Utc::now(),
        }
    }

    /// Recovers the exact bytes of the original message.
    ///
    /// # Errors
    /// Returns an error if a base64 encoded message is corrupt.
    pub fn original_bytes(&self) -> Result<Vec<u8>, DecodeError> {
        match self.original_encoding {
            OriginalEncoding::Utf8 => Ok(self.original_message.as_bytes().to_vec()),
            OriginalEncoding::Base64 => Ok(STANDARD.decode(&self.original_message)?),
        }
    }

    /// Serializes the record to JSON.
    ///
    /// # Errors
    /// Returns an error if serialization fails.
    pub fn encode(&self) -> Result<Bytes, EncodeError> {
        Ok(Bytes::from(serde_json::to_vec(self)?))
    }

    /// Parses a record from JSON.
    ///
    /// # Errors
    /// Returns an error if the bytes are not a dead-letter record.
    pub fn decode(bytes: &[u8]) -> Result<Self, DecodeError> {
        Ok(serde_json::from_slice(bytes)?)
    }
}
