use thiserror::Error;

/// Errors raised while decoding bytes into an envelope or dead-letter record.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// The original message of a dead-letter record is not valid base64.
    #[error("invalid base64 in dead-letter record: {0}")]
    Base64(#[from] base64::DecodeError),

    /// The bytes are not a well-formed JSON object of the expected shape.
    #[error("malformed message: {0}")]
    Malformed(#[from] serde_json::Error),

    /// A required field is absent or empty.
    #[error("missing required field `{0}`")]
    MissingField(&'static str),
}

/// Error raised while encoding an envelope.
#[derive(Debug, Error)]
#[error("failed to encode message: {0}")]
pub struct EncodeError(#[from] pub serde_json::Error);

/// Errors raised while interpreting an envelope payload by its type tag.
#[derive(Debug, Error)]
pub enum PayloadError {
    /// The payload does not have the shape its type tag requires.
    #[error("payload does not match type `{event_type}`: {source}")]
    Invalid {
        /// The type tag carried by the envelope.
        event_type: String,

        /// The underlying deserialization error.
        source: serde_json::Error,
    },

    /// The envelope carries a type tag this build does not know.
    #[error("unknown event type `{0}`")]
    UnknownType(String),
}
