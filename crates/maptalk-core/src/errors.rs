//! Protocol error types.

use thiserror::Error;

/// Errors raised while decoding or encoding wire envelopes.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// The frame was not a valid `{ "event", "data" }` envelope, named an
    /// unknown event, or carried a payload of the wrong shape.
    #[error("failed to decode client event: {0}")]
    Decode(#[source] serde_json::Error),
    /// An outbound event could not be serialized.
    #[error("failed to encode server event `{event}`: {source}")]
    Encode {
        /// Wire name of the event being encoded.
        event: &'static str,
        /// Underlying serializer error.
        #[source]
        source: serde_json::Error,
    },
}

impl ProtocolError {
    /// Short classification string for logging.
    pub fn error_kind(&self) -> &'static str {
        match self {
            Self::Decode(_) => "decode",
            Self::Encode { .. } => "encode",
        }
    }
}
