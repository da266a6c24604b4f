use thiserror::Error;

/// Errors produced while decoding or encoding signaling envelopes.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("malformed envelope: {0}")]
    Json(#[from] serde_json::Error),

    #[error("missing required field: {0}")]
    MissingField(&'static str),

    #[error("unsupported protocol version: {0}")]
    UnsupportedVersion(String),
}
