//! Call-related error types.

use thiserror::Error;

/// Errors surfaced by call operations.
#[derive(Debug, Error)]
pub enum CallError {
    #[error("audio capture permission not granted")]
    PermissionDenied,

    #[error("transport engine unavailable")]
    TransportUnavailable,

    #[error("transport engine not initialized")]
    EngineNotInitialized,

    #[error("session negotiation failed: {0}")]
    NegotiationFailure(String),

    #[error("another call is in progress")]
    Busy,

    #[error("no active call")]
    NoActiveCall,
}

impl CallError {
    pub(crate) fn negotiation(stage: &str, err: anyhow::Error) -> Self {
        Self::NegotiationFailure(format!("{stage}: {err}"))
    }
}
