//! Audio call signaling and orchestration.
//!
//! # Architecture
//!
//! - [`CallManager`]: owns the single call slot and its state machine
//! - [`SessionManager`]: owns the live peer connection
//! - [`SignalingDispatcher`]: decodes inbound envelopes and routes them
//! - [`SignalingSender`]: encodes and sends outbound envelopes
//! - [`AudioRouteController`]: audio mode and speakerphone routing
//!
//! Candidates that arrive before a session exists are held in a
//! [`PendingCandidates`](callcore::ice::PendingCandidates) buffer and applied
//! once the call is answered.

mod audio;
mod error;
mod handler;
mod manager;
mod sender;
mod session;

pub use audio::AudioRouteController;
pub use error::CallError;
pub use handler::{DispatchOutcome, IgnoreReason, SignalingDispatcher};
pub use manager::{
    CallCollaborators, CallManager, END_REASON_CONNECTION_FAILED, END_REASON_HANGUP,
    END_REASON_NEGOTIATION_FAILED, END_REASON_TIMEOUT, Routed,
};
pub use sender::SignalingSender;
pub use session::{SessionHandle, SessionListener, SessionManager};
