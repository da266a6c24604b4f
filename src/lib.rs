//! Peer-to-peer audio call signaling and orchestration.

pub use callcore::{CodecError, ice, signaling, types};

pub mod calls;
pub mod channel;
pub mod config;
pub mod engine;
pub mod platform;
pub mod push;

pub use calls::{CallCollaborators, CallError, CallManager};
pub use config::{CallConfig, IceServer};
