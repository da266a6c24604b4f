pub mod call;

pub use call::{
    CallCandidate, CallId, CallState, CallStats, IceCandidate, IceConnectionState, PartyId,
    SdpKind, SessionDescription, SignalingState,
};
