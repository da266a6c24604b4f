//! Interface to the media/connectivity engine that actually runs the peer
//! connection. Implementations wrap a concrete WebRTC stack.

use crate::config::IceServer;
use async_trait::async_trait;
use callcore::types::{IceCandidate, IceConnectionState, SessionDescription, SignalingState};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Asynchronous notifications raised by a peer connection.
#[derive(Debug, Clone)]
pub enum PeerEvent {
    /// A local candidate was discovered.
    IceCandidate(IceCandidate),
    IceConnectionChanged(IceConnectionState),
    SignalingChanged(SignalingState),
}

/// Raw audio RTP counters reported by the engine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransportStats {
    pub inbound_bytes: u64,
    pub inbound_packets: u64,
    pub outbound_bytes: u64,
    pub outbound_packets: u64,
}

/// One negotiated peer connection.
#[async_trait]
pub trait PeerConnection: Send + Sync {
    /// Capture from the default microphone and attach the track.
    async fn add_local_audio_track(&self) -> anyhow::Result<()>;

    async fn set_local_audio_enabled(&self, enabled: bool);

    async fn create_offer(&self) -> anyhow::Result<SessionDescription>;

    async fn create_answer(&self) -> anyhow::Result<SessionDescription>;

    async fn set_local_description(&self, desc: SessionDescription) -> anyhow::Result<()>;

    async fn set_remote_description(&self, desc: SessionDescription) -> anyhow::Result<()>;

    async fn has_local_description(&self) -> bool;

    async fn add_ice_candidate(&self, candidate: IceCandidate) -> anyhow::Result<()>;

    async fn stats(&self) -> anyhow::Result<TransportStats>;

    /// Release the connection and its media. Must tolerate repeated calls.
    async fn close(&self);
}

/// Factory for peer connections.
#[async_trait]
pub trait TransportEngine: Send + Sync {
    /// Load codecs and audio devices. Called lazily and possibly more than once.
    async fn initialize(&self) -> anyhow::Result<()>;

    fn is_initialized(&self) -> bool;

    /// Creates a new peer connection and returns it, along with its event stream.
    async fn create_peer_connection(
        &self,
        ice_servers: &[IceServer],
    ) -> anyhow::Result<(Arc<dyn PeerConnection>, mpsc::Receiver<PeerEvent>)>;
}
