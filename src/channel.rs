//! The duplex message channel that carries signaling envelopes.

use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;
use tokio::sync::mpsc;

/// An event produced by the channel.
#[derive(Debug, Clone)]
pub enum ChannelEvent {
    Connected,
    /// One complete envelope from the remote side.
    DataReceived(Bytes),
    Disconnected,
}

/// Outbound half of the channel. Delivery is best effort, at-least-once and
/// unordered; callers never wait for acknowledgement.
#[async_trait]
pub trait SignalingChannel: Send + Sync {
    async fn send(&self, data: &[u8]) -> Result<(), anyhow::Error>;
}

/// In-process channel whose sends surface as [`ChannelEvent::DataReceived`]
/// on the paired endpoint.
pub struct MemoryChannel {
    outbound: mpsc::Sender<ChannelEvent>,
}

pub type MemoryEndpoint = (Arc<MemoryChannel>, mpsc::Receiver<ChannelEvent>);

impl MemoryChannel {
    /// Two connected endpoints. Each gets the sending half plus the receiver
    /// of what the other side sends.
    pub fn pair(capacity: usize) -> (MemoryEndpoint, MemoryEndpoint) {
        let (a_tx, a_rx) = mpsc::channel(capacity);
        let (b_tx, b_rx) = mpsc::channel(capacity);
        (
            (Arc::new(Self { outbound: b_tx }), a_rx),
            (Arc::new(Self { outbound: a_tx }), b_rx),
        )
    }
}

#[async_trait]
impl SignalingChannel for MemoryChannel {
    async fn send(&self, data: &[u8]) -> Result<(), anyhow::Error> {
        self.outbound
            .send(ChannelEvent::DataReceived(Bytes::copy_from_slice(data)))
            .await
            .map_err(|_| anyhow::anyhow!("memory channel peer is gone"))
    }
}
