//! Outbound signaling. Every send is fire-and-forget: messages are queued to a
//! background writer in order, failures are logged, and the caller never waits
//! on delivery.

use crate::channel::SignalingChannel;
use callcore::signaling::{
    CallAnswerBody, CallEndBody, CallOfferBody, IceCandidateBody, SignalingBody, SignalingMessage,
};
use callcore::types::{CallId, IceCandidate, PartyId};
use log::{debug, warn};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

struct Outbound {
    to: PartyId,
    kind: &'static str,
    bytes: Vec<u8>,
}

pub struct SignalingSender {
    channel: Arc<dyn SignalingChannel>,
    local_party: PartyId,
    queue: mpsc::UnboundedSender<Outbound>,
    /// Handed to the writer task the first time something is sent.
    idle_writer: Mutex<Option<mpsc::UnboundedReceiver<Outbound>>>,
}

impl SignalingSender {
    pub fn new(channel: Arc<dyn SignalingChannel>, local_party: PartyId) -> Self {
        let (queue, rx) = mpsc::unbounded_channel();
        Self {
            channel,
            local_party,
            queue,
            idle_writer: Mutex::new(Some(rx)),
        }
    }

    pub fn send_offer(&self, to: PartyId, call_id: &CallId, sdp: &str) {
        self.send(
            to,
            SignalingBody::Offer(CallOfferBody {
                call_id: call_id.clone(),
                sdp: sdp.to_string(),
                video: false,
                audio: true,
            }),
        );
    }

    pub fn send_answer(&self, to: PartyId, call_id: &CallId, sdp: &str) {
        self.send(
            to,
            SignalingBody::Answer(CallAnswerBody {
                call_id: call_id.clone(),
                sdp: sdp.to_string(),
            }),
        );
    }

    pub fn send_candidate(&self, to: PartyId, call_id: &CallId, candidate: &IceCandidate) {
        self.send(
            to,
            SignalingBody::Candidate(IceCandidateBody::from_candidate(call_id.clone(), candidate)),
        );
    }

    pub fn send_end(&self, to: PartyId, call_id: &CallId, reason: &str) {
        self.send(
            to,
            SignalingBody::End(CallEndBody {
                call_id: call_id.clone(),
                reason: reason.to_string(),
            }),
        );
    }

    fn send(&self, to: PartyId, body: SignalingBody) {
        let kind = body.kind().as_str();
        let message = SignalingMessage::new(self.local_party, to, body);
        let bytes = match message.encode() {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(target: "Call/Signaling", "Failed to encode {kind}: {e}");
                return;
            }
        };

        debug!(
            target: "Call/Signaling",
            "-> {kind} to {to} ({})", message.header.message_id
        );
        self.ensure_writer();
        if self.queue.send(Outbound { to, kind, bytes }).is_err() {
            warn!(target: "Call/Signaling", "Writer gone, dropping {kind} to {to}");
        }
    }

    fn ensure_writer(&self) {
        let rx = match self.idle_writer.lock() {
            Ok(mut idle) => idle.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(rx) = rx {
            tokio::spawn(write_loop(self.channel.clone(), rx));
        }
    }
}

/// Delivers queued messages one at a time. A stalled channel only stalls this
/// task. Exits once the sender is dropped and the queue is drained.
async fn write_loop(
    channel: Arc<dyn SignalingChannel>,
    mut rx: mpsc::UnboundedReceiver<Outbound>,
) {
    while let Some(out) = rx.recv().await {
        if let Err(e) = channel.send(&out.bytes).await {
            warn!(
                target: "Call/Signaling",
                "Failed to send {} to {}: {e:?}", out.kind, out.to
            );
        }
    }
    debug!(target: "Call/Signaling", "Signaling writer stopped");
}
