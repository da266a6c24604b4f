//! Inbound signaling dispatch.

use super::manager::{CallManager, Routed};
use crate::channel::ChannelEvent;
use callcore::signaling::{Decoded, SignalingBody, SignalingMessage, decode};
use log::{debug, info, warn};
use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    /// The message id was already seen.
    Duplicate,
    /// Not a call signaling kind.
    UnknownKind,
    /// Refers to a call that is not the current one.
    StaleMessage,
    /// An offer arrived while another call occupies the slot.
    Busy,
    Malformed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    Handled,
    Buffered,
    Ignored(IgnoreReason),
}

impl From<Routed> for DispatchOutcome {
    fn from(routed: Routed) -> Self {
        match routed {
            Routed::Applied => Self::Handled,
            Routed::Buffered => Self::Buffered,
            Routed::Stale => Self::Ignored(IgnoreReason::StaleMessage),
            Routed::Busy => Self::Ignored(IgnoreReason::Busy),
        }
    }
}

/// Bounded memory of recently seen message ids.
struct RecentIds {
    capacity: usize,
    order: VecDeque<String>,
    seen: HashSet<String>,
}

impl RecentIds {
    fn new(capacity: usize) -> Self {
        Self {
            capacity,
            order: VecDeque::with_capacity(capacity),
            seen: HashSet::with_capacity(capacity),
        }
    }

    /// Returns false if the id was already present.
    fn insert(&mut self, id: &str) -> bool {
        if self.capacity == 0 {
            return true;
        }
        if self.seen.contains(id) {
            return false;
        }
        if self.order.len() == self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.seen.remove(&oldest);
            }
        }
        self.order.push_back(id.to_string());
        self.seen.insert(id.to_string());
        true
    }
}

/// Decodes inbound envelopes and routes them to the call manager.
pub struct SignalingDispatcher {
    manager: Arc<CallManager>,
    recent: Mutex<RecentIds>,
}

impl SignalingDispatcher {
    pub fn new(manager: Arc<CallManager>, dedup_capacity: usize) -> Self {
        Self {
            manager,
            recent: Mutex::new(RecentIds::new(dedup_capacity)),
        }
    }

    pub async fn dispatch(&self, data: &[u8]) -> DispatchOutcome {
        let SignalingMessage { header, body } = match decode(data) {
            Ok(Decoded::Signaling(message)) => message,
            Ok(Decoded::Other(header)) => {
                debug!(target: "Call/Signaling", "Ignoring non-call message of type {}", header.kind);
                return DispatchOutcome::Ignored(IgnoreReason::UnknownKind);
            }
            Err(e) => {
                warn!(target: "Call/Signaling", "Dropping undecodable envelope: {e}");
                return DispatchOutcome::Ignored(IgnoreReason::Malformed);
            }
        };

        if !header.message_id.is_empty() && !self.remember(&header.message_id) {
            debug!(target: "Call/Signaling", "Duplicate message {}", header.message_id);
            return DispatchOutcome::Ignored(IgnoreReason::Duplicate);
        }

        debug!(
            target: "Call/Signaling",
            "<- {} for {} from {:?}",
            body.kind().as_str(),
            body.call_id(),
            header.sender_id
        );

        let routed = match body {
            SignalingBody::Offer(offer) => {
                let Some(from) = header.sender_id else {
                    warn!(target: "Call/Signaling", "Offer {} has no sender, dropping", offer.call_id);
                    return DispatchOutcome::Ignored(IgnoreReason::Malformed);
                };
                self.manager.on_call_offer(from, offer).await
            }
            SignalingBody::Answer(answer) => {
                self.manager
                    .on_call_answer(&answer.call_id, &answer.sdp)
                    .await
            }
            SignalingBody::Candidate(candidate) => {
                self.manager
                    .on_candidate_received(candidate.into_call_candidate())
                    .await
            }
            SignalingBody::End(end) => {
                if !end.reason.is_empty() {
                    debug!(target: "Call/Signaling", "Call {} end reason: {}", end.call_id, end.reason);
                }
                self.manager.on_call_ended(&end.call_id).await
            }
        };

        routed.into()
    }

    /// Consumes channel events until the channel goes away.
    pub async fn run(self: Arc<Self>, mut events: mpsc::Receiver<ChannelEvent>) {
        while let Some(event) = events.recv().await {
            match event {
                ChannelEvent::DataReceived(data) => {
                    let outcome = self.dispatch(&data).await;
                    debug!(target: "Call/Signaling", "Dispatch outcome: {outcome:?}");
                }
                ChannelEvent::Connected => info!(target: "Call/Signaling", "Signaling channel connected"),
                ChannelEvent::Disconnected => {
                    warn!(target: "Call/Signaling", "Signaling channel disconnected")
                }
            }
        }
        debug!(target: "Call/Signaling", "Signaling channel closed, dispatcher exiting");
    }

    fn remember(&self, message_id: &str) -> bool {
        self.recent
            .lock()
            .expect("Mutex should not be poisoned")
            .insert(message_id)
    }
}
