//! Call orchestrator: owns the single call slot and drives its lifecycle.

use super::audio::AudioRouteController;
use super::error::CallError;
use super::handler::SignalingDispatcher;
use super::sender::SignalingSender;
use super::session::{SessionListener, SessionManager};
use crate::channel::{ChannelEvent, SignalingChannel};
use crate::config::{CallConfig, IceServer};
use crate::engine::TransportEngine;
use crate::platform::{AudioDevice, PermissionSource};
use async_trait::async_trait;
use callcore::ice::{FilterResult, PendingCandidates, admit};
use callcore::signaling::CallOfferBody;
use callcore::types::{
    CallCandidate, CallId, CallState, CallStats, IceCandidate, IceConnectionState, PartyId,
};
use log::{debug, info, warn};
use std::collections::VecDeque;
use std::sync::{Arc, Weak};
use tokio::sync::{Mutex, mpsc, watch};
use tokio::task::JoinHandle;

pub const END_REASON_HANGUP: &str = "hangup";
pub const END_REASON_TIMEOUT: &str = "timeout";
pub const END_REASON_CONNECTION_FAILED: &str = "connection_failed";
pub const END_REASON_NEGOTIATION_FAILED: &str = "negotiation_failed";

/// How many finished call ids are remembered to reject late or redelivered messages.
const RECENTLY_ENDED_CAPACITY: usize = 16;

/// Host-provided collaborators.
pub struct CallCollaborators {
    pub engine: Arc<dyn TransportEngine>,
    pub channel: Arc<dyn SignalingChannel>,
    pub permissions: Arc<dyn PermissionSource>,
    pub audio_device: Arc<dyn AudioDevice>,
}

/// What became of an inbound signaling message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Routed {
    Applied,
    /// Held in the early-candidate buffer until a session exists.
    Buffered,
    /// Belongs to a call that is not (or no longer) the current one.
    Stale,
    /// A different call already occupies the slot.
    Busy,
}

#[derive(Default)]
struct CallSlot {
    call_id: Option<CallId>,
    remote: Option<PartyId>,
    /// Bumped whenever a new call takes the slot; timers compare against it.
    generation: u64,
    recently_ended: VecDeque<CallId>,
}

impl CallSlot {
    fn begin(&mut self, call_id: CallId, remote: PartyId) -> u64 {
        self.generation += 1;
        self.call_id = Some(call_id);
        self.remote = Some(remote);
        self.generation
    }

    fn clear(&mut self) {
        self.call_id = None;
        self.remote = None;
    }

    fn tracks(&self, call_id: &CallId) -> bool {
        self.call_id.as_ref() == Some(call_id)
    }

    fn was_ended(&self, call_id: &CallId) -> bool {
        self.recently_ended.contains(call_id)
    }

    fn remember_ended(&mut self) {
        let Some(call_id) = self.call_id.clone() else {
            return;
        };
        if !self.recently_ended.contains(&call_id) {
            self.recently_ended.push_back(call_id);
        }
        while self.recently_ended.len() > RECENTLY_ENDED_CAPACITY {
            self.recently_ended.pop_front();
        }
    }
}

/// Manages the single call slot.
///
/// Every state change happens while holding the slot lock, so user actions,
/// inbound signaling and timers are applied one at a time.
pub struct CallManager {
    config: CallConfig,
    session: SessionManager,
    sender: SignalingSender,
    audio: AudioRouteController,
    permissions: Arc<dyn PermissionSource>,
    pending: PendingCandidates,
    slot: Mutex<CallSlot>,
    state_tx: watch::Sender<CallState>,
    weak_self: Weak<CallManager>,
}

impl CallManager {
    pub fn new(config: CallConfig, deps: CallCollaborators) -> Arc<Self> {
        let (state_tx, _) = watch::channel(CallState::Idle);
        Arc::new_cyclic(|weak_self| Self {
            session: SessionManager::new(
                deps.engine,
                config.ice_servers.clone(),
                config.stats_interval(),
            ),
            sender: SignalingSender::new(deps.channel, config.local_party_id),
            audio: AudioRouteController::new(deps.audio_device),
            permissions: deps.permissions,
            pending: PendingCandidates::with_capacity(config.pending_capacity),
            slot: Mutex::new(CallSlot::default()),
            state_tx,
            weak_self: weak_self.clone(),
            config,
        })
    }

    /// Eagerly brings up the transport engine. Calls also do this lazily.
    pub async fn initialize(&self) -> bool {
        self.session.initialize_engine().await
    }

    pub fn dispatcher(self: &Arc<Self>) -> Arc<SignalingDispatcher> {
        Arc::new(SignalingDispatcher::new(
            self.clone(),
            self.config.dedup_capacity,
        ))
    }

    /// Spawns the inbound signaling loop for a channel's event stream.
    pub fn spawn_signaling(
        self: &Arc<Self>,
        events: mpsc::Receiver<ChannelEvent>,
    ) -> JoinHandle<()> {
        tokio::spawn(self.dispatcher().run(events))
    }

    pub fn local_party(&self) -> PartyId {
        self.config.local_party_id
    }

    pub fn state(&self) -> CallState {
        self.state_tx.borrow().clone()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<CallState> {
        self.state_tx.subscribe()
    }

    pub fn subscribe_stats(&self) -> watch::Receiver<CallStats> {
        self.session.subscribe_stats()
    }

    pub fn stats(&self) -> CallStats {
        self.session.stats()
    }

    pub async fn current_call_id(&self) -> Option<CallId> {
        self.slot.lock().await.call_id.clone()
    }

    pub fn pending_candidates(&self) -> usize {
        self.pending.len()
    }

    pub fn is_muted(&self) -> bool {
        self.session.is_muted()
    }

    pub fn is_speakerphone_on(&self) -> bool {
        self.audio.is_speakerphone_on()
    }

    /// Used by sessions created after this call.
    pub fn update_ice_servers(&self, servers: Vec<IceServer>) {
        self.session.update_ice_servers(servers);
    }

    /// Places an outgoing call. Allowed while idle or during the ended grace period.
    pub async fn start_call(&self, remote: PartyId) -> Result<CallId, CallError> {
        self.ensure_ready().await?;

        let mut slot = self.slot.lock().await;
        if self.state().is_in_call() {
            warn!(target: "Call/Manager", "Cannot call {remote}: another call is in progress");
            return Err(CallError::Busy);
        }

        let call_id = CallId::generate();
        let generation = slot.begin(call_id.clone(), remote);
        info!(target: "Call/Manager", "Starting call {call_id} to {remote}");
        self.publish(CallState::Outgoing { remote });
        self.audio.set_call_active(true);

        let listener = self.listener(&call_id, remote);
        if let Err(e) = self
            .session
            .create_session(self.config.local_party_id, listener)
            .await
        {
            self.abandon(&mut slot, None).await;
            return Err(e);
        }

        let offer = match self.session.create_local_offer().await {
            Ok(offer) => offer,
            Err(e) => {
                warn!(target: "Call/Manager", "Call {call_id} failed: {e}");
                self.abandon(&mut slot, None).await;
                return Err(e);
            }
        };

        self.sender.send_offer(remote, &call_id, &offer.sdp);
        self.session.start_stats_polling().await;
        self.arm_ring_timeout(call_id.clone(), generation);
        Ok(call_id)
    }

    /// Accepts a remote offer: builds the session, answers, then applies any
    /// candidates that arrived ahead of the session.
    pub async fn answer_call(
        &self,
        remote: PartyId,
        call_id: CallId,
        offer_sdp: &str,
    ) -> Result<(), CallError> {
        self.ensure_ready().await?;

        let mut slot = self.slot.lock().await;
        match self.state() {
            CallState::Outgoing { .. } | CallState::Active { .. } => {
                warn!(target: "Call/Manager", "Cannot answer {call_id}: another call is in progress");
                return Err(CallError::Busy);
            }
            CallState::Incoming {
                call_id: ringing, ..
            } if ringing != call_id => {
                warn!(target: "Call/Manager", "Cannot answer {call_id}: {ringing} is ringing");
                return Err(CallError::Busy);
            }
            _ => {}
        }
        if slot.was_ended(&call_id) {
            info!(target: "Call/Manager", "Call {call_id} already ended, not answering");
            return Err(CallError::NoActiveCall);
        }

        slot.begin(call_id.clone(), remote);
        info!(target: "Call/Manager", "Answering call {call_id} from {remote}");
        self.publish(CallState::Active { remote });
        self.audio.set_call_active(true);

        let listener = self.listener(&call_id, remote);
        if let Err(e) = self
            .session
            .create_session(self.config.local_party_id, listener)
            .await
        {
            self.abandon(&mut slot, Some(END_REASON_NEGOTIATION_FAILED))
                .await;
            return Err(e);
        }

        self.session.apply_remote_description(offer_sdp).await;
        let answer = match self.session.create_local_answer().await {
            Ok(answer) => answer,
            Err(e) => {
                warn!(target: "Call/Manager", "Call {call_id} failed: {e}");
                self.abandon(&mut slot, Some(END_REASON_NEGOTIATION_FAILED))
                    .await;
                return Err(e);
            }
        };

        self.sender.send_answer(remote, &call_id, &answer.sdp);
        self.session.start_stats_polling().await;

        let drained = self.pending.drain_for(&call_id);
        if !drained.matched.is_empty() {
            info!(
                target: "Call/Manager",
                "Applying {} buffered candidate(s) for {call_id}",
                drained.matched.len()
            );
        }
        for candidate in drained.matched {
            self.apply_remote_candidate(candidate.candidate).await;
        }
        Ok(())
    }

    /// Hangs up (or rejects a ringing call). No-op when nothing is in progress.
    pub async fn end_call(&self) {
        let mut slot = self.slot.lock().await;
        if !self.state().is_in_call() {
            debug!(target: "Call/Manager", "end_call with no call in progress");
            return;
        }

        let peer = slot.call_id.clone().zip(slot.remote);
        if let Some((call_id, _)) = &peer {
            info!(target: "Call/Manager", "Ending call {call_id}");
        }
        self.finish(&mut slot).await;
        if let Some((call_id, remote)) = peer {
            self.sender.send_end(remote, &call_id, END_REASON_HANGUP);
        }
    }

    pub async fn toggle_mute(&self, muted: bool) -> Result<(), CallError> {
        if self.session.set_muted(muted).await {
            info!(target: "Call/Manager", "Microphone {}", if muted { "muted" } else { "unmuted" });
            Ok(())
        } else {
            Err(CallError::NoActiveCall)
        }
    }

    pub fn toggle_speaker(&self, on: bool) {
        self.audio.set_speakerphone_on(on);
    }

    /// An offer from `from`. Only takes the slot when no call is in progress.
    pub async fn on_call_offer(&self, from: PartyId, offer: CallOfferBody) -> Routed {
        let mut slot = self.slot.lock().await;
        if slot.was_ended(&offer.call_id) {
            debug!(target: "Call/Manager", "Ignoring offer for finished call {}", offer.call_id);
            return Routed::Stale;
        }
        if self.state().is_in_call() {
            if slot.tracks(&offer.call_id) {
                return Routed::Stale;
            }
            info!(
                target: "Call/Manager",
                "Ignoring offer {} from {from}: another call is in progress",
                offer.call_id
            );
            return Routed::Busy;
        }

        if offer.video {
            debug!(target: "Call/Manager", "Offer {} requests video, audio only is supported", offer.call_id);
        }
        slot.begin(offer.call_id.clone(), from);
        info!(target: "Call/Manager", "Incoming call {} from {from}", offer.call_id);
        self.publish(CallState::Incoming {
            remote: from,
            call_id: offer.call_id,
            sdp: offer.sdp,
        });
        Routed::Applied
    }

    /// The remote answer to our outgoing call.
    pub async fn on_call_answer(&self, call_id: &CallId, sdp: &str) -> Routed {
        let slot = self.slot.lock().await;
        let remote = match self.state() {
            CallState::Outgoing { remote } if slot.tracks(call_id) => remote,
            _ => {
                warn!(target: "Call/Manager", "Dropping stale answer for {call_id}");
                return Routed::Stale;
            }
        };

        self.session.apply_remote_description(sdp).await;
        info!(target: "Call/Manager", "Call {call_id} answered by {remote}");
        self.publish(CallState::Active { remote });
        Routed::Applied
    }

    /// A remote candidate. Applied when it belongs to the live session,
    /// buffered when no session exists yet, dropped otherwise.
    pub async fn on_candidate_received(&self, candidate: CallCandidate) -> Routed {
        let slot = self.slot.lock().await;
        if slot.was_ended(&candidate.call_id) {
            debug!(target: "Call/Manager", "Dropping candidate for finished call {}", candidate.call_id);
            return Routed::Stale;
        }

        let is_current = self.state().is_in_call() && slot.tracks(&candidate.call_id);
        match (is_current, self.session.has_session().await) {
            (true, true) => {
                self.apply_remote_candidate(candidate.candidate).await;
                Routed::Applied
            }
            (_, false) => {
                self.pending.add(candidate);
                Routed::Buffered
            }
            (false, true) => {
                warn!(
                    target: "Call/Manager",
                    "Dropping candidate for {}: not the current call",
                    candidate.call_id
                );
                Routed::Stale
            }
        }
    }

    /// The remote hung up, rejected or cancelled.
    pub async fn on_call_ended(&self, call_id: &CallId) -> Routed {
        let mut slot = self.slot.lock().await;
        if !(self.state().is_in_call() && slot.tracks(call_id)) {
            debug!(target: "Call/Manager", "Ignoring end for {call_id}: not the current call");
            return Routed::Stale;
        }
        info!(target: "Call/Manager", "Call {call_id} ended by remote");
        self.finish(&mut slot).await;
        Routed::Applied
    }

    /// Unrecoverable connectivity loss. Goes straight to idle.
    async fn on_transport_failure(&self, call_id: &CallId) {
        let mut slot = self.slot.lock().await;
        if !(self.state().is_in_call() && slot.tracks(call_id)) {
            return;
        }
        warn!(target: "Call/Manager", "Connection failed for call {call_id}, tearing down");
        self.abandon(&mut slot, Some(END_REASON_CONNECTION_FAILED))
            .await;
    }

    async fn ensure_ready(&self) -> Result<(), CallError> {
        if !self.permissions.audio_capture_granted() {
            warn!(target: "Call/Manager", "Audio capture permission not granted");
            return Err(CallError::PermissionDenied);
        }
        if !self.session.initialize_engine().await {
            return Err(CallError::TransportUnavailable);
        }
        Ok(())
    }

    async fn apply_remote_candidate(&self, candidate: IceCandidate) {
        match admit(&candidate.candidate) {
            FilterResult::Allowed => self.session.add_remote_candidate(candidate).await,
            FilterResult::Blocked(reason) => {
                info!(target: "Call/IceFilter", "Blocked remote candidate ({reason}): {}", candidate.candidate);
            }
        }
    }

    fn listener(&self, call_id: &CallId, remote: PartyId) -> Arc<dyn SessionListener> {
        Arc::new(CallSessionListener {
            manager: self.weak_self.clone(),
            call_id: call_id.clone(),
            remote,
        })
    }

    fn publish(&self, state: CallState) {
        let previous = self.state_tx.send_replace(state);
        debug!(target: "Call/Manager", "State {previous:?} -> {:?}", *self.state_tx.borrow());
    }

    async fn release(&self, slot: &mut CallSlot) {
        self.session.close().await;
        let dropped = self.pending.clear();
        if dropped > 0 {
            debug!(target: "Call/Manager", "Discarded {dropped} buffered candidate(s)");
        }
        self.audio.set_call_active(false);
        slot.remember_ended();
    }

    /// Normal end: `Ended`, then `Idle` once the grace delay passes.
    async fn finish(&self, slot: &mut CallSlot) {
        self.release(slot).await;
        self.publish(CallState::Ended);
        self.schedule_idle(slot.generation);
    }

    /// Failure: straight to `Idle`, optionally telling the remote why once
    /// local teardown is done.
    async fn abandon(&self, slot: &mut CallSlot, notify: Option<&str>) {
        let peer = slot.call_id.clone().zip(slot.remote);
        self.release(slot).await;
        slot.clear();
        self.publish(CallState::Idle);
        if let (Some(reason), Some((call_id, remote))) = (notify, peer) {
            self.sender.send_end(remote, &call_id, reason);
        }
    }

    fn schedule_idle(&self, generation: u64) {
        let manager = self.weak_self.clone();
        let grace = self.config.ended_grace();
        tokio::spawn(async move {
            tokio::time::sleep(grace).await;
            let Some(manager) = manager.upgrade() else {
                return;
            };
            let mut slot = manager.slot.lock().await;
            if slot.generation == generation && manager.state().is_ended() {
                slot.clear();
                manager.publish(CallState::Idle);
            }
        });
    }

    fn arm_ring_timeout(&self, call_id: CallId, generation: u64) {
        let Some(timeout) = self.config.ring_timeout() else {
            return;
        };
        let manager = self.weak_self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            let Some(manager) = manager.upgrade() else {
                return;
            };
            let mut slot = manager.slot.lock().await;
            if slot.generation != generation
                || !matches!(manager.state(), CallState::Outgoing { .. })
            {
                return;
            }
            info!(target: "Call/Manager", "Call {call_id} unanswered after {timeout:?}");
            let remote = slot.remote;
            manager.finish(&mut slot).await;
            if let Some(remote) = remote {
                manager.sender.send_end(remote, &call_id, END_REASON_TIMEOUT);
            }
        });
    }
}

struct CallSessionListener {
    manager: Weak<CallManager>,
    call_id: CallId,
    remote: PartyId,
}

#[async_trait]
impl SessionListener for CallSessionListener {
    async fn on_local_candidate(&self, candidate: IceCandidate) {
        let Some(manager) = self.manager.upgrade() else {
            return;
        };
        if let FilterResult::Blocked(reason) = admit(&candidate.candidate) {
            debug!(target: "Call/IceFilter", "Not sending local candidate ({reason}): {}", candidate.candidate);
            return;
        }
        manager
            .sender
            .send_candidate(self.remote, &self.call_id, &candidate);
    }

    async fn on_ice_connection_change(&self, state: IceConnectionState) {
        if !state.is_fatal() {
            return;
        }
        let Some(manager) = self.manager.upgrade() else {
            return;
        };
        // Teardown closes the session whose event task is running this callback.
        let call_id = self.call_id.clone();
        tokio::spawn(async move {
            manager.on_transport_failure(&call_id).await;
        });
    }
}
