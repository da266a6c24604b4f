//! Transport session manager: owns at most one live peer connection.

use super::error::CallError;
use crate::config::IceServer;
use crate::engine::{PeerConnection, PeerEvent, TransportEngine, TransportStats};
use async_trait::async_trait;
use callcore::types::{
    CallStats, IceCandidate, IceConnectionState, PartyId, SdpKind, SessionDescription,
};
use log::{debug, info, warn};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::sync::{Mutex, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Receives session events. Callbacks run on the session's event task, so
/// they must not close the session inline.
#[async_trait]
pub trait SessionListener: Send + Sync {
    async fn on_local_candidate(&self, candidate: IceCandidate);
    async fn on_ice_connection_change(&self, state: IceConnectionState);
}

/// Identifies one session instance across its lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionHandle(u64);

struct LiveSession {
    handle: SessionHandle,
    peer: Arc<dyn PeerConnection>,
    events: JoinHandle<()>,
    stats: Option<JoinHandle<()>>,
}

impl LiveSession {
    async fn shutdown(self) {
        if let Some(stats) = self.stats {
            stats.abort();
        }
        self.events.abort();
        self.peer.close().await;
        info!(target: "Call/Session", "Session {} closed", self.handle.0);
    }
}

pub struct SessionManager {
    engine: Arc<dyn TransportEngine>,
    ice_servers: RwLock<Vec<IceServer>>,
    stats_interval: Duration,
    live: Mutex<Option<LiveSession>>,
    stats_tx: Arc<watch::Sender<CallStats>>,
    muted: AtomicBool,
    next_handle: AtomicU64,
}

impl SessionManager {
    pub fn new(
        engine: Arc<dyn TransportEngine>,
        ice_servers: Vec<IceServer>,
        stats_interval: Duration,
    ) -> Self {
        let (stats_tx, _) = watch::channel(CallStats::default());
        Self {
            engine,
            ice_servers: RwLock::new(ice_servers),
            stats_interval,
            live: Mutex::new(None),
            stats_tx: Arc::new(stats_tx),
            muted: AtomicBool::new(false),
            next_handle: AtomicU64::new(0),
        }
    }

    /// Brings the engine up if it is not already. Failures are logged and
    /// reported as `false`; the next call retries.
    pub async fn initialize_engine(&self) -> bool {
        if self.engine.is_initialized() {
            return true;
        }
        match self.engine.initialize().await {
            Ok(()) => {
                info!(target: "Call/Session", "Transport engine initialized");
                true
            }
            Err(e) => {
                warn!(target: "Call/Session", "Transport engine initialization failed: {e:?}");
                false
            }
        }
    }

    /// Creates a fresh session, fully closing any previous one first.
    pub async fn create_session(
        &self,
        local_party: PartyId,
        listener: Arc<dyn SessionListener>,
    ) -> Result<SessionHandle, CallError> {
        if !self.engine.is_initialized() {
            warn!(target: "Call/Session", "Cannot create session: engine not initialized");
            return Err(CallError::EngineNotInitialized);
        }

        let mut live = self.live.lock().await;
        if let Some(previous) = live.take() {
            debug!(target: "Call/Session", "Replacing session {}", previous.handle.0);
            previous.shutdown().await;
        }

        let ice_servers = self
            .ice_servers
            .read()
            .expect("RwLock should not be poisoned")
            .clone();
        let (peer, events) = self
            .engine
            .create_peer_connection(&ice_servers)
            .await
            .map_err(|e| {
                warn!(target: "Call/Session", "Failed to create peer connection: {e:?}");
                CallError::TransportUnavailable
            })?;

        if let Err(e) = peer.add_local_audio_track().await {
            warn!(target: "Call/Session", "Failed to attach local audio track: {e:?}");
            peer.close().await;
            return Err(CallError::TransportUnavailable);
        }

        self.muted.store(false, Ordering::Relaxed);
        self.stats_tx.send_replace(CallStats::default());

        let handle = SessionHandle(self.next_handle.fetch_add(1, Ordering::Relaxed) + 1);
        let events = tokio::spawn(pump_events(events, listener, self.stats_tx.clone()));
        *live = Some(LiveSession {
            handle,
            peer,
            events,
            stats: None,
        });

        info!(
            target: "Call/Session",
            "Session {} created for party {local_party} with {} ICE server(s)",
            handle.0,
            ice_servers.len()
        );
        Ok(handle)
    }

    pub async fn create_local_offer(&self) -> Result<SessionDescription, CallError> {
        self.create_local_description(SdpKind::Offer).await
    }

    pub async fn create_local_answer(&self) -> Result<SessionDescription, CallError> {
        self.create_local_description(SdpKind::Answer).await
    }

    /// The description is applied locally before it is returned, so the caller
    /// can send it knowing the engine already holds it.
    async fn create_local_description(
        &self,
        kind: SdpKind,
    ) -> Result<SessionDescription, CallError> {
        let peer = self
            .peer()
            .await
            .ok_or_else(|| CallError::NegotiationFailure("no active session".into()))?;

        let desc = match kind {
            SdpKind::Offer => peer.create_offer().await,
            SdpKind::Answer => peer.create_answer().await,
        }
        .map_err(|e| CallError::negotiation("create local description", e))?;

        peer.set_local_description(desc.clone())
            .await
            .map_err(|e| CallError::negotiation("set local description", e))?;

        debug!(target: "Call/Session", "Local {:?} applied:\n{}", desc.kind, desc.sdp);
        Ok(desc)
    }

    /// Applies a remote description. It is an offer unless a local description
    /// already exists. Failures are logged only; the remote may retry.
    pub async fn apply_remote_description(&self, sdp: &str) {
        let Some(peer) = self.peer().await else {
            warn!(target: "Call/Session", "No session, dropping remote description");
            return;
        };

        let desc = if peer.has_local_description().await {
            SessionDescription::answer(sdp)
        } else {
            SessionDescription::offer(sdp)
        };
        let kind = desc.kind;

        match peer.set_remote_description(desc).await {
            Ok(()) => info!(target: "Call/Session", "Remote {kind:?} applied"),
            Err(e) => warn!(target: "Call/Session", "Failed to apply remote {kind:?}: {e:?}"),
        }
    }

    /// Hands a remote candidate to the engine. Ignored without a session.
    pub async fn add_remote_candidate(&self, candidate: IceCandidate) {
        let Some(peer) = self.peer().await else {
            debug!(target: "Call/Session", "No session, ignoring remote candidate");
            return;
        };
        if let Err(e) = peer.add_ice_candidate(candidate).await {
            debug!(target: "Call/Session", "Engine rejected remote candidate: {e}");
        }
    }

    pub async fn set_muted(&self, muted: bool) -> bool {
        let Some(peer) = self.peer().await else {
            return false;
        };
        peer.set_local_audio_enabled(!muted).await;
        self.muted.store(muted, Ordering::Relaxed);
        true
    }

    pub fn is_muted(&self) -> bool {
        self.muted.load(Ordering::Relaxed)
    }

    /// Starts sampling transport statistics at the configured interval.
    /// Restarting replaces the previous poller.
    pub async fn start_stats_polling(&self) {
        if self.stats_interval.is_zero() {
            debug!(target: "Call/Session", "Stats polling disabled");
            return;
        }
        let mut live = self.live.lock().await;
        let Some(session) = live.as_mut() else {
            return;
        };
        if let Some(previous) = session.stats.take() {
            previous.abort();
        }

        let peer = session.peer.clone();
        let stats = self.stats_tx.clone();
        let period = self.stats_interval;
        session.stats = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                match peer.stats().await {
                    Ok(sample) => publish_sample(&stats, sample),
                    Err(e) => debug!(target: "Call/Session", "Stats query failed: {e}"),
                }
            }
        }));
    }

    pub async fn stop_stats_polling(&self) {
        if let Some(stats) = self
            .live
            .lock()
            .await
            .as_mut()
            .and_then(|session| session.stats.take())
        {
            stats.abort();
        }
    }

    /// Releases the current session. Safe to call repeatedly.
    pub async fn close(&self) {
        let session = self.live.lock().await.take();
        if let Some(session) = session {
            session.shutdown().await;
        }
    }

    pub async fn has_session(&self) -> bool {
        self.live.lock().await.is_some()
    }

    pub async fn current_handle(&self) -> Option<SessionHandle> {
        self.live.lock().await.as_ref().map(|s| s.handle)
    }

    /// Takes effect for the next session created.
    pub fn update_ice_servers(&self, servers: Vec<IceServer>) {
        info!(target: "Call/Session", "ICE servers updated ({} configured)", servers.len());
        *self
            .ice_servers
            .write()
            .expect("RwLock should not be poisoned") = servers;
    }

    pub fn subscribe_stats(&self) -> watch::Receiver<CallStats> {
        self.stats_tx.subscribe()
    }

    pub fn stats(&self) -> CallStats {
        self.stats_tx.borrow().clone()
    }

    async fn peer(&self) -> Option<Arc<dyn PeerConnection>> {
        self.live.lock().await.as_ref().map(|s| s.peer.clone())
    }
}

fn publish_sample(stats: &watch::Sender<CallStats>, sample: TransportStats) {
    stats.send_modify(|snapshot| {
        *snapshot = CallStats {
            inbound_bytes: sample.inbound_bytes,
            inbound_packets: sample.inbound_packets,
            outbound_bytes: sample.outbound_bytes,
            outbound_packets: sample.outbound_packets,
            ice_state: snapshot.ice_state,
            signaling_state: snapshot.signaling_state,
        };
    });
}

async fn pump_events(
    mut events: mpsc::Receiver<PeerEvent>,
    listener: Arc<dyn SessionListener>,
    stats: Arc<watch::Sender<CallStats>>,
) {
    while let Some(event) = events.recv().await {
        match event {
            PeerEvent::IceCandidate(candidate) => listener.on_local_candidate(candidate).await,
            PeerEvent::IceConnectionChanged(state) => {
                info!(target: "Call/Session", "ICE connection state -> {state:?}");
                stats.send_modify(|snapshot| snapshot.ice_state = state);
                listener.on_ice_connection_change(state).await;
            }
            PeerEvent::SignalingChanged(state) => {
                debug!(target: "Call/Session", "Signaling state -> {state:?}");
                stats.send_modify(|snapshot| snapshot.signaling_state = state);
            }
        }
    }
    debug!(target: "Call/Session", "Peer event stream closed");
}
