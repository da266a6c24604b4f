#![allow(dead_code)]

use async_trait::async_trait;
use peercall::calls::{CallCollaborators, CallManager};
use peercall::channel::SignalingChannel;
use peercall::config::{CallConfig, IceServer};
use peercall::engine::{PeerConnection, PeerEvent, TransportEngine, TransportStats};
use peercall::platform::{HeadlessAudioDevice, PermissionSource};
use peercall::signaling::{Decoded, SignalingBody, SignalingMessage, decode};
use peercall::types::{CallId, CallState, IceCandidate, PartyId, SessionDescription};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

pub const ALICE: PartyId = PartyId(1);
pub const BOB: PartyId = PartyId(2);
pub const CAROL: PartyId = PartyId(3);

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Waits (bounded) until the manager's state satisfies `f`.
pub async fn wait_for_state(
    manager: &CallManager,
    f: impl FnMut(&CallState) -> bool,
) -> CallState {
    let mut rx = manager.subscribe_state();
    let state = tokio::time::timeout(Duration::from_secs(5), rx.wait_for(f))
        .await
        .expect("timed out waiting for call state")
        .expect("state channel closed")
        .clone();
    state
}

/// Lets spawned tasks run without advancing the clock.
pub async fn settle() {
    for _ in 0..32 {
        tokio::task::yield_now().await;
    }
}

pub struct FakePeer {
    events: mpsc::Sender<PeerEvent>,
    pub ice_servers: Vec<IceServer>,
    pub local: Mutex<Option<SessionDescription>>,
    pub remote: Mutex<Option<SessionDescription>>,
    pub candidates: Mutex<Vec<IceCandidate>>,
    pub audio_track: AtomicBool,
    pub audio_enabled: AtomicBool,
    pub closed: AtomicBool,
    pub fail_negotiation: bool,
    stats_polls: AtomicU64,
}

impl FakePeer {
    pub async fn emit(&self, event: PeerEvent) {
        let _ = self.events.send(event).await;
    }

    pub fn applied_candidates(&self) -> Vec<String> {
        self.candidates
            .lock()
            .unwrap()
            .iter()
            .map(|c| c.candidate.clone())
            .collect()
    }

    pub fn remote_description(&self) -> Option<SessionDescription> {
        self.remote.lock().unwrap().clone()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PeerConnection for FakePeer {
    async fn add_local_audio_track(&self) -> anyhow::Result<()> {
        self.audio_track.store(true, Ordering::SeqCst);
        self.audio_enabled.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn set_local_audio_enabled(&self, enabled: bool) {
        self.audio_enabled.store(enabled, Ordering::SeqCst);
    }

    async fn create_offer(&self) -> anyhow::Result<SessionDescription> {
        if self.fail_negotiation {
            anyhow::bail!("offer rejected by engine");
        }
        Ok(SessionDescription::offer("v=0\r\no=- 1 1 IN IP4 0.0.0.0\r\n"))
    }

    async fn create_answer(&self) -> anyhow::Result<SessionDescription> {
        if self.fail_negotiation {
            anyhow::bail!("answer rejected by engine");
        }
        if self.remote.lock().unwrap().is_none() {
            anyhow::bail!("no remote offer");
        }
        Ok(SessionDescription::answer("v=0\r\no=- 2 2 IN IP4 0.0.0.0\r\n"))
    }

    async fn set_local_description(&self, desc: SessionDescription) -> anyhow::Result<()> {
        *self.local.lock().unwrap() = Some(desc);
        Ok(())
    }

    async fn set_remote_description(&self, desc: SessionDescription) -> anyhow::Result<()> {
        *self.remote.lock().unwrap() = Some(desc);
        Ok(())
    }

    async fn has_local_description(&self) -> bool {
        self.local.lock().unwrap().is_some()
    }

    async fn add_ice_candidate(&self, candidate: IceCandidate) -> anyhow::Result<()> {
        self.candidates.lock().unwrap().push(candidate);
        Ok(())
    }

    async fn stats(&self) -> anyhow::Result<TransportStats> {
        let n = self.stats_polls.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(TransportStats {
            inbound_bytes: n * 1000,
            inbound_packets: n * 10,
            outbound_bytes: n * 900,
            outbound_packets: n * 9,
        })
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

#[derive(Default)]
pub struct FakeEngine {
    initialized: AtomicBool,
    pub fail_init: AtomicBool,
    pub fail_negotiation: AtomicBool,
    pub init_attempts: AtomicUsize,
    peers: Mutex<Vec<Arc<FakePeer>>>,
}

impl FakeEngine {
    pub fn peers(&self) -> Vec<Arc<FakePeer>> {
        self.peers.lock().unwrap().clone()
    }

    pub fn last_peer(&self) -> Arc<FakePeer> {
        self.peers
            .lock()
            .unwrap()
            .last()
            .cloned()
            .expect("no peer connection was created")
    }
}

#[async_trait]
impl TransportEngine for FakeEngine {
    async fn initialize(&self) -> anyhow::Result<()> {
        self.init_attempts.fetch_add(1, Ordering::SeqCst);
        if self.fail_init.load(Ordering::SeqCst) {
            anyhow::bail!("audio device unavailable");
        }
        self.initialized.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }

    async fn create_peer_connection(
        &self,
        ice_servers: &[IceServer],
    ) -> anyhow::Result<(Arc<dyn PeerConnection>, mpsc::Receiver<PeerEvent>)> {
        let (tx, rx) = mpsc::channel(32);
        let peer = Arc::new(FakePeer {
            events: tx,
            ice_servers: ice_servers.to_vec(),
            local: Mutex::new(None),
            remote: Mutex::new(None),
            candidates: Mutex::new(Vec::new()),
            audio_track: AtomicBool::new(false),
            audio_enabled: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            fail_negotiation: self.fail_negotiation.load(Ordering::SeqCst),
            stats_polls: AtomicU64::new(0),
        });
        self.peers.lock().unwrap().push(peer.clone());
        Ok((peer, rx))
    }
}

/// Records every envelope sent.
#[derive(Default)]
pub struct RecordingChannel {
    sent: Mutex<Vec<Vec<u8>>>,
}

impl RecordingChannel {
    pub fn messages(&self) -> Vec<SignalingMessage> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .map(|bytes| match decode(bytes).expect("sent envelope should decode") {
                Decoded::Signaling(message) => message,
                Decoded::Other(header) => panic!("unexpected envelope type {}", header.kind),
            })
            .collect()
    }

    pub fn bodies(&self) -> Vec<SignalingBody> {
        self.messages().into_iter().map(|m| m.body).collect()
    }

    pub fn kinds(&self) -> Vec<&'static str> {
        self.bodies().iter().map(|b| b.kind().as_str()).collect()
    }

    pub fn end_reasons(&self) -> Vec<String> {
        self.bodies()
            .into_iter()
            .filter_map(|b| match b {
                SignalingBody::End(end) => Some(end.reason),
                _ => None,
            })
            .collect()
    }
}

#[async_trait]
impl SignalingChannel for RecordingChannel {
    async fn send(&self, data: &[u8]) -> Result<(), anyhow::Error> {
        self.sent.lock().unwrap().push(data.to_vec());
        Ok(())
    }
}

pub struct TogglePermission(pub AtomicBool);

impl PermissionSource for TogglePermission {
    fn audio_capture_granted(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

pub struct Harness {
    pub manager: Arc<CallManager>,
    pub engine: Arc<FakeEngine>,
    pub channel: Arc<RecordingChannel>,
    pub permission: Arc<TogglePermission>,
    pub audio: Arc<HeadlessAudioDevice>,
}

impl Harness {
    pub fn new(config: CallConfig) -> Self {
        init_logging();
        let engine = Arc::new(FakeEngine::default());
        let channel = Arc::new(RecordingChannel::default());
        let permission = Arc::new(TogglePermission(AtomicBool::new(true)));
        let audio = Arc::new(HeadlessAudioDevice::default());
        let manager = CallManager::new(
            config,
            CallCollaborators {
                engine: engine.clone(),
                channel: channel.clone(),
                permissions: permission.clone(),
                audio_device: audio.clone(),
            },
        );
        Self {
            manager,
            engine,
            channel,
            permission,
            audio,
        }
    }

    /// Local party is ALICE.
    pub fn alice() -> Self {
        Self::new(CallConfig::new(ALICE))
    }
}

/// Encodes an inbound envelope as `from` would send it to ALICE.
pub fn envelope(from: PartyId, body: SignalingBody) -> Vec<u8> {
    SignalingMessage::new(from, ALICE, body)
        .encode()
        .expect("envelope should encode")
}

pub fn offer(call_id: &str) -> SignalingBody {
    SignalingBody::Offer(peercall::signaling::CallOfferBody {
        call_id: CallId::new(call_id),
        sdp: format!("v=0\r\ns={call_id}\r\n"),
        video: false,
        audio: true,
    })
}

pub fn answer(call_id: &CallId) -> SignalingBody {
    SignalingBody::Answer(peercall::signaling::CallAnswerBody {
        call_id: call_id.clone(),
        sdp: "v=0\r\ns=answer\r\n".to_string(),
    })
}

pub fn candidate(call_id: &str, line: &str) -> SignalingBody {
    SignalingBody::Candidate(peercall::signaling::IceCandidateBody::from_candidate(
        CallId::new(call_id),
        &IceCandidate::new(line).with_sdp_mid("0"),
    ))
}

pub fn end(call_id: &str) -> SignalingBody {
    SignalingBody::End(peercall::signaling::CallEndBody {
        call_id: CallId::new(call_id),
        reason: "hangup".to_string(),
    })
}
