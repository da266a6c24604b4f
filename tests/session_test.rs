mod common;

use async_trait::async_trait;
use common::*;
use peercall::calls::{CallError, SessionListener, SessionManager};
use peercall::config::{DEFAULT_STUN_SERVER, IceServer};
use peercall::engine::PeerEvent;
use peercall::types::{IceCandidate, IceConnectionState, SdpKind, SignalingState};
use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Default)]
struct RecordingListener {
    candidates: Mutex<Vec<IceCandidate>>,
    ice_states: Mutex<Vec<IceConnectionState>>,
}

#[async_trait]
impl SessionListener for RecordingListener {
    async fn on_local_candidate(&self, candidate: IceCandidate) {
        self.candidates.lock().unwrap().push(candidate);
    }

    async fn on_ice_connection_change(&self, state: IceConnectionState) {
        self.ice_states.lock().unwrap().push(state);
    }
}

fn session_manager() -> (SessionManager, Arc<FakeEngine>) {
    init_logging();
    let engine = Arc::new(FakeEngine::default());
    let sessions = SessionManager::new(
        engine.clone(),
        vec![IceServer::stun(DEFAULT_STUN_SERVER)],
        Duration::from_secs(1),
    );
    (sessions, engine)
}

#[tokio::test]
async fn test_create_requires_initialized_engine() {
    let (sessions, engine) = session_manager();
    let listener = Arc::new(RecordingListener::default());

    assert!(matches!(
        sessions.create_session(ALICE, listener.clone()).await,
        Err(CallError::EngineNotInitialized)
    ));
    assert!(!sessions.has_session().await);

    engine.fail_init.store(true, Ordering::SeqCst);
    assert!(!sessions.initialize_engine().await);
    engine.fail_init.store(false, Ordering::SeqCst);
    assert!(sessions.initialize_engine().await);
    assert!(sessions.initialize_engine().await);
    assert_eq!(engine.init_attempts.load(Ordering::SeqCst), 2);

    sessions.create_session(ALICE, listener).await.unwrap();
    assert!(sessions.has_session().await);
    assert!(engine.last_peer().audio_track.load(Ordering::SeqCst));
}

#[tokio::test]
async fn test_replacement_closes_previous_session() {
    let (sessions, engine) = session_manager();
    sessions.initialize_engine().await;
    let listener = Arc::new(RecordingListener::default());

    let first = sessions.create_session(ALICE, listener.clone()).await.unwrap();
    let second = sessions.create_session(ALICE, listener).await.unwrap();
    assert_ne!(first, second);
    assert_eq!(sessions.current_handle().await, Some(second));

    let peers = engine.peers();
    assert!(peers[0].is_closed());
    assert!(!peers[1].is_closed());

    sessions.close().await;
    sessions.close().await;
    assert!(peers[1].is_closed());
    assert!(!sessions.has_session().await);
}

#[tokio::test]
async fn test_remote_description_kind_follows_local_state() {
    let (sessions, engine) = session_manager();
    sessions.initialize_engine().await;
    let listener = Arc::new(RecordingListener::default());

    // Nothing local yet: the remote description is an offer.
    sessions.create_session(BOB, listener.clone()).await.unwrap();
    sessions.apply_remote_description("v=0\r\n").await;
    assert_eq!(
        engine.last_peer().remote_description().map(|d| d.kind),
        Some(SdpKind::Offer)
    );
    let answer = sessions.create_local_answer().await.unwrap();
    assert_eq!(answer.kind, SdpKind::Answer);

    // After our own offer it is an answer.
    sessions.create_session(ALICE, listener).await.unwrap();
    let offer = sessions.create_local_offer().await.unwrap();
    assert_eq!(offer.kind, SdpKind::Offer);
    assert_eq!(
        engine.last_peer().local.lock().unwrap().as_ref(),
        Some(&offer)
    );
    sessions.apply_remote_description("v=0\r\n").await;
    assert_eq!(
        engine.last_peer().remote_description().map(|d| d.kind),
        Some(SdpKind::Answer)
    );
}

#[tokio::test]
async fn test_operations_without_session_are_harmless() {
    let (sessions, _engine) = session_manager();

    sessions
        .add_remote_candidate(IceCandidate::new("candidate:1 1 udp 1 198.51.100.7 5000 typ host"))
        .await;
    sessions.apply_remote_description("v=0\r\n").await;
    sessions.start_stats_polling().await;
    sessions.stop_stats_polling().await;
    sessions.close().await;
    assert!(!sessions.set_muted(true).await);
    assert!(matches!(
        sessions.create_local_offer().await,
        Err(CallError::NegotiationFailure(_))
    ));
}

#[tokio::test]
async fn test_event_pump_forwards_and_tracks_state() {
    let (sessions, engine) = session_manager();
    sessions.initialize_engine().await;
    let listener = Arc::new(RecordingListener::default());
    sessions.create_session(ALICE, listener.clone()).await.unwrap();
    let peer = engine.last_peer();

    let local = IceCandidate::new("candidate:1 1 udp 2130706431 198.51.100.7 5000 typ host")
        .with_sdp_mid("0");
    peer.emit(PeerEvent::IceCandidate(local.clone())).await;
    peer.emit(PeerEvent::IceConnectionChanged(IceConnectionState::Checking))
        .await;
    peer.emit(PeerEvent::SignalingChanged(SignalingState::Stable))
        .await;
    settle().await;

    assert_eq!(*listener.candidates.lock().unwrap(), vec![local]);
    assert_eq!(
        *listener.ice_states.lock().unwrap(),
        vec![IceConnectionState::Checking]
    );
    let stats = sessions.stats();
    assert_eq!(stats.ice_state, IceConnectionState::Checking);
    assert_eq!(stats.signaling_state, SignalingState::Stable);
}

#[tokio::test(start_paused = true)]
async fn test_stats_polling_replaces_snapshot() {
    let (sessions, engine) = session_manager();
    sessions.initialize_engine().await;
    sessions
        .create_session(ALICE, Arc::new(RecordingListener::default()))
        .await
        .unwrap();
    let mut stats_rx = sessions.subscribe_stats();

    sessions.start_stats_polling().await;
    tokio::time::timeout(Duration::from_secs(5), stats_rx.changed())
        .await
        .unwrap()
        .unwrap();
    let first = stats_rx.borrow_and_update().clone();
    assert_eq!(first.inbound_bytes, 1000);
    assert_eq!(first.outbound_packets, 9);

    sessions.stop_stats_polling().await;
    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(sessions.stats(), first);
    assert!(!engine.last_peer().is_closed());
}
