use callcore::ice::DEFAULT_PENDING_CAPACITY;
use callcore::types::PartyId;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_STUN_SERVER: &str = "stun:stun.l.google.com:19302";

/// A STUN/TURN server handed to the transport engine.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct IceServer {
    pub urls: Vec<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub credential: Option<String>,
}

impl IceServer {
    pub fn stun(url: impl Into<String>) -> Self {
        Self {
            urls: vec![url.into()],
            username: None,
            credential: None,
        }
    }

    /// Credentials are only meaningful as a pair.
    pub fn credentials(&self) -> Option<(&str, &str)> {
        match (&self.username, &self.credential) {
            (Some(u), Some(c)) => Some((u.as_str(), c.as_str())),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct CallConfig {
    pub local_party_id: PartyId,
    /// Delay before an ended call reverts to idle, so observers see `Ended`.
    pub ended_grace_ms: u64,
    /// Zero disables statistics polling.
    pub stats_interval_ms: u64,
    /// Give up on an unanswered outgoing call after this long. Disabled when `None`.
    pub ring_timeout_secs: Option<u64>,
    pub ice_servers: Vec<IceServer>,
    /// Number of recent message ids remembered for duplicate suppression.
    pub dedup_capacity: usize,
    /// Upper bound on remote candidates buffered before a session exists.
    pub pending_capacity: usize,
    pub push_enabled: bool,
}

impl Default for CallConfig {
    fn default() -> Self {
        Self {
            local_party_id: PartyId::default(),
            ended_grace_ms: 1000,
            stats_interval_ms: 1000,
            ring_timeout_secs: None,
            ice_servers: vec![IceServer::stun(DEFAULT_STUN_SERVER)],
            dedup_capacity: 256,
            pending_capacity: DEFAULT_PENDING_CAPACITY,
            push_enabled: false,
        }
    }
}

impl CallConfig {
    pub fn new(local_party_id: PartyId) -> Self {
        Self {
            local_party_id,
            ..Default::default()
        }
    }

    pub fn from_json_str(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        Ok(Self::from_json_str(&raw)?)
    }

    pub fn ended_grace(&self) -> Duration {
        Duration::from_millis(self.ended_grace_ms)
    }

    pub fn stats_interval(&self) -> Duration {
        Duration::from_millis(self.stats_interval_ms)
    }

    pub fn ring_timeout(&self) -> Option<Duration> {
        self.ring_timeout_secs.map(Duration::from_secs)
    }
}
