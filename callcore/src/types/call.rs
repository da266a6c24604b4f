use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque token correlating every signaling message of one call attempt.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CallId(String);

impl CallId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Mint a fresh identity for a locally initiated call.
    pub fn generate() -> Self {
        let bytes: [u8; 16] = rand::random();
        Self(hex::encode_upper(bytes))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CallId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CallId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Account identifier of a call participant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(transparent)]
pub struct PartyId(pub i64);

impl fmt::Display for PartyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for PartyId {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

/// Process-wide state of the single call slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Default)]
pub enum CallState {
    #[default]
    Idle,
    /// Local offer sent (or being produced), waiting for the remote answer.
    Outgoing { remote: PartyId },
    /// Remote offer received, waiting for the local user to answer.
    Incoming {
        remote: PartyId,
        call_id: CallId,
        sdp: String,
    },
    Active { remote: PartyId },
    /// Call torn down. Reverts to `Idle` after the configured grace delay.
    Ended,
}

impl CallState {
    pub fn is_idle(&self) -> bool {
        matches!(self, Self::Idle)
    }

    pub fn is_ended(&self) -> bool {
        matches!(self, Self::Ended)
    }

    /// True for every state that represents a live call attempt.
    pub fn is_in_call(&self) -> bool {
        !matches!(self, Self::Idle | Self::Ended)
    }

    pub fn remote_party(&self) -> Option<PartyId> {
        match self {
            Self::Outgoing { remote } | Self::Incoming { remote, .. } | Self::Active { remote } => {
                Some(*remote)
            }
            Self::Idle | Self::Ended => None,
        }
    }
}

/// A connectivity candidate as understood by the transport engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IceCandidate {
    /// Candidate line, e.g. `candidate:1 1 udp 2130706431 192.168.1.5 8888 typ host`.
    pub candidate: String,
    pub sdp_mid: Option<String>,
    pub sdp_m_line_index: u16,
}

impl IceCandidate {
    pub fn new(candidate: impl Into<String>) -> Self {
        Self {
            candidate: candidate.into(),
            sdp_mid: None,
            sdp_m_line_index: 0,
        }
    }

    pub fn with_sdp_mid(mut self, sdp_mid: impl Into<String>) -> Self {
        self.sdp_mid = Some(sdp_mid.into());
        self
    }

    pub fn with_sdp_m_line_index(mut self, index: u16) -> Self {
        self.sdp_m_line_index = index;
        self
    }
}

/// A candidate tagged with the call it belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallCandidate {
    pub call_id: CallId,
    pub candidate: IceCandidate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SdpKind {
    Offer,
    Answer,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDescription {
    pub kind: SdpKind,
    pub sdp: String,
}

impl SessionDescription {
    pub fn offer(sdp: impl Into<String>) -> Self {
        Self {
            kind: SdpKind::Offer,
            sdp: sdp.into(),
        }
    }

    pub fn answer(sdp: impl Into<String>) -> Self {
        Self {
            kind: SdpKind::Answer,
            sdp: sdp.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Default)]
pub enum IceConnectionState {
    #[default]
    Unknown,
    New,
    Checking,
    Connected,
    Completed,
    Disconnected,
    Failed,
    Closed,
}

impl IceConnectionState {
    /// The engine gave up on every candidate pair; the session cannot recover.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Failed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Default)]
pub enum SignalingState {
    #[default]
    Unknown,
    Stable,
    HaveLocalOffer,
    HaveRemoteOffer,
    HaveLocalPranswer,
    HaveRemotePranswer,
    Closed,
}

/// Latest transport statistics sample. Replaced wholesale on every poll.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Default)]
pub struct CallStats {
    pub inbound_bytes: u64,
    pub inbound_packets: u64,
    pub outbound_bytes: u64,
    pub outbound_packets: u64,
    pub ice_state: IceConnectionState,
    pub signaling_state: SignalingState,
}
