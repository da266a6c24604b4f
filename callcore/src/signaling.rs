//! Signaling envelope codec.
//!
//! Every envelope is a JSON object with a `header` and a kind-specific `body`:
//!
//! ```json
//! {
//!   "header": {
//!     "version": "1.0", "type": "ice_candidate", "message_id": "...",
//!     "timestamp": 1700000000000, "sender_id": 7, "recipient_id": 42
//!   },
//!   "body": { "call_id": "...", "candidate": "...", "sdp_mid": "0", "sdp_m_line_index": 0 }
//! }
//! ```
//!
//! Call-related bodies are modelled as the closed [`SignalingBody`] type. Any
//! other `type` decodes to [`Decoded::Other`] so the caller can skip it.

use crate::error::CodecError;
use crate::types::call::{CallCandidate, CallId, IceCandidate, PartyId};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fmt;

pub const PROTOCOL_VERSION: &str = "1.0";

/// Call signaling message kinds carried in `header.type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    CallOffer,
    CallAnswer,
    IceCandidate,
    CallEnd,
}

impl MessageKind {
    pub const ALL: [MessageKind; 4] = [
        Self::CallOffer,
        Self::CallAnswer,
        Self::IceCandidate,
        Self::CallEnd,
    ];

    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::CallOffer => "call_offer",
            Self::CallAnswer => "call_answer",
            Self::IceCandidate => "ice_candidate",
            Self::CallEnd => "call_end",
        }
    }

    pub fn from_wire(kind: &str) -> Option<Self> {
        match kind {
            "call_offer" => Some(Self::CallOffer),
            "call_answer" => Some(Self::CallAnswer),
            "ice_candidate" => Some(Self::IceCandidate),
            "call_end" => Some(Self::CallEnd),
            _ => None,
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn default_version() -> String {
    PROTOCOL_VERSION.to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvelopeHeader {
    #[serde(default = "default_version")]
    pub version: String,
    /// Raw kind string; kept verbatim so unknown kinds can still be logged.
    #[serde(rename = "type")]
    pub kind: String,
    pub message_id: String,
    /// Epoch milliseconds.
    #[serde(default)]
    pub timestamp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender_id: Option<PartyId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recipient_id: Option<PartyId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chat_id: Option<i64>,
}

impl EnvelopeHeader {
    pub fn new(kind: MessageKind, sender_id: PartyId, recipient_id: PartyId) -> Self {
        Self {
            version: default_version(),
            kind: kind.as_str().to_string(),
            message_id: generate_message_id(),
            timestamp: Utc::now().timestamp_millis(),
            sender_id: Some(sender_id),
            recipient_id: Some(recipient_id),
            chat_id: None,
        }
    }
}

/// Timestamp-prefixed random id, unique enough for duplicate detection.
pub fn generate_message_id() -> String {
    let suffix: [u8; 6] = rand::random();
    format!(
        "{}{}",
        Utc::now().format("%Y%m%d%H%M%S"),
        hex::encode(suffix)
    )
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallOfferBody {
    pub call_id: CallId,
    pub sdp: String,
    #[serde(default)]
    pub video: bool,
    #[serde(default = "default_audio")]
    pub audio: bool,
}

fn default_audio() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallAnswerBody {
    pub call_id: CallId,
    pub sdp: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IceCandidateBody {
    pub call_id: CallId,
    pub candidate: String,
    #[serde(default)]
    pub sdp_mid: Option<String>,
    #[serde(default)]
    pub sdp_m_line_index: u16,
}

impl IceCandidateBody {
    pub fn from_candidate(call_id: CallId, candidate: &IceCandidate) -> Self {
        Self {
            call_id,
            candidate: candidate.candidate.clone(),
            sdp_mid: candidate.sdp_mid.clone(),
            sdp_m_line_index: candidate.sdp_m_line_index,
        }
    }

    pub fn into_call_candidate(self) -> CallCandidate {
        CallCandidate {
            call_id: self.call_id,
            candidate: IceCandidate {
                candidate: self.candidate,
                sdp_mid: self.sdp_mid,
                sdp_m_line_index: self.sdp_m_line_index,
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallEndBody {
    pub call_id: CallId,
    #[serde(default)]
    pub reason: String,
}

/// Kind-specific envelope body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum SignalingBody {
    Offer(CallOfferBody),
    Answer(CallAnswerBody),
    Candidate(IceCandidateBody),
    End(CallEndBody),
}

impl SignalingBody {
    pub fn kind(&self) -> MessageKind {
        match self {
            Self::Offer(_) => MessageKind::CallOffer,
            Self::Answer(_) => MessageKind::CallAnswer,
            Self::Candidate(_) => MessageKind::IceCandidate,
            Self::End(_) => MessageKind::CallEnd,
        }
    }

    pub fn call_id(&self) -> &CallId {
        match self {
            Self::Offer(b) => &b.call_id,
            Self::Answer(b) => &b.call_id,
            Self::Candidate(b) => &b.call_id,
            Self::End(b) => &b.call_id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SignalingMessage {
    pub header: EnvelopeHeader,
    pub body: SignalingBody,
}

impl SignalingMessage {
    pub fn new(sender_id: PartyId, recipient_id: PartyId, body: SignalingBody) -> Self {
        Self {
            header: EnvelopeHeader::new(body.kind(), sender_id, recipient_id),
            body,
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>, CodecError> {
        Ok(serde_json::to_vec(self)?)
    }
}

/// Result of decoding one inbound envelope.
#[derive(Debug, Clone, PartialEq)]
pub enum Decoded {
    Signaling(SignalingMessage),
    /// Well-formed envelope of a kind this subsystem does not handle.
    Other(EnvelopeHeader),
}

#[derive(Deserialize)]
struct RawEnvelope {
    header: EnvelopeHeader,
    #[serde(default)]
    body: Option<serde_json::Value>,
}

pub fn decode(bytes: &[u8]) -> Result<Decoded, CodecError> {
    let raw: RawEnvelope = serde_json::from_slice(bytes)?;

    if !raw.header.version.starts_with("1.") {
        return Err(CodecError::UnsupportedVersion(raw.header.version));
    }

    let Some(kind) = MessageKind::from_wire(&raw.header.kind) else {
        return Ok(Decoded::Other(raw.header));
    };

    let body = raw.body.ok_or(CodecError::MissingField("body"))?;
    let body = match kind {
        MessageKind::CallOffer => SignalingBody::Offer(serde_json::from_value(body)?),
        MessageKind::CallAnswer => SignalingBody::Answer(serde_json::from_value(body)?),
        MessageKind::IceCandidate => SignalingBody::Candidate(serde_json::from_value(body)?),
        MessageKind::CallEnd => SignalingBody::End(serde_json::from_value(body)?),
    };

    Ok(Decoded::Signaling(SignalingMessage {
        header: raw.header,
        body,
    }))
}
