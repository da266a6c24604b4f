//! Candidate admissibility rules.
//!
//! A candidate line looks like
//! `candidate:842163049 1 udp 1677729535 203.0.113.5 3478 typ srflx raddr 0.0.0.0 rport 0`.
//! The connection address is the first IP literal before the `typ` keyword and
//! the candidate type is the token after it.

use std::fmt;
use std::net::{IpAddr, Ipv4Addr};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CandidateType {
    Host,
    ServerReflexive,
    PeerReflexive,
    Relay,
    Unknown,
}

impl CandidateType {
    fn from_token(token: &str) -> Self {
        match token {
            "host" => Self::Host,
            "srflx" => Self::ServerReflexive,
            "prflx" => Self::PeerReflexive,
            "relay" => Self::Relay,
            _ => Self::Unknown,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockReason {
    /// Loopback or emulator-internal address.
    Unreachable,
    /// Container bridge network (172.16.0.0/12) on a non-relay candidate.
    DockerNetwork,
}

impl fmt::Display for BlockReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unreachable => f.write_str("unreachable address"),
            Self::DockerNetwork => f.write_str("docker network not allowed"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterResult {
    Allowed,
    Blocked(BlockReason),
}

impl FilterResult {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed)
    }
}

/// Address and type extracted from a candidate line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CandidateInfo {
    pub address: Option<IpAddr>,
    pub kind: CandidateType,
}

impl CandidateInfo {
    pub fn parse(candidate: &str) -> Self {
        let mut address = None;
        let mut kind = CandidateType::Unknown;
        let mut tokens = candidate.split_whitespace();

        while let Some(token) = tokens.next() {
            if token == "typ" {
                kind = tokens
                    .next()
                    .map(CandidateType::from_token)
                    .unwrap_or(CandidateType::Unknown);
                break;
            }
            if address.is_none() {
                address = token.parse::<IpAddr>().ok();
            }
        }

        Self { address, kind }
    }
}

fn is_emulator_internal(ip: &Ipv4Addr) -> bool {
    let [a, b, c, _] = ip.octets();
    a == 10 && b == 0 && c == 2
}

fn is_docker_bridge(ip: &Ipv4Addr) -> bool {
    let [a, b, _, _] = ip.octets();
    a == 172 && (16..=31).contains(&b)
}

/// Decide whether a candidate line may be handed to the transport engine or
/// sent to the peer. Pure; callers do the logging.
pub fn admit(candidate: &str) -> FilterResult {
    let info = CandidateInfo::parse(candidate);
    let is_relay = info.kind == CandidateType::Relay;

    let Some(address) = info.address else {
        // mDNS hostnames and unparseable lines carry no address to judge.
        return FilterResult::Allowed;
    };

    if address.is_loopback() {
        return FilterResult::Blocked(BlockReason::Unreachable);
    }

    let IpAddr::V4(v4) = address else {
        return FilterResult::Allowed;
    };

    if is_emulator_internal(&v4) {
        FilterResult::Blocked(BlockReason::Unreachable)
    } else if is_docker_bridge(&v4) && !is_relay {
        FilterResult::Blocked(BlockReason::DockerNetwork)
    } else {
        FilterResult::Allowed
    }
}
