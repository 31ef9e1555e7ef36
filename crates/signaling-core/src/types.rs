//! Wire-level types shared by both ends of a consultation session.
//!
//! Everything in here crosses the signaling channel as JSON, so the serde
//! representation is part of the protocol: message variants are tagged with
//! `type`, enum values are lowercase / kebab-case.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of one consultation (stable per appointment)
#[derive(Debug, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct SessionId(pub String);

impl SessionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Name of the pub/sub topic carrying this session's signaling
    pub fn topic(&self) -> String {
        format!("consultation_{}", self.0)
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Stable user identifier; ordered lexicographically for tie-breaks
#[derive(Debug, Clone, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
pub struct UserId(pub String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Role a user declared in their profile
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeclaredRole {
    Doctor,
    Patient,
    Admin,
    #[serde(other)]
    Unknown,
}

impl fmt::Display for DeclaredRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Doctor => write!(f, "doctor"),
            Self::Patient => write!(f, "patient"),
            Self::Admin => write!(f, "admin"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

impl std::str::FromStr for DeclaredRole {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.to_ascii_lowercase().as_str() {
            "doctor" => Self::Doctor,
            "patient" => Self::Patient,
            "admin" => Self::Admin,
            _ => Self::Unknown,
        })
    }
}

/// Whether a participant is currently subscribed to the session topic
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PresenceStatus {
    Absent,
    Present,
}

/// One side of a consultation as seen through the presence view
#[derive(Debug, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct Participant {
    pub user_id: UserId,
    pub role: DeclaredRole,
    pub presence: PresenceStatus,
}

impl Participant {
    pub fn new(user_id: impl Into<String>, role: DeclaredRole) -> Self {
        Self {
            user_id: UserId::new(user_id),
            role,
            presence: PresenceStatus::Absent,
        }
    }

    /// Copy of this participant marked present
    pub fn present(&self) -> Self {
        Self {
            presence: PresenceStatus::Present,
            ..self.clone()
        }
    }

    pub fn is_present(&self) -> bool {
        self.presence == PresenceStatus::Present
    }
}

impl fmt::Display for Participant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.user_id, self.role)
    }
}

/// Offer or answer
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SdpKind {
    Offer,
    Answer,
}

/// Session description produced by the local transport primitive
#[derive(Debug, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
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

/// Network candidate discovered by a transport
#[derive(Debug, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct IceCandidate {
    pub candidate: String,
    pub sdp_mid: Option<String>,
    pub sdp_mline_index: Option<u16>,
}

impl IceCandidate {
    pub fn new(candidate: impl Into<String>) -> Self {
        Self {
            candidate: candidate.into(),
            sdp_mid: Some("0".to_string()),
            sdp_mline_index: Some(0),
        }
    }
}

/// Negotiation payloads exchanged over the channel.
///
/// Immutable once sent. The channel may duplicate, drop or reorder them
/// across senders, so receivers must be idempotent.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum NegotiationMessage {
    Offer { description: SessionDescription },
    Answer { description: SessionDescription },
    Candidate { candidate: IceCandidate },
}

impl NegotiationMessage {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Offer { .. } => "offer",
            Self::Answer { .. } => "answer",
            Self::Candidate { .. } => "candidate",
        }
    }
}

/// A negotiation message together with the participant that sent it
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct SignalEnvelope {
    pub from: Participant,
    pub message: NegotiationMessage,
}

impl SignalEnvelope {
    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn decode(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn topic_name_is_scoped_to_session() {
        assert_eq!(SessionId::new("S1").topic(), "consultation_S1");
    }

    #[test]
    fn unknown_roles_deserialize_to_unknown() {
        let role: DeclaredRole = serde_json::from_str("\"nurse\"").unwrap();
        assert_eq!(role, DeclaredRole::Unknown);
        assert_eq!("Doctor".parse::<DeclaredRole>().unwrap(), DeclaredRole::Doctor);
    }

    #[test]
    fn messages_are_tagged_by_type() {
        let msg = NegotiationMessage::Offer {
            description: SessionDescription::offer("v=0"),
        };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "offer");
        assert_eq!(json["description"]["kind"], "offer");
    }

    #[test]
    fn envelope_survives_the_wire() {
        let env = SignalEnvelope {
            from: Participant::new("doctor-1", DeclaredRole::Doctor).present(),
            message: NegotiationMessage::Candidate {
                candidate: IceCandidate::new("candidate:1 1 udp 2130706431 10.0.0.1 5000 typ host"),
            },
        };
        let decoded = SignalEnvelope::decode(&env.encode().unwrap()).unwrap();
        assert_eq!(decoded, env);
    }
}
