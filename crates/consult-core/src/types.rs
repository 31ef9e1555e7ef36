//! Core session types

use serde::{Deserialize, Serialize};
use std::fmt;

/// Which side of the negotiation a participant plays
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NegotiationRole {
    /// Creates the offer
    Initiator,
    /// Answers the offer
    Responder,
}

impl fmt::Display for NegotiationRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Initiator => write!(f, "initiator"),
            Self::Responder => write!(f, "responder"),
        }
    }
}

/// Why a session ended in `failed`
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailureReason {
    CaptureDenied,
    CaptureUnavailable,
    ChannelLost,
    NegotiationTimeout,
    TransportLost,
}

impl FailureReason {
    /// Text shown to the participant
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::CaptureDenied => "Camera or microphone access was denied.",
            Self::CaptureUnavailable => "No camera or microphone could be opened.",
            Self::ChannelLost => "connection lost, please rejoin",
            Self::NegotiationTimeout => "Could not connect to the other participant.",
            Self::TransportLost => "The connection to the other participant was lost.",
        }
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::CaptureDenied => "capture-denied",
            Self::CaptureUnavailable => "capture-unavailable",
            Self::ChannelLost => "channel-lost",
            Self::NegotiationTimeout => "negotiation-timeout",
            Self::TransportLost => "transport-lost",
        };
        f.write_str(name)
    }
}

/// Fine-grained session state.
///
/// `Offering` and `Answering` are the two role-specific halves of
/// negotiating; [`CallState::phase`] folds them back together.
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CallState {
    Idle,
    /// Local media being acquired, channel being joined
    Capturing,
    AwaitingPeer,
    Offering,
    Answering,
    Connected,
    Ended,
    Failed(FailureReason),
}

/// Coarse session phase
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CallPhase {
    Idle,
    AwaitingPeer,
    Negotiating,
    Connected,
    Ended,
    Failed,
}

impl CallState {
    pub fn phase(&self) -> CallPhase {
        match self {
            Self::Idle | Self::Capturing => CallPhase::Idle,
            Self::AwaitingPeer => CallPhase::AwaitingPeer,
            Self::Offering | Self::Answering => CallPhase::Negotiating,
            Self::Connected => CallPhase::Connected,
            Self::Ended => CallPhase::Ended,
            Self::Failed(_) => CallPhase::Failed,
        }
    }

    /// Ended and failed sessions accept no further events
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Ended | Self::Failed(_))
    }

    /// Presence has been published from this state on
    pub fn is_past_capturing(&self) -> bool {
        !matches!(self, Self::Idle | Self::Capturing)
    }
}

impl fmt::Display for CallState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Capturing => write!(f, "capturing"),
            Self::AwaitingPeer => write!(f, "awaiting-peer"),
            Self::Offering => write!(f, "offering"),
            Self::Answering => write!(f, "answering"),
            Self::Connected => write!(f, "connected"),
            Self::Ended => write!(f, "ended"),
            Self::Failed(reason) => write!(f, "failed({})", reason),
        }
    }
}
