//! What the surrounding UI gets to see of a session

use std::fmt;

use serde::{Deserialize, Serialize};
use teleconsult_signaling_core::SessionId;

use crate::state_machine::SessionState;
use crate::types::{CallState, FailureReason, NegotiationRole};

/// Connection status line
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "kebab-case")]
pub enum ConnectionStatus {
    Connecting,
    WaitingForParticipant,
    Connected,
    Ended,
    Failed { reason: FailureReason, message: String },
}

impl ConnectionStatus {
    pub fn from_session(session: &SessionState) -> Self {
        match session.state {
            CallState::AwaitingPeer if session.conditions.peer_wait_noticed => Self::WaitingForParticipant,
            CallState::Idle
            | CallState::Capturing
            | CallState::AwaitingPeer
            | CallState::Offering
            | CallState::Answering => Self::Connecting,
            CallState::Connected => Self::Connected,
            CallState::Ended => Self::Ended,
            CallState::Failed(reason) => Self::Failed {
                reason,
                message: reason.user_message().to_string(),
            },
        }
    }

    /// No further status changes follow
    pub fn is_final(&self) -> bool {
        matches!(self, Self::Ended | Self::Failed { .. })
    }
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connecting => write!(f, "Connecting..."),
            Self::WaitingForParticipant => write!(f, "Waiting for other participant..."),
            Self::Connected => write!(f, "Connected"),
            Self::Ended => write!(f, "Call ended"),
            Self::Failed { message, .. } => write!(f, "{}", message),
        }
    }
}

/// Point-in-time view of a session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub session_id: SessionId,
    pub state: CallState,
    pub role: Option<NegotiationRole>,
    pub status: ConnectionStatus,
    pub audio_enabled: bool,
    pub video_enabled: bool,
    pub remote_media_attached: bool,
    pub transport_generation: u64,
    pub dropped_candidates: u64,
}

impl SessionSnapshot {
    pub fn new(session: &SessionState) -> Self {
        Self {
            session_id: session.session_id.clone(),
            state: session.state,
            role: session.role,
            status: ConnectionStatus::from_session(session),
            audio_enabled: false,
            video_enabled: false,
            remote_media_attached: false,
            transport_generation: session.transport_generation,
            dropped_candidates: session.dropped_candidates,
        }
    }
}
