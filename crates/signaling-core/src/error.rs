//! Error types for the signaling channel

use thiserror::Error;

/// Result type for signaling operations
pub type SignalingResult<T> = Result<T, SignalingError>;

/// Errors that can occur on a signaling channel
#[derive(Debug, Error)]
pub enum SignalingError {
    /// The service refused the subscription
    #[error("Join rejected for topic {topic}: {reason}")]
    JoinRejected { topic: String, reason: String },

    /// Operation on a handle that already left or was disconnected
    #[error("Not joined to topic {topic}")]
    NotJoined { topic: String },

    /// The event stream was already taken from this handle
    #[error("Event stream for topic {topic} already taken")]
    EventsTaken { topic: String },

    /// Payload could not be encoded or decoded
    #[error("Codec error: {0}")]
    Codec(#[from] serde_json::Error),
}

impl SignalingError {
    pub fn join_rejected(topic: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::JoinRejected {
            topic: topic.into(),
            reason: reason.into(),
        }
    }

    pub fn not_joined(topic: impl Into<String>) -> Self {
        Self::NotJoined { topic: topic.into() }
    }
}
