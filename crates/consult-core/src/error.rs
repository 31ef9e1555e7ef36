//! Error types for consultation sessions

use teleconsult_signaling_core::SignalingError;
use thiserror::Error;

/// Result type for consultation operations
pub type ConsultResult<T> = Result<T, ConsultError>;

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Result type for transport primitive operations
pub type TransportResult<T> = Result<T, TransportError>;

/// Errors surfaced by the consultation controller
#[derive(Debug, Error)]
pub enum ConsultError {
    /// Activation without a session id
    #[error("No appointment ID provided")]
    MissingSessionId,

    /// Storage has no record for the session
    #[error("Session not found: {session_id}")]
    SessionNotFound { session_id: String },

    /// The local user is neither doctor nor patient of the session
    #[error("User {user_id} is not a participant of session {session_id}")]
    NotAParticipant { session_id: String, user_id: String },

    /// Media toggled before capture completed or after teardown
    #[error("No local media available")]
    NoLocalMedia,

    /// The session driver is gone
    #[error("Session {session_id} is closed")]
    SessionClosed { session_id: String },

    /// Signaling channel error
    #[error("Signaling error: {0}")]
    Signaling(#[from] SignalingError),

    /// Storage error
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Capture error
    #[error("Capture error: {0}")]
    Capture(#[from] CaptureError),

    /// Transport error
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// Invalid configuration
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// Shared infrastructure error (config files, logging)
    #[error(transparent)]
    Infra(#[from] teleconsult_infra_common::Error),
}

impl ConsultError {
    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create a session-closed error
    pub fn closed(session_id: impl Into<String>) -> Self {
        Self::SessionClosed {
            session_id: session_id.into(),
        }
    }

    /// Whether retrying the same activation can succeed
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Signaling(_) => true,
            Self::Storage(StorageError::Backend { .. }) => true,
            _ => false,
        }
    }

    /// Message suitable for showing to the participant
    pub fn user_message(&self) -> String {
        match self {
            Self::MissingSessionId => "No appointment ID provided".to_string(),
            Self::SessionNotFound { .. } => "This appointment could not be found.".to_string(),
            Self::NotAParticipant { .. } => "You are not a participant of this appointment.".to_string(),
            Self::NoLocalMedia => "Camera and microphone are not available.".to_string(),
            Self::SessionClosed { .. } => "The call has already ended.".to_string(),
            Self::Signaling(_) => "connection lost, please rejoin".to_string(),
            Self::Capture(e) => e.user_message().to_string(),
            Self::Configuration { message } => format!("Configuration problem: {}", message),
            _ => "An unexpected error occurred.".to_string(),
        }
    }
}

/// Errors from the local capture primitive
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CaptureError {
    /// The participant refused camera or microphone access
    #[error("Permission denied: {message}")]
    PermissionDenied { message: String },

    /// No device, or the device is busy
    #[error("Device unavailable: {message}")]
    DeviceUnavailable { message: String },
}

impl CaptureError {
    pub fn denied(message: impl Into<String>) -> Self {
        Self::PermissionDenied {
            message: message.into(),
        }
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::DeviceUnavailable {
            message: message.into(),
        }
    }

    pub fn user_message(&self) -> &'static str {
        match self {
            Self::PermissionDenied { .. } => "Camera or microphone access was denied.",
            Self::DeviceUnavailable { .. } => "No camera or microphone could be opened.",
        }
    }
}

/// Errors from the direct transport primitive
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    /// Session description rejected
    #[error("Invalid session description: {reason}")]
    InvalidDescription { reason: String },

    /// Candidate added before the remote description
    #[error("No remote description applied")]
    NoRemoteDescription,

    /// Operation not valid in the transport's signaling state
    #[error("Invalid transport state: {message}")]
    InvalidState { message: String },

    /// Transport already closed
    #[error("Transport closed")]
    Closed,

    /// Transport could not be created
    #[error("Transport creation failed: {message}")]
    CreateFailed { message: String },
}

impl TransportError {
    pub fn invalid_description(reason: impl Into<String>) -> Self {
        Self::InvalidDescription {
            reason: reason.into(),
        }
    }

    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::InvalidState {
            message: message.into(),
        }
    }
}

/// Errors from session storage
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StorageError {
    #[error("Record not found: {id}")]
    NotFound { id: String },

    #[error("Storage backend error: {message}")]
    Backend { message: String },
}

impl StorageError {
    pub fn not_found(id: impl Into<String>) -> Self {
        Self::NotFound { id: id.into() }
    }

    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_session_id_message() {
        assert_eq!(ConsultError::MissingSessionId.to_string(), "No appointment ID provided");
        assert_eq!(ConsultError::MissingSessionId.user_message(), "No appointment ID provided");
    }

    #[test]
    fn capture_errors_convert() {
        let err: ConsultError = CaptureError::denied("blocked by user").into();
        assert_eq!(err.user_message(), "Camera or microphone access was denied.");
        assert!(!err.is_recoverable());
    }

    #[test]
    fn backend_storage_errors_are_recoverable() {
        let err: ConsultError = StorageError::backend("timeout").into();
        assert!(err.is_recoverable());
        let err: ConsultError = StorageError::not_found("S1").into();
        assert!(!err.is_recoverable());
    }
}
