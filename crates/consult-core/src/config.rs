//! Consultation session configuration
//!
//! All settings have working defaults, so an empty TOML document is a valid
//! configuration. Durations are written as whole seconds:
//!
//! ```toml
//! ice_servers = ["stun:stun.l.google.com:19302"]
//! candidate_buffer_limit = 50
//! negotiation_timeout = 30
//! peer_wait_notice = 60
//! channel_rejoin_attempts = 1
//!
//! [media]
//! audio = true
//! video = true
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use teleconsult_infra_common::config::{duration_secs, from_toml_str, load_toml};

use crate::error::{ConsultError, ConsultResult};

/// Public STUN servers used when nothing else is configured
pub const DEFAULT_ICE_SERVERS: &[&str] = &["stun:stun.l.google.com:19302", "stun:stun1.l.google.com:19302"];

/// Which local tracks to capture
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MediaConstraints {
    pub audio: bool,
    pub video: bool,
}

impl Default for MediaConstraints {
    fn default() -> Self {
        Self { audio: true, video: true }
    }
}

/// Servers handed to the transport primitive for candidate gathering
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct IceConfig {
    pub servers: Vec<String>,
}

/// Settings of one consultation session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsultConfig {
    /// STUN/TURN server URLs
    pub ice_servers: Vec<String>,

    /// Capture constraints
    pub media: MediaConstraints,

    /// Remote candidates kept while no remote description is applied.
    ///
    /// When the buffer is full the oldest candidate is discarded.
    pub candidate_buffer_limit: usize,

    /// Upper bound on the time from starting negotiation to media flowing.
    ///
    /// Expiry fails the session with `negotiation-timeout`.
    #[serde(with = "duration_secs")]
    pub negotiation_timeout: Duration,

    /// Time alone in the session before the participant is told the other
    /// side has not arrived yet. Never fails the session.
    #[serde(with = "duration_secs")]
    pub peer_wait_notice: Duration,

    /// Rejoin attempts after the signaling channel drops
    pub channel_rejoin_attempts: u32,
}

impl Default for ConsultConfig {
    fn default() -> Self {
        Self {
            ice_servers: DEFAULT_ICE_SERVERS.iter().map(|s| s.to_string()).collect(),
            media: MediaConstraints::default(),
            candidate_buffer_limit: 50,
            negotiation_timeout: Duration::from_secs(30),
            peer_wait_notice: Duration::from_secs(60),
            channel_rejoin_attempts: 1,
        }
    }
}

impl ConsultConfig {
    /// Load and validate a TOML configuration file
    pub fn load(path: impl AsRef<Path>) -> ConsultResult<Self> {
        let config: Self = load_toml(path)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse and validate a TOML document
    pub fn from_toml(raw: &str) -> ConsultResult<Self> {
        let config: Self = from_toml_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn with_ice_servers(mut self, servers: Vec<String>) -> Self {
        self.ice_servers = servers;
        self
    }

    pub fn with_media(mut self, audio: bool, video: bool) -> Self {
        self.media = MediaConstraints { audio, video };
        self
    }

    pub fn with_candidate_buffer_limit(mut self, limit: usize) -> Self {
        self.candidate_buffer_limit = limit;
        self
    }

    pub fn with_negotiation_timeout(mut self, timeout: Duration) -> Self {
        self.negotiation_timeout = timeout;
        self
    }

    pub fn with_peer_wait_notice(mut self, notice: Duration) -> Self {
        self.peer_wait_notice = notice;
        self
    }

    pub fn with_channel_rejoin_attempts(mut self, attempts: u32) -> Self {
        self.channel_rejoin_attempts = attempts;
        self
    }

    pub fn ice_config(&self) -> IceConfig {
        IceConfig {
            servers: self.ice_servers.clone(),
        }
    }

    /// Reject settings the session cannot run with
    pub fn validate(&self) -> ConsultResult<()> {
        if self.candidate_buffer_limit == 0 {
            return Err(ConsultError::config("candidate_buffer_limit must be at least 1"));
        }
        if self.negotiation_timeout.is_zero() {
            return Err(ConsultError::config("negotiation_timeout must be positive"));
        }
        if self.peer_wait_notice.is_zero() {
            return Err(ConsultError::config("peer_wait_notice must be positive"));
        }
        if !self.media.audio && !self.media.video {
            return Err(ConsultError::config("at least one of audio or video must be captured"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn defaults() {
        let config = ConsultConfig::default();
        assert_eq!(config.ice_servers.len(), 2);
        assert_eq!(config.candidate_buffer_limit, 50);
        assert_eq!(config.negotiation_timeout, Duration::from_secs(30));
        assert_eq!(config.peer_wait_notice, Duration::from_secs(60));
        assert_eq!(config.channel_rejoin_attempts, 1);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn empty_document_is_default() {
        assert_eq!(ConsultConfig::from_toml("").unwrap(), ConsultConfig::default());
    }

    #[test]
    fn partial_document_overrides() {
        let config = ConsultConfig::from_toml(
            "negotiation_timeout = 10\ncandidate_buffer_limit = 5\n[media]\nvideo = false\n",
        )
        .unwrap();
        assert_eq!(config.negotiation_timeout, Duration::from_secs(10));
        assert_eq!(config.candidate_buffer_limit, 5);
        assert_eq!(config.media, MediaConstraints { audio: true, video: false });
    }

    #[test]
    fn zero_limits_are_rejected() {
        let err = ConsultConfig::default().with_candidate_buffer_limit(0).validate().unwrap_err();
        assert!(matches!(err, ConsultError::Configuration { .. }));
        assert!(ConsultConfig::from_toml("negotiation_timeout = 0").is_err());
        assert!(ConsultConfig::default().with_media(false, false).validate().is_err());
    }

    #[test]
    fn malformed_document_is_infra_error() {
        let err = ConsultConfig::from_toml("negotiation_timeout = \"soon\"").unwrap_err();
        assert!(matches!(err, ConsultError::Infra(_)));
    }
}
