//! Local media capture primitive.
//!
//! Capturing camera and microphone is done by the platform; the session only
//! sees it through [`MediaDevices`] and [`LocalMedia`]. The negotiator wraps
//! the captured media in a [`MediaHandle`] that it alone owns and releases on
//! teardown.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::MediaConstraints;
use crate::error::{CaptureError, ConsultError, ConsultResult};

#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackKind {
    Audio,
    Video,
}

impl fmt::Display for TrackKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Audio => write!(f, "audio"),
            Self::Video => write!(f, "video"),
        }
    }
}

/// A captured track as reported by the platform
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaTrack {
    pub id: String,
    pub kind: TrackKind,
    pub enabled: bool,
}

/// Captured local audio/video
pub trait LocalMedia: Send + Sync + fmt::Debug {
    fn tracks(&self) -> Vec<MediaTrack>;

    /// Enable or disable every track of `kind`. Returns false when there is none.
    fn set_enabled(&self, kind: TrackKind, enabled: bool) -> bool;

    /// Stop every track; the capture devices are released
    fn stop(&self);
}

/// Access to the capture devices
#[async_trait]
pub trait MediaDevices: Send + Sync {
    async fn acquire(&self, constraints: &MediaConstraints) -> Result<Arc<dyn LocalMedia>, CaptureError>;
}

/// Local media owned by one session
#[derive(Debug)]
pub struct MediaHandle {
    local: Arc<dyn LocalMedia>,
    remote_attached: bool,
    released: bool,
}

impl MediaHandle {
    pub fn new(local: Arc<dyn LocalMedia>) -> Self {
        Self {
            local,
            remote_attached: false,
            released: false,
        }
    }

    pub fn local(&self) -> &Arc<dyn LocalMedia> {
        &self.local
    }

    /// Whether any track of `kind` is enabled
    pub fn is_enabled(&self, kind: TrackKind) -> bool {
        !self.released && self.local.tracks().iter().any(|t| t.kind == kind && t.enabled)
    }

    /// Flip the enabled flag of `kind` and return the new value
    pub fn toggle(&mut self, kind: TrackKind) -> ConsultResult<bool> {
        if self.released {
            return Err(ConsultError::NoLocalMedia);
        }
        let enabled = !self.is_enabled(kind);
        if !self.local.set_enabled(kind, enabled) {
            return Err(ConsultError::NoLocalMedia);
        }
        Ok(enabled)
    }

    pub fn attach_remote(&mut self) {
        self.remote_attached = true;
    }

    pub fn remote_attached(&self) -> bool {
        self.remote_attached
    }

    /// Stop all tracks. Later calls do nothing.
    pub fn release(&mut self) {
        if !self.released {
            self.released = true;
            self.remote_attached = false;
            self.local.stop();
        }
    }

    pub fn is_released(&self) -> bool {
        self.released
    }
}

impl Drop for MediaHandle {
    fn drop(&mut self) {
        self.release();
    }
}
