use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::debug;

use crate::config::MediaConstraints;
use crate::error::CaptureError;
use crate::media::{LocalMedia, MediaDevices, MediaTrack, TrackKind};

/// What the next capture request yields
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquireOutcome {
    Grant,
    Deny,
    Unavailable,
}

#[derive(Debug)]
struct DevicesInner {
    outcome: Mutex<AcquireOutcome>,
    delay: Mutex<Option<Duration>>,
    acquired: Mutex<Vec<Arc<LoopbackMedia>>>,
    next_track: AtomicUsize,
}

/// Capture devices that hand out synthetic tracks
#[derive(Debug, Clone)]
pub struct LoopbackMediaDevices {
    inner: Arc<DevicesInner>,
}

impl Default for LoopbackMediaDevices {
    fn default() -> Self {
        Self::new()
    }
}

impl LoopbackMediaDevices {
    pub fn new() -> Self {
        Self::with_outcome(AcquireOutcome::Grant)
    }

    pub fn with_outcome(outcome: AcquireOutcome) -> Self {
        Self {
            inner: Arc::new(DevicesInner {
                outcome: Mutex::new(outcome),
                delay: Mutex::new(None),
                acquired: Mutex::new(Vec::new()),
                next_track: AtomicUsize::new(1),
            }),
        }
    }

    /// Refuse capture as if the participant denied permission
    pub fn denying() -> Self {
        Self::with_outcome(AcquireOutcome::Deny)
    }

    pub fn set_outcome(&self, outcome: AcquireOutcome) {
        *self.inner.outcome.lock() = outcome;
    }

    /// Delay every capture, like a permission prompt would
    pub fn set_delay(&self, delay: Duration) {
        *self.inner.delay.lock() = Some(delay);
    }

    /// Every media object handed out so far
    pub fn acquired(&self) -> Vec<Arc<LoopbackMedia>> {
        self.inner.acquired.lock().clone()
    }
}

#[async_trait]
impl MediaDevices for LoopbackMediaDevices {
    async fn acquire(&self, constraints: &MediaConstraints) -> Result<Arc<dyn LocalMedia>, CaptureError> {
        let delay = *self.inner.delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let outcome = *self.inner.outcome.lock();
        match outcome {
            AcquireOutcome::Deny => return Err(CaptureError::denied("permission dismissed")),
            AcquireOutcome::Unavailable => return Err(CaptureError::unavailable("no capture device")),
            AcquireOutcome::Grant => {}
        }

        let mut tracks = Vec::new();
        for (wanted, kind) in [(constraints.audio, TrackKind::Audio), (constraints.video, TrackKind::Video)] {
            if wanted {
                let n = self.inner.next_track.fetch_add(1, Ordering::SeqCst);
                tracks.push(MediaTrack {
                    id: format!("{}-{}", kind, n),
                    kind,
                    enabled: true,
                });
            }
        }
        if tracks.is_empty() {
            return Err(CaptureError::unavailable("no tracks requested"));
        }

        let media = Arc::new(LoopbackMedia {
            tracks: Mutex::new(tracks),
            stop_count: AtomicUsize::new(0),
        });
        self.inner.acquired.lock().push(Arc::clone(&media));
        debug!("Loopback capture granted ({} tracks)", media.tracks().len());
        Ok(media)
    }
}

/// Synthetic captured media
#[derive(Debug)]
pub struct LoopbackMedia {
    tracks: Mutex<Vec<MediaTrack>>,
    stop_count: AtomicUsize,
}

impl LoopbackMedia {
    /// How often `stop` was called
    pub fn stop_count(&self) -> usize {
        self.stop_count.load(Ordering::SeqCst)
    }

    pub fn is_stopped(&self) -> bool {
        self.stop_count() > 0
    }
}

impl LocalMedia for LoopbackMedia {
    fn tracks(&self) -> Vec<MediaTrack> {
        self.tracks.lock().clone()
    }

    fn set_enabled(&self, kind: TrackKind, enabled: bool) -> bool {
        let mut found = false;
        for track in self.tracks.lock().iter_mut().filter(|t| t.kind == kind) {
            track.enabled = enabled;
            found = true;
        }
        found
    }

    fn stop(&self) {
        self.stop_count.fetch_add(1, Ordering::SeqCst);
        for track in self.tracks.lock().iter_mut() {
            track.enabled = false;
        }
    }
}
