//! Consultation controller.
//!
//! Entry point for the surrounding application: validates the appointment,
//! records the start of the consultation, joins the session channel and hands
//! the session to its driver. The returned [`ConsultationController`] carries
//! the user controls (mute, camera, hang up) and the observable status.
//! Dropping it tears the session down like a hang up.

use std::sync::Arc;

use chrono::Utc;
use teleconsult_signaling_core::{Participant, SessionId, SignalingTransport, UserId};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::config::ConsultConfig;
use crate::error::{ConsultError, ConsultResult, StorageError};
use crate::lifecycle::{SessionLifecycleRecorder, StoreRecorder};
use crate::media::{MediaDevices, TrackKind};
use crate::negotiator::{Command, NegotiatorDeps, SessionNegotiator};
use crate::status::{ConnectionStatus, SessionSnapshot};
use crate::store::{SessionRecord, SessionStore};
use crate::transport::TransportFactory;

/// Who wants to join which consultation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsultationRequest {
    /// Appointment id as it came from the route; may be missing or blank
    pub session_id: Option<String>,
    pub user_id: UserId,
}

impl ConsultationRequest {
    pub fn new(session_id: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            session_id: Some(session_id.into()),
            user_id: UserId::new(user_id),
        }
    }

    pub fn without_session(user_id: impl Into<String>) -> Self {
        Self {
            session_id: None,
            user_id: UserId::new(user_id),
        }
    }
}

/// Everything a consultation needs from its environment
#[derive(Clone)]
pub struct ConsultDeps {
    pub store: Arc<dyn SessionStore>,
    pub recorder: Arc<dyn SessionLifecycleRecorder>,
    pub signaling: Arc<dyn SignalingTransport>,
    pub media: Arc<dyn MediaDevices>,
    pub transports: Arc<dyn TransportFactory>,
}

impl ConsultDeps {
    /// Dependencies recording lifecycle changes through `store`
    pub fn new(
        store: Arc<dyn SessionStore>,
        signaling: Arc<dyn SignalingTransport>,
        media: Arc<dyn MediaDevices>,
        transports: Arc<dyn TransportFactory>,
    ) -> Self {
        Self {
            recorder: Arc::new(StoreRecorder::new(Arc::clone(&store))),
            store,
            signaling,
            media,
            transports,
        }
    }

    pub fn with_recorder(mut self, recorder: Arc<dyn SessionLifecycleRecorder>) -> Self {
        self.recorder = recorder;
        self
    }
}

/// Handle on one active consultation
pub struct ConsultationController {
    session_id: SessionId,
    local: Participant,
    record: SessionRecord,
    commands: mpsc::Sender<Command>,
    status: watch::Receiver<ConnectionStatus>,
    snapshot: watch::Receiver<SessionSnapshot>,
    driver: Option<JoinHandle<()>>,
}

impl ConsultationController {
    /// Activate a consultation for `request.user_id`
    pub async fn activate(
        request: ConsultationRequest,
        deps: ConsultDeps,
        config: ConsultConfig,
    ) -> ConsultResult<Self> {
        config.validate()?;

        let raw_id = request
            .session_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .ok_or(ConsultError::MissingSessionId)?;
        let session_id = SessionId::new(raw_id);

        let record = deps.store.get_session(&session_id).await.map_err(|e| match e {
            StorageError::NotFound { .. } => ConsultError::SessionNotFound {
                session_id: raw_id.to_string(),
            },
            other => ConsultError::Storage(other),
        })?;

        let role = record
            .role_of(&request.user_id)
            .ok_or_else(|| ConsultError::NotAParticipant {
                session_id: raw_id.to_string(),
                user_id: request.user_id.to_string(),
            })?;
        let local = Participant::new(request.user_id.as_str(), role);

        if let Err(e) = deps.recorder.mark_started(&session_id, Utc::now()).await {
            warn!("Session {} failed to record start: {}", session_id, e);
        }

        let channel = deps.signaling.join(&session_id, &local).await?;
        info!("Session {} activated for {}", session_id, local);

        let handle = SessionNegotiator::spawn(
            session_id.clone(),
            local.clone(),
            record.counterpart_of(&local.user_id).cloned(),
            channel,
            config,
            NegotiatorDeps {
                signaling: deps.signaling,
                media: deps.media,
                transports: deps.transports,
                recorder: deps.recorder,
            },
        );

        Ok(Self {
            session_id,
            local,
            record,
            commands: handle.commands,
            status: handle.status,
            snapshot: handle.snapshot,
            driver: Some(handle.task),
        })
    }

    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    pub fn local(&self) -> &Participant {
        &self.local
    }

    /// Appointment as read on activation
    pub fn record(&self) -> &SessionRecord {
        &self.record
    }

    /// The other participant of the appointment
    pub fn counterpart(&self) -> Option<&UserId> {
        self.record.counterpart_of(&self.local.user_id)
    }

    /// Flip the microphone. Returns whether audio is now enabled.
    pub async fn toggle_audio(&self) -> ConsultResult<bool> {
        self.toggle(TrackKind::Audio).await
    }

    /// Flip the camera. Returns whether video is now enabled.
    pub async fn toggle_video(&self) -> ConsultResult<bool> {
        self.toggle(TrackKind::Video).await
    }

    async fn toggle(&self, kind: TrackKind) -> ConsultResult<bool> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(Command::Toggle { kind, reply })
            .await
            .map_err(|_| ConsultError::NoLocalMedia)?;
        rx.await.map_err(|_| ConsultError::NoLocalMedia)?
    }

    /// End the consultation. Returns once teardown has run; hanging up an
    /// ended session is a no-op.
    pub async fn hangup(&self) -> ConsultResult<()> {
        let (reply, rx) = oneshot::channel();
        if self.commands.send(Command::Hangup { reply }).await.is_err() {
            return Ok(());
        }
        let _ = rx.await;
        Ok(())
    }

    /// Hang up and wait for the driver to finish
    pub async fn shutdown(mut self) -> ConsultResult<()> {
        self.hangup().await?;
        if let Some(driver) = self.driver.take() {
            if let Err(e) = driver.await {
                warn!("Session {} driver ended abnormally: {}", self.session_id, e);
            }
        }
        Ok(())
    }

    /// Current connection status
    pub fn status(&self) -> ConnectionStatus {
        self.status.borrow().clone()
    }

    /// Subscribe to connection status changes
    pub fn status_updates(&self) -> watch::Receiver<ConnectionStatus> {
        self.status.clone()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.snapshot.borrow().clone()
    }

    pub fn snapshots(&self) -> watch::Receiver<SessionSnapshot> {
        self.snapshot.clone()
    }

    /// Wait until a snapshot satisfies `predicate`.
    ///
    /// Fails with [`ConsultError::SessionClosed`] when the driver stops
    /// before that happens.
    pub async fn wait_for<F>(&self, predicate: F) -> ConsultResult<SessionSnapshot>
    where
        F: Fn(&SessionSnapshot) -> bool,
    {
        let mut rx = self.snapshot.clone();
        loop {
            {
                let snapshot = rx.borrow_and_update();
                if predicate(&*snapshot) {
                    return Ok(snapshot.clone());
                }
            }
            if rx.changed().await.is_err() {
                let snapshot = rx.borrow().clone();
                return if predicate(&snapshot) {
                    Ok(snapshot)
                } else {
                    Err(ConsultError::closed(self.session_id.as_str()))
                };
            }
        }
    }
}
