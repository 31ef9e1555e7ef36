//! Session driver.
//!
//! One task per session owns the [`SessionState`], the media handle, the live
//! transport and the channel handle. It multiplexes controller commands,
//! results posted back by spawned primitive calls and timers, and channel
//! events, and handles them strictly one at a time: every input is turned
//! into an [`EventType`], folded through the reducer, and the resulting
//! effects are executed before the next input is taken.

mod executor;
mod worker;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use teleconsult_signaling_core::{
    ChannelEvent, ChannelEvents, ChannelHandle, NegotiationMessage, Participant, SessionId, SignalEnvelope,
    SignalingTransport, UserId,
};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::ConsultConfig;
use crate::error::{CaptureError, ConsultError, ConsultResult};
use crate::lifecycle::SessionLifecycleRecorder;
use crate::media::{LocalMedia, MediaDevices, MediaHandle, TrackKind};
use crate::state_machine::{reduce, SessionState};
use crate::state_table::{EventType, StateTable, SESSION_TABLE};
use crate::status::{ConnectionStatus, SessionSnapshot};
use crate::transport::{PeerTransport, TransportFactory};
use crate::types::CallState;

use worker::TransportOp;

/// Primitives a session runs against
#[derive(Clone)]
pub struct NegotiatorDeps {
    pub signaling: Arc<dyn SignalingTransport>,
    pub media: Arc<dyn MediaDevices>,
    pub transports: Arc<dyn TransportFactory>,
    pub recorder: Arc<dyn SessionLifecycleRecorder>,
}

/// Input posted back into the driver by spawned work
pub(crate) enum DriverEvent {
    Session(EventType),
    Media(Result<Arc<dyn LocalMedia>, CaptureError>),
}

/// Requests from the controller
pub(crate) enum Command {
    Toggle {
        kind: TrackKind,
        reply: oneshot::Sender<ConsultResult<bool>>,
    },
    Hangup {
        reply: oneshot::Sender<()>,
    },
}

/// Queue into the driver, closed for good once the session is torn down
#[derive(Clone)]
pub(crate) struct EventPoster {
    tx: mpsc::UnboundedSender<DriverEvent>,
    active: Arc<AtomicBool>,
}

impl EventPoster {
    /// Post an event; hands it back when the session is no longer active
    pub(crate) fn post(&self, event: DriverEvent) -> Result<(), DriverEvent> {
        if !self.active.load(Ordering::SeqCst) {
            return Err(event);
        }
        self.tx.send(event).map_err(|e| e.0)
    }

    pub(crate) fn session(&self, event: EventType) -> bool {
        self.post(DriverEvent::Session(event)).is_ok()
    }

    /// Hand a capture result to the driver. Tracks nobody will own are stopped.
    pub(crate) fn media(&self, result: Result<Arc<dyn LocalMedia>, CaptureError>) -> bool {
        match self.post(DriverEvent::Media(result)) {
            Ok(()) => true,
            Err(DriverEvent::Media(Ok(media))) => {
                media.stop();
                false
            }
            Err(_) => false,
        }
    }

    fn deactivate(&self) {
        self.active.store(false, Ordering::SeqCst);
    }
}

/// Empty the driver queue, stopping captured media nobody will own
fn drain_events(events: &mut mpsc::UnboundedReceiver<DriverEvent>) -> usize {
    let mut dropped = 0usize;
    while let Ok(event) = events.try_recv() {
        if let DriverEvent::Media(Ok(media)) = event {
            media.stop();
        }
        dropped += 1;
    }
    dropped
}

struct TransportSlot {
    generation: u64,
    transport: Arc<dyn PeerTransport>,
    ops: mpsc::UnboundedSender<TransportOp>,
}

/// Controller side of a running session driver
pub(crate) struct NegotiatorHandle {
    pub(crate) commands: mpsc::Sender<Command>,
    pub(crate) status: watch::Receiver<ConnectionStatus>,
    pub(crate) snapshot: watch::Receiver<SessionSnapshot>,
    pub(crate) task: JoinHandle<()>,
}

enum Input {
    Command(Option<Command>),
    Driver(DriverEvent),
    Channel(Option<ChannelEvent>),
}

/// Drives one consultation session
pub struct SessionNegotiator {
    session: SessionState,
    table: Arc<StateTable>,
    config: ConsultConfig,
    deps: NegotiatorDeps,
    channel: Option<Box<dyn ChannelHandle>>,
    channel_events: Option<ChannelEvents>,
    media: Option<MediaHandle>,
    transport: Option<TransportSlot>,
    poster: EventPoster,
    events: mpsc::UnboundedReceiver<DriverEvent>,
    commands: mpsc::Receiver<Command>,
    status: watch::Sender<ConnectionStatus>,
    snapshot: watch::Sender<SessionSnapshot>,
    negotiation_timer: Option<JoinHandle<()>>,
    peer_wait_timer: Option<JoinHandle<()>>,
}

impl SessionNegotiator {
    /// Start the driver for a session whose channel is already joined
    pub(crate) fn spawn(
        session_id: SessionId,
        local: Participant,
        counterpart: Option<UserId>,
        mut channel: Box<dyn ChannelHandle>,
        config: ConsultConfig,
        deps: NegotiatorDeps,
    ) -> NegotiatorHandle {
        let mut session = SessionState::new(session_id, local, config.candidate_buffer_limit);
        session.counterpart = counterpart;
        let (tx, events) = mpsc::unbounded_channel();
        let (command_tx, commands) = mpsc::channel(16);
        let (status, status_rx) = watch::channel(ConnectionStatus::from_session(&session));
        let (snapshot, snapshot_rx) = watch::channel(SessionSnapshot::new(&session));

        let negotiator = Self {
            session,
            table: Arc::clone(&SESSION_TABLE),
            config,
            deps,
            channel_events: channel.take_events(),
            channel: Some(channel),
            media: None,
            transport: None,
            poster: EventPoster {
                tx,
                active: Arc::new(AtomicBool::new(true)),
            },
            events,
            commands,
            status,
            snapshot,
            negotiation_timer: None,
            peer_wait_timer: None,
        };

        NegotiatorHandle {
            commands: command_tx,
            status: status_rx,
            snapshot: snapshot_rx,
            task: tokio::spawn(negotiator.run()),
        }
    }

    async fn run(mut self) {
        info!("Session {} driver started for {}", self.session.session_id, self.session.local);
        self.dispatch(EventType::Activate).await;
        self.dispatch(EventType::ChannelJoined).await;

        while !self.session.torn_down {
            let input = tokio::select! {
                biased;
                command = self.commands.recv() => Input::Command(command),
                Some(event) = self.events.recv() => Input::Driver(event),
                event = next_channel_event(&mut self.channel_events) => Input::Channel(event),
            };

            match input {
                Input::Command(Some(command)) => self.handle_command(command).await,
                Input::Command(None) => {
                    debug!("Session {} controller dropped", self.session.session_id);
                    self.dispatch(EventType::Hangup).await;
                }
                Input::Driver(event) => self.handle_driver_event(event).await,
                Input::Channel(Some(event)) => self.handle_channel_event(event).await,
                Input::Channel(None) => self.handle_disconnect("event stream closed").await,
            }
        }

        // Close before the last drain so a post racing the flag either lands
        // in the drain or is handed back to its sender
        self.poster.deactivate();
        self.events.close();
        self.clear_pending_events();
        info!("Session {} driver stopped in {}", self.session.session_id, self.session.state);
    }

    /// Fold one event through the reducer and run its effects
    async fn dispatch(&mut self, event: EventType) {
        let (next, effects) = reduce(&self.table, self.session.clone(), event);
        self.session = next;
        for effect in effects {
            self.execute(effect).await;
        }
        if self.session.state == CallState::Connected {
            if let Some(media) = self.media.as_mut() {
                media.attach_remote();
            }
        }
        self.publish();
    }

    async fn handle_command(&mut self, command: Command) {
        match command {
            Command::Toggle { kind, reply } => {
                let result = match self.media.as_mut() {
                    Some(media) => media.toggle(kind),
                    None => Err(ConsultError::NoLocalMedia),
                };
                if let Ok(enabled) = &result {
                    info!("Session {} {} enabled: {}", self.session.session_id, kind, enabled);
                }
                self.publish();
                let _ = reply.send(result);
            }
            Command::Hangup { reply } => {
                self.dispatch(EventType::Hangup).await;
                let _ = reply.send(());
            }
        }
    }

    async fn handle_driver_event(&mut self, event: DriverEvent) {
        match event {
            DriverEvent::Session(event) => self.dispatch(event).await,
            DriverEvent::Media(Ok(local)) => {
                self.media = Some(MediaHandle::new(local));
                self.dispatch(EventType::MediaAcquired).await;
            }
            DriverEvent::Media(Err(e)) => {
                warn!("Session {} capture failed: {}", self.session.session_id, e);
                let event = match e {
                    CaptureError::PermissionDenied { .. } => EventType::MediaDenied,
                    CaptureError::DeviceUnavailable { .. } => EventType::MediaUnavailable,
                };
                self.dispatch(event).await;
            }
        }
    }

    async fn handle_channel_event(&mut self, event: ChannelEvent) {
        match event {
            ChannelEvent::Subscribed => debug!("Session {} subscribed", self.session.session_id),
            ChannelEvent::PresenceChanged { present } => {
                debug!("Session {} presence: {} present", self.session.session_id, present.len());
                self.dispatch(EventType::PresenceChanged { present }).await;
            }
            ChannelEvent::Message(envelope) => self.handle_message(envelope).await,
            ChannelEvent::Disconnected { reason } => self.handle_disconnect(&reason).await,
        }
    }

    async fn handle_message(&mut self, envelope: SignalEnvelope) {
        if !self.session.is_counterpart(&envelope.from.user_id) {
            if envelope.from.user_id != self.session.local.user_id {
                debug!(
                    "Session {} ignoring {} from non-participant {}",
                    self.session.session_id,
                    envelope.message.kind(),
                    envelope.from.user_id
                );
            }
            return;
        }
        debug!(
            "Session {} received {} from {}",
            self.session.session_id,
            envelope.message.kind(),
            envelope.from.user_id
        );
        let event = match envelope.message {
            NegotiationMessage::Offer { description } => EventType::OfferReceived {
                from: envelope.from,
                description,
            },
            NegotiationMessage::Answer { description } => EventType::AnswerReceived { description },
            NegotiationMessage::Candidate { candidate } => EventType::CandidateReceived { candidate },
        };
        self.dispatch(event).await;
    }

    /// Rejoin after the channel dropped; fail the session when that is not possible
    async fn handle_disconnect(&mut self, reason: &str) {
        warn!("Session {} channel disconnected: {}", self.session.session_id, reason);
        self.channel = None;
        self.channel_events = None;

        for attempt in 1..=self.config.channel_rejoin_attempts {
            match self
                .deps
                .signaling
                .join(&self.session.session_id, &self.session.local)
                .await
            {
                Ok(mut handle) => {
                    info!("Session {} rejoined channel (attempt {})", self.session.session_id, attempt);
                    self.channel_events = handle.take_events();
                    self.channel = Some(handle);
                    if self.session.state.is_past_capturing() {
                        self.publish_presence().await;
                    }
                    return;
                }
                Err(e) => warn!("Session {} rejoin attempt {} failed: {}", self.session.session_id, attempt, e),
            }
        }

        self.dispatch(EventType::ChannelLost).await;
    }

    fn publish(&self) {
        let status = ConnectionStatus::from_session(&self.session);
        self.status.send_if_modified(|current| {
            if *current == status {
                return false;
            }
            info!("Session {} status: {}", self.session.session_id, status);
            *current = status.clone();
            true
        });

        let mut snapshot = SessionSnapshot::new(&self.session);
        if let Some(media) = &self.media {
            snapshot.audio_enabled = media.is_enabled(TrackKind::Audio);
            snapshot.video_enabled = media.is_enabled(TrackKind::Video);
            snapshot.remote_media_attached = media.remote_attached();
        }
        self.snapshot.send_if_modified(|current| {
            if *current == snapshot {
                return false;
            }
            *current = snapshot;
            true
        });
    }

    fn cancel_timers(&mut self) {
        for timer in [self.negotiation_timer.take(), self.peer_wait_timer.take()].into_iter().flatten() {
            timer.abort();
        }
    }
}

impl Drop for SessionNegotiator {
    fn drop(&mut self) {
        self.poster.deactivate();
        self.cancel_timers();
        if let Some(slot) = self.transport.take() {
            slot.transport.close();
        }
    }
}

async fn next_channel_event(events: &mut Option<ChannelEvents>) -> Option<ChannelEvent> {
    match events {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MediaConstraints;
    use crate::loopback::LoopbackMediaDevices;

    fn poster() -> (EventPoster, mpsc::UnboundedReceiver<DriverEvent>) {
        let (tx, events) = mpsc::unbounded_channel();
        let poster = EventPoster {
            tx,
            active: Arc::new(AtomicBool::new(true)),
        };
        (poster, events)
    }

    #[tokio::test]
    async fn capture_finishing_during_shutdown_is_stopped() {
        let devices = LoopbackMediaDevices::new();
        let constraints = MediaConstraints::default();
        let (poster, mut events) = poster();

        // Queued just before the driver shuts down
        assert!(poster.media(devices.acquire(&constraints).await));
        // Passes the active check, but the queue is already closed
        events.close();
        assert!(!poster.media(devices.acquire(&constraints).await));
        poster.deactivate();
        assert!(!poster.media(devices.acquire(&constraints).await));

        assert_eq!(drain_events(&mut events), 1);
        let acquired = devices.acquired();
        assert_eq!(acquired.len(), 3);
        assert!(acquired.iter().all(|m| m.stop_count() == 1));
    }

    #[tokio::test]
    async fn rejected_capture_errors_are_not_queued() {
        let (poster, mut events) = poster();
        poster.deactivate();
        assert!(!poster.media(Err(CaptureError::denied("dismissed"))));
        assert!(!poster.session(EventType::Hangup));
        assert_eq!(drain_events(&mut events), 0);
    }
}
