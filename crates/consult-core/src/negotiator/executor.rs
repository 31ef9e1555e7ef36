//! Effect execution

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use teleconsult_signaling_core::NegotiationMessage;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::worker::{self, TransportOp};
use super::{drain_events, SessionNegotiator, TransportSlot};
use crate::lifecycle::SessionOutcome;
use crate::state_machine::Effect;
use crate::state_table::EventType;

impl SessionNegotiator {
    pub(super) async fn execute(&mut self, effect: Effect) {
        debug!("Session {} executing {:?}", self.session.session_id, effect);

        match effect {
            Effect::AcquireMedia => self.acquire_media(),
            Effect::PublishPresence => self.publish_presence().await,
            Effect::SendMessage(message) => self.send_message(message).await,

            Effect::CreateTransport { generation } => self.create_transport(generation),
            Effect::AttachLocalTracks { generation } => self.attach_local_tracks(generation),
            Effect::CreateOffer { generation } => self.transport_op(generation, TransportOp::CreateOffer),
            Effect::AcceptOffer { generation, offer } => {
                self.transport_op(generation, TransportOp::AcceptOffer(offer))
            }
            Effect::ApplyAnswer { generation, answer } => {
                self.transport_op(generation, TransportOp::ApplyAnswer(answer))
            }
            Effect::AddRemoteCandidate { generation, candidate } => {
                self.transport_op(generation, TransportOp::AddCandidate(candidate))
            }
            Effect::CloseTransport => self.close_transport(),

            Effect::StartPeerWaitTimer => {
                let wait = self.config.peer_wait_notice;
                let timer = self.start_timer(wait, EventType::PeerWaitElapsed);
                if let Some(old) = self.peer_wait_timer.replace(timer) {
                    old.abort();
                }
            }
            Effect::StartNegotiationTimer => {
                let timeout = self.config.negotiation_timeout;
                let timer = self.start_timer(timeout, EventType::NegotiationTimeout);
                if let Some(old) = self.negotiation_timer.replace(timer) {
                    old.abort();
                }
            }
            Effect::CancelNegotiationTimer => {
                if let Some(timer) = self.negotiation_timer.take() {
                    timer.abort();
                }
            }

            Effect::StopLocalTracks => {
                if let Some(mut media) = self.media.take() {
                    media.release();
                    info!("Session {} local tracks stopped", self.session.session_id);
                }
            }
            Effect::ClearBuffers => self.clear_pending_events(),
            Effect::CancelTimers => self.cancel_timers(),
            Effect::RecordSessionEnd(outcome) => self.record_end(outcome).await,
            Effect::LeaveChannel => self.leave_channel().await,
        }
    }

    fn acquire_media(&self) {
        let devices = Arc::clone(&self.deps.media);
        let constraints = self.config.media;
        let poster = self.poster.clone();
        let session_id = self.session.session_id.clone();

        tokio::spawn(async move {
            let result = devices.acquire(&constraints).await;
            if !poster.media(result) {
                debug!("Session {} gone before capture finished, tracks stopped", session_id);
            }
        });
    }

    /// Drop queued results; captured media that arrives late is stopped
    pub(super) fn clear_pending_events(&mut self) {
        let dropped = drain_events(&mut self.events);
        if dropped > 0 {
            debug!("Session {} dropped {} queued events", self.session.session_id, dropped);
        }
    }

    pub(super) async fn publish_presence(&self) {
        let Some(channel) = &self.channel else {
            warn!("Session {} has no channel to publish presence on", self.session.session_id);
            return;
        };
        if let Err(e) = channel.publish_presence(&self.session.local).await {
            warn!("Session {} failed to publish presence: {}", self.session.session_id, e);
        }
    }

    async fn send_message(&self, message: NegotiationMessage) {
        let Some(channel) = &self.channel else {
            warn!("Session {} dropped {}, no channel", self.session.session_id, message.kind());
            return;
        };
        let kind = message.kind();
        match channel.send(message).await {
            Ok(()) => debug!("Session {} sent {}", self.session.session_id, kind),
            Err(e) => warn!("Session {} failed to send {}: {}", self.session.session_id, kind, e),
        }
    }

    fn create_transport(&mut self, generation: u64) {
        self.close_transport();

        let (sink, events) = mpsc::unbounded_channel();
        match self.deps.transports.create(&self.config.ice_config(), sink) {
            Ok(transport) => {
                worker::spawn_forwarder(generation, events, self.poster.clone());
                let ops = worker::spawn_worker(generation, Arc::clone(&transport), self.poster.clone());
                self.transport = Some(TransportSlot {
                    generation,
                    transport,
                    ops,
                });
                info!("Session {} created transport #{}", self.session.session_id, generation);
            }
            Err(e) => {
                warn!("Session {} failed to create transport: {}", self.session.session_id, e);
                self.poster.session(EventType::NegotiationError {
                    generation,
                    reason: e.to_string(),
                });
            }
        }
    }

    fn attach_local_tracks(&self, generation: u64) {
        let (Some(slot), Some(media)) = (self.live_slot(generation), &self.media) else {
            return;
        };
        if let Err(e) = slot.transport.attach_local_tracks(media.local()) {
            warn!("Session {} failed to attach local tracks: {}", self.session.session_id, e);
            self.poster.session(EventType::NegotiationError {
                generation,
                reason: e.to_string(),
            });
        }
    }

    fn transport_op(&self, generation: u64, op: TransportOp) {
        match self.live_slot(generation) {
            Some(slot) => {
                if slot.ops.send(op).is_err() {
                    warn!("Session {} transport #{} worker is gone", self.session.session_id, generation);
                }
            }
            None => debug!(
                "Session {} dropped {} for stale transport #{}",
                self.session.session_id,
                op.name(),
                generation
            ),
        }
    }

    fn live_slot(&self, generation: u64) -> Option<&TransportSlot> {
        self.transport.as_ref().filter(|slot| slot.generation == generation)
    }

    fn close_transport(&mut self) {
        if let Some(slot) = self.transport.take() {
            slot.transport.close();
            info!("Session {} closed transport #{}", self.session.session_id, slot.generation);
        }
    }

    fn start_timer(&self, after: Duration, event: EventType) -> JoinHandle<()> {
        let poster = self.poster.clone();
        tokio::spawn(async move {
            tokio::time::sleep(after).await;
            poster.session(event);
        })
    }

    async fn record_end(&self, outcome: SessionOutcome) {
        if let Err(e) = self
            .deps
            .recorder
            .mark_ended(&self.session.session_id, outcome, Utc::now())
            .await
        {
            warn!("Session {} failed to record end: {}", self.session.session_id, e);
        }
    }

    async fn leave_channel(&mut self) {
        self.poster.deactivate();
        self.channel_events = None;
        if let Some(channel) = self.channel.take() {
            if let Err(e) = channel.leave().await {
                warn!("Session {} failed to leave channel: {}", self.session.session_id, e);
            }
        }
    }
}
