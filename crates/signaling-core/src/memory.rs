//! In-process signaling hub.
//!
//! Backs tests and the simulator. Every topic keeps its subscribers and
//! their tracked presence; messages are serialised to JSON and decoded again
//! per recipient, as they would be on the wire. A [`DeliveryPolicy`] decides
//! per recipient whether a message is delivered, dropped, duplicated or held
//! back until the next delivery (reordering), which makes the unreliable
//! parts of a hosted service reproducible in tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::channel::{ChannelEvent, ChannelEvents, ChannelHandle, SignalingTransport};
use crate::error::{SignalingError, SignalingResult};
use crate::types::{NegotiationMessage, Participant, SessionId, SignalEnvelope, UserId};

/// What happens to one message for one recipient
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryDecision {
    Deliver,
    Drop,
    Duplicate,
    /// Hold back and deliver right after the next message to the same recipient
    Defer,
}

/// Facts a policy can base its decision on
#[derive(Debug)]
pub struct DeliveryContext<'a> {
    pub topic: &'a str,
    /// Hub-wide sequence number of the published message
    pub seq: u64,
    pub from: &'a UserId,
    pub to: &'a UserId,
    pub message: &'a NegotiationMessage,
}

/// Decides the fate of every message per recipient
pub trait DeliveryPolicy: Send + Sync {
    fn decide(&self, ctx: &DeliveryContext<'_>) -> DeliveryDecision;
}

/// Policy backed by a closure, see [`policy_fn`]
pub struct PolicyFn<F>(F);

impl<F> DeliveryPolicy for PolicyFn<F>
where
    F: Fn(&DeliveryContext<'_>) -> DeliveryDecision + Send + Sync,
{
    fn decide(&self, ctx: &DeliveryContext<'_>) -> DeliveryDecision {
        (self.0)(ctx)
    }
}

/// Build a delivery policy from a closure
pub fn policy_fn<F>(f: F) -> PolicyFn<F>
where
    F: Fn(&DeliveryContext<'_>) -> DeliveryDecision + Send + Sync,
{
    PolicyFn(f)
}

/// Delivers everything exactly once
#[derive(Debug, Default, Clone, Copy)]
pub struct ReliableDelivery;

impl DeliveryPolicy for ReliableDelivery {
    fn decide(&self, _ctx: &DeliveryContext<'_>) -> DeliveryDecision {
        DeliveryDecision::Deliver
    }
}

/// A message as it was published, before any delivery decision
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedMessage {
    pub topic: String,
    pub from: UserId,
    pub message: NegotiationMessage,
}

struct Subscriber {
    id: u64,
    user: UserId,
    tx: mpsc::UnboundedSender<ChannelEvent>,
    presence: Option<Participant>,
}

#[derive(Default)]
struct TopicState {
    subscribers: Vec<Subscriber>,
    deferred: Vec<(u64, SignalEnvelope)>,
}

impl TopicState {
    fn present(&self) -> Vec<Participant> {
        self.subscribers.iter().filter_map(|s| s.presence.clone()).collect()
    }

    fn broadcast_presence(&self) {
        let present = self.present();
        for sub in &self.subscribers {
            let _ = sub.tx.send(ChannelEvent::PresenceChanged {
                present: present.clone(),
            });
        }
    }

    fn contains(&self, id: u64) -> bool {
        self.subscribers.iter().any(|s| s.id == id)
    }

    fn remove(&mut self, id: u64) -> Option<Subscriber> {
        let idx = self.subscribers.iter().position(|s| s.id == id)?;
        self.deferred.retain(|(to, _)| *to != id);
        Some(self.subscribers.remove(idx))
    }
}

struct HubInner {
    topics: Mutex<HashMap<String, TopicState>>,
    policy: Mutex<Arc<dyn DeliveryPolicy>>,
    failing_joins: AtomicUsize,
    next_subscriber: AtomicU64,
    next_seq: AtomicU64,
    published: Mutex<Vec<PublishedMessage>>,
}

/// Shared in-memory pub/sub service with presence tracking
#[derive(Clone)]
pub struct InMemoryHub {
    inner: Arc<HubInner>,
}

impl Default for InMemoryHub {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryHub {
    pub fn new() -> Self {
        Self::with_policy(ReliableDelivery)
    }

    pub fn with_policy(policy: impl DeliveryPolicy + 'static) -> Self {
        Self {
            inner: Arc::new(HubInner {
                topics: Mutex::new(HashMap::new()),
                policy: Mutex::new(Arc::new(policy)),
                failing_joins: AtomicUsize::new(0),
                next_subscriber: AtomicU64::new(1),
                next_seq: AtomicU64::new(1),
                published: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Replace the delivery policy for subsequent messages
    pub fn set_policy(&self, policy: impl DeliveryPolicy + 'static) {
        *self.inner.policy.lock() = Arc::new(policy);
    }

    /// Reject the next `n` join attempts
    pub fn fail_next_joins(&self, n: usize) {
        self.inner.failing_joins.store(n, Ordering::SeqCst);
    }

    /// Simulate a dropped connection for every subscription of `user`.
    ///
    /// The affected subscribers receive `Disconnected`; the others observe
    /// the presence leave. Returns how many subscriptions were dropped.
    pub fn disconnect(&self, session_id: &SessionId, user: &UserId) -> usize {
        let topic = session_id.topic();
        let mut topics = self.inner.topics.lock();
        let Some(state) = topics.get_mut(&topic) else {
            return 0;
        };

        let ids: Vec<u64> = state
            .subscribers
            .iter()
            .filter(|s| &s.user == user)
            .map(|s| s.id)
            .collect();
        for id in &ids {
            if let Some(sub) = state.remove(*id) {
                let _ = sub.tx.send(ChannelEvent::Disconnected {
                    reason: "connection dropped".to_string(),
                });
            }
        }
        if !ids.is_empty() {
            info!("Disconnected {} subscription(s) of {} from {}", ids.len(), user, topic);
            state.broadcast_presence();
        }
        ids.len()
    }

    /// Participants currently tracked on the session topic
    pub fn present(&self, session_id: &SessionId) -> Vec<Participant> {
        self.inner
            .topics
            .lock()
            .get(&session_id.topic())
            .map(TopicState::present)
            .unwrap_or_default()
    }

    /// Number of live subscriptions on the session topic
    pub fn subscriber_count(&self, session_id: &SessionId) -> usize {
        self.inner
            .topics
            .lock()
            .get(&session_id.topic())
            .map(|t| t.subscribers.len())
            .unwrap_or(0)
    }

    /// Every message published on the session topic, in publish order
    pub fn published(&self, session_id: &SessionId) -> Vec<PublishedMessage> {
        let topic = session_id.topic();
        self.inner
            .published
            .lock()
            .iter()
            .filter(|m| m.topic == topic)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl SignalingTransport for InMemoryHub {
    async fn join(
        &self,
        session_id: &SessionId,
        local: &Participant,
    ) -> SignalingResult<Box<dyn ChannelHandle>> {
        let topic = session_id.topic();

        let rejected = self
            .inner
            .failing_joins
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if rejected {
            warn!("Rejecting join of {} to {}", local.user_id, topic);
            return Err(SignalingError::join_rejected(topic, "service unavailable"));
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let id = self.inner.next_subscriber.fetch_add(1, Ordering::SeqCst);
        {
            let mut topics = self.inner.topics.lock();
            let state = topics.entry(topic.clone()).or_default();
            let _ = tx.send(ChannelEvent::Subscribed);
            let _ = tx.send(ChannelEvent::PresenceChanged {
                present: state.present(),
            });
            state.subscribers.push(Subscriber {
                id,
                user: local.user_id.clone(),
                tx,
                presence: None,
            });
        }
        debug!("{} joined {} as subscriber {}", local.user_id, topic, id);

        Ok(Box::new(MemoryChannel {
            hub: Arc::clone(&self.inner),
            topic,
            subscriber: id,
            local: local.clone(),
            events: Some(rx),
        }))
    }
}

/// Handle returned by [`InMemoryHub::join`]
pub struct MemoryChannel {
    hub: Arc<HubInner>,
    topic: String,
    subscriber: u64,
    local: Participant,
    events: Option<ChannelEvents>,
}

#[async_trait]
impl ChannelHandle for MemoryChannel {
    fn topic(&self) -> &str {
        &self.topic
    }

    fn take_events(&mut self) -> Option<ChannelEvents> {
        self.events.take()
    }

    async fn publish_presence(&self, participant: &Participant) -> SignalingResult<()> {
        let mut topics = self.hub.topics.lock();
        let state = topics
            .get_mut(&self.topic)
            .filter(|t| t.contains(self.subscriber))
            .ok_or_else(|| SignalingError::not_joined(&self.topic))?;

        if let Some(sub) = state.subscribers.iter_mut().find(|s| s.id == self.subscriber) {
            sub.presence = Some(participant.present());
        }
        state.broadcast_presence();
        Ok(())
    }

    async fn send(&self, message: NegotiationMessage) -> SignalingResult<()> {
        let envelope = SignalEnvelope {
            from: self.local.present(),
            message,
        };
        let wire = envelope.encode()?;
        let seq = self.hub.next_seq.fetch_add(1, Ordering::SeqCst);
        let policy = Arc::clone(&*self.hub.policy.lock());

        let mut topics = self.hub.topics.lock();
        let state = topics
            .get_mut(&self.topic)
            .filter(|t| t.contains(self.subscriber))
            .ok_or_else(|| SignalingError::not_joined(&self.topic))?;

        self.hub.published.lock().push(PublishedMessage {
            topic: self.topic.clone(),
            from: self.local.user_id.clone(),
            message: envelope.message.clone(),
        });

        let TopicState { subscribers, deferred } = state;
        for sub in subscribers.iter().filter(|s| s.id != self.subscriber) {
            let decision = policy.decide(&DeliveryContext {
                topic: &self.topic,
                seq,
                from: &self.local.user_id,
                to: &sub.user,
                message: &envelope.message,
            });
            if decision != DeliveryDecision::Deliver {
                debug!(
                    "Delivery of {} #{} to {} on {}: {:?}",
                    envelope.message.kind(),
                    seq,
                    sub.user,
                    self.topic,
                    decision
                );
            }

            let copies = match decision {
                DeliveryDecision::Deliver => 1,
                DeliveryDecision::Duplicate => 2,
                DeliveryDecision::Drop => 0,
                DeliveryDecision::Defer => {
                    deferred.push((sub.id, SignalEnvelope::decode(&wire)?));
                    0
                }
            };
            for _ in 0..copies {
                let _ = sub.tx.send(ChannelEvent::Message(SignalEnvelope::decode(&wire)?));
            }
            if copies > 0 {
                let mut held = Vec::new();
                deferred.retain(|(to, env)| {
                    if *to == sub.id {
                        held.push(env.clone());
                        false
                    } else {
                        true
                    }
                });
                for env in held {
                    let _ = sub.tx.send(ChannelEvent::Message(env));
                }
            }
        }
        Ok(())
    }

    async fn leave(&self) -> SignalingResult<()> {
        let mut topics = self.hub.topics.lock();
        if let Some(state) = topics.get_mut(&self.topic) {
            if let Some(sub) = state.remove(self.subscriber) {
                debug!("{} left {}", sub.user, self.topic);
                if sub.presence.is_some() {
                    state.broadcast_presence();
                }
            }
        }
        Ok(())
    }
}
