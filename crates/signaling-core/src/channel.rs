//! Capability interface of the signaling channel.
//!
//! A consultation subscribes to one named topic. The channel reports who is
//! present and relays negotiation messages to every *other* subscriber.
//! Delivery is best effort: ordered per sender, not durable, and possibly
//! duplicated. A subscriber that joins late misses earlier messages.

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::SignalingResult;
use crate::types::{NegotiationMessage, Participant, SessionId, SignalEnvelope};

/// Events surfaced by a joined channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
    /// Subscription completed; always followed by a presence event
    Subscribed,
    /// The set of present participants changed (includes the local one once tracked)
    PresenceChanged { present: Vec<Participant> },
    /// A message published by another subscriber
    Message(SignalEnvelope),
    /// The underlying connection dropped; the channel does not retry
    Disconnected { reason: String },
}

/// Stream of channel events, taken once per handle
pub type ChannelEvents = mpsc::UnboundedReceiver<ChannelEvent>;

/// A joined subscription to one session topic
#[async_trait]
pub trait ChannelHandle: Send + Sync {
    /// Topic this handle is subscribed to
    fn topic(&self) -> &str;

    /// Take the event stream. Returns `None` on every call after the first.
    fn take_events(&mut self) -> Option<ChannelEvents>;

    /// Track the given participant as present on the topic
    async fn publish_presence(&self, participant: &Participant) -> SignalingResult<()>;

    /// Broadcast a negotiation message to the other subscribers
    async fn send(&self, message: NegotiationMessage) -> SignalingResult<()>;

    /// Untrack presence and unsubscribe. Leaving twice is not an error.
    async fn leave(&self) -> SignalingResult<()>;
}

/// Entry point of a real-time messaging service
#[async_trait]
pub trait SignalingTransport: Send + Sync {
    /// Subscribe to the topic of `session_id` as `local`
    async fn join(
        &self,
        session_id: &SessionId,
        local: &Participant,
    ) -> SignalingResult<Box<dyn ChannelHandle>>;
}
