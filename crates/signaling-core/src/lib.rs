//! Signaling channel for two-party consultation sessions.
//!
//! Both participants of a consultation subscribe to the topic
//! `consultation_<session id>`, announce themselves through presence, and
//! exchange [`NegotiationMessage`]s (offer, answer, candidates) until their
//! direct media transport is up. The channel is modelled as a capability
//! ([`SignalingTransport`] / [`ChannelHandle`]) so that the negotiation logic
//! never depends on a particular real-time service, and so that tests can
//! inject duplication, reordering and loss deterministically through
//! [`InMemoryHub`].

pub mod channel;
pub mod error;
pub mod memory;
pub mod types;

pub use channel::{ChannelEvent, ChannelEvents, ChannelHandle, SignalingTransport};
pub use error::{SignalingError, SignalingResult};
pub use memory::{
    policy_fn, DeliveryContext, DeliveryDecision, DeliveryPolicy, InMemoryHub, MemoryChannel, PolicyFn,
    PublishedMessage, ReliableDelivery,
};
pub use types::{
    DeclaredRole, IceCandidate, NegotiationMessage, Participant, PresenceStatus, SdpKind,
    SessionDescription, SessionId, SignalEnvelope, UserId,
};

/// Re-export of common types
pub mod prelude {
    pub use super::{
        ChannelEvent, ChannelHandle, DeclaredRole, IceCandidate, InMemoryHub, NegotiationMessage,
        Participant, SessionDescription, SessionId, SignalEnvelope, SignalingError,
        SignalingTransport, UserId,
    };
}
