//! Direct peer transport primitive.
//!
//! Mirrors the shape of a browser peer connection: creating the object and
//! attaching tracks are synchronous, description and candidate handling are
//! asynchronous, and everything the transport discovers on its own arrives
//! as [`TransportEvent`]s on the sink handed to the factory.

use std::sync::Arc;

use async_trait::async_trait;
use teleconsult_signaling_core::{IceCandidate, SessionDescription};
use tokio::sync::mpsc;

use crate::config::IceConfig;
use crate::error::TransportResult;
use crate::media::LocalMedia;

/// Events raised by a transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// A local network candidate was gathered
    LocalCandidate(IceCandidate),
    /// Remote media started flowing
    MediaFlowing,
    /// Connectivity was lost for good
    Failed { reason: String },
}

pub type TransportEventSink = mpsc::UnboundedSender<TransportEvent>;

/// One direct connection attempt
#[async_trait]
pub trait PeerTransport: Send + Sync {
    fn attach_local_tracks(&self, media: &Arc<dyn LocalMedia>) -> TransportResult<()>;

    /// Create an offer and apply it as local description
    async fn create_offer(&self) -> TransportResult<SessionDescription>;

    /// Apply a remote offer, then create and apply the answer
    async fn accept_offer(&self, offer: &SessionDescription) -> TransportResult<SessionDescription>;

    /// Apply the remote answer to a pending local offer
    async fn apply_answer(&self, answer: &SessionDescription) -> TransportResult<()>;

    /// Add a remote candidate; requires the remote description
    async fn add_remote_candidate(&self, candidate: &IceCandidate) -> TransportResult<()>;

    /// Close the transport. No events are emitted afterwards.
    fn close(&self);
}

/// Creates transports
pub trait TransportFactory: Send + Sync {
    fn create(&self, ice: &IceConfig, events: TransportEventSink) -> TransportResult<Arc<dyn PeerTransport>>;
}
