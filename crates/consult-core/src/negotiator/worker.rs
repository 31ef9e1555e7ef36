//! Per-transport tasks.
//!
//! Each transport gets an op worker that runs description and candidate
//! calls strictly in submission order, and a forwarder that turns transport
//! events into session events. Both tag what they post with the transport's
//! generation so the reducer can drop results of a replaced transport.

use std::sync::Arc;

use teleconsult_signaling_core::{IceCandidate, SessionDescription};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::EventPoster;
use crate::state_table::EventType;
use crate::transport::{PeerTransport, TransportEvent};

/// Asynchronous call on a transport
#[derive(Debug)]
pub(crate) enum TransportOp {
    CreateOffer,
    AcceptOffer(SessionDescription),
    ApplyAnswer(SessionDescription),
    AddCandidate(IceCandidate),
}

impl TransportOp {
    pub(crate) fn name(&self) -> &'static str {
        match self {
            Self::CreateOffer => "create-offer",
            Self::AcceptOffer(_) => "accept-offer",
            Self::ApplyAnswer(_) => "apply-answer",
            Self::AddCandidate(_) => "add-candidate",
        }
    }
}

pub(crate) fn spawn_worker(
    generation: u64,
    transport: Arc<dyn PeerTransport>,
    poster: EventPoster,
) -> mpsc::UnboundedSender<TransportOp> {
    let (tx, mut rx) = mpsc::unbounded_channel::<TransportOp>();

    tokio::spawn(async move {
        while let Some(op) = rx.recv().await {
            let name = op.name();
            let event = match run_op(transport.as_ref(), generation, op).await {
                Ok(Some(event)) => event,
                Ok(None) => continue,
                Err(reason) => {
                    warn!("Transport #{} {} failed: {}", generation, name, reason);
                    EventType::NegotiationError { generation, reason }
                }
            };
            if !poster.session(event) {
                break;
            }
        }
        debug!("Transport #{} worker finished", generation);
    });

    tx
}

async fn run_op(
    transport: &dyn PeerTransport,
    generation: u64,
    op: TransportOp,
) -> Result<Option<EventType>, String> {
    match op {
        TransportOp::CreateOffer => {
            let description = transport.create_offer().await.map_err(|e| e.to_string())?;
            Ok(Some(EventType::LocalOfferCreated { generation, description }))
        }
        TransportOp::AcceptOffer(offer) => {
            let description = transport.accept_offer(&offer).await.map_err(|e| e.to_string())?;
            Ok(Some(EventType::LocalAnswerCreated { generation, description }))
        }
        TransportOp::ApplyAnswer(answer) => {
            transport.apply_answer(&answer).await.map_err(|e| e.to_string())?;
            Ok(Some(EventType::RemoteAnswerApplied { generation }))
        }
        TransportOp::AddCandidate(candidate) => {
            // A bad candidate is not fatal; others may still connect
            if let Err(e) = transport.add_remote_candidate(&candidate).await {
                warn!("Transport #{} rejected candidate: {}", generation, e);
            }
            Ok(None)
        }
    }
}

pub(crate) fn spawn_forwarder(
    generation: u64,
    mut events: mpsc::UnboundedReceiver<TransportEvent>,
    poster: EventPoster,
) {
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            let event = match event {
                TransportEvent::LocalCandidate(candidate) => EventType::LocalCandidate { generation, candidate },
                TransportEvent::MediaFlowing => EventType::MediaFlowing { generation },
                TransportEvent::Failed { reason } => {
                    warn!("Transport #{} failed: {}", generation, reason);
                    EventType::TransportFailed { generation }
                }
            };
            if !poster.session(event) {
                break;
            }
        }
    });
}
