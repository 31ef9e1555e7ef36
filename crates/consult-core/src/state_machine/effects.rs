use teleconsult_signaling_core::{IceCandidate, NegotiationMessage, SessionDescription};

use crate::lifecycle::SessionOutcome;

/// Side effect requested by the reducer, executed by the negotiator.
///
/// Transport effects name the generation they target; the negotiator drops
/// them when that transport is no longer the live one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    AcquireMedia,
    PublishPresence,
    SendMessage(NegotiationMessage),

    CreateTransport { generation: u64 },
    AttachLocalTracks { generation: u64 },
    CreateOffer { generation: u64 },
    AcceptOffer { generation: u64, offer: SessionDescription },
    ApplyAnswer { generation: u64, answer: SessionDescription },
    AddRemoteCandidate { generation: u64, candidate: IceCandidate },
    CloseTransport,

    StartPeerWaitTimer,
    StartNegotiationTimer,
    CancelNegotiationTimer,

    // Teardown, always emitted together and in this order
    StopLocalTracks,
    ClearBuffers,
    CancelTimers,
    RecordSessionEnd(SessionOutcome),
    LeaveChannel,
}

impl Effect {
    /// Effects emitted by a teardown, in execution order
    pub fn teardown(outcome: SessionOutcome) -> [Effect; 6] {
        [
            Effect::StopLocalTracks,
            Effect::CloseTransport,
            Effect::ClearBuffers,
            Effect::CancelTimers,
            Effect::RecordSessionEnd(outcome),
            Effect::LeaveChannel,
        ]
    }
}
