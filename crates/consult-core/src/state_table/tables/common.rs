use teleconsult_signaling_core::IceCandidate;

use crate::state_table::{Action, ConditionUpdates, EventType, Guard, Role, StateTableBuilder, Transition};
use crate::types::{CallState, FailureReason};

const NEGOTIATING: &[CallState] = &[CallState::Offering, CallState::Answering];

/// Add transitions shared by initiator and responder
pub fn add_common_transitions(builder: &mut StateTableBuilder) {
    let role = Role::Both;

    // Idle -> Capturing: start local capture; the controller joins the channel
    builder.add_state_change(role, CallState::Idle, EventType::Activate, CallState::Capturing, [Action::AcquireMedia]);

    builder.add_transition(
        role,
        CallState::Capturing,
        EventType::MediaAcquired,
        Transition::stay()
            .conditions(ConditionUpdates::set_media_ready(true))
            .raise(EventType::CheckReady),
    );
    builder.add_transition(
        role,
        CallState::Capturing,
        EventType::ChannelJoined,
        Transition::stay()
            .conditions(ConditionUpdates::set_channel_joined(true))
            .raise(EventType::CheckReady),
    );

    // Capturing -> AwaitingPeer once both media and channel are ready
    builder.add_transition(
        role,
        CallState::Capturing,
        EventType::CheckReady,
        Transition::to(CallState::AwaitingPeer)
            .guard(Guard::MediaReady)
            .guard(Guard::ChannelJoined)
            .actions([Action::PublishPresence, Action::StartPeerWaitTimer])
            .raise(EventType::CheckPeers),
    );

    // Capture failures are final
    builder.add_state_change(
        role,
        CallState::Capturing,
        EventType::MediaDenied,
        CallState::Failed(FailureReason::CaptureDenied),
        [Action::Teardown],
    );
    builder.add_state_change(
        role,
        CallState::Capturing,
        EventType::MediaUnavailable,
        CallState::Failed(FailureReason::CaptureUnavailable),
        [Action::Teardown],
    );

    builder.add_transition(
        role,
        CallState::AwaitingPeer,
        EventType::PeerWaitElapsed,
        Transition::stay().conditions(ConditionUpdates::set_peer_wait_noticed(true)),
    );

    // Negotiating -> Connected only once media flows on the live transport
    builder.add_transition_for(
        role,
        NEGOTIATING,
        EventType::MediaFlowing { generation: 0 },
        Transition::to(CallState::Connected)
            .guard(Guard::CurrentGeneration)
            .actions([Action::CancelNegotiationTimer]),
    );

    // A failed negotiation discards the transport; it is recreated when the
    // triggering message arrives again
    for event in [
        EventType::NegotiationError {
            generation: 0,
            reason: String::new(),
        },
        EventType::TransportFailed { generation: 0 },
    ] {
        builder.add_transition_for(
            role,
            NEGOTIATING,
            event,
            Transition::stay()
                .guard(Guard::CurrentGeneration)
                .actions([Action::CloseTransport]),
        );
    }

    builder.add_transition_for(
        role,
        NEGOTIATING,
        EventType::NegotiationTimeout,
        Transition::to(CallState::Failed(FailureReason::NegotiationTimeout)).actions([Action::Teardown]),
    );

    // Connected -> Ended when the peer leaves
    builder.add_transition(
        role,
        CallState::Connected,
        EventType::PresenceChanged { present: Vec::new() },
        Transition::to(CallState::Ended)
            .guard(Guard::PeerAbsent)
            .actions([Action::Teardown]),
    );
    builder.add_transition(
        role,
        CallState::Connected,
        EventType::TransportFailed { generation: 0 },
        Transition::to(CallState::Failed(FailureReason::TransportLost))
            .guard(Guard::CurrentGeneration)
            .actions([Action::Teardown]),
    );

    // Any non-terminal state
    builder.add_wildcard(
        role,
        EventType::CandidateReceived {
            candidate: IceCandidate::new(""),
        },
        Transition::stay().actions([Action::ApplyOrBufferCandidate]),
    );
    builder.add_wildcard(
        role,
        EventType::LocalCandidate {
            generation: 0,
            candidate: IceCandidate::new(""),
        },
        Transition::stay()
            .guard(Guard::CurrentGeneration)
            .actions([Action::SendCandidate]),
    );
    builder.add_wildcard(
        role,
        EventType::Hangup,
        Transition::to(CallState::Ended).actions([Action::Teardown]),
    );
    builder.add_wildcard(
        role,
        EventType::ChannelLost,
        Transition::to(CallState::Failed(FailureReason::ChannelLost)).actions([Action::Teardown]),
    );
}
