use crate::state_table::{Action, ConditionUpdates, EventType, Guard, Role, StateTableBuilder, Transition};
use crate::types::CallState;
use teleconsult_signaling_core::SessionDescription;

const START_OFFER: [Action; 3] = [Action::CreateTransport, Action::AttachLocalTracks, Action::CreateOffer];

/// Add transitions for the side that sends the offer
pub fn add_initiator_transitions(builder: &mut StateTableBuilder) {
    let role = Role::Initiator;

    // AwaitingPeer -> Offering as soon as the peer is visible, either through
    // a presence update or because it was already there when we arrived
    for event in [EventType::PresenceChanged { present: Vec::new() }, EventType::CheckPeers] {
        builder.add_transition(
            role,
            CallState::AwaitingPeer,
            event,
            Transition::to(CallState::Offering)
                .guard(Guard::PeerPresent)
                .actions(START_OFFER)
                .actions([Action::StartNegotiationTimer]),
        );
    }

    builder.add_transition(
        role,
        CallState::Offering,
        EventType::LocalOfferCreated {
            generation: 0,
            description: SessionDescription::offer(""),
        },
        Transition::stay()
            .guard(Guard::CurrentGeneration)
            .actions([Action::SendOffer])
            .conditions(ConditionUpdates::set_offer_sent(true)),
    );

    // Peer came back after leaving, or the transport was discarded: offer
    // again on a fresh transport. Duplicate joins fail the guard.
    builder.add_transition(
        role,
        CallState::Offering,
        EventType::PresenceChanged { present: Vec::new() },
        Transition::stay()
            .guard(Guard::PeerPresent)
            .guard(Guard::NeedsFreshOffer)
            .actions(START_OFFER),
    );

    builder.add_transition(
        role,
        CallState::Offering,
        EventType::AnswerReceived {
            description: SessionDescription::answer(""),
        },
        Transition::stay()
            .guard(Guard::TransportLive)
            .guard(Guard::OfferOutstanding)
            .guard(Guard::AnswerPending)
            .guard(Guard::FreshAnswer)
            .actions([Action::ApplyRemoteAnswer])
            .conditions(ConditionUpdates::set_answer_received(true)),
    );

    builder.add_transition(
        role,
        CallState::Offering,
        EventType::RemoteAnswerApplied { generation: 0 },
        Transition::stay()
            .guard(Guard::CurrentGeneration)
            .conditions(ConditionUpdates::set_remote_applied(true))
            .actions([Action::FlushCandidates]),
    );
}
