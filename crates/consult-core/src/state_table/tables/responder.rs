use crate::state_table::{Action, ConditionUpdates, EventType, Guard, Role, StateTableBuilder, Transition};
use crate::types::CallState;
use teleconsult_signaling_core::{DeclaredRole, Participant, SessionDescription};

fn offer_received() -> EventType {
    EventType::OfferReceived {
        from: Participant::new("", DeclaredRole::Unknown),
        description: SessionDescription::offer(""),
    }
}

/// Add transitions for the side that answers
pub fn add_responder_transitions(builder: &mut StateTableBuilder) {
    let role = Role::Responder;
    let accept = [Action::CreateTransport, Action::AttachLocalTracks, Action::AcceptRemoteOffer];

    builder.add_transition(
        role,
        CallState::AwaitingPeer,
        offer_received(),
        Transition::to(CallState::Answering)
            .actions(accept)
            .actions([Action::StartNegotiationTimer]),
    );

    // A new offer (the initiator restarted) or a replay after our transport
    // was discarded; an identical replay on the live transport is ignored
    builder.add_transition(
        role,
        CallState::Answering,
        offer_received(),
        Transition::stay().guard(Guard::OfferNeedsTransport).actions(accept),
    );

    builder.add_transition(
        role,
        CallState::Answering,
        EventType::LocalAnswerCreated {
            generation: 0,
            description: SessionDescription::answer(""),
        },
        Transition::stay()
            .guard(Guard::CurrentGeneration)
            .conditions(ConditionUpdates::set_remote_applied(true))
            .actions([Action::SendAnswer, Action::FlushCandidates]),
    );
}
