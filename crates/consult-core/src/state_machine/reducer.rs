//! Pure session reducer.
//!
//! `reduce` folds one event into the session state and returns the effects
//! to run. It performs no I/O: media, transport, channel and storage calls
//! are all described by [`Effect`]s and executed by the negotiator.

use std::collections::VecDeque;

use teleconsult_signaling_core::{NegotiationMessage, Participant};
use tracing::{debug, info, warn};

use super::effects::Effect;
use super::session::SessionState;
use crate::lifecycle::SessionOutcome;
use crate::role::resolve_role;
use crate::state_table::{Action, EventType, Guard, Role, StateTable};
use crate::types::CallState;

/// Apply `event` and every event it raises
pub fn reduce(table: &StateTable, mut session: SessionState, event: EventType) -> (SessionState, Vec<Effect>) {
    let mut effects = Vec::new();
    let mut queue = VecDeque::from([event]);

    while let Some(event) = queue.pop_front() {
        if session.is_terminal() {
            debug!(
                "Session {} ignoring {} in terminal state {}",
                session.session_id,
                event.type_name(),
                session.state
            );
            continue;
        }

        observe(&mut session, &event);

        let roles = match session.role {
            Some(role) => vec![role.into(), Role::Both],
            None => vec![Role::Both],
        };
        let Some(transition) = table.lookup(&roles, session.state, &event) else {
            debug!(
                "Session {}: no transition for {} in {}",
                session.session_id,
                event.type_name(),
                session.state
            );
            continue;
        };

        if let Some(guard) = transition.guards.iter().find(|g| !check_guard(&session, **g, &event)) {
            debug!(
                "Session {}: {} in {} blocked by {:?}",
                session.session_id,
                event.type_name(),
                session.state,
                guard
            );
            continue;
        }

        if let Some(next) = transition.next_state {
            if next != session.state {
                info!(
                    "Session {} {} -> {} on {}",
                    session.session_id,
                    session.state,
                    next,
                    event.type_name()
                );
                session.state = next;
            }
        }
        session.conditions.apply(&transition.condition_updates);

        for action in &transition.actions {
            expand_action(&mut session, *action, &event, &mut effects);
        }
        queue.extend(transition.raise.iter().cloned());
    }

    (session, effects)
}

/// Record facts carried by the event before the table is consulted
fn observe(session: &mut SessionState, event: &EventType) {
    match event {
        EventType::PresenceChanged { present } => {
            let peers: Vec<Participant> = present
                .iter()
                .filter(|p| session.is_counterpart(&p.user_id) && p.is_present())
                .cloned()
                .collect();

            let was_present = session.conditions.peer_present;
            session.conditions.peer_present = !peers.is_empty();
            if let Some(peer) = peers.first() {
                session.remote = Some(peer.clone());
            }
            if session.role.is_none() {
                resolve(session, &peers);
            }
            if was_present && peers.is_empty() && session.state == CallState::Offering {
                info!("Session {}: peer left while offering, offer is stale", session.session_id);
                session.conditions.offer_stale = true;
            }
        }
        EventType::OfferReceived { from, .. } if session.role.is_none() => {
            resolve(session, std::slice::from_ref(from));
        }
        _ => {}
    }
}

fn resolve(session: &mut SessionState, peers: &[Participant]) {
    if let Some(role) = resolve_role(&session.local, peers) {
        info!("Session {}: {} resolved as {}", session.session_id, session.local, role);
        session.role = Some(role);
    }
}

fn check_guard(session: &SessionState, guard: Guard, event: &EventType) -> bool {
    let c = &session.conditions;
    match guard {
        Guard::MediaReady => c.media_ready,
        Guard::ChannelJoined => c.channel_joined,
        Guard::PeerPresent => c.peer_present,
        Guard::PeerAbsent => !c.peer_present,
        Guard::NeedsFreshOffer => c.offer_stale || !session.transport_live,
        Guard::CurrentGeneration => event.generation().is_some_and(|g| session.is_current(g)),
        Guard::TransportLive => session.transport_live,
        Guard::AnswerPending => !c.answer_received,
        Guard::OfferOutstanding => c.offer_sent,
        Guard::FreshAnswer => match event {
            EventType::AnswerReceived { description } => !session.applied_answers.contains(description),
            _ => false,
        },
        Guard::OfferNeedsTransport => match event {
            EventType::OfferReceived { description, .. } => {
                !session.transport_live || session.applied_offer.as_ref() != Some(description)
            }
            _ => false,
        },
    }
}

fn close_transport(session: &mut SessionState, effects: &mut Vec<Effect>) {
    if session.transport_live {
        session.transport_live = false;
        session.conditions.remote_applied = false;
        session.conditions.answer_received = false;
        session.conditions.offer_sent = false;
        effects.push(Effect::CloseTransport);
    }
}

fn expand_action(session: &mut SessionState, action: Action, event: &EventType, effects: &mut Vec<Effect>) {
    let generation = session.transport_generation;
    match (action, event) {
        (Action::AcquireMedia, _) => effects.push(Effect::AcquireMedia),
        (Action::PublishPresence, _) => effects.push(Effect::PublishPresence),
        (Action::StartPeerWaitTimer, _) => effects.push(Effect::StartPeerWaitTimer),
        (Action::StartNegotiationTimer, _) => effects.push(Effect::StartNegotiationTimer),
        (Action::CancelNegotiationTimer, _) => effects.push(Effect::CancelNegotiationTimer),

        (Action::CreateTransport, _) => {
            close_transport(session, effects);
            session.transport_generation += 1;
            session.transport_live = true;
            session.conditions.remote_applied = false;
            session.conditions.answer_received = false;
            session.conditions.offer_sent = false;
            session.conditions.offer_stale = false;
            effects.push(Effect::CreateTransport {
                generation: session.transport_generation,
            });
        }
        (Action::AttachLocalTracks, _) => effects.push(Effect::AttachLocalTracks { generation }),
        (Action::CreateOffer, _) => effects.push(Effect::CreateOffer { generation }),
        (Action::AcceptRemoteOffer, EventType::OfferReceived { description, .. }) => {
            session.applied_offer = Some(description.clone());
            effects.push(Effect::AcceptOffer {
                generation,
                offer: description.clone(),
            });
        }
        (Action::ApplyRemoteAnswer, EventType::AnswerReceived { description }) => {
            session.applied_answers.push(description.clone());
            effects.push(Effect::ApplyAnswer {
                generation,
                answer: description.clone(),
            });
        }
        (Action::SendOffer, EventType::LocalOfferCreated { description, .. }) => {
            effects.push(Effect::SendMessage(NegotiationMessage::Offer {
                description: description.clone(),
            }));
        }
        (Action::SendAnswer, EventType::LocalAnswerCreated { description, .. }) => {
            effects.push(Effect::SendMessage(NegotiationMessage::Answer {
                description: description.clone(),
            }));
        }
        (Action::SendCandidate, EventType::LocalCandidate { candidate, .. }) => {
            effects.push(Effect::SendMessage(NegotiationMessage::Candidate {
                candidate: candidate.clone(),
            }));
        }

        (Action::ApplyOrBufferCandidate, EventType::CandidateReceived { candidate }) => {
            if session.transport_live && session.conditions.remote_applied {
                effects.push(Effect::AddRemoteCandidate {
                    generation,
                    candidate: candidate.clone(),
                });
            } else {
                if session.pending_candidates.len() >= session.candidate_limit {
                    session.pending_candidates.pop_front();
                    session.dropped_candidates += 1;
                    warn!(
                        "Session {}: candidate buffer full ({}), dropped oldest",
                        session.session_id, session.candidate_limit
                    );
                }
                session.pending_candidates.push_back(candidate.clone());
            }
        }
        (Action::FlushCandidates, _) => {
            if !session.pending_candidates.is_empty() {
                debug!(
                    "Session {}: flushing {} buffered candidates",
                    session.session_id,
                    session.pending_candidates.len()
                );
            }
            effects.extend(
                session
                    .pending_candidates
                    .drain(..)
                    .map(|candidate| Effect::AddRemoteCandidate { generation, candidate }),
            );
        }
        (Action::CloseTransport, _) => close_transport(session, effects),

        (Action::Teardown, _) => {
            if session.torn_down {
                return;
            }
            session.torn_down = true;
            session.transport_live = false;
            session.conditions.remote_applied = false;
            session.pending_candidates.clear();
            let outcome = match session.state {
                CallState::Failed(_) => SessionOutcome::Interrupted,
                _ => SessionOutcome::Completed,
            };
            effects.extend(Effect::teardown(outcome));
        }

        (action, event) => {
            warn!(
                "Session {}: action {:?} has no payload in {}",
                session.session_id,
                action,
                event.type_name()
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state_table::build_session_table;
    use crate::types::{FailureReason, NegotiationRole};
    use pretty_assertions::assert_eq;
    use teleconsult_signaling_core::{DeclaredRole, IceCandidate, SessionDescription, SessionId};

    fn doctor() -> Participant {
        Participant::new("doctor-1", DeclaredRole::Doctor)
    }

    fn patient() -> Participant {
        Participant::new("patient-1", DeclaredRole::Patient)
    }

    fn session(local: Participant) -> SessionState {
        SessionState::new(SessionId::new("S1"), local, 50)
    }

    fn run(state: SessionState, events: Vec<EventType>) -> (SessionState, Vec<Effect>) {
        let table = build_session_table();
        let mut all = Vec::new();
        let mut state = state;
        for event in events {
            let (next, effects) = reduce(&table, state, event);
            state = next;
            all.extend(effects);
        }
        (state, all)
    }

    fn presence(list: &[Participant]) -> EventType {
        EventType::PresenceChanged {
            present: list.iter().map(Participant::present).collect(),
        }
    }

    fn awaiting(local: Participant, others: &[Participant]) -> SessionState {
        let mut present = vec![local.clone()];
        present.extend_from_slice(others);
        let (state, _) = run(
            session(local),
            vec![EventType::Activate, EventType::ChannelJoined, presence(&present[1..]), EventType::MediaAcquired],
        );
        state
    }

    /// Initiator with its offer for `generation` already sent
    fn offered(state: SessionState, generation: u64) -> SessionState {
        let (state, _) = run(
            state,
            vec![EventType::LocalOfferCreated {
                generation,
                description: SessionDescription::offer(format!("v=0 offer-{}", generation)),
            }],
        );
        state
    }

    fn answer(sdp: &str) -> EventType {
        EventType::AnswerReceived {
            description: SessionDescription::answer(sdp),
        }
    }

    fn applied_answers(effects: &[Effect]) -> Vec<(u64, String)> {
        effects
            .iter()
            .filter_map(|e| match e {
                Effect::ApplyAnswer { generation, answer } => Some((*generation, answer.sdp.clone())),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn capture_and_join_reach_awaiting_peer() {
        let (state, effects) = run(
            session(doctor()),
            vec![EventType::Activate, EventType::MediaAcquired, EventType::ChannelJoined],
        );
        assert_eq!(state.state, CallState::AwaitingPeer);
        assert_eq!(
            effects,
            vec![Effect::AcquireMedia, Effect::PublishPresence, Effect::StartPeerWaitTimer]
        );
        assert_eq!(state.role, None);
    }

    #[test]
    fn initiator_offers_when_peer_already_present() {
        let state = awaiting(doctor(), &[patient()]);
        assert_eq!(state.state, CallState::Offering);
        assert_eq!(state.role, Some(NegotiationRole::Initiator));
        assert_eq!(state.transport_generation, 1);
    }

    #[test]
    fn initiator_effects_on_peer_join() {
        let alone = awaiting(doctor(), &[]);
        assert_eq!(alone.state, CallState::AwaitingPeer);

        let (state, effects) = run(alone, vec![presence(&[doctor(), patient()])]);
        assert_eq!(state.state, CallState::Offering);
        assert_eq!(
            effects,
            vec![
                Effect::CreateTransport { generation: 1 },
                Effect::AttachLocalTracks { generation: 1 },
                Effect::CreateOffer { generation: 1 },
                Effect::StartNegotiationTimer,
            ]
        );
    }

    #[test]
    fn duplicate_presence_does_not_reoffer() {
        let state = awaiting(doctor(), &[patient()]);
        let (state, effects) = run(state, vec![presence(&[doctor(), patient()]), presence(&[patient()])]);
        assert!(effects.is_empty());
        assert_eq!(state.transport_generation, 1);
    }

    #[test]
    fn peer_leave_marks_offer_stale_and_rejoin_reoffers() {
        let state = awaiting(doctor(), &[patient()]);
        let (state, effects) = run(state, vec![presence(&[doctor()])]);
        assert!(effects.is_empty());
        assert!(state.conditions.offer_stale);
        assert_eq!(state.state, CallState::Offering);

        let (state, effects) = run(state, vec![presence(&[doctor(), patient()])]);
        assert_eq!(
            effects,
            vec![
                Effect::CloseTransport,
                Effect::CreateTransport { generation: 2 },
                Effect::AttachLocalTracks { generation: 2 },
                Effect::CreateOffer { generation: 2 },
            ]
        );
        assert!(!state.conditions.offer_stale);
    }

    #[test]
    fn stale_generation_results_are_ignored() {
        let state = awaiting(doctor(), &[patient()]);
        let (state, effects) = run(
            state,
            vec![EventType::LocalOfferCreated {
                generation: 7,
                description: SessionDescription::offer("v=0"),
            }],
        );
        assert!(effects.is_empty());

        let (_, effects) = run(
            state,
            vec![EventType::LocalOfferCreated {
                generation: 1,
                description: SessionDescription::offer("v=0"),
            }],
        );
        assert_eq!(effects.len(), 1);
        assert!(matches!(&effects[0], Effect::SendMessage(NegotiationMessage::Offer { .. })));
    }

    #[test]
    fn replayed_answer_is_applied_once() {
        let state = offered(awaiting(doctor(), &[patient()]), 1);
        let (_, effects) = run(state, vec![answer("v=0"), answer("v=0")]);
        assert_eq!(applied_answers(&effects), vec![(1, "v=0".to_string())]);
    }

    #[test]
    fn answer_before_offer_is_sent_is_ignored() {
        let state = awaiting(doctor(), &[patient()]);
        let (state, effects) = run(state, vec![answer("v=0 early")]);
        assert!(applied_answers(&effects).is_empty());
        assert!(!state.conditions.answer_received);
    }

    #[test]
    fn old_answer_is_not_applied_to_a_reoffered_transport() {
        let state = offered(awaiting(doctor(), &[patient()]), 1);
        let (state, first) = run(state, vec![answer("v=0 answer-1")]);
        assert_eq!(applied_answers(&first), vec![(1, "v=0 answer-1".to_string())]);

        // Peer leaves and rejoins before connecting; a new offer goes out
        let (state, _) = run(state, vec![presence(&[doctor()]), presence(&[doctor(), patient()])]);
        assert_eq!(state.transport_generation, 2);

        // Delayed copy of the first answer arrives while the new offer is
        // still being created, and again after it was sent
        let (state, effects) = run(state, vec![answer("v=0 answer-1")]);
        assert!(applied_answers(&effects).is_empty());
        let state = offered(state, 2);
        let (state, effects) = run(state, vec![answer("v=0 answer-1"), answer("v=0 answer-2")]);

        assert_eq!(applied_answers(&effects), vec![(2, "v=0 answer-2".to_string())]);
        assert!(state.conditions.answer_received);
        assert_eq!(state.applied_answers.len(), 2);
    }

    #[test]
    fn candidates_buffer_until_remote_description_then_flush_in_order() {
        let state = offered(awaiting(doctor(), &[patient()]), 1);
        let cands: Vec<EventType> = (0..3)
            .map(|i| EventType::CandidateReceived {
                candidate: IceCandidate::new(format!("c{}", i)),
            })
            .collect();
        let (state, effects) = run(state, cands);
        assert!(effects.is_empty());
        assert_eq!(state.pending_candidates.len(), 3);

        let (state, effects) = run(
            state,
            vec![
                EventType::AnswerReceived {
                    description: SessionDescription::answer("v=0"),
                },
                EventType::RemoteAnswerApplied { generation: 1 },
            ],
        );
        let applied: Vec<String> = effects
            .iter()
            .filter_map(|e| match e {
                Effect::AddRemoteCandidate { candidate, .. } => Some(candidate.candidate.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(applied, vec!["c0", "c1", "c2"]);
        assert!(state.pending_candidates.is_empty());

        let (_, effects) = run(
            state,
            vec![EventType::CandidateReceived {
                candidate: IceCandidate::new("late"),
            }],
        );
        assert!(matches!(&effects[..], [Effect::AddRemoteCandidate { generation: 1, .. }]));
    }

    #[test]
    fn candidate_buffer_drops_oldest_beyond_limit() {
        let mut state = SessionState::new(SessionId::new("S1"), patient(), 50);
        state.state = CallState::AwaitingPeer;
        let cands = (0..60)
            .map(|i| EventType::CandidateReceived {
                candidate: IceCandidate::new(format!("c{}", i)),
            })
            .collect();
        let (state, effects) = run(state, cands);
        assert!(effects.is_empty());
        assert_eq!(state.pending_candidates.len(), 50);
        assert_eq!(state.dropped_candidates, 10);
        assert_eq!(state.pending_candidates.front().unwrap().candidate, "c10");
        assert_eq!(state.pending_candidates.back().unwrap().candidate, "c59");
    }

    #[test]
    fn responder_ignores_identical_offer_replay() {
        let state = awaiting(patient(), &[doctor()]);
        assert_eq!(state.role, Some(NegotiationRole::Responder));
        let offer = EventType::OfferReceived {
            from: doctor().present(),
            description: SessionDescription::offer("v=0 a"),
        };
        let (state, effects) = run(state, vec![offer.clone(), offer]);
        assert_eq!(state.state, CallState::Answering);
        assert_eq!(effects.iter().filter(|e| matches!(e, Effect::CreateTransport { .. })).count(), 1);

        let (state, effects) = run(
            state,
            vec![EventType::OfferReceived {
                from: doctor().present(),
                description: SessionDescription::offer("v=0 b"),
            }],
        );
        assert_eq!(effects[0], Effect::CloseTransport);
        assert_eq!(effects[1], Effect::CreateTransport { generation: 2 });
        assert_eq!(state.transport_generation, 2);
    }

    #[test]
    fn early_offer_resolves_role_from_sender() {
        let (state, _) = run(
            session(patient()),
            vec![EventType::Activate, EventType::MediaAcquired, EventType::ChannelJoined],
        );
        assert_eq!(state.role, None);
        let (state, effects) = run(
            state,
            vec![EventType::OfferReceived {
                from: doctor().present(),
                description: SessionDescription::offer("v=0"),
            }],
        );
        assert_eq!(state.role, Some(NegotiationRole::Responder));
        assert_eq!(state.state, CallState::Answering);
        assert!(effects.contains(&Effect::AcceptOffer {
            generation: 1,
            offer: SessionDescription::offer("v=0"),
        }));
    }

    #[test]
    fn negotiation_error_closes_and_replay_recreates() {
        let state = awaiting(patient(), &[doctor()]);
        let offer = EventType::OfferReceived {
            from: doctor().present(),
            description: SessionDescription::offer("v=0"),
        };
        let (state, _) = run(state, vec![offer.clone()]);
        let (state, effects) = run(
            state,
            vec![EventType::NegotiationError {
                generation: 1,
                reason: "bad sdp".into(),
            }],
        );
        assert_eq!(effects, vec![Effect::CloseTransport]);
        assert_eq!(state.state, CallState::Answering);

        let (state, effects) = run(state, vec![offer]);
        assert!(effects.contains(&Effect::CreateTransport { generation: 2 }));
        assert!(state.transport_live);
    }

    #[test]
    fn connected_only_through_media_flowing() {
        let state = awaiting(doctor(), &[patient()]);
        let (state, _) = run(state, vec![EventType::MediaFlowing { generation: 5 }]);
        assert_eq!(state.state, CallState::Offering);
        let (state, effects) = run(state, vec![EventType::MediaFlowing { generation: 1 }]);
        assert_eq!(state.state, CallState::Connected);
        assert_eq!(effects, vec![Effect::CancelNegotiationTimer]);
    }

    #[test]
    fn peer_leaving_connected_call_ends_it() {
        let state = awaiting(doctor(), &[patient()]);
        let (state, effects) = run(
            state,
            vec![EventType::MediaFlowing { generation: 1 }, presence(&[doctor()])],
        );
        assert_eq!(state.state, CallState::Ended);
        assert!(effects.ends_with(&Effect::teardown(SessionOutcome::Completed)));
    }

    #[test]
    fn teardown_runs_once() {
        let state = awaiting(doctor(), &[]);
        let (state, effects) = run(state, vec![EventType::Hangup, EventType::Hangup, EventType::ChannelLost]);
        assert_eq!(state.state, CallState::Ended);
        assert_eq!(effects, Effect::teardown(SessionOutcome::Completed).to_vec());
    }

    #[test]
    fn capture_denied_fails_without_presence() {
        let (state, effects) = run(
            session(patient()),
            vec![EventType::Activate, EventType::ChannelJoined, EventType::MediaDenied],
        );
        assert_eq!(state.state, CallState::Failed(FailureReason::CaptureDenied));
        assert!(!effects.contains(&Effect::PublishPresence));
        assert!(effects.contains(&Effect::RecordSessionEnd(SessionOutcome::Interrupted)));
    }

    #[test]
    fn negotiation_timeout_fails() {
        let state = awaiting(doctor(), &[patient()]);
        let (state, _) = run(state, vec![EventType::NegotiationTimeout]);
        assert_eq!(state.state, CallState::Failed(FailureReason::NegotiationTimeout));
        assert!(!state.transport_live);
    }

    #[test]
    fn third_party_on_the_topic_is_not_a_peer() {
        let admin = Participant::new("admin-7", DeclaredRole::Unknown);
        let local = session(doctor()).with_counterpart(patient().user_id);
        let (state, effects) = run(
            local,
            vec![
                EventType::Activate,
                EventType::ChannelJoined,
                EventType::MediaAcquired,
                presence(&[doctor(), admin.clone()]),
            ],
        );
        assert_eq!(state.state, CallState::AwaitingPeer);
        assert!(!state.conditions.peer_present);
        assert_eq!(state.remote, None);
        assert_eq!(state.role, None);
        assert!(!effects.iter().any(|e| matches!(e, Effect::CreateTransport { .. })));

        let (state, _) = run(state, vec![presence(&[doctor(), admin.clone(), patient()])]);
        assert_eq!(state.state, CallState::Offering);
        assert_eq!(state.remote.as_ref().map(|p| p.user_id.clone()), Some(patient().user_id));

        // The admin leaving is not the peer leaving
        let (state, _) = run(state, vec![presence(&[doctor(), patient()])]);
        assert!(state.conditions.peer_present);
        assert!(!state.conditions.offer_stale);
    }

    #[test]
    fn peer_wait_notice_is_recorded_only_while_waiting() {
        let state = awaiting(doctor(), &[]);
        let (state, _) = run(state, vec![EventType::PeerWaitElapsed]);
        assert!(state.conditions.peer_wait_noticed);
        assert_eq!(state.state, CallState::AwaitingPeer);
    }
}
