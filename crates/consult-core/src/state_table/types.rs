use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use teleconsult_signaling_core::{DeclaredRole, IceCandidate, Participant, SessionDescription};

use crate::types::{CallState, NegotiationRole};

/// Key for looking up transitions in the state table
#[derive(Debug, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct StateKey {
    pub role: Role,
    pub state: CallState,
    pub event: EventType,
}

/// Role a transition applies to
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub enum Role {
    Initiator,
    Responder,
    /// Applies to both roles, and to sessions whose role is not resolved yet
    Both,
}

impl From<NegotiationRole> for Role {
    fn from(role: NegotiationRole) -> Self {
        match role {
            NegotiationRole::Initiator => Role::Initiator,
            NegotiationRole::Responder => Role::Responder,
        }
    }
}

/// Events driving a session.
///
/// Events that report the result of a transport operation carry the
/// generation of the transport they belong to; results from a replaced or
/// closed transport fail the `CurrentGeneration` guard.
#[derive(Debug, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub enum EventType {
    // User / lifecycle events
    Activate,
    Hangup,

    // Capture results
    MediaAcquired,
    MediaDenied,
    MediaUnavailable,

    // Signaling channel
    ChannelJoined,
    PresenceChanged { present: Vec<Participant> },
    ChannelLost,

    // Messages from the peer
    OfferReceived { from: Participant, description: SessionDescription },
    AnswerReceived { description: SessionDescription },
    CandidateReceived { candidate: IceCandidate },

    // Transport results
    LocalOfferCreated { generation: u64, description: SessionDescription },
    LocalAnswerCreated { generation: u64, description: SessionDescription },
    RemoteAnswerApplied { generation: u64 },
    LocalCandidate { generation: u64, candidate: IceCandidate },
    MediaFlowing { generation: u64 },
    NegotiationError { generation: u64, reason: String },
    TransportFailed { generation: u64 },

    // Timers
    NegotiationTimeout,
    PeerWaitElapsed,

    // Internal coordination events
    CheckReady,
    CheckPeers,
}

impl EventType {
    /// Variant name without payload
    pub fn type_name(&self) -> &'static str {
        match self {
            EventType::Activate => "Activate",
            EventType::Hangup => "Hangup",
            EventType::MediaAcquired => "MediaAcquired",
            EventType::MediaDenied => "MediaDenied",
            EventType::MediaUnavailable => "MediaUnavailable",
            EventType::ChannelJoined => "ChannelJoined",
            EventType::PresenceChanged { .. } => "PresenceChanged",
            EventType::ChannelLost => "ChannelLost",
            EventType::OfferReceived { .. } => "OfferReceived",
            EventType::AnswerReceived { .. } => "AnswerReceived",
            EventType::CandidateReceived { .. } => "CandidateReceived",
            EventType::LocalOfferCreated { .. } => "LocalOfferCreated",
            EventType::LocalAnswerCreated { .. } => "LocalAnswerCreated",
            EventType::RemoteAnswerApplied { .. } => "RemoteAnswerApplied",
            EventType::LocalCandidate { .. } => "LocalCandidate",
            EventType::MediaFlowing { .. } => "MediaFlowing",
            EventType::NegotiationError { .. } => "NegotiationError",
            EventType::TransportFailed { .. } => "TransportFailed",
            EventType::NegotiationTimeout => "NegotiationTimeout",
            EventType::PeerWaitElapsed => "PeerWaitElapsed",
            EventType::CheckReady => "CheckReady",
            EventType::CheckPeers => "CheckPeers",
        }
    }

    /// Transport generation the event belongs to, if any
    pub fn generation(&self) -> Option<u64> {
        match self {
            EventType::LocalOfferCreated { generation, .. }
            | EventType::LocalAnswerCreated { generation, .. }
            | EventType::RemoteAnswerApplied { generation }
            | EventType::LocalCandidate { generation, .. }
            | EventType::MediaFlowing { generation }
            | EventType::NegotiationError { generation, .. }
            | EventType::TransportFailed { generation } => Some(*generation),
            _ => None,
        }
    }

    /// Normalize the event for state table lookups by removing payloads.
    /// This allows the state table to match on event type rather than exact field values.
    pub fn normalize(&self) -> Self {
        match self {
            EventType::PresenceChanged { .. } => EventType::PresenceChanged { present: Vec::new() },
            EventType::OfferReceived { .. } => EventType::OfferReceived {
                from: Participant::new("", DeclaredRole::Unknown),
                description: SessionDescription::offer(""),
            },
            EventType::AnswerReceived { .. } => EventType::AnswerReceived {
                description: SessionDescription::answer(""),
            },
            EventType::CandidateReceived { .. } => EventType::CandidateReceived {
                candidate: IceCandidate::new(""),
            },
            EventType::LocalOfferCreated { .. } => EventType::LocalOfferCreated {
                generation: 0,
                description: SessionDescription::offer(""),
            },
            EventType::LocalAnswerCreated { .. } => EventType::LocalAnswerCreated {
                generation: 0,
                description: SessionDescription::answer(""),
            },
            EventType::RemoteAnswerApplied { .. } => EventType::RemoteAnswerApplied { generation: 0 },
            EventType::LocalCandidate { .. } => EventType::LocalCandidate {
                generation: 0,
                candidate: IceCandidate::new(""),
            },
            EventType::MediaFlowing { .. } => EventType::MediaFlowing { generation: 0 },
            EventType::NegotiationError { .. } => EventType::NegotiationError {
                generation: 0,
                reason: String::new(),
            },
            EventType::TransportFailed { .. } => EventType::TransportFailed { generation: 0 },

            // Events without fields pass through unchanged
            _ => self.clone(),
        }
    }
}

/// Transition definition - what happens when an event occurs in a state
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Transition {
    /// Conditions that must be true for this transition
    pub guards: Vec<Guard>,

    /// Actions to execute
    pub actions: Vec<Action>,

    /// Next state (if changing)
    pub next_state: Option<CallState>,

    /// Condition flags to update
    pub condition_updates: ConditionUpdates,

    /// Internal events processed right after this transition
    pub raise: Vec<EventType>,
}

impl Transition {
    /// Transition moving to `state`
    pub fn to(state: CallState) -> Self {
        Self {
            next_state: Some(state),
            ..Default::default()
        }
    }

    /// Transition staying in the current state
    pub fn stay() -> Self {
        Self::default()
    }

    pub fn guard(mut self, guard: Guard) -> Self {
        self.guards.push(guard);
        self
    }

    pub fn actions(mut self, actions: impl IntoIterator<Item = Action>) -> Self {
        self.actions.extend(actions);
        self
    }

    pub fn conditions(mut self, updates: ConditionUpdates) -> Self {
        self.condition_updates = updates;
        self
    }

    pub fn raise(mut self, event: EventType) -> Self {
        self.raise.push(event);
        self
    }
}

/// Guards that must be satisfied for a transition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Guard {
    MediaReady,
    ChannelJoined,
    PeerPresent,
    PeerAbsent,
    /// Offer was invalidated by a peer leave, or its transport is gone
    NeedsFreshOffer,
    /// Event belongs to the live transport
    CurrentGeneration,
    TransportLive,
    /// No answer applied to the live transport yet
    AnswerPending,
    /// The live transport's offer was sent and is awaiting its answer
    OfferOutstanding,
    /// Answer was never applied before, on this or an earlier transport
    FreshAnswer,
    /// Offer differs from the applied one, or no transport is live
    OfferNeedsTransport,
}

/// Actions to execute during a transition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Action {
    // Media actions
    AcquireMedia,

    // Channel actions
    PublishPresence,
    SendOffer,
    SendAnswer,
    SendCandidate,

    // Transport actions
    CreateTransport,
    AttachLocalTracks,
    CreateOffer,
    AcceptRemoteOffer,
    ApplyRemoteAnswer,
    ApplyOrBufferCandidate,
    FlushCandidates,
    CloseTransport,

    // Timers
    StartPeerWaitTimer,
    StartNegotiationTimer,
    CancelNegotiationTimer,

    // Cleanup
    Teardown,
}

/// Updates to condition flags
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConditionUpdates {
    pub media_ready: Option<bool>,
    pub channel_joined: Option<bool>,
    pub remote_applied: Option<bool>,
    pub answer_received: Option<bool>,
    pub offer_sent: Option<bool>,
    pub offer_stale: Option<bool>,
    pub peer_wait_noticed: Option<bool>,
}

impl ConditionUpdates {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn set_media_ready(ready: bool) -> Self {
        Self {
            media_ready: Some(ready),
            ..Default::default()
        }
    }

    pub fn set_channel_joined(joined: bool) -> Self {
        Self {
            channel_joined: Some(joined),
            ..Default::default()
        }
    }

    pub fn set_remote_applied(applied: bool) -> Self {
        Self {
            remote_applied: Some(applied),
            ..Default::default()
        }
    }

    pub fn set_answer_received(received: bool) -> Self {
        Self {
            answer_received: Some(received),
            ..Default::default()
        }
    }

    pub fn set_offer_sent(sent: bool) -> Self {
        Self {
            offer_sent: Some(sent),
            ..Default::default()
        }
    }

    pub fn set_peer_wait_noticed(noticed: bool) -> Self {
        Self {
            peer_wait_noticed: Some(noticed),
            ..Default::default()
        }
    }
}

/// States that must always have exit transitions if used
const CORE_STATES_REQUIRING_EXITS: &[CallState] = &[
    CallState::Idle,
    CallState::Capturing,
    CallState::AwaitingPeer,
    CallState::Offering,
    CallState::Answering,
    CallState::Connected,
];

/// State table containing all transitions
#[derive(Debug, Default)]
pub struct StateTable {
    transitions: HashMap<StateKey, Transition>,
    /// Transitions that apply in any non-terminal state
    wildcard_transitions: HashMap<(Role, EventType), Transition>,
}

impl StateTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: StateKey, transition: Transition) {
        let normalized_key = StateKey {
            role: key.role,
            state: key.state,
            event: key.event.normalize(),
        };
        self.transitions.insert(normalized_key, transition);
    }

    pub fn insert_wildcard(&mut self, role: Role, event: EventType, transition: Transition) {
        self.wildcard_transitions.insert((role, event.normalize()), transition);
    }

    pub fn get(&self, key: &StateKey) -> Option<&Transition> {
        let normalized_key = StateKey {
            role: key.role,
            state: key.state,
            event: key.event.normalize(),
        };
        if let Some(transition) = self.transitions.get(&normalized_key) {
            return Some(transition);
        }
        self.wildcard_transitions.get(&(key.role, normalized_key.event))
    }

    /// Find the transition for `event` in `state`, trying each role in order.
    ///
    /// Exact state entries of any role win over wildcard entries.
    pub fn lookup(&self, roles: &[Role], state: CallState, event: &EventType) -> Option<&Transition> {
        let event = event.normalize();
        roles
            .iter()
            .find_map(|role| {
                self.transitions.get(&StateKey {
                    role: *role,
                    state,
                    event: event.clone(),
                })
            })
            .or_else(|| {
                roles
                    .iter()
                    .find_map(|role| self.wildcard_transitions.get(&(*role, event.clone())))
            })
    }

    pub fn has_transition(&self, key: &StateKey) -> bool {
        self.get(key).is_some()
    }

    pub fn transition_count(&self) -> usize {
        self.transitions.len() + self.wildcard_transitions.len()
    }

    /// Collect all states referenced in this table
    pub fn collect_used_states(&self) -> HashSet<CallState> {
        let mut states = HashSet::new();
        for (key, transition) in &self.transitions {
            states.insert(key.state);
            if let Some(next_state) = transition.next_state {
                states.insert(next_state);
            }
        }
        for transition in self.wildcard_transitions.values() {
            if let Some(next_state) = transition.next_state {
                states.insert(next_state);
            }
        }
        states
    }

    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        for state in self.collect_used_states() {
            if state.is_terminal() {
                continue;
            }
            let has_exit = self
                .transitions
                .iter()
                .any(|(k, t)| k.state == state && t.next_state.is_some_and(|n| n != state));
            if !has_exit && CORE_STATES_REQUIRING_EXITS.contains(&state) {
                errors.push(format!("Core state {} has no exit transitions", state));
            }
        }

        let terminal_exits = self
            .wildcard_transitions
            .iter()
            .filter(|(_, t)| t.next_state.is_some_and(|n| n.is_terminal()))
            .count();
        if terminal_exits == 0 {
            errors.push("No wildcard path to a terminal state".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}
