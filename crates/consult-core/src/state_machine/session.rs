use std::collections::VecDeque;

use serde::{Deserialize, Serialize};
use teleconsult_signaling_core::{IceCandidate, Participant, SessionDescription, SessionId, UserId};

use crate::state_table::ConditionUpdates;
use crate::types::{CallState, NegotiationRole};

/// Readiness flags of a session
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conditions {
    pub media_ready: bool,
    pub channel_joined: bool,
    pub peer_present: bool,
    /// Remote description applied on the live transport
    pub remote_applied: bool,
    pub answer_received: bool,
    /// Our offer for the live transport went out
    pub offer_sent: bool,
    /// The peer left after our offer went out
    pub offer_stale: bool,
    pub peer_wait_noticed: bool,
}

impl Conditions {
    pub fn apply(&mut self, updates: &ConditionUpdates) {
        let fields = [
            (&mut self.media_ready, updates.media_ready),
            (&mut self.channel_joined, updates.channel_joined),
            (&mut self.remote_applied, updates.remote_applied),
            (&mut self.answer_received, updates.answer_received),
            (&mut self.offer_sent, updates.offer_sent),
            (&mut self.offer_stale, updates.offer_stale),
            (&mut self.peer_wait_noticed, updates.peer_wait_noticed),
        ];
        for (flag, update) in fields {
            if let Some(value) = update {
                *flag = value;
            }
        }
    }
}

/// Everything the reducer knows about one session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionState {
    pub session_id: SessionId,
    pub local: Participant,
    /// Resolved once, never changed afterwards
    pub role: Option<NegotiationRole>,
    /// The other participant named by the appointment; anyone else on the
    /// topic is ignored
    pub counterpart: Option<UserId>,
    pub remote: Option<Participant>,
    pub state: CallState,
    pub conditions: Conditions,
    /// Incremented for every transport created
    pub transport_generation: u64,
    pub transport_live: bool,
    /// Last remote offer handed to the transport
    pub applied_offer: Option<SessionDescription>,
    /// Every remote answer handed to a transport, across generations
    pub applied_answers: Vec<SessionDescription>,
    /// Remote candidates waiting for a remote description
    pub pending_candidates: VecDeque<IceCandidate>,
    pub candidate_limit: usize,
    pub dropped_candidates: u64,
    pub torn_down: bool,
}

impl SessionState {
    pub fn new(session_id: SessionId, local: Participant, candidate_limit: usize) -> Self {
        Self {
            session_id,
            local,
            role: None,
            counterpart: None,
            remote: None,
            state: CallState::Idle,
            conditions: Conditions::default(),
            transport_generation: 0,
            transport_live: false,
            applied_offer: None,
            applied_answers: Vec::new(),
            pending_candidates: VecDeque::new(),
            candidate_limit: candidate_limit.max(1),
            dropped_candidates: 0,
            torn_down: false,
        }
    }

    pub fn with_counterpart(mut self, counterpart: UserId) -> Self {
        self.counterpart = Some(counterpart);
        self
    }

    /// Whether `user` is the peer this session negotiates with
    pub fn is_counterpart(&self, user: &UserId) -> bool {
        *user != self.local.user_id && self.counterpart.as_ref().map_or(true, |c| c == user)
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    /// Whether `generation` names the live transport
    pub fn is_current(&self, generation: u64) -> bool {
        self.transport_live && generation == self.transport_generation
    }
}
