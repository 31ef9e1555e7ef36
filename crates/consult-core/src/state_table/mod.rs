//! Transition table of a consultation session.
//!
//! Transitions are keyed by `(role, state, event)`. Role-specific entries
//! live in `tables::initiator` and `tables::responder`, everything shared in
//! `tables::common`. Wildcard entries apply in every non-terminal state.

pub mod builder;
pub mod tables;
pub mod types;

pub use builder::StateTableBuilder;
pub use types::*;

use lazy_static::lazy_static;
use std::sync::Arc;

lazy_static! {
    /// The session state table - single source of truth for all transitions
    pub static ref SESSION_TABLE: Arc<StateTable> = Arc::new(build_session_table());
}

/// Build the complete session state table
pub fn build_session_table() -> StateTable {
    let mut builder = StateTableBuilder::new();
    tables::add_common_transitions(&mut builder);
    tables::add_initiator_transitions(&mut builder);
    tables::add_responder_transitions(&mut builder);
    let table = builder.build();

    if let Err(errors) = table.validate() {
        tracing::error!("Session state table validation failed: {:?}", errors);
    }
    tracing::debug!("Session state table built with {} transitions", table.transition_count());
    table
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::CallState;

    #[test]
    fn built_table_validates() {
        let table = build_session_table();
        assert_eq!(table.validate(), Ok(()));
    }

    #[test]
    fn role_entries_do_not_leak_across_roles() {
        let table = build_session_table();
        let offer_key = |role| StateKey {
            role,
            state: CallState::AwaitingPeer,
            event: EventType::CheckPeers,
        };
        assert!(table.has_transition(&offer_key(Role::Initiator)));
        assert!(!table.has_transition(&offer_key(Role::Responder)));
        assert!(!table.has_transition(&offer_key(Role::Both)));
    }

    #[test]
    fn exact_entries_win_over_wildcards() {
        let table = build_session_table();
        let transition = table
            .lookup(
                &[Role::Initiator, Role::Both],
                CallState::Connected,
                &EventType::TransportFailed { generation: 9 },
            )
            .unwrap();
        assert!(transition.next_state.is_some_and(|s| s.is_terminal()));

        let hangup = table
            .lookup(&[Role::Both], CallState::Capturing, &EventType::Hangup)
            .unwrap();
        assert_eq!(hangup.next_state, Some(CallState::Ended));
    }

    #[test]
    fn missing_exits_are_reported() {
        let mut builder = StateTableBuilder::new();
        builder.add_state_change(Role::Both, CallState::Idle, EventType::Activate, CallState::Capturing, Vec::<Action>::new());
        let errors = builder.build().validate().unwrap_err();
        assert!(errors.iter().any(|e| e.contains("capturing")));
    }
}
