use super::types::{Action, EventType, Role, StateKey, StateTable, Transition};
use crate::types::CallState;

/// Assembles a [`StateTable`] from per-role table definitions
#[derive(Debug, Default)]
pub struct StateTableBuilder {
    table: StateTable,
}

impl StateTableBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_transition(&mut self, role: Role, state: CallState, event: EventType, transition: Transition) -> &mut Self {
        self.table.insert(StateKey { role, state, event }, transition);
        self
    }

    /// Same transition for several states
    pub fn add_transition_for(
        &mut self,
        role: Role,
        states: &[CallState],
        event: EventType,
        transition: Transition,
    ) -> &mut Self {
        for state in states {
            self.add_transition(role, *state, event.clone(), transition.clone());
        }
        self
    }

    /// Transition applying in every non-terminal state
    pub fn add_wildcard(&mut self, role: Role, event: EventType, transition: Transition) -> &mut Self {
        self.table.insert_wildcard(role, event, transition);
        self
    }

    /// Plain state change running `actions`
    pub fn add_state_change(
        &mut self,
        role: Role,
        from: CallState,
        event: EventType,
        to: CallState,
        actions: impl IntoIterator<Item = Action>,
    ) -> &mut Self {
        self.add_transition(role, from, event, Transition::to(to).actions(actions))
    }

    pub fn build(self) -> StateTable {
        self.table
    }
}
