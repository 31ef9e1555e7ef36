//! Deterministic initiator election.
//!
//! Both sides run the same pure function over the same two participants, so
//! they agree on who sends the offer without exchanging anything. A declared
//! doctor always initiates; otherwise the lexicographically smaller user id
//! wins.

use teleconsult_signaling_core::{DeclaredRole, Participant};

use crate::types::NegotiationRole;

fn rank(role: DeclaredRole) -> u8 {
    match role {
        DeclaredRole::Doctor => 0,
        _ => 1,
    }
}

/// The participant that initiates among `candidates`
pub fn initiator_of<'a>(candidates: impl IntoIterator<Item = &'a Participant>) -> Option<&'a Participant> {
    candidates
        .into_iter()
        .min_by(|a, b| (rank(a.role), &a.user_id).cmp(&(rank(b.role), &b.user_id)))
}

/// Resolve the local negotiation role against the visible remote participants.
///
/// Entries for the local user are ignored. Returns `None` while nobody else
/// is visible.
pub fn resolve_role(local: &Participant, remote: &[Participant]) -> Option<NegotiationRole> {
    let others: Vec<&Participant> = remote.iter().filter(|p| p.user_id != local.user_id).collect();
    if others.is_empty() {
        return None;
    }

    let initiator = initiator_of(others.into_iter().chain(std::iter::once(local)))?;
    if initiator.user_id == local.user_id {
        Some(NegotiationRole::Initiator)
    } else {
        Some(NegotiationRole::Responder)
    }
}
