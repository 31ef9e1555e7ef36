mod common;
mod initiator;
mod responder;

pub use common::add_common_transitions;
pub use initiator::add_initiator_transitions;
pub use responder::add_responder_transitions;
