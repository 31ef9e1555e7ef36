//! Session state machine: state, reducer and the effects it requests

pub mod effects;
pub mod reducer;
pub mod session;

pub use effects::Effect;
pub use reducer::reduce;
pub use session::{Conditions, SessionState};
