//! # Teleconsult Core
//!
//! Negotiation core of a two-party video consultation between a doctor and a
//! patient.
//!
//! A consultation runs as one session per participant:
//!
//! 1. The [`ConsultationController`] validates the appointment, records its
//!    start and joins the session's signaling channel.
//! 2. A per-session driver captures local media, announces presence, and
//!    waits for the counterpart.
//! 3. Roles are resolved deterministically ([`resolve_role`]): the doctor
//!    initiates, or the lower user id when roles tie. The initiator sends the
//!    single offer, the responder answers, and both trickle candidates.
//! 4. The session is connected only once remote media flows. Hang up, peer
//!    departure, timeouts and failures all go through one teardown.
//!
//! Session behaviour is a transition table ([`state_table`]) folded by a pure
//! reducer ([`state_machine::reduce`]); the driver only executes the effects
//! the reducer asks for. Media capture, the peer transport, the signaling
//! channel and appointment storage are capabilities, with in-process
//! implementations in [`loopback`], [`store::MemorySessionStore`] and
//! `teleconsult_signaling_core::InMemoryHub`.

pub mod config;
pub mod controller;
pub mod error;
pub mod lifecycle;
pub mod loopback;
pub mod media;
pub mod role;
pub mod state_machine;
pub mod state_table;
pub mod status;
pub mod store;
pub mod transport;
pub mod types;

mod negotiator;

pub use config::{ConsultConfig, IceConfig, MediaConstraints, DEFAULT_ICE_SERVERS};
pub use controller::{ConsultDeps, ConsultationController, ConsultationRequest};
pub use error::{CaptureError, ConsultError, ConsultResult, StorageError, TransportError};
pub use lifecycle::{SessionLifecycleRecorder, SessionOutcome, StoreRecorder};
pub use media::{LocalMedia, MediaDevices, MediaHandle, MediaTrack, TrackKind};
pub use role::{initiator_of, resolve_role};
pub use status::{ConnectionStatus, SessionSnapshot};
pub use store::{AppointmentStatus, MemorySessionStore, SessionRecord, SessionStore, StatusUpdate};
pub use transport::{PeerTransport, TransportEvent, TransportEventSink, TransportFactory};
pub use types::{CallPhase, CallState, FailureReason, NegotiationRole};

/// Re-export of common types
pub mod prelude {
    pub use crate::{
        CallState, ConnectionStatus, ConsultConfig, ConsultDeps, ConsultError, ConsultResult,
        ConsultationController, ConsultationRequest, NegotiationRole, SessionSnapshot,
    };
    pub use teleconsult_signaling_core::{DeclaredRole, Participant, SessionId, UserId};
}
