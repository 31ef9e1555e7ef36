//! In-process media and transport primitives.
//!
//! Used by the integration tests and the simulator in place of real capture
//! devices and peer connections.

mod media;
mod transport;

pub use media::{AcquireOutcome, LoopbackMedia, LoopbackMediaDevices};
pub use transport::{LoopbackTransport, LoopbackTransportFactory};
