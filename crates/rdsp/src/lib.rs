//! Umbrella crate tying together the session protocol stack:
//!
//! - [`rdsp_wire`] — frames, packet encoders, compression/encryption, transports.
//! - [`rdsp_proto`] — capability negotiation and the hello handshake.
//! - [`rdsp_shm`] — the shared-memory fast path for pixel data.
//! - [`rdsp_session`] — the connection state machine and subsystem dispatch loop.
//! - [`rdsp_subsystems`] — the concrete per-area packet handlers.
//! - [`rdsp_worker`] — subprocess isolation for codec/audio backends.
//!
//! Binaries and integration tests should generally `use rdsp::prelude::*`
//! rather than depending on the individual crates directly.

#[doc(hidden)]
pub extern crate rdsp_buffer;
#[doc(hidden)]
pub extern crate rdsp_proto;
#[doc(hidden)]
pub extern crate rdsp_session;
#[doc(hidden)]
pub extern crate rdsp_shm;
#[doc(hidden)]
pub extern crate rdsp_subsystems;
#[doc(hidden)]
pub extern crate rdsp_wire;
#[doc(hidden)]
pub extern crate rdsp_worker;

pub use rdsp_proto::{Capabilities, NegotiationError, SessionProfile};
pub use rdsp_session::{ConnectionSource, ConnectionState, Packet, SessionError, SessionId, Subsystem, SubsystemError, SubsystemRegistry};
pub use rdsp_wire::{CompressionMethod, Frame, FrameFlags, PacketEncoder, Transport, Value};
pub use rdsp_worker::{WorkerControl, WorkerError, WorkerHandle};

/// The common set of imports a subsystem implementation or a server binary
/// is expected to need.
pub mod prelude {
    pub use rdsp_proto::{Capabilities, SessionProfile};
    pub use rdsp_session::{
        run as run_dispatch_loop, ConnectionSource, ConnectionState, HandleFuture, Packet, SessionError, SessionId,
        SessionIdAllocator, Subsystem, SubsystemError, SubsystemRegistry,
    };
    pub use rdsp_wire::{PacketEncoder, Transport, Value};
}
