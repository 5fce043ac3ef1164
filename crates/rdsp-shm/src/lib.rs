//! MMAP region descriptor, mutual token handshake, and the ring-buffer fast
//! path that lets pixel/audio payloads bypass the transport entirely when
//! both endpoints share a host.

mod fastpath;
mod futex;
mod handshake;
mod mmap;
mod segment;
mod session;

pub use fastpath::{FastPath, FastPathError, SlotRef};
pub use handshake::{AreaDescriptor, HandshakeError, TokenHandshake, TOKEN_AREA_LEN, TOKEN_LEN};
pub use mmap::{MmapError, MmapFile};
pub use segment::{
    LayoutError, SegmentHeader, SegmentLayout, DEFAULT_RING_CAPACITY, DEFAULT_SLOT_COUNT,
    DEFAULT_SLOT_SIZE, MAGIC, PROTOCOL_VERSION,
};
pub use session::{ShmError, ShmSession};
