//! Layout of the shared segment backing the mmap fast path: a fixed header
//! followed by a descriptor ring (peer -> peer slot references) and a slab
//! of fixed-size data slots, mirroring the teacher's descriptor-ring + slab
//! SHM layout but scoped to the single-region, single-ring shape this core
//! needs.

use core::sync::atomic::{AtomicU32, AtomicU64};

use shm_primitives::spsc::SpscRingHeader;
use shm_primitives::treiber::TreiberSlabHeader;
use static_assertions::const_assert_eq;

/// Identifies a valid segment and rejects stale or foreign files quickly.
pub const MAGIC: [u8; 8] = *b"RDSPSHM\0";
pub const PROTOCOL_VERSION: u32 = 1;

pub const DEFAULT_RING_CAPACITY: u32 = 256;
pub const DEFAULT_SLOT_SIZE: u32 = 64 * 1024;
pub const DEFAULT_SLOT_COUNT: u32 = 64;

/// Segment-wide header, 128 bytes, cache-line aligned so the handshake
/// words and the ring/slab headers that follow never share a cache line
/// with it.
#[repr(C, align(64))]
pub struct SegmentHeader {
    pub magic: [u8; 8],

    /// Monotonic heartbeat each side bumps so the other can detect a dead
    /// peer instead of waiting forever on a futex that will never wake.
    /// Placed right after `magic` so these 8-byte-aligned fields never
    /// force the compiler to pad the narrower fields below.
    pub client_epoch: AtomicU64,
    pub server_epoch: AtomicU64,

    pub version: u32,
    pub ring_capacity: u32,
    pub slot_size: u32,
    pub slot_count: u32,
    _pad0: u32,

    /// Handshake progress, advanced by [`crate::handshake::TokenHandshake`].
    pub handshake_state: AtomicU32,
    /// Futex word producers/consumers wait on when the ring is empty.
    pub data_ready: AtomicU32,
    /// Futex word allocators wait on when the slab has no free slots.
    pub slot_available: AtomicU32,
    _pad1: u32,

    _reserved: [u8; 68],
}

const_assert_eq!(core::mem::size_of::<SegmentHeader>(), 128);

#[derive(Debug, thiserror::Error)]
pub enum LayoutError {
    #[error("bad magic in segment header")]
    BadMagic,
    #[error("unsupported segment version {0}")]
    UnsupportedVersion(u32),
    #[error("ring_capacity must be a power of two, got {0}")]
    BadRingCapacity(u32),
    #[error("invalid config: {0}")]
    InvalidConfig(&'static str),
}

impl SegmentHeader {
    pub fn init(&mut self, ring_capacity: u32, slot_size: u32, slot_count: u32) {
        self.magic = MAGIC;
        self.version = PROTOCOL_VERSION;
        self.ring_capacity = ring_capacity;
        self.slot_size = slot_size;
        self.slot_count = slot_count;
        self._pad0 = 0;
        self.handshake_state = AtomicU32::new(0);
        self.data_ready = AtomicU32::new(0);
        self.slot_available = AtomicU32::new(0);
        self._pad1 = 0;
        self.client_epoch = AtomicU64::new(0);
        self.server_epoch = AtomicU64::new(0);
        self._reserved = [0; 68];
    }

    pub fn validate(&self) -> Result<(), LayoutError> {
        if self.magic != MAGIC {
            return Err(LayoutError::BadMagic);
        }
        if self.version != PROTOCOL_VERSION {
            return Err(LayoutError::UnsupportedVersion(self.version));
        }
        if !self.ring_capacity.is_power_of_two() {
            return Err(LayoutError::BadRingCapacity(self.ring_capacity));
        }
        if self.slot_size == 0 {
            return Err(LayoutError::InvalidConfig("slot_size must be > 0"));
        }
        if self.slot_count == 0 {
            return Err(LayoutError::InvalidConfig("slot_count must be > 0"));
        }
        Ok(())
    }

    pub fn config(&self) -> (u32, u32, u32) {
        (self.ring_capacity, self.slot_size, self.slot_count)
    }
}

/// Byte offsets of each region within the segment, derived from a config
/// rather than stored, so a freshly mapped file can compute them before the
/// header has been read.
#[derive(Debug, Clone, Copy)]
pub struct SegmentLayout {
    pub header_offset: usize,
    pub ring_offset: usize,
    pub slab_offset: usize,
    pub total_len: usize,
}

impl SegmentLayout {
    pub fn compute(ring_capacity: u32, slot_size: u32, slot_count: u32) -> Self {
        let header_offset = 0;
        let ring_offset = align_up(header_offset + core::mem::size_of::<SegmentHeader>(), 64);
        let ring_bytes = core::mem::size_of::<SpscRingHeader>()
            + ring_capacity as usize * core::mem::size_of::<crate::fastpath::SlotRef>();
        let slab_offset = align_up(ring_offset + ring_bytes, 64);
        let slab_bytes = core::mem::size_of::<TreiberSlabHeader>()
            + slot_count as usize * core::mem::size_of::<shm_primitives::slot::SlotMeta>()
            + slot_count as usize * slot_size as usize;
        let total_len = slab_offset + slab_bytes;

        Self {
            header_offset,
            ring_offset,
            slab_offset,
            total_len,
        }
    }
}

#[inline]
const fn align_up(value: usize, align: usize) -> usize {
    (value + (align - 1)) & !(align - 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_round_trips_through_validate() {
        let mut header = std::mem::MaybeUninit::<SegmentHeader>::zeroed();
        let header = unsafe {
            let ptr = header.as_mut_ptr();
            (*ptr).init(DEFAULT_RING_CAPACITY, DEFAULT_SLOT_SIZE, DEFAULT_SLOT_COUNT);
            &*ptr
        };
        header.validate().unwrap();
        assert_eq!(
            header.config(),
            (DEFAULT_RING_CAPACITY, DEFAULT_SLOT_SIZE, DEFAULT_SLOT_COUNT)
        );
    }

    #[test]
    fn layout_offsets_are_aligned_and_ordered() {
        let layout = SegmentLayout::compute(DEFAULT_RING_CAPACITY, DEFAULT_SLOT_SIZE, DEFAULT_SLOT_COUNT);
        assert_eq!(layout.header_offset, 0);
        assert!(layout.ring_offset >= core::mem::size_of::<SegmentHeader>());
        assert!(layout.ring_offset % 64 == 0);
        assert!(layout.slab_offset > layout.ring_offset);
        assert!(layout.slab_offset % 64 == 0);
        assert!(layout.total_len > layout.slab_offset);
    }
}
