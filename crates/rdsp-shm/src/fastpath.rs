//! The ring-buffer fast path: once the token handshake has validated both
//! sides, pixel/audio payloads are written into a slab slot and only an
//! `(offset, length)` reference travels through the descriptor ring, so the
//! payload itself never crosses the socket.

use shm_primitives::{AllocResult, Region, SlotHandle, TreiberSlab};
use shm_primitives::spsc::SpscRing;

use crate::segment::SegmentLayout;

/// A reference to a slab slot, the only thing that travels through the
/// descriptor ring. `Copy` so it can sit directly in [`SpscRing`] slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(C)]
pub struct SlotRef {
    pub slot_index: u32,
    pub generation: u32,
    pub offset: u32,
    pub length: u32,
}

#[derive(Debug, thiserror::Error)]
pub enum FastPathError {
    #[error("descriptor ring is full")]
    RingFull,
    #[error("no free slots in the data slab")]
    NoFreeSlots,
    #[error("payload of {len} bytes exceeds the slot size of {slot_size} bytes")]
    PayloadTooLarge { len: usize, slot_size: usize },
    #[error("slab slot error: {0:?}")]
    Slot(shm_primitives::SlotError),
}

impl From<shm_primitives::SlotError> for FastPathError {
    fn from(err: shm_primitives::SlotError) -> Self {
        FastPathError::Slot(err)
    }
}

/// One direction's worth of ring + slab, built over a [`Region`] laid out
/// per [`SegmentLayout`]. A full-duplex connection pairs two of these, one
/// per direction, each rooted at its own region (or region half).
pub struct FastPath {
    region: Region,
    header_offset: usize,
    ring: SpscRing<SlotRef>,
    slab: TreiberSlab,
}

unsafe impl Send for FastPath {}

impl FastPath {
    /// Initializes a fresh ring + slab at the offsets in `layout`.
    ///
    /// # Safety
    ///
    /// `region` must be writable and exclusively owned during
    /// initialization (no other process may be attaching concurrently).
    pub unsafe fn init(region: Region, layout: &SegmentLayout) -> Self {
        let ring = unsafe { SpscRing::init(region, layout.ring_offset, ring_capacity(region, layout)) };
        let slab = unsafe {
            TreiberSlab::init(
                region,
                layout.slab_offset,
                slot_count(region, layout),
                slot_size(region, layout),
            )
        };
        Self {
            region,
            header_offset: layout.header_offset,
            ring,
            slab,
        }
    }

    /// Attaches to a ring + slab a peer already initialized.
    ///
    /// # Safety
    ///
    /// `region` must contain a valid, already-initialized ring and slab at
    /// the offsets in `layout`.
    pub unsafe fn attach(region: Region, layout: &SegmentLayout) -> Result<Self, FastPathError> {
        let ring = unsafe { SpscRing::attach(region, layout.ring_offset) };
        let slab = unsafe {
            TreiberSlab::attach(region, layout.slab_offset)
                .map_err(|_| FastPathError::Slot(shm_primitives::SlotError::InvalidIndex))?
        };
        Ok(Self {
            region,
            header_offset: layout.header_offset,
            ring,
            slab,
        })
    }

    fn header(&self) -> &crate::segment::SegmentHeader {
        unsafe { self.region.get::<crate::segment::SegmentHeader>(self.header_offset) }
    }

    /// Copies `payload` into a freshly allocated slot and publishes a
    /// reference to it on the ring. Returns the reference so the caller can
    /// embed `(offset, length)` in the outbound packet's payload-handoff
    /// field.
    pub fn send(&mut self, payload: &[u8]) -> Result<SlotRef, FastPathError> {
        if payload.len() > self.slab.slot_size() as usize {
            return Err(FastPathError::PayloadTooLarge {
                len: payload.len(),
                slot_size: self.slab.slot_size() as usize,
            });
        }
        let handle = match self.slab.try_alloc() {
            AllocResult::Ok(handle) => handle,
            AllocResult::WouldBlock => return Err(FastPathError::NoFreeSlots),
        };

        unsafe {
            let dst = self.slab.slot_data_ptr(handle);
            std::ptr::copy_nonoverlapping(payload.as_ptr(), dst, payload.len());
        }
        self.slab.mark_in_flight(handle)?;

        let slot_ref = SlotRef {
            slot_index: handle.index,
            generation: handle.generation,
            offset: 0,
            length: payload.len() as u32,
        };

        let (mut producer, _consumer) = self.ring.split();
        match producer.try_push(slot_ref) {
            shm_primitives::spsc::PushResult::Ok => {
                crate::futex::signal(&self.header().data_ready);
                Ok(slot_ref)
            }
            shm_primitives::spsc::PushResult::WouldBlock => {
                let handle = SlotHandle {
                    index: slot_ref.slot_index,
                    generation: slot_ref.generation,
                };
                let _ = self.slab.free(handle);
                Err(FastPathError::RingFull)
            }
        }
    }

    /// Pops the next reference off the ring, if any. The caller is
    /// responsible for calling [`FastPath::release`] once it has read the
    /// slot's bytes.
    pub fn recv(&self) -> Option<SlotRef> {
        let (_producer, mut consumer) = self.ring.split();
        consumer.try_pop()
    }

    /// Borrows the slot's bytes without copying them out.
    ///
    /// # Safety
    ///
    /// `slot_ref` must have come from [`FastPath::recv`] on this same
    /// fast path and not yet have been released.
    pub unsafe fn read(&self, slot_ref: SlotRef) -> &[u8] {
        let ptr = unsafe {
            self.slab
                .slot_data_ptr(SlotHandle {
                    index: slot_ref.slot_index,
                    generation: slot_ref.generation,
                })
                .add(slot_ref.offset as usize)
        };
        unsafe { std::slice::from_raw_parts(ptr, slot_ref.length as usize) }
    }

    /// Returns the slot to the free list once the receiver is done with it.
    pub fn release(&self, slot_ref: SlotRef) -> Result<(), FastPathError> {
        let handle = SlotHandle {
            index: slot_ref.slot_index,
            generation: slot_ref.generation,
        };
        self.slab.free(handle).map_err(FastPathError::from)?;
        crate::futex::signal(&self.header().slot_available);
        Ok(())
    }

    /// Blocks (briefly spin-polling, or parking on a futex on Linux) until
    /// the ring has a reference ready or `timeout` elapses.
    pub fn wait_for_data(&self, timeout: std::time::Duration) {
        let word = &self.header().data_ready;
        let observed = word.load(core::sync::atomic::Ordering::Acquire);
        if self.ring.is_empty() {
            crate::futex::wait(word, observed, timeout);
        }
    }

    pub fn slot_size(&self) -> u32 {
        self.slab.slot_size()
    }

    pub fn slot_count(&self) -> u32 {
        self.slab.slot_count()
    }

    pub fn free_count_approx(&self) -> u32 {
        self.slab.free_count_approx()
    }
}

fn ring_capacity(region: Region, layout: &SegmentLayout) -> u32 {
    let header = unsafe { region.get::<crate::segment::SegmentHeader>(layout.header_offset) };
    header.ring_capacity
}

fn slot_size(region: Region, layout: &SegmentLayout) -> u32 {
    let header = unsafe { region.get::<crate::segment::SegmentHeader>(layout.header_offset) };
    header.slot_size
}

fn slot_count(region: Region, layout: &SegmentLayout) -> u32 {
    let header = unsafe { region.get::<crate::segment::SegmentHeader>(layout.header_offset) };
    header.slot_count
}

#[cfg(test)]
mod tests {
    use super::*;
    use shm_primitives::HeapRegion;

    fn init_pair(ring_capacity: u32, slot_size: u32, slot_count: u32) -> (HeapRegion, SegmentLayout) {
        let layout = SegmentLayout::compute(ring_capacity, slot_size, slot_count);
        let heap = HeapRegion::new(layout.total_len, 64);
        unsafe {
            let header = heap
                .region()
                .get_mut::<crate::segment::SegmentHeader>(layout.header_offset);
            header.init(ring_capacity, slot_size, slot_count);
        }
        (heap, layout)
    }

    #[test]
    fn send_then_recv_round_trips_payload() {
        let (heap, layout) = init_pair(4, 256, 4);
        let mut fast_path = unsafe { FastPath::init(heap.region(), &layout) };

        let sent = fast_path.send(b"hello fast path").unwrap();
        let popped = fast_path.recv().unwrap();
        assert_eq!(sent, popped);

        let bytes = unsafe { fast_path.read(popped) };
        assert_eq!(bytes, b"hello fast path");

        fast_path.release(popped).unwrap();
        assert_eq!(fast_path.free_count_approx(), 4);
    }

    #[test]
    fn oversized_payload_is_rejected() {
        let (heap, layout) = init_pair(4, 16, 4);
        let mut fast_path = unsafe { FastPath::init(heap.region(), &layout) };

        let err = fast_path.send(&[0u8; 17]).unwrap_err();
        assert!(matches!(err, FastPathError::PayloadTooLarge { .. }));
    }

    #[test]
    fn exhausting_slots_reports_no_free_slots() {
        let (heap, layout) = init_pair(8, 16, 2);
        let mut fast_path = unsafe { FastPath::init(heap.region(), &layout) };

        fast_path.send(b"one").unwrap();
        fast_path.send(b"two").unwrap();
        let err = fast_path.send(b"three").unwrap_err();
        assert!(matches!(err, FastPathError::NoFreeSlots));
    }
}
