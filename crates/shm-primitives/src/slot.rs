//! Per-slot metadata shared between a [`crate::treiber::TreiberSlab`] and its
//! consumers: each slot carries a lock-free state machine plus an ABA
//! generation counter.

use crate::sync::{AtomicU32, Ordering};

/// Lifecycle of a single slab slot.
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotState {
    /// On the free list, available for allocation.
    Free = 0,
    /// Allocated and owned by whoever holds the [`crate::treiber::SlotHandle`].
    Allocated = 1,
    /// Allocated and handed off to a peer (e.g. a worker process) that is
    /// actively reading or writing it.
    InFlight = 2,
}

impl SlotState {
    pub fn from_u32(value: u32) -> Option<Self> {
        match value {
            0 => Some(Self::Free),
            1 => Some(Self::Allocated),
            2 => Some(Self::InFlight),
            _ => None,
        }
    }
}

/// Per-slot header stored inline in shared memory next to the slot's data.
///
/// `state` and `generation` are independently atomic so a reader can observe
/// a torn-looking combination only across, never within, a field; callers
/// that need both consistent together re-check `state` after reading
/// `generation` (or vice versa), per the slab's allocate/free protocol.
#[repr(C)]
pub struct SlotMeta {
    pub state: AtomicU32,
    pub generation: AtomicU32,
}

impl SlotMeta {
    /// Resets a slot to its initial, unallocated state. Called once when a
    /// region backing a slab is first initialized.
    pub fn init(&mut self) {
        self.state = AtomicU32::new(SlotState::Free as u32);
        self.generation = AtomicU32::new(0);
    }

    pub fn state(&self) -> SlotState {
        SlotState::from_u32(self.state.load(Ordering::Acquire))
            .expect("shm-primitives: corrupt slot state")
    }

    pub fn generation(&self) -> u32 {
        self.generation.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_round_trips_through_u32() {
        for state in [SlotState::Free, SlotState::Allocated, SlotState::InFlight] {
            assert_eq!(SlotState::from_u32(state as u32), Some(state));
        }
        assert_eq!(SlotState::from_u32(99), None);
    }

    #[test]
    fn init_resets_to_free() {
        let mut meta = SlotMeta {
            state: AtomicU32::new(SlotState::InFlight as u32),
            generation: AtomicU32::new(7),
        };
        meta.init();
        assert_eq!(meta.state(), SlotState::Free);
        assert_eq!(meta.generation(), 0);
    }
}
