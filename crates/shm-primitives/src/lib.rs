//! Lock-free primitives shared-memory regions are built on:
//! [`treiber::TreiberSlab`] allocates fixed-size slots and [`spsc::SpscRing`]
//! hands their handles between producer and consumer. `rdsp-shm` composes
//! the two into its fast path for picture updates and audio chunks, one
//! slab/ring pair per connection direction.
#![no_std]

#[cfg(any(test, feature = "alloc"))]
extern crate alloc;
#[cfg(feature = "std")]
extern crate std;

pub mod region;
pub mod slot;
pub mod spsc;
pub mod sync;
pub mod treiber;

#[cfg(any(test, feature = "alloc"))]
pub use region::HeapRegion;
pub use region::Region;
pub use slot::{SlotMeta, SlotState};
pub use spsc::{PushResult, SpscConsumer, SpscProducer, SpscRing, SpscRingHeader};
pub use treiber::{AllocResult, FreeError, SlotError, SlotHandle, TreiberSlab, TreiberSlabHeader};

#[cfg(all(test, feature = "loom"))]
mod loom_tests;
