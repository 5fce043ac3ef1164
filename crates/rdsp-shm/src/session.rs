//! Ties the mapped file, segment header, token handshake, and ring/slab
//! fast path into the single object a connection's `mmap` subsystem holds.

use std::path::{Path, PathBuf};

use crate::fastpath::{FastPath, FastPathError};
use crate::handshake::{AreaDescriptor, HandshakeError, TokenHandshake, TOKEN_AREA_LEN};
use crate::mmap::{MmapError, MmapFile};
use crate::segment::{SegmentHeader, SegmentLayout, DEFAULT_RING_CAPACITY, DEFAULT_SLOT_COUNT, DEFAULT_SLOT_SIZE};

#[derive(Debug, thiserror::Error)]
pub enum ShmError {
    #[error(transparent)]
    Mmap(#[from] MmapError),
    #[error(transparent)]
    Layout(#[from] crate::segment::LayoutError),
    #[error(transparent)]
    Handshake(#[from] HandshakeError),
    #[error(transparent)]
    FastPath(#[from] FastPathError),
    #[error("mmap fast path has not completed its token handshake yet")]
    NotValidated,
}

/// Whether this side has offered its token, received and verified the
/// peer's, or both — gating [`ShmSession::fast_path`] per the invariant
/// that mmap references must never be emitted before mutual verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ValidationState {
    Pending,
    Validated,
}

/// One side of a shared-memory fast path: creates or attaches the backing
/// file, runs the token handshake, and once validated exposes the
/// ring-buffer fast path for `(offset, length)` pixel/audio handoff.
pub struct ShmSession {
    mapped: MmapFile,
    layout: SegmentLayout,
    state: ValidationState,
    fast_path: Option<FastPath>,
}

impl ShmSession {
    /// Creates a brand-new backing file and initializes the segment header,
    /// descriptor ring, and slab. This side is the handshake's initiator.
    pub fn create(
        path: impl AsRef<Path>,
        ring_capacity: u32,
        slot_size: u32,
        slot_count: u32,
    ) -> Result<Self, ShmError> {
        let layout = SegmentLayout::compute(ring_capacity, slot_size, slot_count);
        let mapped = MmapFile::create(path, layout.total_len + TOKEN_AREA_LEN)?;

        let region = unsafe { mapped.region() };
        unsafe {
            region
                .get_mut::<SegmentHeader>(layout.header_offset)
                .init(ring_capacity, slot_size, slot_count);
        }
        let fast_path = unsafe { FastPath::init(region, &layout) };

        Ok(Self {
            mapped,
            layout,
            state: ValidationState::Pending,
            fast_path: Some(fast_path),
        })
    }

    /// Creates with the distilled spec's default ring/slot sizing.
    pub fn create_default(path: impl AsRef<Path>) -> Result<Self, ShmError> {
        Self::create(
            path,
            DEFAULT_RING_CAPACITY,
            DEFAULT_SLOT_SIZE,
            DEFAULT_SLOT_COUNT,
        )
    }

    /// Opens a file a peer already created and initialized, attaching to
    /// its existing ring/slab rather than re-initializing them.
    pub fn attach(path: impl AsRef<Path>) -> Result<Self, ShmError> {
        let mapped = MmapFile::open(path)?;
        let region = unsafe { mapped.region() };

        let header = unsafe { region.get::<SegmentHeader>(0) };
        header.validate()?;
        let (ring_capacity, slot_size, slot_count) = header.config();
        let layout = SegmentLayout::compute(ring_capacity, slot_size, slot_count);

        let fast_path = unsafe { FastPath::attach(region, &layout)? };

        Ok(Self {
            mapped,
            layout,
            state: ValidationState::Pending,
            fast_path: Some(fast_path),
        })
    }

    pub fn path(&self) -> &Path {
        self.mapped.path()
    }

    /// Generates this side's token, writes it into the region's token area
    /// (the bytes past the fast path's ring and slab), and returns the
    /// descriptor to advertise in the `mmap` capability namespace.
    pub fn offer_token(&self) -> AreaDescriptor {
        let region = unsafe { self.mapped.region() };
        let handshake = unsafe { TokenHandshake::new(region) };
        let token_area_start = self.layout.total_len;
        let token_area_len = self.mapped.len().saturating_sub(token_area_start).max(1);
        handshake.generate_and_write(self.mapped.path().to_path_buf(), token_area_start, token_area_len)
    }

    /// Verifies the peer's advertised descriptor against this side's view
    /// of the region. Once this returns `Ok`, [`ShmSession::fast_path`]
    /// becomes available.
    pub fn verify_peer(&mut self, peer_descriptor: &AreaDescriptor) -> Result<(), ShmError> {
        let region = unsafe { self.mapped.region() };
        let handshake = unsafe { TokenHandshake::new(region) };
        handshake.verify(peer_descriptor)?;
        self.state = ValidationState::Validated;
        Ok(())
    }

    pub fn is_validated(&self) -> bool {
        self.state == ValidationState::Validated
    }

    /// The ring-buffer fast path, available only once both sides' tokens
    /// have been verified — callers that skip straight here without
    /// validating get a clear error instead of silently emitting mmap
    /// references an unverified peer can't trust.
    pub fn fast_path(&mut self) -> Result<&mut FastPath, ShmError> {
        if self.state != ValidationState::Validated {
            return Err(ShmError::NotValidated);
        }
        self.fast_path.as_mut().ok_or(ShmError::NotValidated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_path(tag: &str) -> PathBuf {
        std::env::temp_dir().join(format!(
            "rdsp-shm-session-{tag}-{}-{:?}",
            std::process::id(),
            std::thread::current().id()
        ))
    }

    #[test]
    fn fast_path_is_locked_until_both_tokens_verify() {
        let path = scratch_path("gate");
        let _ = std::fs::remove_file(&path);

        let mut session = ShmSession::create(&path, 4, 256, 4).unwrap();
        assert!(matches!(session.fast_path(), Err(ShmError::NotValidated)));

        let descriptor = session.offer_token();
        session.verify_peer(&descriptor).unwrap();
        assert!(session.is_validated());
        assert!(session.fast_path().is_ok());

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn attach_reads_back_the_creator_segment_config() {
        let path = scratch_path("attach");
        let _ = std::fs::remove_file(&path);

        let creator = ShmSession::create(&path, 8, 128, 6).unwrap();
        drop(creator);

        let attached = ShmSession::attach(&path).unwrap();
        assert_eq!(attached.layout.total_len, SegmentLayout::compute(8, 128, 6).total_len);

        let _ = std::fs::remove_file(&path);
    }
}
