use std::fmt;
use std::marker::PhantomData;

use shm_primitives::HeapRegion;

/// A view over a contiguous block of memory, tagged by who owns it.
///
/// This is the common currency passed between the wire decoder, the
/// subsystems, and (on the fast path) the shared memory transport: a frame
/// payload decoded from a TCP stream is `Owned`, a payload read straight out
/// of a peer's mmap'd ring is `Borrowed`, and a buffer handed back from a
/// codec worker's shared region is `Foreign`.
pub enum AlignedBuffer {
    /// A heap allocation we own outright, at the requested alignment.
    Owned(HeapRegion),
    /// A view into memory owned by a peer, valid for the borrow's lifetime.
    Borrowed(BorrowedBuffer),
    /// A foreign allocation released through a caller-supplied callback.
    Foreign(ForeignBuffer),
}

impl AlignedBuffer {
    pub fn owned(len: usize, align: usize) -> Self {
        Self::Owned(HeapRegion::new(len, align))
    }

    /// Wraps a caller-managed view into memory that outlives `'a`.
    ///
    /// # Safety
    ///
    /// `ptr` must be valid for reads (and writes, if `mutable`) for `len`
    /// bytes for the entire lifetime `'a`.
    pub unsafe fn borrowed<'a>(ptr: *mut u8, len: usize, mutable: bool) -> Self
    where
        Self: 'a,
    {
        Self::Borrowed(BorrowedBuffer {
            ptr,
            len,
            mutable,
            _marker: PhantomData,
        })
    }

    /// Wraps a foreign allocation, calling `release` with `(ptr, len)` when
    /// the buffer is dropped.
    ///
    /// # Safety
    ///
    /// `ptr` must be valid for reads and writes for `len` bytes until
    /// `release` is called, and `release` must be the correct way to give
    /// that memory back to whoever allocated it.
    pub unsafe fn foreign(
        ptr: *mut u8,
        len: usize,
        release: Box<dyn FnOnce(*mut u8, usize) + Send>,
    ) -> Self {
        Self::Foreign(ForeignBuffer {
            ptr,
            len,
            release: Some(release),
        })
    }

    pub fn len(&self) -> usize {
        match self {
            Self::Owned(region) => region.len(),
            Self::Borrowed(b) => b.len,
            Self::Foreign(f) => f.len,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn as_ptr(&self) -> *const u8 {
        match self {
            Self::Owned(region) => region.region().as_ptr(),
            Self::Borrowed(b) => b.ptr,
            Self::Foreign(f) => f.ptr,
        }
    }

    pub fn as_slice(&self) -> &[u8] {
        // SAFETY: each variant's constructor establishes validity of
        // `as_ptr()..as_ptr()+len()` for the lifetime of `self`.
        unsafe { std::slice::from_raw_parts(self.as_ptr(), self.len()) }
    }

    /// Returns a mutable view, if this buffer is writable.
    ///
    /// `Borrowed` buffers constructed with `mutable = false` return `None`;
    /// every other variant is always writable.
    pub fn as_mut_slice(&mut self) -> Result<&mut [u8], BufferError> {
        let writable = match self {
            Self::Owned(_) | Self::Foreign(_) => true,
            Self::Borrowed(b) => b.mutable,
        };
        if !writable {
            return Err(BufferError::ReadOnly);
        }
        let ptr = match self {
            Self::Owned(region) => region.region().as_mut_ptr(),
            Self::Borrowed(b) => b.ptr,
            Self::Foreign(f) => f.ptr,
        };
        let len = self.len();
        // SAFETY: writability was just checked, and validity is the same
        // invariant relied on by `as_slice`.
        Ok(unsafe { std::slice::from_raw_parts_mut(ptr, len) })
    }
}

impl fmt::Debug for AlignedBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self {
            Self::Owned(_) => "Owned",
            Self::Borrowed(_) => "Borrowed",
            Self::Foreign(_) => "Foreign",
        };
        f.debug_struct("AlignedBuffer")
            .field("kind", &kind)
            .field("len", &self.len())
            .finish()
    }
}

/// A non-owning view into memory that lives at least as long as `'a`.
pub struct BorrowedBuffer {
    ptr: *mut u8,
    len: usize,
    mutable: bool,
    _marker: PhantomData<*mut ()>,
}

/// A foreign allocation, released through its callback on `Drop`.
pub struct ForeignBuffer {
    ptr: *mut u8,
    len: usize,
    release: Option<Box<dyn FnOnce(*mut u8, usize) + Send>>,
}

impl Drop for ForeignBuffer {
    fn drop(&mut self) {
        if let Some(release) = self.release.take() {
            release(self.ptr, self.len);
        }
    }
}

// SAFETY: the pointers inside `AlignedBuffer` are only dereferenced through
// `as_slice`/`as_mut_slice`, which the borrow checker already serializes;
// cross-thread handoff (e.g. to a codec worker) is the intended use.
unsafe impl Send for AlignedBuffer {}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum BufferError {
    #[error("buffer is read-only")]
    ReadOnly,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn owned_round_trip() {
        let mut buf = AlignedBuffer::owned(64, 16);
        assert_eq!(buf.len(), 64);
        buf.as_mut_slice().unwrap()[0] = 0x42;
        assert_eq!(buf.as_slice()[0], 0x42);
    }

    #[test]
    fn read_only_borrow_rejects_mutation() {
        let mut backing = vec![0u8; 8];
        let mut buf = unsafe { AlignedBuffer::borrowed(backing.as_mut_ptr(), 8, false) };
        assert_eq!(buf.as_mut_slice().unwrap_err(), BufferError::ReadOnly);
    }

    #[test]
    fn foreign_calls_release_on_drop() {
        use std::sync::atomic::{AtomicBool, Ordering};
        use std::sync::Arc;

        let released = Arc::new(AtomicBool::new(false));
        let released_clone = released.clone();
        let mut backing = vec![0u8; 8];
        let ptr = backing.as_mut_ptr();
        let buf = unsafe {
            AlignedBuffer::foreign(
                ptr,
                8,
                Box::new(move |_, _| released_clone.store(true, Ordering::SeqCst)),
            )
        };
        drop(buf);
        assert!(released.load(Ordering::SeqCst));
        // `backing` stays alive long enough for the callback above.
        drop(backing);
    }
}
