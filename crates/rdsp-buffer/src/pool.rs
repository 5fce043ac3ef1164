use std::ops::{Deref, DerefMut};

use object_pool::{Pool, Reusable};

/// Default number of scratch buffers kept warm in a pool.
const DEFAULT_POOL_COUNT: usize = 16;
/// Default scratch buffer size: large enough for a typical encoded frame
/// without falling back to an oversized allocation.
const DEFAULT_BUFFER_SIZE: usize = 64 * 1024;

/// A pool of reusable `Vec<u8>` scratch buffers, used by the wire encoder to
/// avoid allocating on every outbound packet.
pub struct BufferPool {
    pool: Pool<Vec<u8>>,
    buffer_size: usize,
}

impl BufferPool {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_POOL_COUNT, DEFAULT_BUFFER_SIZE)
    }

    pub fn with_capacity(count: usize, buffer_size: usize) -> Self {
        let pool = Pool::new(count, || Vec::with_capacity(buffer_size));
        Self { pool, buffer_size }
    }

    /// The nominal buffer size new pool entries are created with. A pulled
    /// buffer may be smaller (if never grown) or larger (if a previous use
    /// grew it past this size and it was returned rather than discarded).
    pub fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    pub fn get(&self) -> PooledBuf<'_> {
        let buffer_size = self.buffer_size;
        let mut buf = self.pool.pull(|| Vec::with_capacity(buffer_size));
        buf.clear();
        PooledBuf(buf)
    }
}

impl Default for BufferPool {
    fn default() -> Self {
        Self::new()
    }
}

/// A `Vec<u8>` pulled from a [`BufferPool`], returned to the pool on drop.
pub struct PooledBuf<'a>(Reusable<'a, Vec<u8>>);

impl Deref for PooledBuf<'_> {
    type Target = Vec<u8>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl DerefMut for PooledBuf<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pulled_buffer_starts_empty() {
        let pool = BufferPool::with_capacity(2, 256);
        let buf = pool.get();
        assert!(buf.is_empty());
        assert_eq!(pool.buffer_size(), 256);
    }

    #[test]
    fn buffer_returns_to_pool_on_drop() {
        let pool = BufferPool::with_capacity(1, 64);
        {
            let mut buf = pool.get();
            buf.extend_from_slice(b"hello");
        }
        // Pulling again should reuse the same (now-cleared) buffer rather
        // than allocate a second one; we can't observe pool internals
        // directly, but the buffer must come back empty.
        let buf = pool.get();
        assert!(buf.is_empty());
    }

    #[test]
    fn oversized_payload_grows_the_pulled_buffer() {
        let pool = BufferPool::with_capacity(1, 8);
        let mut buf = pool.get();
        buf.extend_from_slice(&[0u8; 64]);
        assert_eq!(buf.len(), 64);
    }
}
