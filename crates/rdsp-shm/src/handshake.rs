//! Mutual random-token validation: the precondition the core's invariants
//! require before any mmap offset reference may be emitted. Each side
//! proves it can write into, and read back from, the exact bytes the other
//! side will later treat as shared — catching a misconfigured path (e.g.
//! two containers each mapping a same-named but different file) before any
//! pixel data is trusted to the region instead of the socket.

use std::path::PathBuf;

use shm_primitives::Region;

pub const TOKEN_LEN: usize = 16;

/// Bytes reserved past the ring/slab fast path for each side's token write.
/// Large enough that both sides' random offsets essentially never collide.
pub const TOKEN_AREA_LEN: usize = 4096;

/// `{path, size, token, token_index, token_length}` from the distilled
/// spec's MMAP area descriptor, exchanged as part of the `mmap` capability
/// namespace during `hello`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AreaDescriptor {
    pub path: PathBuf,
    pub size: u64,
    pub token: [u8; TOKEN_LEN],
    pub token_index: u32,
    pub token_length: u32,
}

impl AreaDescriptor {
    pub fn new(path: PathBuf, size: u64, token: [u8; TOKEN_LEN], token_index: u32) -> Self {
        Self {
            path,
            size,
            token,
            token_index,
            token_length: TOKEN_LEN as u32,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum HandshakeError {
    #[error("token_index {index} with token_length {length} does not fit inside a region of {region_len} bytes")]
    OutOfBounds {
        index: u32,
        length: u32,
        region_len: usize,
    },
    #[error("token mismatch: region did not contain the expected bytes at the advertised offset")]
    Mismatch,
}

/// Drives one side's half of the handshake described in the distilled
/// spec's MMAP module: write a random token at a random offset, wait for
/// the peer to report its own, verify it, and only then consider the
/// region trusted for offset/length references.
pub struct TokenHandshake {
    region: Region,
}

impl TokenHandshake {
    /// # Safety
    ///
    /// `region` must be the mapping backing `descriptor.path`, sized at
    /// least `descriptor.size` bytes.
    pub unsafe fn new(region: Region) -> Self {
        Self { region }
    }

    /// Generates a fresh token at a pseudo-random offset inside the
    /// region's token area (the bytes after the segment header and fast
    /// path, so token writes never collide with ring/slab data) and writes
    /// it in place, returning the descriptor to advertise to the peer.
    pub fn generate_and_write(
        &self,
        path: PathBuf,
        token_area_start: usize,
        token_area_len: usize,
    ) -> AreaDescriptor {
        use rand::RngCore;
        let mut rng = rand::thread_rng();

        let mut token = [0u8; TOKEN_LEN];
        rng.fill_bytes(&mut token);

        let max_index = token_area_len.saturating_sub(TOKEN_LEN).max(1);
        let index = token_area_start + (rng.next_u32() as usize % max_index);

        unsafe {
            self.region
                .slice_mut(index, TOKEN_LEN)
                .copy_from_slice(&token);
        }

        AreaDescriptor::new(path, self.region.len() as u64, token, index as u32)
    }

    /// Reads back the bytes the peer claims to have written and compares
    /// them against the token in `descriptor`. The offsets are absolute
    /// within the shared region: the peer's descriptor and this side's view
    /// of the same file must agree on where the bytes live.
    pub fn verify(&self, descriptor: &AreaDescriptor) -> Result<(), HandshakeError> {
        let index = descriptor.token_index as usize;
        let length = descriptor.token_length as usize;
        if index + length > self.region.len() || length != TOKEN_LEN {
            return Err(HandshakeError::OutOfBounds {
                index: descriptor.token_index,
                length: descriptor.token_length,
                region_len: self.region.len(),
            });
        }

        let actual = unsafe { self.region.slice(index, length) };
        if actual == descriptor.token.as_slice() {
            Ok(())
        } else {
            Err(HandshakeError::Mismatch)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shm_primitives::HeapRegion;
    use std::path::PathBuf;

    #[test]
    fn writes_then_verifies_its_own_token() {
        let heap = HeapRegion::new(4096, 64);
        let handshake = unsafe { TokenHandshake::new(heap.region()) };

        let descriptor = handshake.generate_and_write(PathBuf::from("/tmp/x"), 1024, 2048);
        handshake.verify(&descriptor).unwrap();
    }

    #[test]
    fn tampered_token_fails_verification() {
        let heap = HeapRegion::new(4096, 64);
        let handshake = unsafe { TokenHandshake::new(heap.region()) };

        let mut descriptor = handshake.generate_and_write(PathBuf::from("/tmp/x"), 1024, 2048);
        descriptor.token[0] ^= 0xff;

        assert!(matches!(
            handshake.verify(&descriptor),
            Err(HandshakeError::Mismatch)
        ));
    }

    #[test]
    fn out_of_bounds_index_is_rejected() {
        let heap = HeapRegion::new(4096, 64);
        let handshake = unsafe { TokenHandshake::new(heap.region()) };

        let descriptor = AreaDescriptor::new(PathBuf::from("/tmp/x"), 4096, [0u8; TOKEN_LEN], 4090);
        assert!(matches!(
            handshake.verify(&descriptor),
            Err(HandshakeError::OutOfBounds { .. })
        ));
    }
}
