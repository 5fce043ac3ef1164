//! Thin per-connection wrapper over the mmap token handshake. The `mmap`
//! capability keys (`file`, `size`, `token`, `token_index`, `token_bytes`)
//! are exchanged inside `hello` itself rather than through a standalone
//! packet type, so this isn't a [`rdsp_session::Subsystem`] — it's a
//! collaborator the window subsystem consults once a pixel packet claims
//! to reference an `(offset, length)` region instead of carrying its bytes
//! inline.

use std::path::Path;

use rdsp_shm::{AreaDescriptor, ShmError, ShmSession};

/// Owns the connection's mmap session, if the hello negotiation enabled it.
#[derive(Default)]
pub struct MmapChannel {
    session: Option<ShmSession>,
}

impl MmapChannel {
    pub fn new() -> Self {
        Self { session: None }
    }

    pub fn create(&mut self, path: impl AsRef<Path>) -> Result<AreaDescriptor, ShmError> {
        let session = ShmSession::create_default(path)?;
        let descriptor = session.offer_token();
        self.session = Some(session);
        Ok(descriptor)
    }

    /// Verifies the peer's advertised descriptor, unlocking offset/length
    /// pixel references for the rest of the connection's lifetime.
    pub fn verify_peer(&mut self, peer_descriptor: &AreaDescriptor) -> Result<(), ShmError> {
        match self.session.as_mut() {
            Some(session) => session.verify_peer(peer_descriptor),
            None => Err(ShmError::NotValidated),
        }
    }

    pub fn is_ready(&self) -> bool {
        self.session.as_ref().is_some_and(ShmSession::is_validated)
    }

    /// Reads bytes a pixel packet claims live at `(offset, length)` in the
    /// mapped region. Only callable once [`MmapChannel::is_ready`] — the
    /// invariant that mmap references must never be trusted before mutual
    /// verification is enforced one layer down, by `ShmSession::fast_path`.
    pub fn fast_path(&mut self) -> Result<&mut rdsp_shm::FastPath, ShmError> {
        self.session.as_mut().ok_or(ShmError::NotValidated)?.fast_path()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_path(tag: &str) -> std::path::PathBuf {
        std::env::temp_dir().join(format!(
            "rdsp-subsystems-mmap-{tag}-{}-{:?}",
            std::process::id(),
            std::thread::current().id()
        ))
    }

    #[test]
    fn channel_is_not_ready_until_peer_token_verifies() {
        let path = scratch_path("channel");
        let _ = std::fs::remove_file(&path);

        let mut channel = MmapChannel::new();
        let descriptor = channel.create(&path).unwrap();
        assert!(!channel.is_ready());

        channel.verify_peer(&descriptor).unwrap();
        assert!(channel.is_ready());

        let _ = std::fs::remove_file(&path);
    }
}
