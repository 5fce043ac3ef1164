//! Control-channel payloads exchanged with a codec/audio worker over its
//! stdin/stdout pipe. Bulk pixel and audio bytes never ride in this enum —
//! they go over the bulk channel (an fd-passed shared region on Unix, or an
//! inline-copy fallback) and are referenced here only by length and id.

use facet::Facet;

/// One control message in the worker protocol. `frame_id` correlates a
/// work request with its eventual `FrameReady`/`Error` reply; the worker
/// echoes it back unchanged.
#[derive(Debug, Clone, Facet)]
#[repr(u8)]
pub enum WorkerControl {
    /// Sent once, before any work request, to configure the worker for a
    /// single codec at a fixed picture geometry.
    Init {
        codec: String,
        width: u32,
        height: u32,
        quality: u8,
        speed: u8,
    },
    /// Encode a raw frame already available on the bulk channel.
    EncodeFrame { frame_id: u64, byte_len: u32 },
    /// Decode a compressed frame already available on the bulk channel.
    DecodeFrame { frame_id: u64, byte_len: u32 },
    /// Ask the worker to exit cleanly. The core still enforces the
    /// death-pact signal as a backstop if the worker doesn't exit in time.
    Shutdown,
    /// The result of an `EncodeFrame`/`DecodeFrame` request is ready on the
    /// bulk channel at the given length.
    FrameReady { frame_id: u64, byte_len: u32 },
    /// The request identified by `frame_id` failed. `frame_id` is `None`
    /// for errors that aren't tied to a specific request (e.g. a malformed
    /// `Init`).
    Error { frame_id: Option<u64>, message: String },
}

impl WorkerControl {
    pub fn frame_id(&self) -> Option<u64> {
        match self {
            WorkerControl::EncodeFrame { frame_id, .. }
            | WorkerControl::DecodeFrame { frame_id, .. }
            | WorkerControl::FrameReady { frame_id, .. } => Some(*frame_id),
            WorkerControl::Error { frame_id, .. } => *frame_id,
            WorkerControl::Init { .. } | WorkerControl::Shutdown => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_id_extraction_matches_variant() {
        assert_eq!(WorkerControl::Shutdown.frame_id(), None);
        assert_eq!(WorkerControl::EncodeFrame { frame_id: 7, byte_len: 4 }.frame_id(), Some(7));
        assert_eq!(
            WorkerControl::Error { frame_id: None, message: "boom".into() }.frame_id(),
            None
        );
    }
}
