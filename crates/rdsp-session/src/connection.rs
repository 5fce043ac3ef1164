//! The per-connection object the dispatch loop owns exclusively: transport,
//! negotiated capabilities, lifecycle state, per-subsystem state, and the
//! outbound priority queue.

use std::any::Any;
use std::sync::atomic::{AtomicU64, Ordering};

use anymap::AnyMap;
use rdsp_proto::Capabilities;
use rdsp_wire::{EnqueueError, Frame, FramePipeline, OutboundWriter, PacketEncoder, Priority, Transport, Value, WireError};

use crate::packet::Packet;
use crate::state::ConnectionState;

/// Up to 7 side channels (chunk index 1-7) travel with one logical packet;
/// index 0 is always the main channel.
const MAX_SIDE_CHANNELS: usize = 7;

#[derive(Debug, thiserror::Error)]
pub enum SendError {
    #[error(transparent)]
    Wire(#[from] WireError),
    #[error(transparent)]
    Enqueue(#[from] EnqueueError),
    #[error("packet carries {0} side-channel chunks, the wire format allows at most 7")]
    TooManyChunks(usize),
}

/// Opaque per-connection identifier, handed out by [`SessionIdAllocator`].
/// Subsystems hold this rather than a reference back into the connection,
/// mirroring the teacher's peer-id back-index pattern instead of a cyclic
/// `Rc`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(pub u64);

#[derive(Debug, Default)]
pub struct SessionIdAllocator(AtomicU64);

impl SessionIdAllocator {
    pub fn new() -> Self {
        Self(AtomicU64::new(1))
    }

    pub fn next(&self) -> SessionId {
        SessionId(self.0.fetch_add(1, Ordering::Relaxed))
    }
}

/// Everything a dispatch loop needs for one connection. Only the dispatch
/// task ever holds `&mut` access; subsystem handlers borrow it for the
/// duration of their call.
pub struct ConnectionSource {
    id: SessionId,
    transport: Transport,
    capabilities: Capabilities,
    state: ConnectionState,
    subsystem_state: AnyMap,
    outbound: OutboundWriter,
    pipeline: FramePipeline,
}

impl ConnectionSource {
    pub fn new(id: SessionId, transport: Transport) -> Self {
        Self {
            id,
            transport,
            capabilities: Capabilities::new(),
            state: ConnectionState::New,
            subsystem_state: AnyMap::new(),
            outbound: OutboundWriter::new(),
            pipeline: FramePipeline::plain(),
        }
    }

    /// Installs the compressor set and cipher negotiated at hello time.
    /// Frames sent and received before this call (the hello exchange
    /// itself) travel uncompressed and unciphered.
    pub fn set_pipeline(&mut self, pipeline: FramePipeline) {
        self.pipeline = pipeline;
    }

    /// Decodes one received frame's payload through the installed
    /// compression/cipher pipeline.
    pub fn decode_frame(&mut self, frame: &Frame) -> Result<Vec<u8>, WireError> {
        self.pipeline.decode(frame)
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn transport(&self) -> &Transport {
        &self.transport
    }

    pub fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    pub fn set_capabilities(&mut self, capabilities: Capabilities) {
        self.capabilities = capabilities;
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn transition(&mut self, state: ConnectionState) {
        self.state = state;
    }

    /// Returns this subsystem's state, creating it with `Default::default()`
    /// the first time it's asked for. One slot per type, keyed structurally
    /// by `T`'s `TypeId` rather than by subsystem name.
    pub fn subsystem_state_mut<T: Any + Default>(&mut self) -> &mut T {
        if !self.subsystem_state.contains::<T>() {
            self.subsystem_state.insert(T::default());
        }
        self.subsystem_state
            .get_mut::<T>()
            .expect("just inserted above")
    }

    pub fn subsystem_state<T: Any>(&self) -> Option<&T> {
        self.subsystem_state.get::<T>()
    }

    /// Queues a frame for sending, gated by whether `packet_type` is allowed
    /// to leave in the connection's current state.
    pub fn enqueue(
        &mut self,
        priority: Priority,
        packet_type: &str,
        frame: Frame,
    ) -> Result<(), EnqueueError> {
        if !self.state.allowed_outbound(packet_type) {
            return Err(EnqueueError::Closing);
        }
        self.outbound.enqueue(priority, frame)
    }

    pub fn pop_outbound(&mut self) -> Option<Frame> {
        self.outbound.pop_next()
    }

    /// Encodes `packet_type` plus `args` as the main channel, trailed by
    /// `chunks` as side channels (index 1-7, in order), and enqueues the
    /// whole burst together so nothing else lands between them in the
    /// outbound queue for this priority.
    pub fn send_packet(
        &mut self,
        priority: Priority,
        packet_type: &str,
        encoder: &dyn PacketEncoder,
        args: Vec<Value>,
        chunks: &[Vec<u8>],
    ) -> Result<(), SendError> {
        if chunks.len() > MAX_SIDE_CHANNELS {
            return Err(SendError::TooManyChunks(chunks.len()));
        }
        if !self.state.allowed_outbound(packet_type) {
            return Err(EnqueueError::Closing.into());
        }

        let values = Packet::new(packet_type, args).into_values();
        let payload = encoder.encode(&values)?;
        let main = self.pipeline.encode(0, &payload)?;

        let mut frames = Vec::with_capacity(1 + chunks.len());
        frames.push(main);
        for (i, chunk) in chunks.iter().enumerate() {
            frames.push(self.pipeline.encode((i + 1) as u8, chunk)?);
        }

        for frame in frames {
            self.outbound.enqueue(priority, frame)?;
        }
        Ok(())
    }

    pub fn begin_close(&mut self, reason: impl Into<String>) {
        self.outbound.begin_close(reason);
    }

    pub fn outbound_bytes_in_flight(&self) -> usize {
        self.outbound.bytes_in_flight()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct PointerState {
        last_sequence: u64,
    }

    #[test]
    fn subsystem_state_is_created_lazily_and_persists() {
        let (transport, _peer) = Transport::mem_pair();
        let mut source = ConnectionSource::new(SessionId(1), transport);

        assert!(source.subsystem_state::<PointerState>().is_none());
        source.subsystem_state_mut::<PointerState>().last_sequence = 5;
        assert_eq!(source.subsystem_state::<PointerState>().unwrap().last_sequence, 5);
    }

    #[test]
    fn enqueue_is_rejected_outside_allowed_outbound_states() {
        let (transport, _peer) = Transport::mem_pair();
        let mut source = ConnectionSource::new(SessionId(1), transport);
        source.transition(ConnectionState::Closing);

        let header = rdsp_wire::FrameHeader::new(
            rdsp_wire::FrameFlags::binary(rdsp_wire::CompressionMethod::None),
            0,
            0,
        )
        .unwrap();
        let frame = Frame { header, payload: Vec::new() };
        assert!(source.enqueue(Priority::Urgent, "pointer-position", frame).is_err());
    }

    #[test]
    fn session_id_allocator_hands_out_increasing_ids() {
        let allocator = SessionIdAllocator::new();
        let a = allocator.next();
        let b = allocator.next();
        assert!(b.0 > a.0);
    }
}
