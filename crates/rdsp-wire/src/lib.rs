//! Packet transport: frame layout, compression, encryption, the argument
//! encoding carried inside a frame's payload, and the transport backends
//! that move frames over TCP, Unix sockets, vsock, WebSockets, or an
//! in-process channel for tests.

mod cipher;
mod compress;
mod error;
mod frame;
mod pipeline;
mod transport;
mod value;
mod writer;

pub use cipher::{AesGcmCipher, CipherContext, MIN_PBKDF2_ITERATIONS, derive_key};
pub use compress::{COMPRESSION_THRESHOLD, Compressor, Lz4Compressor, ZlibCompressor, choose_compressor, compressor_by_name};
pub use error::{WireError, WireResult};
pub use frame::{CompressionMethod, Frame, FrameFlags, FrameHeader, HEADER_LEN, PROTOCOL_MAGIC};
pub use pipeline::FramePipeline;
pub use transport::Transport;
pub use value::{LegacyEncoder, ModernEncoder, PacketEncoder, Value};
pub use writer::{DEFAULT_HIGH_WATERMARK, EnqueueError, OutboundWriter, Priority};
