//! Pluggable per-frame compression.
//!
//! The sender picks a method from the intersection of its configured
//! methods and the peer's advertised decoders (see `rdsp-proto`'s hello
//! resolution). Packets under a small threshold, or already carrying
//! pre-compressed payloads, bypass this layer entirely and are sent with
//! [`CompressionMethod::None`].

use std::sync::Arc;

use crate::error::WireError;
use crate::frame::CompressionMethod;

/// Packets smaller than this are sent uncompressed; the framing and
/// dictionary overhead of any of the supported codecs outweighs the
/// savings below this size.
pub const COMPRESSION_THRESHOLD: usize = 256;

pub trait Compressor: Send + Sync {
    fn method(&self) -> CompressionMethod;
    fn compress(&self, input: &[u8]) -> Vec<u8>;
    fn decompress(&self, input: &[u8], max_len: usize) -> Result<Vec<u8>, WireError>;
}

/// Picks a compressor for an outbound payload given the negotiated set of
/// methods both sides advertised support for. Returns `None` (meaning "send
/// uncompressed") for small or pre-compressed payloads.
pub fn choose_compressor<'a>(
    payload_len: usize,
    already_compressed: bool,
    available: &'a [&'a dyn Compressor],
) -> Option<&'a dyn Compressor> {
    if already_compressed || payload_len < COMPRESSION_THRESHOLD {
        return None;
    }
    available.first().copied()
}

/// Maps a negotiated compressor name (as it appears in a hello's
/// `compressors` list) to the concrete implementation, for building a
/// connection's [`crate::pipeline::FramePipeline`] after negotiation.
/// `lzo`/`brotli` are recognized on the wire (see [`CompressionMethod`])
/// but have no compressor here, so they never get negotiated locally and
/// a peer flagging one is a decode error rather than a silent mismatch.
pub fn compressor_by_name(name: &str) -> Option<Arc<dyn Compressor>> {
    match name {
        "lz4" => Some(Arc::new(Lz4Compressor)),
        "zlib" => Some(Arc::new(ZlibCompressor::new())),
        _ => None,
    }
}

pub struct Lz4Compressor;

impl Compressor for Lz4Compressor {
    fn method(&self) -> CompressionMethod {
        CompressionMethod::Lz4
    }

    fn compress(&self, input: &[u8]) -> Vec<u8> {
        lz4_flex::block::compress_prepend_size(input)
    }

    fn decompress(&self, input: &[u8], max_len: usize) -> Result<Vec<u8>, WireError> {
        let out = lz4_flex::block::decompress_size_prepended(input)
            .map_err(|e| WireError::Decompress(e.to_string()))?;
        if out.len() > max_len {
            return Err(WireError::Decompress(format!(
                "decompressed size {} exceeds limit {}",
                out.len(),
                max_len
            )));
        }
        Ok(out)
    }
}

pub struct ZlibCompressor {
    level: flate2::Compression,
}

impl ZlibCompressor {
    pub fn new() -> Self {
        Self {
            level: flate2::Compression::default(),
        }
    }

    pub fn with_level(level: u32) -> Self {
        Self {
            level: flate2::Compression::new(level),
        }
    }
}

impl Default for ZlibCompressor {
    fn default() -> Self {
        Self::new()
    }
}

impl Compressor for ZlibCompressor {
    fn method(&self) -> CompressionMethod {
        CompressionMethod::Zlib
    }

    fn compress(&self, input: &[u8]) -> Vec<u8> {
        use std::io::Write;
        let mut encoder = flate2::write::ZlibEncoder::new(Vec::new(), self.level);
        // Writing to a Vec-backed encoder never fails.
        encoder.write_all(input).expect("zlib compress");
        encoder.finish().expect("zlib compress")
    }

    fn decompress(&self, input: &[u8], max_len: usize) -> Result<Vec<u8>, WireError> {
        use std::io::Read;
        let mut decoder = flate2::read::ZlibDecoder::new(input).take(max_len as u64 + 1);
        let mut out = Vec::new();
        decoder
            .read_to_end(&mut out)
            .map_err(|e| WireError::Decompress(e.to_string()))?;
        if out.len() > max_len {
            return Err(WireError::Decompress(format!(
                "decompressed size exceeds limit {max_len}"
            )));
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lz4_round_trips() {
        let codec = Lz4Compressor;
        let input = b"the quick brown fox jumps over the lazy dog".repeat(8);
        let compressed = codec.compress(&input);
        let decompressed = codec.decompress(&compressed, input.len() + 16).unwrap();
        assert_eq!(decompressed, input);
    }

    #[test]
    fn zlib_round_trips() {
        let codec = ZlibCompressor::new();
        let input = b"the quick brown fox jumps over the lazy dog".repeat(8);
        let compressed = codec.compress(&input);
        let decompressed = codec.decompress(&compressed, input.len() + 16).unwrap();
        assert_eq!(decompressed, input);
    }

    #[test]
    fn zlib_rejects_oversized_output() {
        let codec = ZlibCompressor::new();
        let input = vec![0u8; 4096];
        let compressed = codec.compress(&input);
        assert!(codec.decompress(&compressed, 16).is_err());
    }

    #[test]
    fn small_payloads_bypass_compression() {
        let lz4 = Lz4Compressor;
        let available: Vec<&dyn Compressor> = vec![&lz4];
        assert!(choose_compressor(16, false, &available).is_none());
        assert!(choose_compressor(4096, true, &available).is_none());
        assert!(choose_compressor(4096, false, &available).is_some());
    }

    #[test]
    fn unknown_compressor_names_resolve_to_none() {
        assert!(compressor_by_name("lz4").is_some());
        assert!(compressor_by_name("zlib").is_some());
        assert!(compressor_by_name("brotli").is_none());
        assert!(compressor_by_name("lzo").is_none());
    }
}
