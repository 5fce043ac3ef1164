//! Turns a logical packet payload into wire frames and back: picks a
//! compressor from the negotiated set, applies the cipher (if the
//! connection negotiated one), and stamps the frame header accordingly.
//! This is the layer §4.B's compression and encryption policy actually
//! runs in; [`crate::compress`] and [`crate::cipher`] only supply the
//! mechanisms.

use std::sync::Arc;

use crate::cipher::CipherContext;
use crate::compress::{choose_compressor, Compressor};
use crate::error::WireError;
use crate::frame::{CompressionMethod, Frame, FrameFlags, FrameHeader};

/// Decompressed payloads above this size are rejected rather than
/// allocated, so a forged or corrupted length can't be used to exhaust
/// memory.
const MAX_DECOMPRESSED_PAYLOAD: usize = 64 * 1024 * 1024;

/// Per-connection compression/encryption policy, built once hello
/// negotiation agrees on a compressor set and (optionally) a cipher.
/// Frame indices feed the cipher's nonce counter, so one pipeline must own
/// both directions' counters for the lifetime of the connection.
pub struct FramePipeline {
    compressors: Vec<Arc<dyn Compressor>>,
    cipher: Option<Arc<dyn CipherContext>>,
    outbound_index: u64,
    inbound_index: u64,
}

impl FramePipeline {
    pub fn new(compressors: Vec<Arc<dyn Compressor>>, cipher: Option<Arc<dyn CipherContext>>) -> Self {
        Self {
            compressors,
            cipher,
            outbound_index: 0,
            inbound_index: 0,
        }
    }

    /// No negotiated compressor, no cipher — the state before hello
    /// negotiation has run, and the state of any connection whose hello
    /// advertised no compressors and whose server wasn't configured with
    /// `--encryption`.
    pub fn plain() -> Self {
        Self::new(Vec::new(), None)
    }

    /// Builds an outbound frame for `payload` at `chunk_idx` (0 for the
    /// main channel, 1-7 for a side channel travelling with it),
    /// compressing then encrypting per the negotiated policy.
    pub fn encode(&mut self, chunk_idx: u8, payload: &[u8]) -> Result<Frame, WireError> {
        let available: Vec<&dyn Compressor> = self.compressors.iter().map(Arc::as_ref).collect();
        let chosen = choose_compressor(payload.len(), false, &available);
        let (method, mut bytes) = match chosen {
            Some(compressor) => (compressor.method(), compressor.compress(payload)),
            None => (CompressionMethod::None, payload.to_vec()),
        };

        let ciphered = self.cipher.is_some();
        if let Some(cipher) = &self.cipher {
            bytes = cipher.encrypt(self.outbound_index, &bytes)?;
        }

        let header = FrameHeader::new(FrameFlags::binary(method).with_cipher(ciphered), chunk_idx, bytes.len() as u32)?;
        self.outbound_index += 1;
        Ok(Frame { header, payload: bytes })
    }

    /// Recovers a frame's logical payload: decrypts first (if the frame
    /// says it's ciphered), then decompresses per the flagged method. Each
    /// call consumes one inbound frame index, matching the sender's
    /// counter one-for-one regardless of chunk index.
    pub fn decode(&mut self, frame: &Frame) -> Result<Vec<u8>, WireError> {
        let index = self.inbound_index;
        self.inbound_index += 1;

        let mut bytes = frame.payload.clone();
        if frame.header.flags.ciphered {
            let cipher = self.cipher.as_ref().ok_or(WireError::Decrypt)?;
            bytes = cipher.decrypt(index, &bytes)?;
        }

        match frame.header.flags.compression {
            CompressionMethod::None => Ok(bytes),
            other => {
                let compressor = self
                    .compressors
                    .iter()
                    .find(|c| c.method() == other)
                    .ok_or(WireError::Decompress(format!(
                        "frame flagged with a compression method ({other:?}) this connection never negotiated"
                    )))?;
                compressor.decompress(&bytes, MAX_DECOMPRESSED_PAYLOAD)
            }
        }
    }
}

impl Default for FramePipeline {
    fn default() -> Self {
        Self::plain()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compress::{Lz4Compressor, ZlibCompressor};
    use crate::cipher::AesGcmCipher;

    #[test]
    fn round_trips_uncompressed_unciphered() {
        let mut pipeline = FramePipeline::plain();
        let frame = pipeline.encode(0, b"short").unwrap();
        assert_eq!(frame.header.flags.compression, CompressionMethod::None);
        let mut reader = FramePipeline::plain();
        assert_eq!(reader.decode(&frame).unwrap(), b"short");
    }

    #[test]
    fn compresses_large_payloads_and_round_trips() {
        let compressors: Vec<Arc<dyn Compressor>> = vec![Arc::new(Lz4Compressor)];
        let mut writer = FramePipeline::new(compressors.clone(), None);
        let payload = b"the quick brown fox jumps over the lazy dog".repeat(16);
        let frame = writer.encode(0, &payload).unwrap();
        assert_eq!(frame.header.flags.compression, CompressionMethod::Lz4);

        let mut reader = FramePipeline::new(compressors, None);
        assert_eq!(reader.decode(&frame).unwrap(), payload);
    }

    #[test]
    fn encrypts_and_decrypts_with_matching_indices() {
        let key = crate::cipher::derive_key(b"hunter2", b"salt", crate::cipher::MIN_PBKDF2_ITERATIONS);
        let cipher: Arc<dyn CipherContext> = Arc::new(AesGcmCipher::new(&key));
        let mut writer = FramePipeline::new(Vec::new(), Some(cipher.clone()));
        let mut reader = FramePipeline::new(Vec::new(), Some(cipher));

        let a = writer.encode(0, b"first frame").unwrap();
        let b = writer.encode(0, b"second frame").unwrap();
        assert!(a.header.flags.ciphered);
        assert_eq!(reader.decode(&a).unwrap(), b"first frame");
        assert_eq!(reader.decode(&b).unwrap(), b"second frame");
    }

    #[test]
    fn unnegotiated_compression_flag_is_a_decode_error() {
        let compressors: Vec<Arc<dyn Compressor>> = vec![Arc::new(Lz4Compressor)];
        let mut writer = FramePipeline::new(compressors, None);
        let payload = b"the quick brown fox jumps over the lazy dog".repeat(16);
        let mut frame = writer.encode(0, &payload).unwrap();
        // Flip the flag byte to claim zlib instead of the lz4 actually applied.
        let mut encoded = frame.header.encode();
        encoded[1] = 0b0000_1000;
        frame.header = FrameHeader::decode(&encoded).unwrap();

        let mut reader = FramePipeline::new(vec![Arc::new(ZlibCompressor::new())], None);
        assert!(matches!(reader.decode(&frame), Err(WireError::Decompress(_))));
    }

    #[test]
    fn zero_length_compressed_payload_is_a_decode_error() {
        let compressors: Vec<Arc<dyn Compressor>> = vec![Arc::new(Lz4Compressor)];
        let header = FrameHeader::new(FrameFlags::binary(CompressionMethod::Lz4), 0, 0).unwrap();
        let frame = Frame { header, payload: Vec::new() };

        let mut reader = FramePipeline::new(compressors, None);
        assert!(matches!(reader.decode(&frame), Err(WireError::Decompress(_))));
    }

    #[test]
    fn ciphered_flag_without_a_cipher_fails_closed() {
        let key = crate::cipher::derive_key(b"hunter2", b"salt", crate::cipher::MIN_PBKDF2_ITERATIONS);
        let cipher: Arc<dyn CipherContext> = Arc::new(AesGcmCipher::new(&key));
        let mut writer = FramePipeline::new(Vec::new(), Some(cipher));
        let frame = writer.encode(0, b"secret").unwrap();

        let mut reader = FramePipeline::plain();
        assert!(matches!(reader.decode(&frame), Err(WireError::Decrypt)));
    }
}
