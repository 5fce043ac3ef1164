//! Bit-exact on-the-wire frame layout: `P | flags | chunk_idx | length(u32 BE) | payload`.

use bitflags::bitflags;

use crate::error::WireError;

/// Protocol magic byte identifying this framing version. Any other leading
/// byte is a different (or corrupt) protocol and is rejected outright.
pub const PROTOCOL_MAGIC: u8 = 0x50; // 'P'

/// Fixed header size: magic + flags + chunk_idx + u32 length.
pub const HEADER_LEN: usize = 1 + 1 + 1 + 4;

bitflags! {
    /// Raw flag bits as they appear on the wire: one bit per compression
    /// method plus binary-vs-text and cipher-applied. At most one
    /// compression bit is ever set at a time — `FrameFlags` is the typed
    /// view that enforces this.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    struct RawFlags: u8 {
        const LZ4      = 0b0000_0001;
        const LZO      = 0b0000_0010;
        const BROTLI   = 0b0000_0100;
        const ZLIB     = 0b0000_1000;
        const TEXT     = 0b0001_0000;
        const CIPHERED = 0b0010_0000;
    }
}

const COMPRESSION_BITS: RawFlags = RawFlags::LZ4
    .union(RawFlags::LZO)
    .union(RawFlags::BROTLI)
    .union(RawFlags::ZLIB);

/// Compression method applied to a frame's payload. At most one method
/// applies per frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionMethod {
    None,
    Lz4,
    Lzo,
    Brotli,
    Zlib,
}

impl CompressionMethod {
    fn raw_bit(self) -> RawFlags {
        match self {
            Self::None => RawFlags::empty(),
            Self::Lz4 => RawFlags::LZ4,
            Self::Lzo => RawFlags::LZO,
            Self::Brotli => RawFlags::BROTLI,
            Self::Zlib => RawFlags::ZLIB,
        }
    }

    fn from_raw(raw: RawFlags) -> Result<Self, WireError> {
        let bits = raw & COMPRESSION_BITS;
        match bits {
            RawFlags::LZ4 => Ok(Self::Lz4),
            RawFlags::LZO => Ok(Self::Lzo),
            RawFlags::BROTLI => Ok(Self::Brotli),
            RawFlags::ZLIB => Ok(Self::Zlib),
            empty if empty.is_empty() => Ok(Self::None),
            _ => Err(WireError::UnknownFlags(raw.bits())),
        }
    }
}

/// Per-frame flags: compression method, binary-vs-text payload kind, and
/// whether the payload is encrypted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameFlags {
    pub compression: CompressionMethod,
    pub text: bool,
    pub ciphered: bool,
}

impl FrameFlags {
    pub fn binary(compression: CompressionMethod) -> Self {
        Self {
            compression,
            text: false,
            ciphered: false,
        }
    }

    pub fn with_cipher(mut self, ciphered: bool) -> Self {
        self.ciphered = ciphered;
        self
    }

    fn to_byte(self) -> u8 {
        let mut raw = self.compression.raw_bit();
        raw.set(RawFlags::TEXT, self.text);
        raw.set(RawFlags::CIPHERED, self.ciphered);
        raw.bits()
    }

    fn from_byte(b: u8) -> Result<Self, WireError> {
        let raw = RawFlags::from_bits(b).ok_or(WireError::UnknownFlags(b))?;
        let compression = CompressionMethod::from_raw(raw)?;
        Ok(Self {
            compression,
            text: raw.contains(RawFlags::TEXT),
            ciphered: raw.contains(RawFlags::CIPHERED),
        })
    }
}

/// Parsed frame header, preceding a frame's payload bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub flags: FrameFlags,
    /// 0 is the main channel; 1-7 are bulk side channels carried alongside
    /// the main packet they logically belong to.
    pub chunk_idx: u8,
    /// Post-compression, post-encryption payload length.
    pub length: u32,
}

impl FrameHeader {
    pub fn new(flags: FrameFlags, chunk_idx: u8, length: u32) -> Result<Self, WireError> {
        if chunk_idx > 7 {
            return Err(WireError::BadChunkIndex(chunk_idx));
        }
        Ok(Self {
            flags,
            chunk_idx,
            length,
        })
    }

    pub fn encode(&self) -> [u8; HEADER_LEN] {
        let mut buf = [0u8; HEADER_LEN];
        buf[0] = PROTOCOL_MAGIC;
        buf[1] = self.flags.to_byte();
        buf[2] = self.chunk_idx;
        buf[3..7].copy_from_slice(&self.length.to_be_bytes());
        buf
    }

    pub fn decode(buf: &[u8; HEADER_LEN]) -> Result<Self, WireError> {
        if buf[0] != PROTOCOL_MAGIC {
            return Err(WireError::BadMagic(buf[0]));
        }
        let flags = FrameFlags::from_byte(buf[1])?;
        let chunk_idx = buf[2];
        if chunk_idx > 7 {
            return Err(WireError::BadChunkIndex(chunk_idx));
        }
        let length = u32::from_be_bytes([buf[3], buf[4], buf[5], buf[6]]);
        Ok(Self {
            flags,
            chunk_idx,
            length,
        })
    }
}

/// A fully assembled frame: header plus payload bytes, ready for transport.
#[derive(Debug, Clone)]
pub struct Frame {
    pub header: FrameHeader,
    pub payload: Vec<u8>,
}

impl Frame {
    pub fn encode_to(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.header.encode());
        out.extend_from_slice(&self.payload);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_round_trips() {
        let flags = FrameFlags::binary(CompressionMethod::Lz4).with_cipher(true);
        let header = FrameHeader::new(flags, 3, 1024).unwrap();
        let encoded = header.encode();
        assert_eq!(encoded[0], PROTOCOL_MAGIC);
        let decoded = FrameHeader::decode(&encoded).unwrap();
        assert_eq!(decoded, header);
    }

    #[test]
    fn rejects_bad_magic() {
        let mut buf = [0u8; HEADER_LEN];
        buf[0] = 0xff;
        assert!(matches!(
            FrameHeader::decode(&buf),
            Err(WireError::BadMagic(0xff))
        ));
    }

    #[test]
    fn rejects_chunk_index_above_seven() {
        let flags = FrameFlags::binary(CompressionMethod::None);
        assert!(matches!(
            FrameHeader::new(flags, 8, 0),
            Err(WireError::BadChunkIndex(8))
        ));
    }

    #[test]
    fn rejects_reserved_flag_bits() {
        let mut buf = [0u8; HEADER_LEN];
        buf[0] = PROTOCOL_MAGIC;
        buf[1] = 0b1000_0000;
        assert!(matches!(
            FrameHeader::decode(&buf),
            Err(WireError::UnknownFlags(_))
        ));
    }
}
