/// Errors that terminate a connection. Per the dispatch contract, every
/// variant here is fatal: there is no partial-recovery path from a framing,
/// compression, or cipher failure mid-stream.
#[derive(Debug, thiserror::Error)]
pub enum WireError {
    #[error("transport closed")]
    Closed,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("unrecognized protocol magic byte {0:#x}")]
    BadMagic(u8),

    #[error("unknown flag combination {0:#010b}")]
    UnknownFlags(u8),

    #[error("chunk index {0} out of range (0-7)")]
    BadChunkIndex(u8),

    #[error("frame length {got} exceeds configured maximum {max}")]
    FrameTooLarge { got: u32, max: u32 },

    #[error("decompression failed: {0}")]
    Decompress(String),

    #[error("decryption failed")]
    Decrypt,

    #[error("encoding-version mismatch: legacy encoding is not enabled for this connection")]
    LegacyDisabled,

    #[error("value encoding error: {0}")]
    Encode(String),

    #[error("value decoding error: {0}")]
    Decode(String),
}

pub type WireResult<T> = Result<T, WireError>;
