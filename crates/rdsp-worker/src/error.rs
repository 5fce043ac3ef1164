use std::io;

#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    #[error("failed to spawn worker process")]
    Spawn(#[source] io::Error),

    #[error("worker control channel I/O error")]
    Io(#[source] io::Error),

    #[error("worker control message too large ({0} bytes, max {1})")]
    MessageTooLarge(u32, u32),

    #[error("worker control message encoding failed: {0}")]
    Encode(String),

    #[error("worker control message decoding failed: {0}")]
    Decode(String),

    #[error("worker control channel closed before a complete message was read")]
    ChannelClosed,

    #[error("no bulk fd channel is available for this worker")]
    NoFdChannel,

    #[error("worker reported an error: {0}")]
    WorkerReported(String),

    #[error("worker exited unexpectedly (status: {0:?})")]
    Exited(Option<i32>),
}
