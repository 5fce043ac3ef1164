//! Length-prefixed framing for [`WorkerControl`] messages over a worker's
//! stdin/stdout pipe. Postcard itself has no built-in message delimiter, so
//! every message is preceded by a 4-byte little-endian length.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::control::WorkerControl;
use crate::error::WorkerError;

/// Control messages are small (ids, lengths, short error strings); cap them
/// well below the bulk-channel thresholds so a corrupted length prefix can't
/// make us allocate an unbounded buffer.
const MAX_MESSAGE_LEN: u32 = 64 * 1024;

pub async fn write_message<W: AsyncWrite + Unpin>(writer: &mut W, message: &WorkerControl) -> Result<(), WorkerError> {
    let encoded = facet_postcard::to_vec(message).map_err(|e| WorkerError::Encode(e.to_string()))?;
    let len = u32::try_from(encoded.len()).map_err(|_| WorkerError::MessageTooLarge(u32::MAX, MAX_MESSAGE_LEN))?;
    if len > MAX_MESSAGE_LEN {
        return Err(WorkerError::MessageTooLarge(len, MAX_MESSAGE_LEN));
    }
    writer.write_all(&len.to_le_bytes()).await.map_err(WorkerError::Io)?;
    writer.write_all(&encoded).await.map_err(WorkerError::Io)?;
    writer.flush().await.map_err(WorkerError::Io)
}

pub async fn read_message<R: AsyncRead + Unpin>(reader: &mut R) -> Result<WorkerControl, WorkerError> {
    let mut len_bytes = [0u8; 4];
    match reader.read_exact(&mut len_bytes).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Err(WorkerError::ChannelClosed),
        Err(e) => return Err(WorkerError::Io(e)),
    }
    let len = u32::from_le_bytes(len_bytes);
    if len > MAX_MESSAGE_LEN {
        return Err(WorkerError::MessageTooLarge(len, MAX_MESSAGE_LEN));
    }
    let mut buf = vec![0u8; len as usize];
    reader.read_exact(&mut buf).await.map_err(WorkerError::Io)?;
    facet_postcard::from_bytes::<WorkerControl>(&buf).map_err(|e| WorkerError::Decode(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn round_trips_through_an_in_memory_pipe() {
        let (mut client, mut server) = tokio::io::duplex(4096);

        let sent = WorkerControl::Init { codec: "h264".into(), width: 1920, height: 1080, quality: 80, speed: 50 };
        write_message(&mut client, &sent).await.unwrap();
        let received = read_message(&mut server).await.unwrap();

        match received {
            WorkerControl::Init { codec, width, height, .. } => {
                assert_eq!(codec, "h264");
                assert_eq!(width, 1920);
                assert_eq!(height, 1080);
            }
            other => panic!("unexpected variant: {other:?}"),
        }
    }

    #[tokio::test]
    async fn closed_pipe_before_any_bytes_reports_channel_closed() {
        let (client, mut server) = tokio::io::duplex(4096);
        drop(client);
        let err = read_message(&mut server).await.unwrap_err();
        assert!(matches!(err, WorkerError::ChannelClosed));
    }
}
