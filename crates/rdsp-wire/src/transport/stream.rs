use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex as AsyncMutex;

use crate::error::WireError;
use crate::frame::{Frame, FrameHeader, HEADER_LEN};

use super::TransportBackend;

/// Default maximum frame payload length: large enough for a pixel-encoded
/// frame over a slow link, small enough to bound a single malicious or
/// corrupt length field's damage before the connection is torn down.
const DEFAULT_MAX_PAYLOAD_SIZE: u32 = 256 * 1024 * 1024;

/// A framed transport over any full-duplex byte stream: TCP, a Unix domain
/// socket, or a vsock connection all implement `AsyncRead + AsyncWrite` and
/// share this one implementation, differing only in how the caller
/// constructs the underlying `S`.
#[derive(Clone)]
pub struct StreamTransport {
    inner: Arc<Inner>,
}

struct Inner {
    reader: AsyncMutex<Box<dyn AsyncRead + Unpin + Send>>,
    writer: AsyncMutex<Box<dyn AsyncWrite + Unpin + Send>>,
    closed: AtomicBool,
    max_payload_size: AtomicU32,
    next_send_index: AtomicU64,
}

impl StreamTransport {
    pub fn new<S>(io: S) -> Self
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let (reader, writer) = tokio::io::split(io);
        Self::from_split(reader, writer)
    }

    pub fn from_split<R, W>(reader: R, writer: W) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        Self {
            inner: Arc::new(Inner {
                reader: AsyncMutex::new(Box::new(reader)),
                writer: AsyncMutex::new(Box::new(writer)),
                closed: AtomicBool::new(false),
                max_payload_size: AtomicU32::new(DEFAULT_MAX_PAYLOAD_SIZE),
                next_send_index: AtomicU64::new(0),
            }),
        }
    }

    /// Updates the maximum accepted payload length, typically after hello
    /// negotiation settles on a value lower or higher than the default.
    pub fn set_max_payload_size(&self, size: u32) {
        self.inner.max_payload_size.store(size, Ordering::Release);
    }

    pub fn pair() -> (Self, Self) {
        let (a, b) = tokio::io::duplex(64 * 1024);
        (Self::new(a), Self::new(b))
    }

    fn is_closed_inner(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }
}

impl TransportBackend for StreamTransport {
    async fn send_frame(&self, frame: Frame) -> Result<(), WireError> {
        if self.is_closed_inner() {
            return Err(WireError::Closed);
        }
        let mut writer = self.inner.writer.lock().await;
        writer.write_all(&frame.header.encode()).await?;
        writer.write_all(&frame.payload).await?;
        writer.flush().await?;
        self.inner.next_send_index.fetch_add(1, Ordering::AcqRel);
        Ok(())
    }

    async fn recv_frame(&self) -> Result<Frame, WireError> {
        if self.is_closed_inner() {
            return Err(WireError::Closed);
        }

        let mut reader = self.inner.reader.lock().await;

        let mut header_buf = [0u8; HEADER_LEN];
        match reader.read_exact(&mut header_buf).await {
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                self.close();
                return Err(WireError::Closed);
            }
            Err(e) => return Err(e.into()),
        }

        let header = FrameHeader::decode(&header_buf)?;
        let max_payload = self.inner.max_payload_size.load(Ordering::Acquire);
        if header.length > max_payload {
            return Err(WireError::FrameTooLarge {
                got: header.length,
                max: max_payload,
            });
        }

        let mut payload = vec![0u8; header.length as usize];
        reader.read_exact(&mut payload).await?;

        Ok(Frame { header, payload })
    }

    fn close(&self) {
        self.inner.closed.store(true, Ordering::Release);
    }

    fn is_closed(&self) -> bool {
        self.is_closed_inner()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{CompressionMethod, FrameFlags};

    #[tokio::test]
    async fn round_trips_a_frame_over_a_duplex_stream() {
        let (a, b) = StreamTransport::pair();
        let header = FrameHeader::new(FrameFlags::binary(CompressionMethod::None), 2, 5).unwrap();
        let frame = Frame {
            header,
            payload: b"hello".to_vec(),
        };
        a.send_frame(frame.clone()).await.unwrap();
        let received = b.recv_frame().await.unwrap();
        assert_eq!(received.header, frame.header);
        assert_eq!(received.payload, frame.payload);
    }

    #[tokio::test]
    async fn oversized_length_is_rejected() {
        let (a, b) = StreamTransport::pair();
        b.set_max_payload_size(4);
        let header = FrameHeader::new(FrameFlags::binary(CompressionMethod::None), 0, 5).unwrap();
        let frame = Frame {
            header,
            payload: b"hello".to_vec(),
        };
        a.send_frame(frame).await.unwrap();
        assert!(matches!(
            b.recv_frame().await,
            Err(WireError::FrameTooLarge { .. })
        ));
    }

    #[tokio::test]
    async fn closed_peer_eof_surfaces_as_closed() {
        let (a, b) = StreamTransport::pair();
        drop(a);
        assert!(matches!(b.recv_frame().await, Err(WireError::Closed)));
    }
}
