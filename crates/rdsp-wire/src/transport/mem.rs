use std::sync::Arc;

use tokio::sync::mpsc;

use crate::error::WireError;
use crate::frame::Frame;

use super::TransportBackend;

const CHANNEL_CAPACITY: usize = 64;

/// An in-process transport backed by a pair of `mpsc` channels. Used for
/// the `Mem` transport variant in tests and for connecting a session to a
/// locally spawned worker's control channel when no real IPC is needed.
#[derive(Clone)]
pub struct MemTransport {
    inner: Arc<Inner>,
}

struct Inner {
    tx: mpsc::Sender<Frame>,
    rx: tokio::sync::Mutex<mpsc::Receiver<Frame>>,
    closed: std::sync::atomic::AtomicBool,
}

impl MemTransport {
    pub fn pair() -> (Self, Self) {
        let (tx_a, rx_a) = mpsc::channel(CHANNEL_CAPACITY);
        let (tx_b, rx_b) = mpsc::channel(CHANNEL_CAPACITY);

        let a = Self {
            inner: Arc::new(Inner {
                tx: tx_b,
                rx: tokio::sync::Mutex::new(rx_a),
                closed: std::sync::atomic::AtomicBool::new(false),
            }),
        };
        let b = Self {
            inner: Arc::new(Inner {
                tx: tx_a,
                rx: tokio::sync::Mutex::new(rx_b),
                closed: std::sync::atomic::AtomicBool::new(false),
            }),
        };
        (a, b)
    }

    fn is_closed_inner(&self) -> bool {
        self.inner.closed.load(std::sync::atomic::Ordering::Acquire)
    }
}

impl TransportBackend for MemTransport {
    async fn send_frame(&self, frame: Frame) -> Result<(), WireError> {
        if self.is_closed_inner() {
            return Err(WireError::Closed);
        }
        self.inner.tx.send(frame).await.map_err(|_| WireError::Closed)
    }

    async fn recv_frame(&self) -> Result<Frame, WireError> {
        if self.is_closed_inner() {
            return Err(WireError::Closed);
        }
        let mut rx = self.inner.rx.lock().await;
        rx.recv().await.ok_or(WireError::Closed)
    }

    fn close(&self) {
        self.inner
            .closed
            .store(true, std::sync::atomic::Ordering::Release);
    }

    fn is_closed(&self) -> bool {
        self.is_closed_inner()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{FrameFlags, FrameHeader, CompressionMethod};

    #[tokio::test]
    async fn round_trips_a_frame() {
        let (a, b) = MemTransport::pair();
        let header = FrameHeader::new(FrameFlags::binary(CompressionMethod::None), 0, 5).unwrap();
        let frame = Frame {
            header,
            payload: b"hello".to_vec(),
        };
        a.send_frame(frame.clone()).await.unwrap();
        let received = b.recv_frame().await.unwrap();
        assert_eq!(received.payload, frame.payload);
    }

    #[tokio::test]
    async fn closed_transport_rejects_send() {
        let (a, _b) = MemTransport::pair();
        a.close();
        let header = FrameHeader::new(FrameFlags::binary(CompressionMethod::None), 0, 0).unwrap();
        let frame = Frame {
            header,
            payload: vec![],
        };
        assert!(matches!(a.send_frame(frame).await, Err(WireError::Closed)));
    }

    #[tokio::test]
    async fn dropped_peer_closes_recv() {
        let (a, b) = MemTransport::pair();
        drop(a);
        assert!(b.recv_frame().await.is_err());
    }
}
