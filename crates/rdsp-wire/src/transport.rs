//! Transport enum and internal backend trait.
//!
//! The public API is the [`Transport`] enum. Each backend lives in its own
//! module under `transport/` and implements the internal [`TransportBackend`]
//! trait; `enum_dispatch` forwards calls without handwritten `match`
//! boilerplate.

use enum_dispatch::enum_dispatch;

use crate::error::WireError;
use crate::frame::Frame;

#[enum_dispatch]
pub(crate) trait TransportBackend: Send + Sync {
    async fn send_frame(&self, frame: Frame) -> Result<(), WireError>;
    async fn recv_frame(&self) -> Result<Frame, WireError>;
    fn close(&self);
    fn is_closed(&self) -> bool;
}

#[enum_dispatch(TransportBackend)]
pub enum Transport {
    #[cfg(feature = "mem")]
    Mem(mem::MemTransport),
    #[cfg(feature = "stream")]
    Stream(stream::StreamTransport),
    #[cfg(feature = "websocket")]
    WebSocket(websocket::WebSocketTransport),
}

impl Transport {
    pub async fn send_frame(&self, frame: Frame) -> Result<(), WireError> {
        TransportBackend::send_frame(self, frame).await
    }

    pub async fn recv_frame(&self) -> Result<Frame, WireError> {
        TransportBackend::recv_frame(self).await
    }

    pub fn close(&self) {
        TransportBackend::close(self);
    }

    pub fn is_closed(&self) -> bool {
        TransportBackend::is_closed(self)
    }

    #[cfg(feature = "mem")]
    pub fn mem_pair() -> (Self, Self) {
        let (a, b) = mem::MemTransport::pair();
        (Transport::Mem(a), Transport::Mem(b))
    }

    /// Wraps any full-duplex byte stream: TCP, a Unix domain socket, or a
    /// vsock connection all satisfy `AsyncRead + AsyncWrite` and share this
    /// one framing implementation.
    #[cfg(feature = "stream")]
    pub fn stream<S>(io: S) -> Self
    where
        S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin + Send + 'static,
    {
        Transport::Stream(stream::StreamTransport::new(io))
    }

    #[cfg(feature = "stream")]
    pub fn stream_pair() -> (Self, Self) {
        let (a, b) = stream::StreamTransport::pair();
        (Transport::Stream(a), Transport::Stream(b))
    }

    /// Performs the server-side WebSocket handshake over `io` and wraps the
    /// result as a `Transport`.
    #[cfg(feature = "websocket")]
    pub async fn websocket_accept<S>(io: S) -> Result<Self, WireError>
    where
        S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin + Send + 'static,
    {
        Ok(Transport::WebSocket(
            websocket::WebSocketTransport::accept(io).await?,
        ))
    }
}

#[cfg(feature = "mem")]
pub mod mem;
#[cfg(feature = "stream")]
pub mod stream;
#[cfg(feature = "websocket")]
pub mod websocket;
