use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::Mutex as AsyncMutex;
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message;

use crate::error::WireError;
use crate::frame::{Frame, FrameHeader, HEADER_LEN};

use super::TransportBackend;

/// Any IO type the WebSocket handshake can run over; boxed so
/// `WebSocketTransport` has one concrete type regardless of whether the
/// underlying socket is a `TcpStream`, a TLS stream, or an in-memory duplex.
trait AsyncReadWrite: AsyncRead + AsyncWrite + Unpin + Send {}
impl<T: AsyncRead + AsyncWrite + Unpin + Send> AsyncReadWrite for T {}

type BoxedIo = Box<dyn AsyncReadWrite>;

/// A framed transport carried inside WebSocket binary messages: each
/// message holds exactly one frame (header + payload), so there's no
/// separate length-prefix handshake the way there is over a raw stream —
/// the WebSocket framing already delimits messages.
#[derive(Clone)]
pub struct WebSocketTransport {
    inner: Arc<Inner>,
}

struct Inner {
    stream: AsyncMutex<WebSocketStream<BoxedIo>>,
    closed: AtomicBool,
}

impl WebSocketTransport {
    /// Performs the server side of the WebSocket handshake over `io`.
    pub async fn accept<S>(io: S) -> Result<Self, WireError>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let boxed: BoxedIo = Box::new(io);
        let ws = tokio_tungstenite::accept_async(boxed)
            .await
            .map_err(|e| WireError::Io(std::io::Error::other(e)))?;
        Ok(Self::from_stream(ws))
    }

    pub(crate) fn from_stream(ws: WebSocketStream<BoxedIo>) -> Self {
        Self {
            inner: Arc::new(Inner {
                stream: AsyncMutex::new(ws),
                closed: AtomicBool::new(false),
            }),
        }
    }

    fn is_closed_inner(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }
}

impl TransportBackend for WebSocketTransport {
    async fn send_frame(&self, frame: Frame) -> Result<(), WireError> {
        if self.is_closed_inner() {
            return Err(WireError::Closed);
        }
        let mut bytes = Vec::with_capacity(HEADER_LEN + frame.payload.len());
        frame.encode_to(&mut bytes);
        let mut stream = self.inner.stream.lock().await;
        stream
            .send(Message::Binary(bytes.into()))
            .await
            .map_err(|_| WireError::Closed)
    }

    async fn recv_frame(&self) -> Result<Frame, WireError> {
        if self.is_closed_inner() {
            return Err(WireError::Closed);
        }
        let mut stream = self.inner.stream.lock().await;
        loop {
            match stream.next().await {
                Some(Ok(Message::Binary(bytes))) => {
                    if bytes.len() < HEADER_LEN {
                        return Err(WireError::Decode(
                            "websocket message shorter than frame header".into(),
                        ));
                    }
                    let mut header_buf = [0u8; HEADER_LEN];
                    header_buf.copy_from_slice(&bytes[..HEADER_LEN]);
                    let header = FrameHeader::decode(&header_buf)?;
                    let payload = bytes[HEADER_LEN..].to_vec();
                    if payload.len() != header.length as usize {
                        return Err(WireError::Decode(
                            "websocket message length does not match frame header".into(),
                        ));
                    }
                    return Ok(Frame { header, payload });
                }
                Some(Ok(Message::Close(_))) | None => {
                    drop(stream);
                    self.close();
                    return Err(WireError::Closed);
                }
                Some(Ok(_)) => continue, // ping/pong/text: not a frame, keep reading
                Some(Err(_)) => {
                    drop(stream);
                    self.close();
                    return Err(WireError::Closed);
                }
            }
        }
    }

    fn close(&self) {
        self.inner.closed.store(true, Ordering::Release);
    }

    fn is_closed(&self) -> bool {
        self.is_closed_inner()
    }
}
