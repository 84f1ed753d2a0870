//! tokio-tungstenite transport
//!
//! Production [`Connector`]: opens the TCP (and TLS) stream itself, runs the
//! upgrade over it, and adapts the split stream to [`FrameSink`] /
//! [`FrameSource`]. Keeping a handle on the stream lets a rejected upgrade
//! read the rest of the HTTP response body.

use crate::traits::*;
use async_trait::async_trait;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use std::io::ErrorKind;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::error::ProtocolError;
use tokio_tungstenite::tungstenite::http;
use tokio_tungstenite::tungstenite::protocol::WebSocketConfig;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::{client_async_with_config, MaybeTlsStream, WebSocketStream};
use tracing::{debug, warn};

/// How long a rejected upgrade may take to deliver its body
const REJECTION_BODY_TIMEOUT: Duration = Duration::from_secs(2);

/// Rejection bodies are cut off here
const MAX_REJECTION_BODY: usize = 64 * 1024;

type RawStream = MaybeTlsStream<TcpStream>;
type WsStream = WebSocketStream<SharedStream<RawStream>>;

/// Connector backed by `tokio_tungstenite::client_async_with_config`
#[derive(Debug, Clone, Default)]
pub struct TungsteniteConnector;

impl TungsteniteConnector {
    pub fn new() -> Self {
        Self
    }

    fn websocket_config() -> WebSocketConfig {
        let mut config = WebSocketConfig::default();
        // Oversize messages are skipped by the receive loop's assembler
        config.max_message_size = None;
        config
    }
}

#[async_trait]
impl Connector for TungsteniteConnector {
    async fn connect(
        &self,
        endpoint: &str,
        headers: &Headers,
    ) -> Result<(Box<dyn FrameSink>, Box<dyn FrameSource>)> {
        let mut request = endpoint
            .into_client_request()
            .map_err(|e| LiveSocketError::Configuration(format!("invalid endpoint '{}': {}", endpoint, e)))?;

        for (key, value) in headers {
            match (
                key.parse::<http::header::HeaderName>(),
                value.parse::<http::header::HeaderValue>(),
            ) {
                (Ok(name), Ok(value)) => {
                    request.headers_mut().insert(name, value);
                }
                (Err(_), _) => warn!("Invalid header name: {}", key),
                (_, Err(_)) => warn!("Invalid header value for key '{}'", key),
            }
        }

        debug!("Connecting to {} with {} custom headers", endpoint, headers.len());
        let stream = SharedStream::new(open_stream(request.uri()).await?);

        match client_async_with_config(request, stream.clone(), Some(Self::websocket_config())).await {
            Ok((ws, _response)) => {
                let (write, read) = ws.split();
                Ok((
                    Box::new(TungsteniteSink { write }),
                    Box::new(TungsteniteSource { read }),
                ))
            }
            Err(WsError::Http(response)) => Err(read_rejection(response, stream).await),
            Err(other) => Err(LiveSocketError::WebSocket(other.to_string())),
        }
    }
}

/// Resolve, connect and, for `wss`, run the TLS handshake
async fn open_stream(uri: &http::Uri) -> Result<RawStream> {
    let host = uri
        .host()
        .ok_or_else(|| LiveSocketError::Configuration(format!("endpoint '{}' has no host", uri)))?
        .trim_start_matches('[')
        .trim_end_matches(']');

    let secure = match uri.scheme_str() {
        Some("wss") => true,
        Some("ws") => false,
        other => {
            return Err(LiveSocketError::Configuration(format!(
                "unsupported scheme {:?} in '{}'",
                other, uri
            )))
        }
    };
    let port = uri.port_u16().unwrap_or(if secure { 443 } else { 80 });

    let tcp = TcpStream::connect((host, port))
        .await
        .map_err(|e| LiveSocketError::WebSocket(format!("failed to reach {}:{}: {}", host, port, e)))?;

    if !secure {
        return Ok(MaybeTlsStream::Plain(tcp));
    }

    let tls = native_tls::TlsConnector::new()
        .map_err(|e| LiveSocketError::WebSocket(format!("TLS setup failed: {}", e)))?;
    let stream = tokio_native_tls::TlsConnector::from(tls)
        .connect(host, tcp)
        .await
        .map_err(|e| LiveSocketError::WebSocket(format!("TLS handshake with {} failed: {}", host, e)))?;
    Ok(MaybeTlsStream::NativeTls(stream))
}

/// Stream handle that outlives a failed upgrade
///
/// The upgrade consumes one clone; the connector keeps the other. Only one
/// of them is ever polled at a time, so the lock is never contended.
struct SharedStream<S>(Arc<Mutex<S>>);

impl<S> SharedStream<S> {
    fn new(stream: S) -> Self {
        Self(Arc::new(Mutex::new(stream)))
    }
}

impl<S> Clone for SharedStream<S> {
    fn clone(&self) -> Self {
        Self(Arc::clone(&self.0))
    }
}

impl<S: AsyncRead + Unpin> AsyncRead for SharedStream<S> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        Pin::new(&mut *self.0.lock()).poll_read(cx, buf)
    }
}

impl<S: AsyncWrite + Unpin> AsyncWrite for SharedStream<S> {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<std::io::Result<usize>> {
        Pin::new(&mut *self.0.lock()).poll_write(cx, buf)
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Pin::new(&mut *self.0.lock()).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Pin::new(&mut *self.0.lock()).poll_shutdown(cx)
    }
}

/// Write half
pub struct TungsteniteSink {
    write: SplitSink<WsStream, Message>,
}

#[async_trait]
impl FrameSink for TungsteniteSink {
    async fn send_text(&mut self, text: String) -> Result<()> {
        self.write.send(Message::Text(text)).await.map_err(write_error)
    }

    async fn close(&mut self) -> Result<()> {
        self.write.close().await.map_err(write_error)
    }
}

/// Read half
pub struct TungsteniteSource {
    read: SplitStream<WsStream>,
}

#[async_trait]
impl FrameSource for TungsteniteSource {
    async fn next_frame(&mut self) -> Option<Result<Frame>> {
        loop {
            let message = match self.read.next().await? {
                Ok(message) => message,
                Err(WsError::ConnectionClosed) | Err(WsError::AlreadyClosed) => return None,
                Err(e) => return Some(Err(LiveSocketError::WebSocket(e.to_string()))),
            };

            match message {
                Message::Text(text) => return Some(Ok(Frame::text(text))),
                Message::Binary(data) => return Some(Ok(Frame::fragment(data, true))),
                Message::Close(Some(frame)) => {
                    return Some(Ok(Frame::Close(DisconnectReason::from_close_code(
                        u16::from(frame.code),
                        frame.reason.into_owned(),
                    ))))
                }
                Message::Close(None) => return Some(Ok(Frame::Close(DisconnectReason::Unknown))),
                // tungstenite answers pings itself
                Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => continue,
            }
        }
    }
}

/// How the body of a rejection response is delimited
#[derive(Debug, Clone, Copy, PartialEq)]
enum BodyFraming {
    Length(usize),
    Chunked,
    UntilClose,
}

impl BodyFraming {
    fn from_headers(headers: &http::HeaderMap) -> Self {
        let chunked = headers
            .get(http::header::TRANSFER_ENCODING)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.to_ascii_lowercase().contains("chunked"))
            .unwrap_or(false);
        if chunked {
            return BodyFraming::Chunked;
        }

        headers
            .get(http::header::CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse().ok())
            .map(BodyFraming::Length)
            .unwrap_or(BodyFraming::UntilClose)
    }

    fn is_complete(&self, body: &[u8]) -> bool {
        match self {
            BodyFraming::Length(len) => body.len() >= *len,
            BodyFraming::Chunked => decode_chunked(body).is_some(),
            BodyFraming::UntilClose => false,
        }
    }

    fn decode(&self, mut body: Vec<u8>) -> Vec<u8> {
        match self {
            BodyFraming::Length(len) => {
                body.truncate(*len);
                body
            }
            BodyFraming::Chunked => decode_chunked(&body).unwrap_or(body),
            BodyFraming::UntilClose => body,
        }
    }
}

/// Decode a chunked body; `None` until the terminating chunk has arrived
fn decode_chunked(raw: &[u8]) -> Option<Vec<u8>> {
    let mut decoded = Vec::new();
    let mut rest = raw;
    loop {
        let line_end = rest.windows(2).position(|w| w == b"\r\n")?;
        let size_line = std::str::from_utf8(&rest[..line_end]).ok()?;
        let size = usize::from_str_radix(size_line.split(';').next()?.trim(), 16).ok()?;
        rest = &rest[line_end + 2..];

        if size == 0 {
            return Some(decoded);
        }
        if rest.len() < size + 2 {
            return None;
        }
        decoded.extend_from_slice(&rest[..size]);
        rest = &rest[size + 2..];
    }
}

/// Pull body bytes until the framing says the body is complete
async fn read_remaining<S: AsyncRead + Unpin>(
    stream: &mut S,
    body: &mut Vec<u8>,
    framing: BodyFraming,
) -> std::io::Result<()> {
    let mut chunk = [0u8; 4096];
    while !framing.is_complete(body) && body.len() < MAX_REJECTION_BODY {
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            break;
        }
        body.extend_from_slice(&chunk[..n]);
    }
    Ok(())
}

/// Turn a non-101 upgrade response into an error carrying its whole body
async fn read_rejection(
    response: http::Response<Option<Vec<u8>>>,
    mut stream: SharedStream<RawStream>,
) -> LiveSocketError {
    let framing = BodyFraming::from_headers(response.headers());
    let mut body = response.body().clone().unwrap_or_default();

    match tokio::time::timeout(
        REJECTION_BODY_TIMEOUT,
        read_remaining(&mut stream, &mut body, framing),
    )
    .await
    {
        Ok(Ok(())) => {}
        Ok(Err(e)) => debug!("Reading rejection body failed: {}", e),
        Err(_) => debug!("Rejection body still incomplete after {:?}", REJECTION_BODY_TIMEOUT),
    }

    rejection_error(response.status(), &framing.decode(body))
}

fn rejection_error(status: http::StatusCode, body: &[u8]) -> LiveSocketError {
    LiveSocketError::HandshakeRejected {
        status: status.as_u16(),
        reason: status.canonical_reason().unwrap_or("").to_string(),
        body: String::from_utf8_lossy(body).into_owned(),
    }
}

/// Classify a write failure; a dead socket becomes `SocketUnusable`
fn write_error(error: WsError) -> LiveSocketError {
    match error {
        WsError::ConnectionClosed
        | WsError::AlreadyClosed
        | WsError::Protocol(ProtocolError::SendAfterClosing) => {
            LiveSocketError::SocketUnusable(error.to_string())
        }
        WsError::Io(ref io)
            if matches!(
                io.kind(),
                ErrorKind::BrokenPipe
                    | ErrorKind::ConnectionReset
                    | ErrorKind::ConnectionAborted
                    | ErrorKind::NotConnected
            ) =>
        {
            LiveSocketError::SocketUnusable(error.to_string())
        }
        other => LiveSocketError::WebSocket(other.to_string()),
    }
}
