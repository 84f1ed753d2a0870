//! Common test utilities for LiveSocket integration tests
//!
//! A small protocol server speaking the method/reply/event dialect over a
//! real tokio-tungstenite socket.

use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpListener;
use tokio::sync::Notify;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;

/// Macro for verbose test output (controlled by TEST_VERBOSE env var)
#[macro_export]
macro_rules! verbose_println {
    ($($arg:tt)*) => {
        if std::env::var("TEST_VERBOSE").is_ok() {
            println!($($arg)*);
        }
    };
}

/// Mock protocol server
///
/// Method requests are answered by name:
/// - `ping`      -> reply with `data: "pong"`
/// - `whoami`    -> reply with `result: {"user": "probe"}` and `data: null`
/// - `forbidden` -> reply with an error payload
/// - `broadcast` -> two events in one array message, no reply
/// - `flood`     -> a 4 KB event followed by a small one, no reply
/// - `kick`      -> close frame with code 4001
/// - anything else is left unanswered
pub struct MockProtocolServer {
    pub addr: SocketAddr,
    shutdown: Arc<Notify>,
    authorization: Arc<Mutex<Option<String>>>,
}

impl MockProtocolServer {
    /// Create and start a new mock server
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let shutdown = Arc::new(Notify::new());
        let authorization = Arc::new(Mutex::new(None));

        let shutdown_clone = shutdown.clone();
        let authorization_clone = authorization.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    result = listener.accept() => {
                        match result {
                            Ok((stream, _)) => {
                                let shutdown = shutdown_clone.clone();
                                let authorization = authorization_clone.clone();
                                tokio::spawn(async move {
                                    Self::handle_connection(stream, shutdown, authorization).await;
                                });
                            }
                            Err(e) => {
                                eprintln!("Accept error: {}", e);
                                break;
                            }
                        }
                    }
                    _ = shutdown_clone.notified() => {
                        break;
                    }
                }
            }
        });

        Self {
            addr,
            shutdown,
            authorization,
        }
    }

    async fn handle_connection(
        stream: tokio::net::TcpStream,
        shutdown: Arc<Notify>,
        authorization: Arc<Mutex<Option<String>>>,
    ) {
        let record_auth = |request: &Request, response: Response| -> Result<Response, ErrorResponse> {
            let header = request
                .headers()
                .get("Authorization")
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);
            *authorization.lock().unwrap() = header;
            Ok(response)
        };

        let ws_stream = match tokio_tungstenite::accept_hdr_async(stream, record_auth).await {
            Ok(ws) => ws,
            Err(e) => {
                eprintln!("WebSocket handshake failed: {}", e);
                return;
            }
        };

        let (mut write, mut read) = ws_stream.split();

        loop {
            tokio::select! {
                msg = read.next() => {
                    let text = match msg {
                        Some(Ok(Message::Text(text))) => text,
                        Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                        Some(Ok(_)) => continue,
                    };

                    let request: Value = match serde_json::from_str(&text) {
                        Ok(v) => v,
                        Err(_) => continue,
                    };
                    let id = request["id"].clone();

                    let response = match request["method"].as_str() {
                        Some("ping") => Some(json!({"id": id, "type": "reply", "data": "pong"})),
                        Some("whoami") => Some(json!({"id": id, "type": "reply", "data": null, "result": {"user": "probe"}})),
                        Some("forbidden") => Some(json!({"id": id, "type": "reply", "error": {"code": 4003, "message": "not allowed"}})),
                        Some("broadcast") => Some(json!([
                            {"type": "event", "event": "live", "data": {"n": 1}},
                            {"type": "event", "event": "live", "data": {"n": 2}}
                        ])),
                        Some("flood") => {
                            let big = json!({"type": "event", "event": "big", "data": "x".repeat(4096)});
                            if write.send(Message::Text(big.to_string())).await.is_err() {
                                break;
                            }
                            Some(json!({"type": "event", "event": "small", "data": {"n": 1}}))
                        }
                        Some("kick") => {
                            let frame = CloseFrame {
                                code: CloseCode::from(4001),
                                reason: "kicked".into(),
                            };
                            let _ = write.send(Message::Close(Some(frame))).await;
                            break;
                        }
                        _ => None,
                    };

                    if let Some(response) = response {
                        if write.send(Message::Text(response.to_string())).await.is_err() {
                            break;
                        }
                    }
                }
                _ = shutdown.notified() => {
                    break;
                }
            }
        }
    }

    /// Get the WebSocket URL for this server
    pub fn ws_url(&self) -> String {
        format!("ws://{}", self.addr)
    }

    /// Authorization header seen on the last handshake
    pub fn last_authorization(&self) -> Option<String> {
        self.authorization.lock().unwrap().clone()
    }

    /// Shutdown the server
    pub fn shutdown(&self) {
        self.shutdown.notify_waiters();
    }
}

impl Drop for MockProtocolServer {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Server that refuses every upgrade with `401 Unauthorized`
///
/// The body is written in a separate segment after the headers.
pub async fn start_rejecting_server(body: &'static str) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        while let Ok((mut stream, _)) = listener.accept().await {
            let mut buf = [0u8; 4096];
            let _ = tokio::io::AsyncReadExt::read(&mut stream, &mut buf).await;
            let head = format!(
                "HTTP/1.1 401 Unauthorized\r\nContent-Type: text/plain\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                body.len()
            );
            let _ = stream.write_all(head.as_bytes()).await;
            let _ = stream.flush().await;
            tokio::time::sleep(std::time::Duration::from_millis(100)).await;
            let _ = stream.write_all(body.as_bytes()).await;
            let _ = stream.shutdown().await;
        }
    });

    addr
}
