//! In-memory transport for unit tests
//!
//! `MemoryConnector::pair()` returns the connector the client uses and a
//! `MemoryServer` handle that plays the remote side: it records every frame
//! the client writes, pushes frames to the client, and injects write
//! failures.

use crate::traits::*;
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};

#[derive(Debug, Clone)]
enum WriteFailure {
    ClosedSocket,
    Other(String),
    /// Write never completes, like a peer that stopped reading
    Stall,
}

#[derive(Debug, Default)]
struct Wire {
    bytes: Vec<u8>,
    frame_count: usize,
    chunked: bool,
    failure: Option<WriteFailure>,
    closed: bool,
}

const FRAME_DELIMITER: u8 = b'\n';

pub(crate) struct MemoryConnector {
    halves: Mutex<Option<(MemorySink, MemorySource)>>,
    failure: Mutex<Option<LiveSocketError>>,
}

impl MemoryConnector {
    pub(crate) fn pair() -> (Self, MemoryServer) {
        let wire = Arc::new(Mutex::new(Wire::default()));
        let (inbound_tx, inbound_rx) = unbounded_channel();
        let (outbound_tx, outbound_rx) = unbounded_channel();

        let sink = MemorySink {
            wire: Arc::clone(&wire),
            inbound_tx: inbound_tx.clone(),
            outbound_tx,
        };
        let source = MemorySource { inbound_rx };

        let connector = Self {
            halves: Mutex::new(Some((sink, source))),
            failure: Mutex::new(None),
        };
        let server = MemoryServer {
            wire,
            inbound_tx,
            outbound_rx: Mutex::new(Some(outbound_rx)),
        };
        (connector, server)
    }

    pub(crate) fn failing(error: LiveSocketError) -> Self {
        Self {
            halves: Mutex::new(None),
            failure: Mutex::new(Some(error)),
        }
    }
}

#[async_trait]
impl Connector for MemoryConnector {
    async fn connect(
        &self,
        _endpoint: &str,
        _headers: &Headers,
    ) -> Result<(Box<dyn FrameSink>, Box<dyn FrameSource>)> {
        if let Some(error) = self.failure.lock().take() {
            return Err(error);
        }
        match self.halves.lock().take() {
            Some((sink, source)) => Ok((Box::new(sink), Box::new(source))),
            None => Err(LiveSocketError::WebSocket("memory connection already used".into())),
        }
    }
}

struct MemorySink {
    wire: Arc<Mutex<Wire>>,
    inbound_tx: UnboundedSender<Frame>,
    outbound_tx: UnboundedSender<String>,
}

#[async_trait]
impl FrameSink for MemorySink {
    async fn send_text(&mut self, text: String) -> Result<()> {
        let (chunked, failure) = {
            let wire = self.wire.lock();
            (wire.chunked, wire.failure.clone())
        };

        match failure {
            Some(WriteFailure::ClosedSocket) => {
                return Err(LiveSocketError::SocketUnusable("socket closed".into()))
            }
            Some(WriteFailure::Other(cause)) => return Err(LiveSocketError::WebSocket(cause)),
            Some(WriteFailure::Stall) => std::future::pending::<()>().await,
            None => {}
        }

        if chunked {
            // Interleaving writers would corrupt the wire here
            for chunk in text.as_bytes().chunks(8) {
                self.wire.lock().bytes.extend_from_slice(chunk);
                tokio::task::yield_now().await;
            }
        } else {
            self.wire.lock().bytes.extend_from_slice(text.as_bytes());
        }

        {
            let mut wire = self.wire.lock();
            wire.bytes.push(FRAME_DELIMITER);
            wire.frame_count += 1;
        }
        let _ = self.outbound_tx.send(text);
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        self.wire.lock().closed = true;
        let _ = self.inbound_tx.send(Frame::Close(DisconnectReason::NormalClosure));
        Ok(())
    }
}

struct MemorySource {
    inbound_rx: UnboundedReceiver<Frame>,
}

#[async_trait]
impl FrameSource for MemorySource {
    async fn next_frame(&mut self) -> Option<Result<Frame>> {
        self.inbound_rx.recv().await.map(Ok)
    }
}

/// Remote side of a memory connection
pub(crate) struct MemoryServer {
    wire: Arc<Mutex<Wire>>,
    inbound_tx: UnboundedSender<Frame>,
    outbound_rx: Mutex<Option<UnboundedReceiver<String>>>,
}

impl MemoryServer {
    /// Number of payload bytes the client has written
    pub(crate) fn bytes_written(&self) -> usize {
        let wire = self.wire.lock();
        wire.bytes.len() - wire.frame_count
    }

    /// Every frame the client has written, in order
    pub(crate) fn frames(&self) -> Vec<String> {
        let wire = self.wire.lock();
        wire.bytes
            .split(|b| *b == FRAME_DELIMITER)
            .filter(|frame| !frame.is_empty())
            .map(|frame| String::from_utf8_lossy(frame).into_owned())
            .collect()
    }

    pub(crate) fn closed(&self) -> bool {
        self.wire.lock().closed
    }

    pub(crate) fn set_chunked_writes(&self, chunked: bool) {
        self.wire.lock().chunked = chunked;
    }

    pub(crate) fn fail_writes_with_closed_socket(&self) {
        self.wire.lock().failure = Some(WriteFailure::ClosedSocket);
    }

    pub(crate) fn fail_writes_with(&self, cause: &str) {
        self.wire.lock().failure = Some(WriteFailure::Other(cause.to_string()));
    }

    pub(crate) fn stall_writes(&self) {
        self.wire.lock().failure = Some(WriteFailure::Stall);
    }

    pub(crate) fn push_text(&self, text: impl Into<String>) {
        let _ = self.inbound_tx.send(Frame::text(text));
    }

    pub(crate) fn push_fragment(&self, payload: Vec<u8>, end_of_message: bool) {
        let _ = self.inbound_tx.send(Frame::fragment(payload, end_of_message));
    }

    pub(crate) fn push_close(&self, reason: DisconnectReason) {
        let _ = self.inbound_tx.send(Frame::Close(reason));
    }

    /// Answer every request the client writes with `respond(id, request)`
    pub(crate) fn answer_each<F>(&self, respond: F)
    where
        F: Fn(u64, Value) -> Value + Send + 'static,
    {
        let Some(mut outbound_rx) = self.outbound_rx.lock().take() else {
            panic!("answer_each may only be installed once");
        };
        let inbound_tx = self.inbound_tx.clone();

        tokio::spawn(async move {
            while let Some(text) = outbound_rx.recv().await {
                let request: Value = match serde_json::from_str(&text) {
                    Ok(request) => request,
                    Err(_) => continue,
                };
                let id = request["id"].as_u64().unwrap_or(0);
                let reply = respond(id, request);
                if inbound_tx.send(Frame::text(reply.to_string())).is_err() {
                    break;
                }
            }
        });
    }
}
