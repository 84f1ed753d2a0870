//! Transport seam
//!
//! The client never touches a socket type directly. A [`Connector`] opens a
//! connection and hands back the two halves:
//!
//! ```text
//! Connector::connect(endpoint)
//!        │
//!        ├──> FrameSink   (owned by the send gate, one write at a time)
//!        └──> FrameSource (owned by the receive loop, one read at a time)
//! ```
//!
//! The production implementation lives in `core::tungstenite`; tests plug in
//! in-memory halves.

use crate::error::Result;
use crate::headers::Headers;
use async_trait::async_trait;
use std::fmt;

/// WebSocket close code for a normal closure
pub const CLOSE_NORMAL: u16 = 1000;

/// One unit read from the transport
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    /// A piece of a logical message. The message is complete once a frame
    /// arrives with `end_of_message` set.
    Data {
        payload: Vec<u8>,
        end_of_message: bool,
    },
    /// The peer initiated (or completed) the close handshake
    Close(DisconnectReason),
}

impl Frame {
    /// A complete single-frame text message
    pub fn text(text: impl Into<String>) -> Self {
        Frame::Data {
            payload: text.into().into_bytes(),
            end_of_message: true,
        }
    }

    /// A fragment of a larger message
    pub fn fragment(payload: impl Into<Vec<u8>>, end_of_message: bool) -> Self {
        Frame::Data {
            payload: payload.into(),
            end_of_message,
        }
    }
}

/// Why a connection ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisconnectReason {
    /// Close code 1000, or a local `disconnect`
    NormalClosure,
    /// No close status available (write found the socket unusable, or the
    /// peer closed without a status code)
    Unknown,
    /// The peer closed with a non-normal status code
    Remote { code: u16, reason: String },
    /// The transport failed while reading
    Aborted(String),
}

impl DisconnectReason {
    /// Classify a close code reported by the peer
    pub fn from_close_code(code: u16, reason: impl Into<String>) -> Self {
        if code == CLOSE_NORMAL {
            DisconnectReason::NormalClosure
        } else {
            DisconnectReason::Remote {
                code,
                reason: reason.into(),
            }
        }
    }

    /// Close code if one is known
    pub fn close_code(&self) -> Option<u16> {
        match self {
            DisconnectReason::NormalClosure => Some(CLOSE_NORMAL),
            DisconnectReason::Remote { code, .. } => Some(*code),
            DisconnectReason::Unknown | DisconnectReason::Aborted(_) => None,
        }
    }
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DisconnectReason::NormalClosure => write!(f, "normal closure"),
            DisconnectReason::Unknown => write!(f, "unknown"),
            DisconnectReason::Remote { code, reason } if reason.is_empty() => {
                write!(f, "closed by peer ({})", code)
            }
            DisconnectReason::Remote { code, reason } => {
                write!(f, "closed by peer ({}): {}", code, reason)
            }
            DisconnectReason::Aborted(cause) => write!(f, "aborted: {}", cause),
        }
    }
}

/// Write half of a connection
#[async_trait]
pub trait FrameSink: Send {
    /// Write one complete text frame
    ///
    /// Must return [`crate::LiveSocketError::SocketUnusable`] when the
    /// connection can no longer carry frames, so the client can treat the
    /// failure as a disconnect.
    async fn send_text(&mut self, text: String) -> Result<()>;

    /// Start the close handshake
    async fn close(&mut self) -> Result<()>;
}

/// Read half of a connection
#[async_trait]
pub trait FrameSource: Send {
    /// Read the next frame
    ///
    /// `None` means the stream ended without a close frame.
    async fn next_frame(&mut self) -> Option<Result<Frame>>;
}

/// Opens connections
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(
        &self,
        endpoint: &str,
        headers: &Headers,
    ) -> Result<(Box<dyn FrameSink>, Box<dyn FrameSource>)>;
}
