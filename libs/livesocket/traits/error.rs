use serde::Deserialize;
use serde_json::Value;
use std::fmt;
use thiserror::Error;

/// Main error type for livesocket
#[derive(Error, Debug)]
pub enum LiveSocketError {
    /// A send was attempted before `connect` succeeded (or after a disconnect)
    #[error("Client is not connected")]
    NotConnected,

    /// A send required an authenticated session that has not been established
    #[error("Client is not authenticated")]
    NotAuthenticated,

    /// WebSocket transport error
    #[error("WebSocket error: {0}")]
    WebSocket(String),

    /// The server rejected the upgrade at the HTTP layer
    #[error("{status} - {reason} - {body}")]
    HandshakeRejected {
        status: u16,
        reason: String,
        body: String,
    },

    /// The socket can no longer carry frames (closed, reset, broken pipe)
    #[error("Socket is not usable: {0}")]
    SocketUnusable(String),

    /// Connection ended while the operation was in flight
    #[error("Connection closed: {0}")]
    ConnectionClosed(String),

    /// Outbound packet could not be serialized
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Inbound message could not be decoded
    #[error("Parse error: {0}")]
    ParseError(String),

    /// The server answered a request with an error payload
    #[error("Reply error: {0}")]
    Reply(ReplyError),

    /// Invalid state transition
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),
}

/// Result type for livesocket operations
pub type Result<T> = std::result::Result<T, LiveSocketError>;

/// Error payload carried by a failed reply
///
/// Platforms disagree on the exact shape, so only `code` and `message` are
/// lifted out; the untouched payload stays available in `payload`.
#[derive(Debug, Clone, PartialEq)]
pub struct ReplyError {
    pub code: Option<i64>,
    pub message: Option<String>,
    pub payload: Value,
}

#[derive(Deserialize)]
struct ReplyErrorFields {
    #[serde(default)]
    code: Option<i64>,
    #[serde(default)]
    message: Option<String>,
}

impl ReplyError {
    /// Build a structured error from a raw reply `error` payload
    pub fn from_payload(payload: Value) -> Self {
        match &payload {
            Value::String(message) => Self {
                code: None,
                message: Some(message.clone()),
                payload,
            },
            _ => {
                let fields = ReplyErrorFields::deserialize(&payload).ok();
                Self {
                    code: fields.as_ref().and_then(|f| f.code),
                    message: fields.and_then(|f| f.message),
                    payload,
                }
            }
        }
    }
}

impl fmt::Display for ReplyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.code, self.message.as_deref()) {
            (Some(code), Some(message)) => write!(f, "{} ({})", message, code),
            (None, Some(message)) => write!(f, "{}", message),
            (Some(code), None) => write!(f, "code {}", code),
            (None, None) => write!(f, "{}", self.payload),
        }
    }
}
