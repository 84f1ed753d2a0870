use crate::traits::*;
use std::sync::Arc;
use std::time::Duration;

/// Largest logical message accepted by the receive loop, in bytes
pub const DEFAULT_RECEIVE_BUFFER_SIZE: usize = 1_000_000;

/// Interval between checks for a correlated reply
pub const REPLY_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Number of checks before a correlated request gives up
pub const REPLY_POLL_ATTEMPTS: u32 = 50;

/// How long `send_and_listen` waits for a reply: 50 x 100ms
pub const DEFAULT_REPLY_TIMEOUT: Duration =
    Duration::from_millis(REPLY_POLL_INTERVAL.as_millis() as u64 * REPLY_POLL_ATTEMPTS as u64);

/// Configuration for [`crate::WebSocketClient`]
///
/// Built with [`crate::WebSocketClientBuilder`].
#[derive(Clone)]
pub struct ClientConfig {
    /// Upper bound for one reassembled inbound message
    pub(crate) receive_buffer_size: usize,

    /// Wait ceiling for correlated requests
    pub(crate) reply_timeout: Duration,

    /// Optional handshake header provider (e.g. a bearer token)
    pub(crate) headers: Option<Arc<dyn HeaderProvider>>,
}

impl ClientConfig {
    pub fn receive_buffer_size(&self) -> usize {
        self.receive_buffer_size
    }

    pub fn reply_timeout(&self) -> Duration {
        self.reply_timeout
    }

    /// Check if a header provider is configured
    pub fn has_headers(&self) -> bool {
        self.headers.is_some()
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.receive_buffer_size == 0 {
            return Err(LiveSocketError::Configuration(
                "receive_buffer_size must be greater than zero".into(),
            ));
        }
        if self.reply_timeout.is_zero() {
            return Err(LiveSocketError::Configuration(
                "reply_timeout must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            receive_buffer_size: DEFAULT_RECEIVE_BUFFER_SIZE,
            reply_timeout: DEFAULT_REPLY_TIMEOUT,
            headers: None,
        }
    }
}

impl std::fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientConfig")
            .field("receive_buffer_size", &self.receive_buffer_size)
            .field("reply_timeout", &self.reply_timeout)
            .field("has_headers", &self.headers.is_some())
            .finish()
    }
}
