use crate::client::WebSocketClient;
use crate::config::{ClientConfig, DEFAULT_RECEIVE_BUFFER_SIZE, DEFAULT_REPLY_TIMEOUT};
use crate::traits::*;
use crate::tungstenite::TungsteniteConnector;
use std::sync::Arc;
use std::time::Duration;

/// Builder for [`WebSocketClient`]
///
/// Nothing is required: the endpoint is passed to `connect`, and every
/// setting has a default.
///
/// # Example
/// ```ignore
/// let client = livesocket::builder()
///     .reply_timeout(Duration::from_secs(10))
///     .headers(StaticHeaders::default().with("Authorization", "OAuth abc"))
///     .build()?;
///
/// client.connect("wss://chat.example.com/socket").await?;
/// ```
pub struct WebSocketClientBuilder {
    receive_buffer_size: usize,
    reply_timeout: Duration,
    headers: Option<Arc<dyn HeaderProvider>>,
    connector: Option<Arc<dyn Connector>>,
}

impl WebSocketClientBuilder {
    /// Create a new builder instance
    pub fn new() -> Self {
        Self {
            receive_buffer_size: DEFAULT_RECEIVE_BUFFER_SIZE,
            reply_timeout: DEFAULT_REPLY_TIMEOUT,
            headers: None,
            connector: None,
        }
    }

    /// Largest inbound message, in bytes
    ///
    /// Also caps the message size negotiated with the default connector.
    pub fn receive_buffer_size(mut self, bytes: usize) -> Self {
        self.receive_buffer_size = bytes;
        self
    }

    /// How long `send_and_listen` waits for the matching reply
    pub fn reply_timeout(mut self, timeout: Duration) -> Self {
        self.reply_timeout = timeout;
        self
    }

    pub fn headers(mut self, provider: impl HeaderProvider + 'static) -> Self {
        self.headers = Some(Arc::new(provider));
        self
    }

    /// Replace the default tokio-tungstenite connector
    pub fn connector(mut self, connector: impl Connector + 'static) -> Self {
        self.connector = Some(Arc::new(connector));
        self
    }

    pub fn build(self) -> Result<WebSocketClient> {
        let config = ClientConfig {
            receive_buffer_size: self.receive_buffer_size,
            reply_timeout: self.reply_timeout,
            headers: self.headers,
        };
        config.validate()?;

        let connector = self.connector.unwrap_or_else(|| {
            Arc::new(TungsteniteConnector::new()) as Arc<dyn Connector>
        });

        Ok(WebSocketClient::new(config, connector))
    }
}

impl Default for WebSocketClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}
