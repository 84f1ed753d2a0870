//! # LiveSocket core
//!
//! The protocol engine: packet model, connection state, send gate, receive
//! loop and reply correlation.
//!
//! ## Example
//!
//! ```rust,ignore
//! use livesocket::{WebSocketClient, WebSocketPacket};
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> livesocket::Result<()> {
//!     let client = livesocket::builder().build()?;
//!     client.connect("wss://chat.example.com/socket").await?;
//!
//!     let methods = client.subscribe_methods();
//!
//!     // Run the platform's own auth handshake, then:
//!     client.set_authenticated(true);
//!
//!     let mut request = WebSocketPacket::method("whoami");
//!     let reply = client.send_and_listen(&mut request, true).await?;
//!     println!("reply: {:?}", reply);
//!
//!     while let Ok(method) = methods.recv() {
//!         println!("{}: {}", method.method, method.parameters);
//!     }
//!     Ok(())
//! }
//! ```

pub mod assembler;
pub mod builder;
pub mod client;
pub mod config;
pub mod connection_state;
pub mod correlation;
pub mod dispatch;
pub mod packet;
pub mod packet_id;
pub(crate) mod receive;
pub mod tungstenite;

#[cfg(test)]
pub(crate) mod memory;

// Re-export main types
pub use builder::WebSocketClientBuilder;
pub use client::WebSocketClient;
pub use config::{ClientConfig, DEFAULT_RECEIVE_BUFFER_SIZE, DEFAULT_REPLY_TIMEOUT};
pub use connection_state::{AtomicConnectionState, AtomicMetrics, ConnectionState, Metrics};
pub use correlation::{PendingReply, ReplyTable};
pub use dispatch::{EventHub, Subscribers};
pub use packet::{
    decode_message, EventPacket, InboundPacket, MethodPacket, PacketType, ReplyPacket,
    WebSocketPacket,
};
pub use packet_id::{PacketIdAllocator, MIN_PACKET_ID};
pub use tungstenite::TungsteniteConnector;

// Re-export traits for convenience
pub use crate::traits::*;

/// Create a new WebSocket client builder
///
/// # Example
/// ```ignore
/// let client = livesocket::builder()
///     .reply_timeout(Duration::from_secs(10))
///     .build()?;
/// ```
pub fn builder() -> WebSocketClientBuilder {
    WebSocketClientBuilder::new()
}
