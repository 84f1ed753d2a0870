//! # LiveSocket
//!
//! Client for the message-oriented WebSocket protocols used by live-streaming
//! platform APIs.
//!
//! ## Features
//!
//! - **Typed packets**: outbound requests, inbound methods, replies and events
//! - **Request/reply correlation**: ids assigned per request, replies matched
//!   back with a bounded wait
//! - **Serialized writes**: one frame on the wire at a time, whatever the
//!   number of concurrent callers
//! - **Fan-out**: per-category subscriber channels for every inbound packet
//!   and for disconnects
//! - **Pluggable transport**: tokio-tungstenite by default, any
//!   `Connector` in tests

pub mod traits;
pub mod core;

// Re-export all traits
pub use traits::*;

// Re-export core client functionality
pub use crate::core::{
    assembler, builder, client, config, connection_state, correlation, dispatch, packet,
    packet_id, tungstenite,
    builder::WebSocketClientBuilder,
    client::WebSocketClient,
    config::{ClientConfig, DEFAULT_RECEIVE_BUFFER_SIZE, DEFAULT_REPLY_TIMEOUT},
    connection_state::{AtomicConnectionState, AtomicMetrics, ConnectionState, Metrics},
    packet::{EventPacket, InboundPacket, MethodPacket, PacketType, ReplyPacket, WebSocketPacket},
};

pub(crate) use crate::core::receive;

#[cfg(test)]
pub(crate) use crate::core::memory;

/// Type alias for Result with LiveSocketError
pub type Result<T> = std::result::Result<T, traits::LiveSocketError>;
