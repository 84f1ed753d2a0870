//! # LiveSocket Traits
//!
//! Seams and shared vocabulary for the livesocket client:
//!
//! - **Connector / FrameSink / FrameSource**: the transport the client drives
//! - **HeaderProvider**: handshake headers computed per connection
//! - **LiveSocketError**: the error taxonomy every operation reports through

pub mod error;
pub mod headers;
pub mod transport;

// Re-export commonly used types
pub use error::{LiveSocketError, ReplyError, Result};
pub use headers::{HeaderProvider, Headers, StaticHeaders};
pub use transport::{Connector, DisconnectReason, Frame, FrameSink, FrameSource, CLOSE_NORMAL};
