//! Reassembly of fragmented messages
//!
//! Frames are appended to one accumulation buffer until the transport marks
//! the end of the message. Every terminal outcome (complete message, oversize,
//! invalid UTF-8) resets the buffer, so a bad message never bleeds into the
//! next one.

use crate::traits::{LiveSocketError, Result};
use tracing::warn;

/// Accumulates frame payloads into complete text messages
#[derive(Debug)]
pub struct MessageAssembler {
    buffer: Vec<u8>,
    max_message_size: usize,
    discarding: bool,
}

impl MessageAssembler {
    pub fn new(max_message_size: usize) -> Self {
        Self {
            buffer: Vec::new(),
            max_message_size,
            discarding: false,
        }
    }

    /// Append one frame
    ///
    /// Returns `Ok(Some(text))` once the message is complete, `Ok(None)` while
    /// more fragments are expected, and `Err` when the finished message has to
    /// be dropped.
    pub fn push(&mut self, payload: &[u8], end_of_message: bool) -> Result<Option<String>> {
        if !self.discarding {
            if self.buffer.len() + payload.len() > self.max_message_size {
                warn!(
                    "Inbound message exceeds {} bytes, discarding",
                    self.max_message_size
                );
                self.buffer.clear();
                self.discarding = true;
            } else {
                self.buffer.extend_from_slice(payload);
            }
        }

        if !end_of_message {
            return Ok(None);
        }

        let bytes = std::mem::take(&mut self.buffer);
        if std::mem::replace(&mut self.discarding, false) {
            return Err(LiveSocketError::ParseError(format!(
                "message larger than {} bytes",
                self.max_message_size
            )));
        }

        String::from_utf8(bytes)
            .map(Some)
            .map_err(|e| LiveSocketError::ParseError(format!("invalid UTF-8: {}", e)))
    }

    /// Bytes buffered for the message in progress
    pub fn pending_len(&self) -> usize {
        self.buffer.len()
    }
}
