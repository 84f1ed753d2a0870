//! Receive loop
//!
//! One instance per connection, spawned by `connect`:
//!
//! ```text
//! FrameSource ──> MessageAssembler ──> decode_message ──┬─> Method ──> methods subscribers
//!                                                       ├─> Reply  ──> ReplyTable + replies subscribers
//!                                                       └─> Event  ──> events subscribers
//! ```
//!
//! The loop exits for good on a close frame, a read error, the end of the
//! stream, or a local shutdown; each of these funnels into the client's
//! disconnect signaling. It is never restarted.

use crate::client::ClientInner;
use crate::core::assembler::MessageAssembler;
use crate::core::packet::{decode_message, InboundPacket};
use crate::traits::*;
use std::sync::Arc;
use tokio::sync::Notify;
use tracing::{debug, error, warn};

pub(crate) async fn receive_loop(
    inner: Arc<ClientInner>,
    mut source: Box<dyn FrameSource>,
    epoch: u64,
    shutdown: Arc<Notify>,
) {
    let mut assembler = MessageAssembler::new(inner.config.receive_buffer_size);
    debug!("Receive loop started for connection {}", epoch);

    let reason = loop {
        tokio::select! {
            _ = shutdown.notified() => {
                debug!("Receive loop for connection {} shutting down", epoch);
                break DisconnectReason::NormalClosure;
            }

            frame = source.next_frame() => match frame {
                Some(Ok(Frame::Data { payload, end_of_message })) => {
                    match assembler.push(&payload, end_of_message) {
                        Ok(Some(text)) => dispatch_message(&inner, &text),
                        Ok(None) => {}
                        Err(e) => {
                            inner.metrics.increment_parse_failures();
                            warn!("Dropping inbound message: {}", e);
                        }
                    }
                }
                Some(Ok(Frame::Close(reason))) => {
                    debug!("Peer closed connection {}: {}", epoch, reason);
                    break reason;
                }
                Some(Err(e)) => {
                    error!("WebSocket error: {}", e);
                    break DisconnectReason::Aborted(e.to_string());
                }
                None => {
                    warn!("WebSocket stream closed");
                    break DisconnectReason::NormalClosure;
                }
            }
        }
    };

    inner.signal_disconnect(epoch, reason);
    inner.release_writer(epoch).await;
    debug!("Receive loop for connection {} exiting", epoch);
}

/// Decode one complete message and route every packet in it
fn dispatch_message(inner: &ClientInner, text: &str) {
    let packets = match decode_message(text) {
        Ok(packets) => packets,
        Err(e) => {
            inner.metrics.increment_parse_failures();
            warn!("Parse error: {}", e);
            debug!("Unparseable message: {}", text);
            return;
        }
    };

    for packet in packets {
        inner.metrics.increment_received();
        match packet {
            InboundPacket::Method(method) => {
                debug!("Method received: {}", method.method);
                inner.hub.methods.publish(method);
            }
            InboundPacket::Reply(reply) => {
                if !inner.replies.fulfill(reply.clone()) {
                    inner.metrics.increment_unmatched_replies();
                    debug!("Reply {} has no pending request", reply.id);
                }
                inner.hub.replies.publish(reply);
            }
            InboundPacket::Event(event) => {
                debug!("Event received: {}", event.event);
                inner.hub.events.publish(event);
            }
        }
    }
}
