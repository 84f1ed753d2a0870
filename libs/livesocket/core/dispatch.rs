//! Subscriber fan-out
//!
//! Each notification category has its own subscriber list. Subscribing hands
//! out the receiving end of an unbounded crossbeam channel; publishing pushes a
//! clone to every live subscriber and prunes the ones whose receiver was
//! dropped. Publishing never blocks the receive loop.

use crate::core::packet::{EventPacket, MethodPacket, ReplyPacket, WebSocketPacket};
use crate::traits::DisconnectReason;
use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::Mutex;

/// Subscriber list for one notification category
#[derive(Debug)]
pub struct Subscribers<T> {
    senders: Mutex<Vec<Sender<T>>>,
}

impl<T: Clone> Subscribers<T> {
    pub fn new() -> Self {
        Self {
            senders: Mutex::new(Vec::new()),
        }
    }

    pub fn subscribe(&self) -> Receiver<T> {
        let (tx, rx) = unbounded();
        self.senders.lock().push(tx);
        rx
    }

    /// Deliver `item` to every subscriber, returning how many received it
    pub fn publish(&self, item: T) -> usize {
        let mut senders = self.senders.lock();
        senders.retain(|tx| tx.send(item.clone()).is_ok());
        senders.len()
    }

    pub fn len(&self) -> usize {
        self.senders.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.senders.lock().is_empty()
    }
}

impl<T: Clone> Default for Subscribers<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// All notification channels a client exposes
#[derive(Debug, Default)]
pub struct EventHub {
    pub packet_sent: Subscribers<WebSocketPacket>,
    pub methods: Subscribers<MethodPacket>,
    pub replies: Subscribers<ReplyPacket>,
    pub events: Subscribers<EventPacket>,
    pub disconnects: Subscribers<DisconnectReason>,
}

impl EventHub {
    pub fn new() -> Self {
        Self::default()
    }
}
