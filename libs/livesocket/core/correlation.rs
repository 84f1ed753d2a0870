//! Reply correlation table
//!
//! Maps in-flight request ids to a one-shot slot the receive loop fills when
//! the matching reply arrives.
//!
//! ```text
//! register(id) ──> pending ──fulfill(reply)──> fulfilled ──> waiter removes
//!                     │
//!                     └──timeout / abandon_all──> waiter removes, gets None
//! ```
//!
//! All access goes through one `parking_lot::Mutex`, held only for the map
//! operation itself and never across an await point.

use crate::core::packet::ReplyPacket;
use crate::traits::{LiveSocketError, Result};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::debug;

/// Receiving end of a registered slot
#[derive(Debug)]
pub struct PendingReply {
    id: u32,
    rx: oneshot::Receiver<ReplyPacket>,
}

impl PendingReply {
    pub fn id(&self) -> u32 {
        self.id
    }
}

/// Registry of requests awaiting a reply
#[derive(Debug, Default)]
pub struct ReplyTable {
    pending: Mutex<HashMap<u32, oneshot::Sender<ReplyPacket>>>,
}

impl ReplyTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `id` as pending
    ///
    /// Fails if `id` is zero or already pending; two requests can never share
    /// a slot.
    pub fn register(&self, id: u32) -> Result<PendingReply> {
        if id == 0 {
            return Err(LiveSocketError::InvalidState(
                "cannot register unassigned packet id 0".into(),
            ));
        }

        let mut pending = self.pending.lock();
        if pending.contains_key(&id) {
            return Err(LiveSocketError::InvalidState(format!(
                "packet id {} is already awaiting a reply",
                id
            )));
        }

        let (tx, rx) = oneshot::channel();
        pending.insert(id, tx);
        Ok(PendingReply { id, rx })
    }

    /// Hand a reply to its waiter
    ///
    /// Returns `false` if nobody is waiting for `reply.id` (late, unknown or
    /// already answered). The entry leaves the table here, so a second reply
    /// with the same id is never delivered.
    pub fn fulfill(&self, reply: ReplyPacket) -> bool {
        let sender = self.pending.lock().remove(&reply.id);
        match sender {
            Some(tx) => {
                let id = reply.id;
                if tx.send(reply).is_err() {
                    debug!("Waiter for reply {} already gave up", id);
                    return false;
                }
                true
            }
            None => false,
        }
    }

    /// Drop the slot for `id` if it is still present
    pub fn remove(&self, id: u32) -> bool {
        self.pending.lock().remove(&id).is_some()
    }

    /// Drop every slot; waiters wake up with no reply
    pub fn abandon_all(&self) -> usize {
        let mut pending = self.pending.lock();
        let count = pending.len();
        pending.clear();
        count
    }

    pub fn contains(&self, id: u32) -> bool {
        self.pending.lock().contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.pending.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.lock().is_empty()
    }

    /// Wait for the reply registered in `pending`
    ///
    /// Returns `None` on timeout or if the slot was abandoned. The id is gone
    /// from the table when this returns, whatever the outcome.
    pub async fn wait(&self, pending: PendingReply, timeout: Duration) -> Option<ReplyPacket> {
        let PendingReply { id, rx } = pending;
        let reply = match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(reply)) => Some(reply),
            Ok(Err(_)) => {
                debug!("Reply slot {} abandoned", id);
                None
            }
            Err(_) => {
                debug!("No reply for packet {} within {:?}", id, timeout);
                None
            }
        };
        self.remove(id);
        reply
    }
}
