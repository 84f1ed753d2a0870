//! Lock-free connection state and metrics
//!
//! The `connected` and `authenticated` flags share one atomic word with the
//! connection epoch:
//!
//! ```text
//!  63                              2   1   0
//! ┌──────────────────────────────────┬───┬───┐
//! │ epoch                            │ A │ C │
//! └──────────────────────────────────┴───┴───┘
//! ```
//!
//! Clearing both flags is a single compare-exchange, and a receive loop that
//! belongs to an old epoch can never clear a newer connection.

use std::sync::atomic::{AtomicU64, Ordering};

const CONNECTED: u64 = 0b01;
const AUTHENTICATED: u64 = 0b10;
const FLAG_MASK: u64 = CONNECTED | AUTHENTICATED;
const EPOCH_SHIFT: u32 = 2;

/// Point-in-time view of the connection flags
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionState {
    pub connected: bool,
    pub authenticated: bool,
    pub epoch: u64,
}

impl ConnectionState {
    fn from_bits(bits: u64) -> Self {
        Self {
            connected: bits & CONNECTED != 0,
            authenticated: bits & AUTHENTICATED != 0,
            epoch: bits >> EPOCH_SHIFT,
        }
    }
}

/// Atomic holder for the connection flags
#[derive(Debug)]
pub struct AtomicConnectionState {
    bits: AtomicU64,
}

impl AtomicConnectionState {
    /// Disconnected, unauthenticated, epoch 0
    pub fn new() -> Self {
        Self {
            bits: AtomicU64::new(0),
        }
    }

    #[inline]
    pub fn get(&self) -> ConnectionState {
        ConnectionState::from_bits(self.bits.load(Ordering::Acquire))
    }

    #[inline]
    pub fn is_connected(&self) -> bool {
        self.bits.load(Ordering::Acquire) & CONNECTED != 0
    }

    #[inline]
    pub fn is_authenticated(&self) -> bool {
        self.bits.load(Ordering::Acquire) & AUTHENTICATED != 0
    }

    /// Start a new connection: bump the epoch, set `connected`, clear
    /// `authenticated`. Returns the new epoch.
    pub fn begin_connection(&self) -> u64 {
        let mut current = self.bits.load(Ordering::Acquire);
        loop {
            let epoch = (current >> EPOCH_SHIFT).wrapping_add(1);
            let next = (epoch << EPOCH_SHIFT) | CONNECTED;
            match self
                .bits
                .compare_exchange_weak(current, next, Ordering::AcqRel, Ordering::Acquire)
            {
                Ok(_) => return epoch,
                Err(actual) => current = actual,
            }
        }
    }

    /// Set or clear `authenticated`. Only takes effect while connected;
    /// returns whether the flag was applied.
    pub fn set_authenticated(&self, authenticated: bool) -> bool {
        let mut current = self.bits.load(Ordering::Acquire);
        loop {
            if current & CONNECTED == 0 {
                return false;
            }
            let next = if authenticated {
                current | AUTHENTICATED
            } else {
                current & !AUTHENTICATED
            };
            match self
                .bits
                .compare_exchange_weak(current, next, Ordering::AcqRel, Ordering::Acquire)
            {
                Ok(_) => return true,
                Err(actual) => current = actual,
            }
        }
    }

    /// Clear both flags if `epoch` is still the live connection
    ///
    /// Returns `true` for exactly one caller per epoch.
    pub fn end_connection(&self, epoch: u64) -> bool {
        let mut current = self.bits.load(Ordering::Acquire);
        loop {
            if current >> EPOCH_SHIFT != epoch || current & CONNECTED == 0 {
                return false;
            }
            let next = current & !FLAG_MASK;
            match self
                .bits
                .compare_exchange_weak(current, next, Ordering::AcqRel, Ordering::Acquire)
            {
                Ok(_) => return true,
                Err(actual) => current = actual,
            }
        }
    }
}

impl Default for AtomicConnectionState {
    fn default() -> Self {
        Self::new()
    }
}

/// Client metrics snapshot
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Metrics {
    pub packets_sent: u64,
    pub packets_received: u64,
    pub parse_failures: u64,
    pub unmatched_replies: u64,
}

/// Atomic counters behind [`Metrics`]
#[derive(Debug, Default)]
pub struct AtomicMetrics {
    packets_sent: AtomicU64,
    packets_received: AtomicU64,
    parse_failures: AtomicU64,
    unmatched_replies: AtomicU64,
}

impl AtomicMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn increment_sent(&self) {
        self.packets_sent.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn increment_received(&self) {
        self.packets_received.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn increment_parse_failures(&self) {
        self.parse_failures.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn increment_unmatched_replies(&self) {
        self.unmatched_replies.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> Metrics {
        Metrics {
            packets_sent: self.packets_sent.load(Ordering::Relaxed),
            packets_received: self.packets_received.load(Ordering::Relaxed),
            parse_failures: self.parse_failures.load(Ordering::Relaxed),
            unmatched_replies: self.unmatched_replies.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lifecycle() {
        let state = AtomicConnectionState::new();
        assert!(!state.is_connected());
        assert!(!state.set_authenticated(true), "cannot authenticate while disconnected");

        let epoch = state.begin_connection();
        assert_eq!(epoch, 1);
        assert!(state.is_connected());
        assert!(!state.is_authenticated());

        assert!(state.set_authenticated(true));
        assert_eq!(
            state.get(),
            ConnectionState {
                connected: true,
                authenticated: true,
                epoch: 1
            }
        );

        assert!(state.end_connection(epoch));
        assert!(!state.is_connected());
        assert!(!state.is_authenticated());
        assert!(!state.end_connection(epoch), "second end for the same epoch is a no-op");
    }

    #[test]
    fn test_stale_epoch_cannot_clear_new_connection() {
        let state = AtomicConnectionState::new();
        let old = state.begin_connection();
        assert!(state.end_connection(old));

        let new = state.begin_connection();
        state.set_authenticated(true);
        assert!(!state.end_connection(old));
        assert!(state.is_connected());
        assert!(state.is_authenticated());
        assert!(state.end_connection(new));
    }

    #[test]
    fn test_reconnect_clears_authentication() {
        let state = AtomicConnectionState::new();
        state.begin_connection();
        state.set_authenticated(true);
        state.begin_connection();
        assert!(!state.is_authenticated());
    }

    #[test]
    fn test_metrics_snapshot() {
        let metrics = AtomicMetrics::new();
        metrics.increment_sent();
        metrics.increment_sent();
        metrics.increment_received();
        metrics.increment_parse_failures();
        metrics.increment_unmatched_replies();

        assert_eq!(
            metrics.snapshot(),
            Metrics {
                packets_sent: 2,
                packets_received: 1,
                parse_failures: 1,
                unmatched_replies: 1,
            }
        );
    }
}
