//! Correlation id assignment
//!
//! Ids come from a counter that starts at a random point and only moves
//! forward, wrapping from `u32::MAX` back to [`MIN_PACKET_ID`]. Candidates
//! that are still awaiting a reply are skipped, so an id is never handed out
//! twice while in flight.

use parking_lot::Mutex;
use rand::Rng;

/// Lowest id ever assigned; ids below this are left for callers that
/// pre-assign their own.
pub const MIN_PACKET_ID: u32 = 100;

/// Hands out non-zero correlation ids
#[derive(Debug)]
pub struct PacketIdAllocator {
    next: Mutex<u32>,
}

impl PacketIdAllocator {
    /// Start from a random point in `[MIN_PACKET_ID, u32::MAX / 2]`
    pub fn new() -> Self {
        let start = rand::thread_rng().gen_range(MIN_PACKET_ID..=u32::MAX / 2);
        Self::starting_at(start)
    }

    /// Start from a fixed point (clamped to `MIN_PACKET_ID`)
    pub fn starting_at(start: u32) -> Self {
        Self {
            next: Mutex::new(start.max(MIN_PACKET_ID)),
        }
    }

    /// Allocate the next id for which `in_use` is false
    pub fn allocate(&self, in_use: impl Fn(u32) -> bool) -> u32 {
        let mut next = self.next.lock();
        loop {
            let candidate = *next;
            *next = if candidate == u32::MAX {
                MIN_PACKET_ID
            } else {
                candidate + 1
            };
            if !in_use(candidate) {
                return candidate;
            }
        }
    }
}

impl Default for PacketIdAllocator {
    fn default() -> Self {
        Self::new()
    }
}
