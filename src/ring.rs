//! The Charlie-nonce ring (base spec §3, §4.2, §9): a fixed-size table of
//! nonces this node has been recruited as Charlie for, so a second,
//! direct contact from Alice can be recognized without tracking her
//! identity -- membership alone means "Alice may contact me directly for
//! this test".
//!
//! The base spec calls out that a prior implementation compared a ring
//! lookup with `binarySearch` on an unsorted, ring-overwritten buffer --
//! almost certainly a bug (§9, "Open questions"). This mandates a linear
//! scan; there is no binary-search path to disable.

use std::sync::Mutex;

use crate::message::Nonce;

/// Number of outstanding Charlie nonces a responder tracks at once.
pub const RING_SIZE: usize = 64;

struct RingState {
    entries: [Option<Nonce>; RING_SIZE],
    next: usize,
}

/// Fixed-size, mutex-guarded ring of outstanding Charlie-recruitment nonces.
///
/// Insertion always overwrites the oldest slot (round-robin), bounding
/// memory use regardless of how many times this node is recruited.
/// Eviction is compare-and-clear (base spec §3 invariant): a timer fired
/// for a given `(nonce, slot)` only clears that slot if it still holds the
/// nonce it was scheduled for, so a slot the ring has since reused for a
/// newer recruitment is left alone.
pub struct CharlieRing {
    slots: Mutex<RingState>,
}

impl CharlieRing {
    pub fn new() -> Self {
        Self {
            slots: Mutex::new(RingState {
                entries: [None; RING_SIZE],
                next: 0,
            }),
        }
    }

    /// Register `nonce` at the next write slot, returning the slot index so
    /// the caller can schedule its compare-and-clear eviction.
    pub fn insert(&self, nonce: Nonce) -> usize {
        let mut state = self.slots.lock().unwrap();
        let slot = state.next;

        state.entries[slot] = Some(nonce);
        state.next = (slot + 1) % RING_SIZE;

        slot
    }

    /// Whether `nonce` is currently registered. A linear scan by design --
    /// see the module doc comment.
    pub fn contains(&self, nonce: Nonce) -> bool {
        self.slots
            .lock()
            .unwrap()
            .entries
            .iter()
            .any(|slot| *slot == Some(nonce))
    }

    /// Clear `slot` iff it still holds `nonce`. Returns whether an entry
    /// was actually cleared.
    pub fn evict(&self, nonce: Nonce, slot: usize) -> bool {
        let mut state = self.slots.lock().unwrap();

        if state.entries[slot] == Some(nonce) {
            state.entries[slot] = None;
            true
        } else {
            false
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.slots
            .lock()
            .unwrap()
            .entries
            .iter()
            .filter(|s| s.is_some())
            .count()
    }
}

impl Default for CharlieRing {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_then_contains_round_trips() {
        let ring = CharlieRing::new();
        ring.insert(42);

        assert!(ring.contains(42));
    }

    #[test]
    fn lookup_of_unknown_nonce_is_absent() {
        let ring = CharlieRing::new();
        assert!(!ring.contains(99));
    }

    #[test]
    fn evict_is_compare_and_clear() {
        let ring = CharlieRing::new();
        let slot = ring.insert(7);

        assert!(ring.evict(7, slot));
        assert!(!ring.contains(7));
        assert!(!ring.evict(7, slot), "evicting twice finds nothing the second time");
    }

    #[test]
    fn evict_leaves_a_reused_slot_alone() {
        let ring = CharlieRing::new();
        let slot = ring.insert(1);

        // The ring wraps all the way around and reuses `slot` for a fresh
        // nonce before the original's eviction timer fires.
        for i in 0..RING_SIZE as u32 {
            ring.insert(100 + i);
        }
        assert!(!ring.contains(1), "the original nonce must have been overwritten");

        assert!(
            !ring.evict(1, slot),
            "stale eviction must not clear a slot reused by a newer tenant"
        );
        assert!(
            ring.contains(100 + RING_SIZE as u32 - 1),
            "the newer tenant that landed on the reused slot must survive the stale eviction"
        );
    }

    #[test]
    fn wraparound_evicts_oldest_entry_first() {
        let ring = CharlieRing::new();

        for i in 0..RING_SIZE as u32 {
            ring.insert(i);
        }
        assert!(ring.contains(0));

        ring.insert(RING_SIZE as u32);
        assert!(!ring.contains(0));
        assert!(ring.contains(RING_SIZE as u32));
        assert_eq!(ring.len(), RING_SIZE);
    }
}
