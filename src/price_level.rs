//! Price level: the FIFO queue of resting orders at one price.
//!
//! The FIFO is a doubly-linked list threaded through arena slots, so
//! insertion at the tail, matching at the head, and cancellation from any
//! position are all O(1). Levels also carry their bucket-local chain links
//! (see `ladder`), forming the price-ordered walk within a bucket.

use crate::arena::{Arena, ArenaIndex, NIL_INDEX};

/// Sentinel for "no neighbor level" in a bucket chain
pub const NIL_SLOT: u16 = u16::MAX;

/// All resting orders at a single price, in time priority.
#[derive(Clone, Copy, Debug)]
pub struct PriceLevel {
    /// Price shared by every order on this level
    pub price: i64,
    /// Oldest order (first to match)
    pub head: ArenaIndex,
    /// Youngest order (last to match)
    pub tail: ArenaIndex,
    /// Sum of remaining quantity across the FIFO
    pub volume: i64,
    /// Number of orders on this level
    pub count: u32,
    /// Bucket-chain neighbor toward better prices
    pub prev_slot: u16,
    /// Bucket-chain neighbor toward worse prices
    pub next_slot: u16,
}

impl PriceLevel {
    pub const fn new(price: i64) -> Self {
        Self {
            price,
            head: NIL_INDEX,
            tail: NIL_INDEX,
            volume: 0,
            count: 0,
            prev_slot: NIL_SLOT,
            next_slot: NIL_SLOT,
        }
    }

    #[inline]
    pub const fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Append an order at the tail (newest, lowest time priority).
    ///
    /// O(1). The level's volume grows by the order's remaining quantity.
    pub fn push_back(&mut self, arena: &mut Arena, index: ArenaIndex) {
        let remaining = arena.get(index).order.remaining();
        debug_assert_eq!(arena.get(index).order.price, self.price);

        if self.tail == NIL_INDEX {
            debug_assert!(self.head == NIL_INDEX);
            self.head = index;
            self.tail = index;
            let slot = arena.get_mut(index);
            slot.prev = NIL_INDEX;
            slot.next = NIL_INDEX;
        } else {
            arena.get_mut(self.tail).next = index;
            let slot = arena.get_mut(index);
            slot.prev = self.tail;
            slot.next = NIL_INDEX;
            self.tail = index;
        }

        self.count += 1;
        self.volume += remaining;
    }

    /// Unlink an order from any position (cancel or fill-removal path).
    ///
    /// The slot is NOT freed from the arena; the caller owns that step.
    /// Returns `true` when the level is now empty.
    ///
    /// O(1) in all four unlink cases (only node, head, tail, middle).
    pub fn remove(&mut self, arena: &mut Arena, index: ArenaIndex) -> bool {
        let slot = arena.get(index);
        let prev = slot.prev;
        let next = slot.next;
        let remaining = slot.order.remaining();

        if prev == NIL_INDEX && next == NIL_INDEX {
            debug_assert!(self.head == index && self.tail == index);
            self.head = NIL_INDEX;
            self.tail = NIL_INDEX;
        } else if prev == NIL_INDEX {
            debug_assert!(self.head == index);
            self.head = next;
            arena.get_mut(next).prev = NIL_INDEX;
        } else if next == NIL_INDEX {
            debug_assert!(self.tail == index);
            self.tail = prev;
            arena.get_mut(prev).next = NIL_INDEX;
        } else {
            arena.get_mut(prev).next = next;
            arena.get_mut(next).prev = prev;
        }

        self.count -= 1;
        self.volume -= remaining;

        let slot = arena.get_mut(index);
        slot.prev = NIL_INDEX;
        slot.next = NIL_INDEX;

        self.count == 0
    }

    /// Head of the FIFO (oldest order), NIL_INDEX when empty
    #[inline]
    pub const fn front(&self) -> ArenaIndex {
        self.head
    }

    /// Shrink the level's open volume after a partial fill of a resting
    /// order (the order's own `filled` has already been advanced).
    #[inline]
    pub fn subtract_volume(&mut self, quantity: i64) {
        debug_assert!(self.volume >= quantity);
        self.volume -= quantity;
    }
}
