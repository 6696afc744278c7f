//! Sharded price ladder: one side of the order book.
//!
//! Two-level container. The outer index is an ordered map from bucket id
//! (`price >> BUCKET_SHIFT`) to bucket, bounding worst-case growth at
//! O(log m) when traders spread across thousands of prices. Each bucket is
//! a direct-address array of `BUCKET_WIDTH` level slots indexed by
//! `price & BUCKET_MASK` (low price bits index directly, no hashing) plus a
//! doubly-linked chain of its non-empty levels in price order. The ladder
//! caches the best price, so top-of-book queries never touch the map.
//!
//! Most activity concentrates near the top of book, where every operation
//! is O(1) array dispatch; the tree only moves when a bucket appears or
//! disappears.

use std::collections::BTreeMap;

use crate::arena::{Arena, ArenaIndex};
use crate::order::Side;
use crate::price_level::{PriceLevel, NIL_SLOT};

/// Prices per bucket. Power of two so the slot is a mask away.
pub const BUCKET_WIDTH: i64 = 128;
const BUCKET_SHIFT: u32 = BUCKET_WIDTH.trailing_zeros();
const BUCKET_MASK: i64 = BUCKET_WIDTH - 1;

const _: () = assert!(BUCKET_WIDTH & (BUCKET_WIDTH - 1) == 0);

/// Snapshot of one level for depth queries
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LevelDepth {
    pub price: i64,
    pub volume: i64,
    pub orders: u32,
}

/// A contiguous range of `BUCKET_WIDTH` prices sharing one slot array.
struct Bucket {
    levels: Box<[Option<PriceLevel>; BUCKET_WIDTH as usize]>,
    /// Head of the bucket-local chain: best level in this bucket
    best_slot: u16,
    /// Non-empty level count
    len: u16,
}

impl Bucket {
    fn new() -> Self {
        Self {
            levels: Box::new([None; BUCKET_WIDTH as usize]),
            best_slot: NIL_SLOT,
            len: 0,
        }
    }

    #[inline]
    fn slot_of(price: i64) -> u16 {
        (price & BUCKET_MASK) as u16
    }

    #[inline]
    fn level(&self, slot: u16) -> &PriceLevel {
        self.levels[slot as usize]
            .as_ref()
            .expect("chained slot must hold a level")
    }

    #[inline]
    fn level_mut(&mut self, slot: u16) -> &mut PriceLevel {
        self.levels[slot as usize]
            .as_mut()
            .expect("chained slot must hold a level")
    }

    fn best_price(&self) -> i64 {
        self.level(self.best_slot).price
    }

    /// Get or create the level for `price`, splicing a new level into the
    /// bucket chain at its price rank. O(k) in the bucket's non-empty level
    /// count, bounded by BUCKET_WIDTH and small in practice.
    fn ensure_level(&mut self, price: i64, side: Side) -> u16 {
        let slot = Self::slot_of(price);
        if self.levels[slot as usize].is_some() {
            return slot;
        }

        let mut level = PriceLevel::new(price);
        self.len += 1;

        if self.best_slot == NIL_SLOT {
            self.levels[slot as usize] = Some(level);
            self.best_slot = slot;
            return slot;
        }

        if better(side, price, self.best_price()) {
            level.next_slot = self.best_slot;
            self.levels[slot as usize] = Some(level);
            self.level_mut(self.best_slot).prev_slot = slot;
            self.best_slot = slot;
            return slot;
        }

        // Walk the chain to the last level still better than the new price
        let mut current = self.best_slot;
        loop {
            let next = self.level(current).next_slot;
            if next == NIL_SLOT || better(side, price, self.level(next).price) {
                break;
            }
            current = next;
        }

        let next = self.level(current).next_slot;
        level.prev_slot = current;
        level.next_slot = next;
        self.levels[slot as usize] = Some(level);
        self.level_mut(current).next_slot = slot;
        if next != NIL_SLOT {
            self.level_mut(next).prev_slot = slot;
        }
        slot
    }

    /// Unlink an empty level from the chain and clear its array slot.
    /// Returns `true` when the bucket is now empty.
    fn remove_level(&mut self, slot: u16) -> bool {
        let level = self.levels[slot as usize]
            .take()
            .expect("removing vacant level slot");
        debug_assert!(level.is_empty(), "removing non-empty level");
        self.len -= 1;

        if level.prev_slot != NIL_SLOT {
            self.level_mut(level.prev_slot).next_slot = level.next_slot;
        } else {
            debug_assert_eq!(self.best_slot, slot);
            self.best_slot = level.next_slot;
        }
        if level.next_slot != NIL_SLOT {
            self.level_mut(level.next_slot).prev_slot = level.prev_slot;
        }

        self.len == 0
    }
}

#[inline]
fn better(side: Side, a: i64, b: i64) -> bool {
    match side {
        Side::Buy => a > b,
        Side::Sell => a < b,
    }
}

/// Price-indexed container for one side of the book.
///
/// Buy side iterates prices descending, Sell side ascending; the cached
/// best price is always the true extremum over all non-empty levels.
pub struct PriceLadder {
    side: Side,
    buckets: BTreeMap<i64, Bucket>,
    /// Cached best price; `None` iff the ladder is empty
    best: Option<i64>,
    /// Non-empty level count across all buckets
    level_count: usize,
}

impl PriceLadder {
    pub fn new(side: Side) -> Self {
        Self {
            side,
            buckets: BTreeMap::new(),
            best: None,
            level_count: 0,
        }
    }

    #[inline]
    pub fn side(&self) -> Side {
        self.side
    }

    /// Best price on this side, `None` when empty. O(1).
    #[inline]
    pub fn best_price(&self) -> Option<i64> {
        self.best
    }

    /// The level holding the best price. O(1).
    pub fn best_level(&self) -> Option<&PriceLevel> {
        let price = self.best?;
        let bucket = self.buckets.get(&(price >> BUCKET_SHIFT))?;
        Some(bucket.level(Bucket::slot_of(price)))
    }

    pub fn best_level_mut(&mut self) -> Option<&mut PriceLevel> {
        let price = self.best?;
        let bucket = self.buckets.get_mut(&(price >> BUCKET_SHIFT))?;
        Some(bucket.level_mut(Bucket::slot_of(price)))
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.best.is_none()
    }

    /// Number of non-empty price levels on this side
    #[inline]
    pub fn level_count(&self) -> usize {
        self.level_count
    }

    /// Append the order held at `index` to the level for its price,
    /// creating bucket and level as needed.
    ///
    /// O(1) when the bucket exists, O(log m) to create one, plus the
    /// bucket-local splice.
    pub fn insert(&mut self, arena: &mut Arena, index: ArenaIndex) {
        let price = arena.get(index).order.price;
        debug_assert_eq!(arena.get(index).order.side, self.side);

        let side = self.side;
        let bucket = self.buckets.entry(price >> BUCKET_SHIFT).or_insert_with(Bucket::new);
        let slot = Bucket::slot_of(price);
        if bucket.levels[slot as usize].is_none() {
            self.level_count += 1;
        }
        bucket.ensure_level(price, side);
        bucket.level_mut(slot).push_back(arena, index);

        if self.best.map_or(true, |best| better(side, price, best)) {
            self.best = Some(price);
        }
    }

    /// Unlink the order at `index` from its level using the stored FIFO
    /// handle; tears down the level, bucket, and best cache as they empty.
    ///
    /// O(1) except O(log m) when a bucket disappears or the best price
    /// must be re-derived from the outer map.
    pub fn remove(&mut self, arena: &mut Arena, index: ArenaIndex) {
        let price = arena.get(index).order.price;
        let bucket_id = price >> BUCKET_SHIFT;
        let slot = Bucket::slot_of(price);

        let bucket = self
            .buckets
            .get_mut(&bucket_id)
            .expect("order's bucket missing from ladder");
        let level_empty = bucket.level_mut(slot).remove(arena, index);

        if level_empty {
            self.level_count -= 1;
            let bucket_empty = bucket.remove_level(slot);
            if bucket_empty {
                self.buckets.remove(&bucket_id);
            }
            if self.best == Some(price) {
                self.recompute_best();
            }
        }
    }

    /// Walk up to `k` levels in price order from the best.
    pub fn depth(&self, k: usize) -> Vec<LevelDepth> {
        let mut out = Vec::with_capacity(k.min(self.level_count));

        let bucket_iter: Box<dyn Iterator<Item = &Bucket>> = match self.side {
            Side::Buy => Box::new(self.buckets.values().rev()),
            Side::Sell => Box::new(self.buckets.values()),
        };

        'outer: for bucket in bucket_iter {
            let mut slot = bucket.best_slot;
            while slot != NIL_SLOT {
                let level = bucket.level(slot);
                out.push(LevelDepth {
                    price: level.price,
                    volume: level.volume,
                    orders: level.count,
                });
                if out.len() == k {
                    break 'outer;
                }
                slot = level.next_slot;
            }
        }

        out
    }

    /// Re-derive the cached best from the outer map extremum.
    fn recompute_best(&mut self) {
        let entry = match self.side {
            Side::Buy => self.buckets.iter().next_back(),
            Side::Sell => self.buckets.iter().next(),
        };
        self.best = entry.map(|(_, bucket)| bucket.best_price());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::order::Order;

    fn insert_order(
        arena: &mut Arena,
        ladder: &mut PriceLadder,
        id: &str,
        price: i64,
        qty: i64,
    ) -> ArenaIndex {
        let side = ladder.side();
        let idx = arena.insert(Order::limit(id, "BTCUSDT", "u-1", side, price, qty));
        ladder.insert(arena, idx);
        idx
    }

    #[test]
    fn test_empty_ladder() {
        let ladder = PriceLadder::new(Side::Sell);
        assert!(ladder.is_empty());
        assert_eq!(ladder.best_price(), None);
        assert!(ladder.best_level().is_none());
        assert!(ladder.depth(5).is_empty());
    }

    #[test]
    fn test_sell_side_best_is_lowest() {
        let mut arena = Arena::new(16);
        let mut ladder = PriceLadder::new(Side::Sell);

        insert_order(&mut arena, &mut ladder, "a", 50_100, 10);
        assert_eq!(ladder.best_price(), Some(50_100));

        insert_order(&mut arena, &mut ladder, "b", 50_000, 10);
        assert_eq!(ladder.best_price(), Some(50_000));

        insert_order(&mut arena, &mut ladder, "c", 50_200, 10);
        assert_eq!(ladder.best_price(), Some(50_000));
    }

    #[test]
    fn test_buy_side_best_is_highest() {
        let mut arena = Arena::new(16);
        let mut ladder = PriceLadder::new(Side::Buy);

        insert_order(&mut arena, &mut ladder, "a", 49_900, 10);
        insert_order(&mut arena, &mut ladder, "b", 50_000, 10);
        insert_order(&mut arena, &mut ladder, "c", 49_800, 10);

        assert_eq!(ladder.best_price(), Some(50_000));
    }

    #[test]
    fn test_remove_best_advances_within_bucket() {
        let mut arena = Arena::new(16);
        let mut ladder = PriceLadder::new(Side::Sell);

        // Same bucket (width 128): 50_000 and 50_001
        let best = insert_order(&mut arena, &mut ladder, "a", 50_000, 10);
        insert_order(&mut arena, &mut ladder, "b", 50_001, 10);

        ladder.remove(&mut arena, best);
        arena.remove(best);
        assert_eq!(ladder.best_price(), Some(50_001));
    }

    #[test]
    fn test_remove_best_advances_across_buckets() {
        let mut arena = Arena::new(16);
        let mut ladder = PriceLadder::new(Side::Sell);

        // Distant prices: different buckets
        let best = insert_order(&mut arena, &mut ladder, "a", 50_000, 10);
        insert_order(&mut arena, &mut ladder, "b", 90_000, 10);

        ladder.remove(&mut arena, best);
        arena.remove(best);
        assert_eq!(ladder.best_price(), Some(90_000));
        assert_eq!(ladder.level_count(), 1);
    }

    #[test]
    fn test_bucket_boundary_prices_resolve() {
        // BUCKET_WIDTH-1 and BUCKET_WIDTH sit in adjacent buckets
        let mut arena = Arena::new(16);
        let mut ladder = PriceLadder::new(Side::Sell);

        let low = insert_order(&mut arena, &mut ladder, "a", BUCKET_WIDTH - 1, 10);
        insert_order(&mut arena, &mut ladder, "b", BUCKET_WIDTH, 10);

        assert_eq!(ladder.best_price(), Some(BUCKET_WIDTH - 1));

        ladder.remove(&mut arena, low);
        arena.remove(low);
        assert_eq!(ladder.best_price(), Some(BUCKET_WIDTH));
    }

    #[test]
    fn test_depth_walks_price_order() {
        let mut arena = Arena::new(32);
        let mut ladder = PriceLadder::new(Side::Sell);

        // Mix of same-bucket and cross-bucket prices, inserted out of order
        for (id, price) in [("a", 50_130), ("b", 50_000), ("c", 50_001), ("d", 51_000)] {
            insert_order(&mut arena, &mut ladder, id, price, 10);
        }

        let depth = ladder.depth(10);
        let prices: Vec<_> = depth.iter().map(|l| l.price).collect();
        assert_eq!(prices, vec![50_000, 50_001, 50_130, 51_000]);

        let top2 = ladder.depth(2);
        assert_eq!(top2.len(), 2);
        assert_eq!(top2[0].price, 50_000);
    }

    #[test]
    fn test_depth_buy_side_descending() {
        let mut arena = Arena::new(32);
        let mut ladder = PriceLadder::new(Side::Buy);

        for (id, price) in [("a", 49_000), ("b", 50_000), ("c", 49_500)] {
            insert_order(&mut arena, &mut ladder, id, price, 10);
        }

        let prices: Vec<_> = ladder.depth(10).iter().map(|l| l.price).collect();
        assert_eq!(prices, vec![50_000, 49_500, 49_000]);
    }

    #[test]
    fn test_level_aggregates_orders_at_same_price() {
        let mut arena = Arena::new(16);
        let mut ladder = PriceLadder::new(Side::Sell);

        insert_order(&mut arena, &mut ladder, "a", 50_000, 100);
        insert_order(&mut arena, &mut ladder, "b", 50_000, 200);

        assert_eq!(ladder.level_count(), 1);
        let level = ladder.best_level().unwrap();
        assert_eq!(level.volume, 300);
        assert_eq!(level.count, 2);
    }

    #[test]
    fn test_insert_remove_interleaved_keeps_best_correct() {
        let mut arena = Arena::new(64);
        let mut ladder = PriceLadder::new(Side::Buy);

        let mut handles = Vec::new();
        for i in 0..20 {
            let price = 49_000 + i * 37; // spreads across buckets
            handles.push((
                price,
                insert_order(&mut arena, &mut ladder, &format!("o-{i}"), price, 10),
            ));
        }

        // Remove from the top repeatedly; best must track the true max
        handles.sort_by_key(|(price, _)| *price);
        while let Some((price, idx)) = handles.pop() {
            assert_eq!(ladder.best_price(), Some(price));
            ladder.remove(&mut arena, idx);
            arena.remove(idx);
        }
        assert!(ladder.is_empty());
    }
}
