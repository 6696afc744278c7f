//! The central limit order book: bid and ask ladders plus the id index.
//!
//! Mutated only by the matching thread; no internal synchronization.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use rustc_hash::FxHashMap;

use crate::arena::{Arena, ArenaIndex};
use crate::ladder::{LevelDepth, PriceLadder};
use crate::order::{Order, Side};
use crate::price_level::PriceLevel;

/// Bid ladder, ask ladder, and an id → arena-slot map for O(1) cancel.
///
/// Invariant: an order is registered in the map iff it rests in exactly
/// one ladder.
pub struct OrderBook {
    symbol: String,
    bids: PriceLadder,
    asks: PriceLadder,
    orders: FxHashMap<String, ArenaIndex>,
}

impl OrderBook {
    pub fn new(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            bids: PriceLadder::new(Side::Buy),
            asks: PriceLadder::new(Side::Sell),
            orders: FxHashMap::default(),
        }
    }

    #[inline]
    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    // ========================================================================
    // Best Price Access
    // ========================================================================

    /// Highest bid price, `None` when no bids rest
    #[inline]
    pub fn best_bid(&self) -> Option<i64> {
        self.bids.best_price()
    }

    /// Lowest ask price, `None` when no asks rest
    #[inline]
    pub fn best_ask(&self) -> Option<i64> {
        self.asks.best_price()
    }

    /// Best level on the buy side
    #[inline]
    pub fn best_buy_level(&self) -> Option<&PriceLevel> {
        self.bids.best_level()
    }

    /// Best level on the sell side
    #[inline]
    pub fn best_sell_level(&self) -> Option<&PriceLevel> {
        self.asks.best_level()
    }

    /// Best price a taker on `side` would execute against
    #[inline]
    pub fn best_opposite_price(&self, side: Side) -> Option<i64> {
        match side {
            Side::Buy => self.asks.best_price(),
            Side::Sell => self.bids.best_price(),
        }
    }

    /// Spread (best_ask − best_bid) when both sides are present and
    /// uncrossed
    pub fn spread(&self) -> Option<i64> {
        match (self.best_bid(), self.best_ask()) {
            (Some(bid), Some(ask)) if ask > bid => Some(ask - bid),
            _ => None,
        }
    }

    // ========================================================================
    // Ladder Access
    // ========================================================================

    #[inline]
    pub fn ladder(&self, side: Side) -> &PriceLadder {
        match side {
            Side::Buy => &self.bids,
            Side::Sell => &self.asks,
        }
    }

    #[inline]
    pub fn ladder_mut(&mut self, side: Side) -> &mut PriceLadder {
        match side {
            Side::Buy => &mut self.bids,
            Side::Sell => &mut self.asks,
        }
    }

    // ========================================================================
    // Order Management
    // ========================================================================

    /// Move a (residual) order into the arena and rest it on its side's
    /// ladder. Returns the slot handle.
    ///
    /// An id collision with a resting order would corrupt the id index;
    /// the colliding order is dropped instead (ids are the submitter's
    /// responsibility).
    pub fn add(&mut self, arena: &mut Arena, order: Order) -> Option<ArenaIndex> {
        if self.orders.contains_key(&order.id) {
            tracing::warn!(order_id = %order.id, "duplicate order id dropped");
            return None;
        }

        let side = order.side;
        let id = order.id.clone();
        let index = arena.insert(order);

        self.ladder_mut(side).insert(arena, index);
        self.orders.insert(id, index);
        Some(index)
    }

    /// Unlink a resting order and free its slot, returning the order.
    ///
    /// Used for both cancellation and fill-removal; unknown or
    /// already-terminal ids are a no-op (`None`).
    pub fn remove(&mut self, arena: &mut Arena, order_id: &str) -> Option<Order> {
        let index = self.orders.remove(order_id)?;
        let side = arena.get(index).order.side;
        self.ladder_mut(side).remove(arena, index);
        Some(arena.remove(index))
    }

    /// Cancel a resting order: remove it and mark it Cancelled.
    /// No-op for unknown ids.
    pub fn cancel(&mut self, arena: &mut Arena, order_id: &str) -> Option<Order> {
        let mut order = self.remove(arena, order_id)?;
        order.cancel();
        Some(order)
    }

    /// Arena handle for a resting order id
    #[inline]
    pub fn lookup(&self, order_id: &str) -> Option<ArenaIndex> {
        self.orders.get(order_id).copied()
    }

    #[inline]
    pub fn contains(&self, order_id: &str) -> bool {
        self.orders.contains_key(order_id)
    }

    // ========================================================================
    // Snapshots
    // ========================================================================

    /// Up to `k` levels per side in price order: (bids, asks)
    pub fn depth(&self, k: usize) -> (Vec<LevelDepth>, Vec<LevelDepth>) {
        (self.bids.depth(k), self.asks.depth(k))
    }

    /// Total resting orders
    #[inline]
    pub fn order_count(&self) -> usize {
        self.orders.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.orders.is_empty()
    }

    /// Non-empty levels per side: (bid levels, ask levels)
    pub fn level_counts(&self) -> (usize, usize) {
        (self.bids.level_count(), self.asks.level_count())
    }

    /// Order-independent digest of the book's observable state, for
    /// golden-master determinism checks.
    pub fn state_hash(&self, arena: &Arena) -> u64 {
        let mut hasher = DefaultHasher::new();

        self.best_bid().hash(&mut hasher);
        self.best_ask().hash(&mut hasher);
        self.orders.len().hash(&mut hasher);
        arena.allocated().hash(&mut hasher);

        let (bids, asks) = self.depth(usize::MAX);
        for level in bids.iter().chain(asks.iter()) {
            level.price.hash(&mut hasher);
            level.volume.hash(&mut hasher);
            level.orders.hash(&mut hasher);
        }

        hasher.finish()
    }
}

impl std::fmt::Debug for OrderBook {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrderBook")
            .field("symbol", &self.symbol)
            .field("best_bid", &self.best_bid())
            .field("best_ask", &self.best_ask())
            .field("bid_levels", &self.bids.level_count())
            .field("ask_levels", &self.asks.level_count())
            .field("order_count", &self.orders.len())
            .finish()
    }
}
