//! Matching core: the single-threaded cross/rest algorithm.
//!
//! 1. CROSSING: the incoming order executes against the best opposite
//!    levels in price-time priority, at the resting order's price.
//! 2. RESTING: an unfilled limit residual is placed in the book; an
//!    unfilled market residual is discarded.
//!
//! All book state is owned here and mutated in submit-queue order, so for
//! a fixed input sequence the trade sequence is identical across runs.

use crate::arena::{Arena, NIL_INDEX};
use crate::ids::IdGenerator;
use crate::order::{Order, OrderType, Side};
use crate::order_book::OrderBook;
use crate::trade::Trade;

/// Default initial arena capacity (slots; the arena grows past it)
pub const DEFAULT_ORDER_CAPACITY: u32 = 1 << 16;

/// Single-consumer matching state: arena, book, and trade-id counter.
///
/// Exclusively owned by the matching thread for the engine's lifetime;
/// nothing here is synchronized.
pub struct MatchingCore {
    arena: Arena,
    book: OrderBook,
    trade_ids: IdGenerator,
}

impl MatchingCore {
    pub fn new(symbol: impl Into<String>) -> Self {
        Self::with_capacity(symbol, DEFAULT_ORDER_CAPACITY)
    }

    pub fn with_capacity(symbol: impl Into<String>, order_capacity: u32) -> Self {
        Self {
            arena: Arena::new(order_capacity),
            book: OrderBook::new(symbol),
            trade_ids: IdGenerator::new("T"),
        }
    }

    /// Process one incoming order: cross, then rest or discard the
    /// residual. Appends every resulting trade to `trades` in execution
    /// order.
    ///
    /// Total: malformed orders are rejected at submission time and no
    /// matching decision can fail.
    pub fn process_order(&mut self, mut order: Order, trades: &mut Vec<Trade>) {
        debug_assert!(order.quantity > 0);
        debug_assert_eq!(order.symbol, self.book.symbol());

        self.cross(&mut order, trades);

        if !order.is_filled() && order.kind == OrderType::Limit {
            self.book.add(&mut self.arena, order);
        }
        // Market residual (or a fully filled taker) is dropped here.
    }

    /// Execute the incoming order against the opposite ladder while a
    /// crossable level exists.
    fn cross(&mut self, taker: &mut Order, trades: &mut Vec<Trade>) {
        while !taker.is_filled() {
            let Some(best_opposite) = self.book.best_opposite_price(taker.side) else {
                break;
            };
            if taker.kind == OrderType::Limit
                && !prices_cross(taker.side, taker.price, best_opposite)
            {
                break;
            }

            let maker_index = match taker.side {
                Side::Buy => self.book.best_sell_level(),
                Side::Sell => self.book.best_buy_level(),
            }
            .map_or(NIL_INDEX, |level| level.front());
            debug_assert_ne!(maker_index, NIL_INDEX, "non-empty level without a head");

            let maker = &mut self.arena.get_mut(maker_index).order;
            let quantity = taker.remaining().min(maker.remaining());

            maker.fill(quantity);
            taker.fill(quantity);

            // Trade price is the maker's price; the resting side sets it.
            let trade = match taker.side {
                Side::Buy => Trade::new(self.trade_ids.next_id(), best_opposite, quantity, taker, maker),
                Side::Sell => Trade::new(self.trade_ids.next_id(), best_opposite, quantity, maker, taker),
            };
            let maker_filled = maker.is_filled();
            let maker_id = if maker_filled { maker.id.clone() } else { String::new() };
            trades.push(trade);

            // The level's open volume shrinks by every fill; a filled
            // maker then leaves through the removal path with zero
            // remaining.
            self.book
                .ladder_mut(taker.side.opposite())
                .best_level_mut()
                .expect("crossed level vanished mid-match")
                .subtract_volume(quantity);

            if maker_filled {
                self.book.remove(&mut self.arena, &maker_id);
            }
        }
    }

    /// Cancel a resting order by id. Unknown or already-terminal ids are
    /// silently ignored; a cancel racing ahead of its order's processing
    /// is dropped by the same rule.
    pub fn apply_cancel(&mut self, order_id: &str) -> bool {
        self.book.cancel(&mut self.arena, order_id).is_some()
    }

    #[inline]
    pub fn book(&self) -> &OrderBook {
        &self.book
    }

    #[inline]
    pub(crate) fn book_mut(&mut self) -> &mut OrderBook {
        &mut self.book
    }

    #[inline]
    pub fn best_bid(&self) -> Option<i64> {
        self.book.best_bid()
    }

    #[inline]
    pub fn best_ask(&self) -> Option<i64> {
        self.book.best_ask()
    }

    #[inline]
    pub fn order_count(&self) -> usize {
        self.book.order_count()
    }

    /// Pre-fault arena pages before entering the hot loop
    pub fn warm_up(&mut self) {
        self.arena.warm_up();
    }

    /// Digest of book state for determinism checks
    pub fn state_hash(&self) -> u64 {
        self.book.state_hash(&self.arena)
    }
}

/// Does a limit taker at `price` cross the best opposite at
/// `opposite_best`?
#[inline]
fn prices_cross(side: Side, price: i64, opposite_best: i64) -> bool {
    match side {
        // Buyer pays up to their limit
        Side::Buy => price >= opposite_best,
        // Seller accepts down to their limit
        Side::Sell => price <= opposite_best,
    }
}
