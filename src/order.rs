//! Order domain types: side, type, status, and the order record itself.
//!
//! Orders are created by producer threads, handed to the matching thread
//! through the submit queue, and from then on mutated only by the matching
//! thread. All prices and quantities are signed 64-bit integers in minor
//! units (no fractional sizes).

use std::time::Instant;

use thiserror::Error;

/// Order side (Buy = bid, Sell = ask)
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Side {
    /// Buy side (bids)
    Buy = 0,
    /// Sell side (asks)
    Sell = 1,
}

impl Side {
    /// Returns the opposite side
    #[inline]
    pub const fn opposite(self) -> Self {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }
}

/// Order type determines crossing behavior
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum OrderType {
    /// Limit order - rests in the book if not fully matched (default)
    #[default]
    Limit = 0,
    /// Market order - crosses at any price; unfilled residual is discarded
    Market = 1,
}

/// Order lifecycle status.
///
/// Pending -> PartialFilled -> Filled, with Cancelled reachable from the
/// first two. Filled and Cancelled are terminal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum OrderStatus {
    #[default]
    Pending = 0,
    PartialFilled = 1,
    Filled = 2,
    Cancelled = 3,
}

impl OrderStatus {
    /// Returns true for the absorbing states (Filled, Cancelled)
    #[inline]
    pub const fn is_terminal(self) -> bool {
        matches!(self, OrderStatus::Filled | OrderStatus::Cancelled)
    }
}

/// A trading order.
///
/// Field order groups the data touched on every match iteration (price,
/// quantity, fill state) ahead of the identity strings that are only read
/// when a trade is emitted, so the crossing loop stays within the leading
/// cache line of the record.
#[repr(C)]
#[derive(Clone, Debug)]
pub struct Order {
    // Hot fields: read/written on every crossing iteration
    /// Limit price in minor units; 0 for market orders
    pub price: i64,
    /// Total quantity, always > 0
    pub quantity: i64,
    /// Executed quantity, 0 <= filled <= quantity
    pub filled: i64,
    pub side: Side,
    pub kind: OrderType,
    pub status: OrderStatus,

    // Cold fields: touched at trade emission and bookkeeping only
    /// Client-assigned order id (opaque)
    pub id: String,
    /// Symbol this order trades (must match the engine's symbol)
    pub symbol: String,
    /// Owning user id (opaque)
    pub user_id: String,
    /// Monotonic creation timestamp; drives the buyer-maker flag
    pub created_at: Instant,
}

impl Order {
    /// Create a new limit order
    pub fn limit(
        id: impl Into<String>,
        symbol: impl Into<String>,
        user_id: impl Into<String>,
        side: Side,
        price: i64,
        quantity: i64,
    ) -> Self {
        Self {
            price,
            quantity,
            filled: 0,
            side,
            kind: OrderType::Limit,
            status: OrderStatus::Pending,
            id: id.into(),
            symbol: symbol.into(),
            user_id: user_id.into(),
            created_at: Instant::now(),
        }
    }

    /// Create a new market order. Price is fixed at 0; the order crosses
    /// against whatever the opposite side offers.
    pub fn market(
        id: impl Into<String>,
        symbol: impl Into<String>,
        user_id: impl Into<String>,
        side: Side,
        quantity: i64,
    ) -> Self {
        Self {
            price: 0,
            quantity,
            filled: 0,
            side,
            kind: OrderType::Market,
            status: OrderStatus::Pending,
            id: id.into(),
            symbol: symbol.into(),
            user_id: user_id.into(),
            created_at: Instant::now(),
        }
    }

    /// Unfilled quantity
    #[inline]
    pub fn remaining(&self) -> i64 {
        self.quantity - self.filled
    }

    /// Returns true once the order is fully executed
    #[inline]
    pub fn is_filled(&self) -> bool {
        self.filled >= self.quantity
    }

    /// Record an execution of `quantity` against this order and advance the
    /// status machine.
    #[inline]
    pub fn fill(&mut self, quantity: i64) {
        debug_assert!(quantity > 0, "fill quantity must be positive");
        debug_assert!(
            !self.status.is_terminal(),
            "fill on terminal order {}",
            self.id
        );
        debug_assert!(
            quantity <= self.remaining(),
            "overfill: {} > remaining {}",
            quantity,
            self.remaining()
        );
        self.filled += quantity;
        self.status = if self.is_filled() {
            OrderStatus::Filled
        } else {
            OrderStatus::PartialFilled
        };
    }

    /// Mark the order cancelled. Only reachable from Pending/PartialFilled.
    #[inline]
    pub fn cancel(&mut self) {
        debug_assert!(
            !self.status.is_terminal(),
            "cancel on terminal order {}",
            self.id
        );
        self.status = OrderStatus::Cancelled;
    }
}

impl Default for Order {
    /// Empty placeholder used for vacant arena slots. Never enters the book.
    fn default() -> Self {
        Self {
            price: 0,
            quantity: 0,
            filled: 0,
            side: Side::Buy,
            kind: OrderType::Limit,
            status: OrderStatus::Pending,
            id: String::new(),
            symbol: String::new(),
            user_id: String::new(),
            created_at: Instant::now(),
        }
    }
}

/// Rejection returned synchronously from `Engine::submit` for malformed
/// orders. All other matching decisions are total and never error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SubmitError {
    #[error("order quantity must be positive, got {0}")]
    InvalidQuantity(i64),
    #[error("limit order price must be positive, got {0}")]
    InvalidPrice(i64),
    #[error("order symbol `{got}` does not match engine symbol `{expected}`")]
    SymbolMismatch { expected: String, got: String },
    #[error("engine is shut down")]
    Shutdown,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_side_opposite() {
        assert_eq!(Side::Buy.opposite(), Side::Sell);
        assert_eq!(Side::Sell.opposite(), Side::Buy);
    }

    #[test]
    fn test_limit_order_construction() {
        let order = Order::limit("o-1", "BTCUSDT", "u-1", Side::Buy, 50_000, 100);
        assert_eq!(order.kind, OrderType::Limit);
        assert_eq!(order.status, OrderStatus::Pending);
        assert_eq!(order.remaining(), 100);
        assert!(!order.is_filled());
    }

    #[test]
    fn test_market_order_has_zero_price() {
        let order = Order::market("o-1", "BTCUSDT", "u-1", Side::Sell, 100);
        assert_eq!(order.kind, OrderType::Market);
        assert_eq!(order.price, 0);
    }

    #[test]
    fn test_fill_advances_status() {
        let mut order = Order::limit("o-1", "BTCUSDT", "u-1", Side::Buy, 50_000, 100);

        order.fill(40);
        assert_eq!(order.status, OrderStatus::PartialFilled);
        assert_eq!(order.filled, 40);
        assert_eq!(order.remaining(), 60);

        order.fill(60);
        assert_eq!(order.status, OrderStatus::Filled);
        assert!(order.is_filled());
        assert_eq!(order.remaining(), 0);
    }

    #[test]
    fn test_cancel_from_pending_and_partial() {
        let mut pending = Order::limit("o-1", "BTCUSDT", "u-1", Side::Buy, 50_000, 100);
        pending.cancel();
        assert_eq!(pending.status, OrderStatus::Cancelled);

        let mut partial = Order::limit("o-2", "BTCUSDT", "u-1", Side::Buy, 50_000, 100);
        partial.fill(30);
        partial.cancel();
        assert_eq!(partial.status, OrderStatus::Cancelled);
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "overfill")]
    fn test_overfill_is_programmer_error() {
        let mut order = Order::limit("o-1", "BTCUSDT", "u-1", Side::Buy, 50_000, 100);
        order.fill(101);
    }

    #[test]
    fn test_status_terminal() {
        assert!(!OrderStatus::Pending.is_terminal());
        assert!(!OrderStatus::PartialFilled.is_terminal());
        assert!(OrderStatus::Filled.is_terminal());
        assert!(OrderStatus::Cancelled.is_terminal());
    }
}
