//! Trade record emitted for every execution.

use std::time::Instant;

use crate::order::Order;

/// A matched execution between one buy and one sell order.
///
/// Immutable once emitted. Price and quantity lead the record; the id
/// strings are only read by downstream consumers.
#[repr(C)]
#[derive(Clone, Debug)]
pub struct Trade {
    /// Execution price in minor units (always the resting order's price)
    pub price: i64,
    /// Executed quantity, > 0
    pub quantity: i64,
    /// Monotonic execution timestamp
    pub executed_at: Instant,
    /// True iff the buy order was resting first
    pub is_buyer_maker: bool,

    /// Unique trade id within the engine instance
    pub id: String,
    pub symbol: String,
    pub buy_order_id: String,
    pub sell_order_id: String,
    pub buy_user_id: String,
    pub sell_user_id: String,
}

impl Trade {
    /// Build a trade from the two participating orders.
    ///
    /// `price` must be the resting order's price (price-time priority: the
    /// maker sets the price).
    pub fn new(id: String, price: i64, quantity: i64, buy: &Order, sell: &Order) -> Self {
        Self {
            price,
            quantity,
            executed_at: Instant::now(),
            is_buyer_maker: buy.created_at < sell.created_at,
            id,
            symbol: buy.symbol.clone(),
            buy_order_id: buy.id.clone(),
            sell_order_id: sell.id.clone(),
            buy_user_id: buy.user_id.clone(),
            sell_user_id: sell.user_id.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::order::Side;

    #[test]
    fn test_trade_captures_both_sides() {
        let sell = Order::limit("s-1", "BTCUSDT", "alice", Side::Sell, 50_000, 100);
        let buy = Order::limit("b-1", "BTCUSDT", "bob", Side::Buy, 50_000, 100);

        let trade = Trade::new("T1".to_string(), 50_000, 100, &buy, &sell);

        assert_eq!(trade.symbol, "BTCUSDT");
        assert_eq!(trade.buy_order_id, "b-1");
        assert_eq!(trade.sell_order_id, "s-1");
        assert_eq!(trade.buy_user_id, "bob");
        assert_eq!(trade.sell_user_id, "alice");
        assert_eq!(trade.price, 50_000);
        assert_eq!(trade.quantity, 100);
    }

    #[test]
    fn test_buyer_maker_when_buy_rested_first() {
        let buy = Order::limit("b-1", "BTCUSDT", "bob", Side::Buy, 50_000, 100);
        std::thread::sleep(std::time::Duration::from_millis(1));
        let sell = Order::limit("s-1", "BTCUSDT", "alice", Side::Sell, 50_000, 100);

        let trade = Trade::new("T1".to_string(), 50_000, 100, &buy, &sell);
        assert!(trade.is_buyer_maker);
    }

    #[test]
    fn test_seller_maker_when_sell_rested_first() {
        let sell = Order::limit("s-1", "BTCUSDT", "alice", Side::Sell, 50_000, 100);
        std::thread::sleep(std::time::Duration::from_millis(1));
        let buy = Order::limit("b-1", "BTCUSDT", "bob", Side::Buy, 50_000, 100);

        let trade = Trade::new("T1".to_string(), 50_000, 100, &buy, &sell);
        assert!(!trade.is_buyer_maker);
    }
}
