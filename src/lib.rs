//! # Bolt-LOB
//!
//! A deterministic, single-symbol limit order book matching engine.
//!
//! ## Design Principles
//!
//! - **Single-Writer**: one thread owns the book exclusively (no locks in
//!   the matching path)
//! - **Semaphore Queues**: bounded MPSC/SPSC ring buffers with counting
//!   semaphores carry orders in and trades out, with batched draining
//! - **O(1) Top-of-Book**: sharded price ladder with a cached best price,
//!   O(1) per-price dispatch, and O(1) cancel via arena handles
//! - **Arena Allocation**: resting orders live in a recycled slab
//!
//! ## Architecture
//!
//! ```text
//! [Producers] --> [Submit Queue (MPSC)] --> [Matching Thread (Pinned)]
//!                                                   |
//! [Consumer]  <-- [Trade Queue (SPSC)]  <-----------+
//! ```

pub mod arena;
pub mod engine;
pub mod ids;
pub mod ladder;
pub mod matching;
pub mod order;
pub mod order_book;
pub mod price_level;
pub mod queue;
pub mod trade;

// Re-exports for convenience
pub use arena::{Arena, ArenaIndex, OrderSlot, NIL_INDEX};
pub use engine::{Engine, TradeConsumer, SUBMIT_QUEUE_CAPACITY, TRADE_QUEUE_CAPACITY};
pub use ids::IdGenerator;
pub use ladder::{LevelDepth, PriceLadder, BUCKET_WIDTH};
pub use matching::MatchingCore;
pub use order::{Order, OrderStatus, OrderType, Side, SubmitError};
pub use order_book::OrderBook;
pub use price_level::PriceLevel;
pub use queue::{BoundedQueue, Consumer, QueueClosed, CONSUME_BATCH};
pub use trade::Trade;
