//! Engine façade: queues, the pinned matching thread, and the trade
//! stream.
//!
//! Producers submit through the bounded MPSC queue; one dedicated thread
//! drains it in batches, drives the matching core, and publishes trades to
//! the SPSC trade queue for the single downstream consumer. A separate
//! low-frequency channel carries cancel requests.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::thread::JoinHandle;

use parking_lot::{MappedMutexGuard, Mutex, MutexGuard};
use tracing::{debug, info};

use crate::matching::MatchingCore;
use crate::order::{Order, OrderType, SubmitError};
use crate::order_book::OrderBook;
use crate::queue::{BoundedQueue, Consumer};
use crate::trade::Trade;

/// Submit queue capacity (power of two)
pub const SUBMIT_QUEUE_CAPACITY: usize = 65_536;
/// Trade queue capacity (power of two)
pub const TRADE_QUEUE_CAPACITY: usize = 65_536;
/// Cancel requests applied per matching-loop iteration
const CANCEL_DRAIN_LIMIT: usize = 32;

/// The single consumer handle over the engine's trade stream.
pub type TradeConsumer = Consumer<Trade>;

/// Single-symbol matching engine.
///
/// One matching thread per engine; any number of producer threads may call
/// `submit`/`cancel`. Exactly one consumer drains `trade_stream()`.
pub struct Engine {
    symbol: String,
    submit_queue: Arc<BoundedQueue<Order>>,
    trade_queue: Arc<BoundedQueue<Trade>>,
    cancel_tx: mpsc::Sender<String>,
    /// Held by the matching thread for its whole run; lock acquisition by
    /// anyone else succeeds only while the matcher is quiesced.
    core: Arc<Mutex<MatchingCore>>,
    state: Mutex<EngineState>,
    trade_stream_claimed: AtomicBool,
}

struct EngineState {
    handle: Option<JoinHandle<()>>,
    cancel_rx: Option<mpsc::Receiver<String>>,
    stopped: bool,
}

impl Engine {
    /// Create an engine for one symbol. Queues are sized at their
    /// compile-time capacities; nothing is tunable at runtime.
    pub fn new(symbol: impl Into<String>) -> Self {
        let symbol = symbol.into();
        let (cancel_tx, cancel_rx) = mpsc::channel();

        Self {
            core: Arc::new(Mutex::new(MatchingCore::new(symbol.clone()))),
            submit_queue: Arc::new(BoundedQueue::new(SUBMIT_QUEUE_CAPACITY)),
            trade_queue: Arc::new(BoundedQueue::new(TRADE_QUEUE_CAPACITY)),
            cancel_tx,
            state: Mutex::new(EngineState {
                handle: None,
                cancel_rx: Some(cancel_rx),
                stopped: false,
            }),
            trade_stream_claimed: AtomicBool::new(false),
            symbol,
        }
    }

    #[inline]
    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    /// Spawn the matching thread. Idempotent; a stopped engine does not
    /// restart.
    pub fn start(&self) {
        let mut state = self.state.lock();
        if state.handle.is_some() || state.stopped {
            return;
        }
        let cancel_rx = state
            .cancel_rx
            .take()
            .expect("cancel receiver consumed without a matcher");

        let core = Arc::clone(&self.core);
        let submit_queue = Arc::clone(&self.submit_queue);
        let trade_queue = Arc::clone(&self.trade_queue);
        let symbol = self.symbol.clone();

        let handle = std::thread::Builder::new()
            .name(format!("matcher-{symbol}"))
            .spawn(move || {
                pin_to_core();
                let mut core = core.lock();
                core.warm_up();
                info!(%symbol, "matching engine started");
                run_matching_loop(&mut core, &submit_queue, &trade_queue, &cancel_rx);
                info!(%symbol, "matching engine drained and stopped");
            })
            .expect("failed to spawn matching thread");

        state.handle = Some(handle);
    }

    /// Validate and enqueue an order. Blocks only under submit-queue
    /// backpressure.
    ///
    /// Rejections are submission-time preconditions; once accepted, the
    /// order's fate is decided entirely by the matching thread.
    pub fn submit(&self, order: Order) -> Result<(), SubmitError> {
        if order.quantity <= 0 {
            return Err(SubmitError::InvalidQuantity(order.quantity));
        }
        if order.kind == OrderType::Limit && order.price <= 0 {
            return Err(SubmitError::InvalidPrice(order.price));
        }
        if order.symbol != self.symbol {
            return Err(SubmitError::SymbolMismatch {
                expected: self.symbol.clone(),
                got: order.symbol,
            });
        }

        self.submit_queue
            .publish(order)
            .map_err(|_| SubmitError::Shutdown)
    }

    /// Fire-and-forget cancel request. Only resting orders can be
    /// cancelled; a request that arrives before its order is processed is
    /// silently dropped.
    pub fn cancel(&self, order_id: &str) {
        if self.cancel_tx.send(order_id.to_string()).is_err() {
            debug!(order_id, "cancel after shutdown ignored");
        }
    }

    /// Claim the engine's trade stream.
    ///
    /// # Panics
    /// Panics on a second claim; the trade queue contract is one consumer.
    pub fn trade_stream(&self) -> TradeConsumer {
        let already = self.trade_stream_claimed.swap(true, Ordering::AcqRel);
        assert!(!already, "trade stream already claimed");
        Arc::clone(&self.trade_queue).consumer()
    }

    /// Snapshot access to the book. Succeeds only while the matching
    /// thread is quiesced (before `start` or after `stop`); production
    /// consumers read market data from the trade stream instead.
    pub fn order_book(&self) -> Option<MappedMutexGuard<'_, OrderBook>> {
        let guard = self.core.try_lock()?;
        Some(MutexGuard::map(guard, MatchingCore::book_mut))
    }

    /// Graceful shutdown: close the submit queue, let the matcher drain
    /// every accepted order, then end the trade stream.
    ///
    /// A panic on the matching thread is fatal and resurfaces here.
    pub fn stop(&self) {
        let mut state = self.state.lock();
        if state.stopped {
            return;
        }
        state.stopped = true;

        self.submit_queue.close();
        if let Some(handle) = state.handle.take() {
            if handle.join().is_err() {
                panic!("matching thread panicked; book invariants are unrecoverable");
            }
        }
        self.trade_queue.close();
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.stop();
    }
}

/// The matching loop proper. Runs until the submit queue is closed and
/// drained.
fn run_matching_loop(
    core: &mut MatchingCore,
    submit_queue: &Arc<BoundedQueue<Order>>,
    trade_queue: &BoundedQueue<Trade>,
    cancel_rx: &mpsc::Receiver<String>,
) {
    let mut orders = Arc::clone(submit_queue).consumer();
    let mut trades = Vec::new();

    loop {
        // The only steady-state suspension point.
        let Some(order) = orders.consume() else {
            break;
        };

        // Cancels interleave at iteration granularity, capped so a cancel
        // storm cannot starve matching. Draining after the wake-up lets a
        // cancel that arrived while the matcher was parked precede the
        // order that ended the wait.
        for order_id in cancel_rx.try_iter().take(CANCEL_DRAIN_LIMIT) {
            core.apply_cancel(&order_id);
        }

        core.process_order(order, &mut trades);

        // Backpressures deliberately when the trade queue is full; there
        // is no drop policy.
        for trade in trades.drain(..) {
            if trade_queue.publish(trade).is_err() {
                return;
            }
        }
    }

    // Late cancels against the final book state, uncapped: nothing is
    // left to starve at shutdown
    for order_id in cancel_rx.try_iter() {
        core.apply_cancel(&order_id);
    }
}

/// Pin the matching thread to the last core; it is the least likely to
/// take OS interrupts.
fn pin_to_core() {
    if let Some(core_ids) = core_affinity::get_core_ids() {
        if let Some(last) = core_ids.last() {
            core_affinity::set_for_current(*last);
        }
    }
}
