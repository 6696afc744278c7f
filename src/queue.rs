//! Bounded ring buffer with counting-semaphore backpressure.
//!
//! The submit path is multi-producer / single-consumer; the trade path uses
//! the same structure with a single producer. Producers linearize on a
//! fetch-and-increment of the write sequence; every slot hand-off rides a
//! semaphore release→acquire pair, which carries the happens-before edge
//! that makes slot contents visible across threads.
//!
//! The consumer drains in batches of up to [`CONSUME_BATCH`] items into a
//! local buffer, amortizing synchronization to roughly one blocking acquire
//! per batch under load.

use std::cell::UnsafeCell;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::{Condvar, Mutex};

/// Maximum number of items the consumer captures per blocking acquire.
pub const CONSUME_BATCH: usize = 128;

/// Error returned from `publish` once the queue is closed. Carries the
/// rejected item back to the caller.
#[derive(Debug)]
pub struct QueueClosed<T>(pub T);

/// Counting semaphore with a lock-free fast path.
///
/// `release` is a Release fetch-add on the permit counter and `acquire` an
/// Acquire compare-and-swap, so a release synchronizes-with the acquire
/// that consumes its permit. The parking_lot mutex/condvar pair is only the
/// parking substrate for contended waits; permits never travel through it.
struct Semaphore {
    permits: AtomicUsize,
    closed: AtomicBool,
    lock: Mutex<()>,
    cvar: Condvar,
}

impl Semaphore {
    fn new(permits: usize) -> Self {
        Self {
            permits: AtomicUsize::new(permits),
            closed: AtomicBool::new(false),
            lock: Mutex::new(()),
            cvar: Condvar::new(),
        }
    }

    /// Acquire one permit, blocking while none are available.
    ///
    /// Returns `false` only when the semaphore is closed and drained; a
    /// closed semaphore keeps handing out remaining permits so the consumer
    /// can finish the in-flight backlog.
    fn acquire(&self) -> bool {
        loop {
            let mut current = self.permits.load(Ordering::Acquire);
            while current > 0 {
                match self.permits.compare_exchange_weak(
                    current,
                    current - 1,
                    Ordering::AcqRel,
                    Ordering::Acquire,
                ) {
                    Ok(_) => return true,
                    Err(observed) => current = observed,
                }
            }

            if self.closed.load(Ordering::Acquire) {
                return false;
            }

            // Re-check under the lock: a releaser notifies while holding it,
            // so a permit posted between the check and the wait cannot be
            // missed.
            let mut guard = self.lock.lock();
            if self.permits.load(Ordering::Acquire) == 0 && !self.closed.load(Ordering::Acquire) {
                self.cvar.wait(&mut guard);
            }
        }
    }

    /// Non-blocking acquire via CAS decrement. Off the producer-critical
    /// path only (stream-style polling).
    fn try_acquire(&self) -> bool {
        let mut current = self.permits.load(Ordering::Acquire);
        while current > 0 {
            match self.permits.compare_exchange_weak(
                current,
                current - 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return true,
                Err(observed) => current = observed,
            }
        }
        false
    }

    /// Release one permit and wake one waiter.
    fn release(&self) {
        self.permits.fetch_add(1, Ordering::Release);
        let _guard = self.lock.lock();
        self.cvar.notify_one();
    }

    /// Close the semaphore and wake every waiter. Permits already posted
    /// remain acquirable.
    fn close(&self) {
        self.closed.store(true, Ordering::Release);
        let _guard = self.lock.lock();
        self.cvar.notify_all();
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

/// Fixed-capacity MPSC/SPSC ring buffer.
///
/// Slot ownership: a value moved in by `publish` is owned by the queue
/// until the consumer takes it out; the `empty` release for a slot
/// happens-before the next producer's acquire of that same slot, so
/// wrap-arounds never race.
pub struct BoundedQueue<T> {
    slots: Box<[UnsafeCell<Option<T>>]>,
    mask: u64,
    write_seq: AtomicU64,
    read_seq: AtomicU64,
    /// Free slots; producers acquire, consumer releases. Initial value N.
    empty: Semaphore,
    /// Published items; producers release, consumer acquires. Initial 0.
    full: Semaphore,
    consumer_claimed: AtomicBool,
}

// The UnsafeCell slots are handed across threads only through the
// semaphore protocol above; each slot has exactly one owner at a time.
unsafe impl<T: Send> Send for BoundedQueue<T> {}
unsafe impl<T: Send> Sync for BoundedQueue<T> {}

impl<T> BoundedQueue<T> {
    /// Create a queue with the given capacity.
    ///
    /// # Panics
    /// Panics unless `capacity` is a power of two (the mask trick requires
    /// it; a wrong capacity is a programmer error, caught at construction).
    pub fn new(capacity: usize) -> Self {
        assert!(
            capacity.is_power_of_two() && capacity > 0,
            "queue capacity must be a power of two, got {capacity}"
        );

        let slots = (0..capacity)
            .map(|_| UnsafeCell::new(None))
            .collect::<Vec<_>>()
            .into_boxed_slice();

        Self {
            slots,
            mask: capacity as u64 - 1,
            write_seq: AtomicU64::new(0),
            read_seq: AtomicU64::new(0),
            empty: Semaphore::new(capacity),
            full: Semaphore::new(0),
            consumer_claimed: AtomicBool::new(false),
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Publish one item, blocking while the queue is full.
    ///
    /// Safe for any number of concurrent producers: the fetch-and-increment
    /// on the write sequence is the linearization point, and the `empty`
    /// permit guarantees the claimed slot has been vacated by the consumer.
    pub fn publish(&self, item: T) -> Result<(), QueueClosed<T>> {
        if self.empty.is_closed() {
            return Err(QueueClosed(item));
        }
        if !self.empty.acquire() {
            return Err(QueueClosed(item));
        }

        let seq = self.write_seq.fetch_add(1, Ordering::AcqRel);
        let slot = &self.slots[(seq & self.mask) as usize];
        // Exclusive access: no other producer can hold this sequence, and
        // the consumer released the slot before posting the empty permit.
        unsafe {
            *slot.get() = Some(item);
        }

        self.full.release();
        Ok(())
    }

    /// Claim the single consumer handle.
    ///
    /// # Panics
    /// Panics on a second claim; both queue flavors require exactly one
    /// consumer (the batched drain is unsound with more).
    pub fn consumer(self: Arc<Self>) -> Consumer<T> {
        let already = self.consumer_claimed.swap(true, Ordering::AcqRel);
        assert!(!already, "queue consumer already claimed");
        Consumer {
            queue: self,
            cache: VecDeque::with_capacity(CONSUME_BATCH),
        }
    }

    /// Close the queue: blocked producers fail with [`QueueClosed`], the
    /// consumer drains whatever was already published and then observes
    /// end-of-stream.
    pub fn close(&self) {
        self.empty.close();
        self.full.close();
    }

    pub fn is_closed(&self) -> bool {
        self.empty.is_closed()
    }

    /// Take the item at the next read sequence. Caller must hold a `full`
    /// permit.
    fn take_next(&self) -> T {
        let seq = self.read_seq.fetch_add(1, Ordering::AcqRel);
        let slot = &self.slots[(seq & self.mask) as usize];
        let item = unsafe { (*slot.get()).take() };
        self.empty.release();
        match item {
            Some(item) => item,
            // A full permit without a published slot means the protocol was
            // violated; the book's invariants cannot be trusted past this.
            None => panic!("ring slot empty under a full permit"),
        }
    }
}

/// The single consumer of a [`BoundedQueue`], with a local drain buffer.
pub struct Consumer<T> {
    queue: Arc<BoundedQueue<T>>,
    cache: VecDeque<T>,
}

impl<T> Consumer<T> {
    /// Blocking consume in publication order.
    ///
    /// Returns `None` once the queue has been closed and fully drained.
    pub fn consume(&mut self) -> Option<T> {
        if let Some(item) = self.cache.pop_front() {
            return Some(item);
        }
        if !self.fill_cache() {
            return None;
        }
        self.cache.pop_front()
    }

    /// Non-blocking consume. `None` means presently empty (or closed and
    /// drained); poll again later.
    pub fn try_consume(&mut self) -> Option<T> {
        if let Some(item) = self.cache.pop_front() {
            return Some(item);
        }
        if !self.try_fill_cache() {
            return None;
        }
        self.cache.pop_front()
    }

    /// Blocking batch fill. One blocking acquire, then an optimistic batch
    /// sized from a write-sequence snapshot.
    fn fill_cache(&mut self) -> bool {
        let queue = &self.queue;

        // First item: the only suspension point.
        if !queue.full.acquire() {
            return false;
        }
        self.cache.push_back(queue.take_next());

        // The snapshot bounds the batch by items already published (or
        // mid-publish); every extra acquire is satisfied without parking
        // beyond a producer finishing its in-flight release, because the
        // in-flight count never decreases between snapshot and acquire
        // (single consumer).
        let write_snapshot = queue.write_seq.load(Ordering::Acquire);
        let read = queue.read_seq.load(Ordering::Relaxed);
        let extra = (write_snapshot - read).min(CONSUME_BATCH as u64 - 1);

        for _ in 0..extra {
            if !queue.full.acquire() {
                break;
            }
            self.cache.push_back(queue.take_next());
        }

        true
    }

    /// Non-blocking batch fill via CAS-decrement acquires.
    fn try_fill_cache(&mut self) -> bool {
        let queue = &self.queue;

        let write = queue.write_seq.load(Ordering::Acquire);
        let read = queue.read_seq.load(Ordering::Relaxed);
        if write == read {
            return false;
        }

        let batch = (write - read).min(CONSUME_BATCH as u64);
        let mut taken = 0;
        for _ in 0..batch {
            if !queue.full.try_acquire() {
                break;
            }
            self.cache.push_back(queue.take_next());
            taken += 1;
        }

        taken > 0
    }

    /// True once the queue is closed; remaining buffered items are still
    /// returned by `consume`/`try_consume`.
    pub fn is_closed(&self) -> bool {
        self.queue.is_closed()
    }
}
