//! Monotonic textual id generation for trades.

use std::fmt::Write;
use std::sync::atomic::{AtomicU64, Ordering};

/// Produces `prefix ‖ decimal(counter)` ids ("T1", "T2", ...).
///
/// Uniqueness holds within one engine instance for the life of the u64
/// counter, which is unreachable at realistic rates. Correctness nowhere
/// depends on the format.
pub struct IdGenerator {
    prefix: &'static str,
    counter: AtomicU64,
}

impl IdGenerator {
    pub const fn new(prefix: &'static str) -> Self {
        Self {
            prefix,
            counter: AtomicU64::new(0),
        }
    }

    /// Next unique id. The builder is sized up front so formatting never
    /// reallocates.
    pub fn next_id(&self) -> String {
        let count = self.counter.fetch_add(1, Ordering::Relaxed) + 1;
        let mut id = String::with_capacity(self.prefix.len() + 20);
        id.push_str(self.prefix);
        // write! to a String is infallible
        let _ = write!(id, "{count}");
        id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_sequential_ids() {
        let ids = IdGenerator::new("T");
        assert_eq!(ids.next_id(), "T1");
        assert_eq!(ids.next_id(), "T2");
        assert_eq!(ids.next_id(), "T3");
    }

    #[test]
    fn test_ids_unique_across_many() {
        let ids = IdGenerator::new("T");
        let generated: HashSet<_> = (0..10_000).map(|_| ids.next_id()).collect();
        assert_eq!(generated.len(), 10_000);
    }

    #[test]
    fn test_prefix_applied() {
        let ids = IdGenerator::new("TRD-");
        assert_eq!(ids.next_id(), "TRD-1");
    }
}
