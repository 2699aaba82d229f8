//! Padded sequence counter shared between producers and the consumer

use crossbeam::utils::CachePadded;
use std::sync::atomic::{AtomicI64, Ordering};

/// Value of a cursor before anything has been claimed or processed
pub const INITIAL_CURSOR_VALUE: i64 = -1;

/// Monotonic sequence counter on its own cache line.
#[derive(Debug)]
pub struct Sequence {
    value: CachePadded<AtomicI64>,
}

impl Sequence {
    /// Create a counter starting at `initial`
    pub fn new(initial: i64) -> Self {
        Self {
            value: CachePadded::new(AtomicI64::new(initial)),
        }
    }

    /// Acquire load
    pub fn get(&self) -> i64 {
        self.value.load(Ordering::Acquire)
    }

    /// Release store
    pub fn set(&self, value: i64) {
        self.value.store(value, Ordering::Release);
    }

    /// Claim `current -> next` if nobody else moved the counter
    pub fn compare_and_set(&self, current: i64, next: i64) -> bool {
        self.value
            .compare_exchange(current, next, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

impl Default for Sequence {
    fn default() -> Self {
        Self::new(INITIAL_CURSOR_VALUE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_initial_cursor() {
        assert_eq!(Sequence::default().get(), INITIAL_CURSOR_VALUE);
    }

    #[test]
    fn test_compare_and_set() {
        let seq = Sequence::new(5);
        assert!(seq.compare_and_set(5, 6));
        assert!(!seq.compare_and_set(5, 7));
        assert_eq!(seq.get(), 6);
    }
}
