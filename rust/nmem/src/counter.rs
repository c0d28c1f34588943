use std::sync::atomic::{AtomicUsize, Ordering};

/// A thread-safe pin counter that saturates instead of wrapping in either direction.
///
/// Increments stop at `usize::MAX` and decrements stop at zero. Both use a bounded
/// compare-and-exchange loop, so concurrent pins and unpins from any number of threads
/// never lose an update and never block.
pub struct PinCounter(AtomicUsize);

impl PinCounter {
    /// Creates a counter with no pins.
    pub const fn new() -> PinCounter {
        PinCounter(AtomicUsize::new(0))
    }

    /// Adds one pin and returns the new count.
    ///
    /// If the counter is already at `usize::MAX`, it is left unchanged.
    pub fn acquire(&self) -> usize {
        let mut current = self.0.load(Ordering::Relaxed);
        while current != usize::MAX {
            match self.0.compare_exchange_weak(
                current,
                current + 1,
                Ordering::AcqRel,
                Ordering::Relaxed,
            ) {
                Ok(_) => return current + 1,
                Err(updated) => current = updated,
            }
        }
        current
    }

    /// Removes one pin and returns the new count.
    ///
    /// If the counter is already zero, it is left unchanged.
    pub fn release(&self) -> usize {
        let mut current = self.0.load(Ordering::Relaxed);
        while current != 0 {
            match self.0.compare_exchange_weak(
                current,
                current - 1,
                Ordering::AcqRel,
                Ordering::Relaxed,
            ) {
                Ok(_) => return current - 1,
                Err(updated) => current = updated,
            }
        }
        0
    }

    /// Returns the pin count (possibly stale by the time it is observed by the caller).
    pub fn read(&self) -> usize {
        self.0.load(Ordering::Acquire)
    }
}

impl Default for PinCounter {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for PinCounter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("PinCounter").field(&self.read()).finish()
    }
}
