//! Thread-safe monotonic sequence numbers.
//!
//! Useful inside a transform to derive unique identifiers, e.g. output file
//! names. Create a [`Seq`] per purpose, or use the process-wide counter behind
//! [`next`] when uniqueness is all that matters.

use std::sync::atomic::{AtomicU64, Ordering};

/// A monotonically increasing counter. The first value after a reset to `0` is `1`.
///
/// # Example
///
/// ```rust
/// use parmap::Seq;
///
/// let seq = Seq::new();
/// assert_eq!(seq.next(), 1);
/// assert_eq!(seq.next_as_string(), "2");
///
/// seq.reset(0);
/// assert_eq!(seq.next(), 1);
/// ```
#[derive(Debug, Default)]
pub struct Seq(AtomicU64);

impl Seq {
    /// A counter whose first value is `1`.
    pub const fn new() -> Self {
        Self::starting_at(0)
    }

    /// A counter whose first value is `value + 1`.
    pub const fn starting_at(value: u64) -> Self {
        Seq(AtomicU64::new(value))
    }

    /// Set the counter so the next value handed out is `value + 1`.
    pub fn reset(&self, value: u64) {
        self.0.store(value, Ordering::SeqCst);
    }

    /// Increment and return the new value.
    pub fn next(&self) -> u64 {
        self.0.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// The counter's current value, without incrementing.
    pub fn current(&self) -> u64 {
        self.0.load(Ordering::SeqCst)
    }

    /// Like [`Seq::next`], as a `usize`.
    pub fn next_as_usize(&self) -> usize {
        self.next() as usize
    }

    /// Like [`Seq::next`], formatted as a decimal string.
    pub fn next_as_string(&self) -> String {
        self.next().to_string()
    }
}

static GLOBAL: Seq = Seq::new();

/// Reset the process-wide counter to `0`.
pub fn reset() {
    GLOBAL.reset(0);
}

/// Next value of the process-wide counter.
pub fn next() -> u64 {
    GLOBAL.next()
}

/// Next value of the process-wide counter, as a `usize`.
pub fn next_as_usize() -> usize {
    GLOBAL.next_as_usize()
}

/// Next value of the process-wide counter, as a decimal string.
pub fn next_as_string() -> String {
    GLOBAL.next_as_string()
}
