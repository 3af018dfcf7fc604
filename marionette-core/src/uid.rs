//! Request correlation ids.
//!
//! Every outstanding request on a channel is keyed by a [`Uid`]. Ids must
//! never collide between outstanding requests; the original scheme
//! (concatenated random hex segments) is replaced here by a 128-bit id whose
//! second half is a process-wide monotonic counter, making collisions within
//! a process impossible and cross-process collisions negligible.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// 128-bit correlation id.
///
/// The `first` half is random per id; the `second` half is a process-wide
/// monotonic counter. [`Uid::fresh`] therefore never repeats within a
/// process.
///
/// # Examples
///
/// ```
/// use marionette_core::Uid;
///
/// let a = Uid::fresh();
/// let b = Uid::fresh();
/// assert_ne!(a, b);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Uid {
    /// Random half.
    pub first: u64,
    /// Monotonic half.
    pub second: u64,
}

static NEXT_SEQUENCE: AtomicU64 = AtomicU64::new(1);

impl Uid {
    /// Create a Uid with explicit values.
    pub const fn new(first: u64, second: u64) -> Self {
        Self { first, second }
    }

    /// Generate a fresh, process-unique id.
    pub fn fresh() -> Self {
        Self {
            first: rand::random(),
            second: NEXT_SEQUENCE.fetch_add(1, Ordering::Relaxed),
        }
    }
}

impl std::fmt::Display for Uid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:016x}{:016x}", self.first, self.second)
    }
}
