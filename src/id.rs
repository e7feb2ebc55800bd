//! Page and opaque identifier generation.
//!
//! Page ids come from a process-wide monotonic counter held by the
//! [`Guard`](crate::Guard), so ids are unique across every session and every
//! scope cache. Wrap-around of the 64-bit counter is not handled.

use std::sync::atomic::{AtomicU64, Ordering};

/// Monotonic page id source.
///
/// # Examples
///
/// ```
/// use tamper_guard::IdGenerator;
///
/// let ids = IdGenerator::new();
/// let first = ids.next_page_id();
/// let second = ids.next_page_id();
/// assert!(second > first);
/// ```
#[derive(Debug)]
pub struct IdGenerator {
    next: AtomicU64,
}

impl IdGenerator {
    /// Creates a generator whose first id is 1.
    pub fn new() -> Self {
        Self::starting_at(1)
    }

    /// Creates a generator whose first id is `first`.
    pub fn starting_at(first: u64) -> Self {
        Self {
            next: AtomicU64::new(first),
        }
    }

    /// Returns the next page id. Strictly increasing for the life of the generator.
    pub fn next_page_id(&self) -> u64 {
        self.next.fetch_add(1, Ordering::Relaxed)
    }
}

impl Default for IdGenerator {
    fn default() -> Self {
        Self::new()
    }
}

/// Returns a random 128-bit identifier as 32 lowercase hex characters.
pub fn new_opaque_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

/// Returns the random component embedded in memory-strategy tokens.
pub(crate) fn page_nonce() -> String {
    format!("{:016x}", rand::random::<u64>())
}
