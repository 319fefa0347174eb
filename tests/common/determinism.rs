//! Deterministic id generation
//!
//! Graph and tab ids normally come from random UUIDs; tests use a counter so
//! ids and failure messages are reproducible.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use promptcrafter::IdGenerator;

/// Hands out `{prefix}-1`, `{prefix}-2`, ...
///
/// # Example
/// ```ignore
/// let ids = SequentialIds::new("v");
/// assert_eq!(ids.next_id(), "v-1");
/// ```
#[derive(Debug)]
pub struct SequentialIds {
    prefix: &'static str,
    counter: AtomicU64,
}

impl SequentialIds {
    pub fn new(prefix: &'static str) -> Self {
        Self {
            prefix,
            counter: AtomicU64::new(1),
        }
    }

    /// Shared handle suitable for `TabManager::with_id_generator`
    pub fn shared(prefix: &'static str) -> Arc<Self> {
        Arc::new(Self::new(prefix))
    }

    /// Number of ids handed out so far
    pub fn issued(&self) -> u64 {
        self.counter.load(Ordering::SeqCst) - 1
    }
}

impl IdGenerator for SequentialIds {
    fn next_id(&self) -> String {
        let n = self.counter.fetch_add(1, Ordering::SeqCst);
        format!("{}-{}", self.prefix, n)
    }
}
