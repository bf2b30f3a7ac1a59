//! Internal health counters for framework anomalies that would otherwise
//! only show up as user-facing errors. A metrics plugin can scrape these;
//! the core does not bind a backend.

use std::sync::atomic::{AtomicU64, Ordering};

pub struct Counter(AtomicU64);

impl Counter {
    pub const fn new() -> Self {
        Self(AtomicU64::new(0))
    }

    #[inline]
    pub fn incr(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn value(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

/// A call reached the byte pipeline without a codec configured.
pub static CLIENT_CODEC_EMPTY: Counter = Counter::new();

/// Node selection failed (selector error or empty node address).
pub static SELECT_NODE_FAIL: Counter = Counter::new();
