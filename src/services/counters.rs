//! Lock-free entry/exit counters
//!
//! Only the ingestion loop writes. An entry is always counted before the
//! matching exit, so a reader that loads `exits` first and `entries` second
//! always observes `entries >= exits`, and `live` is derived from that same
//! pair of loads.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Consistent counter reading
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CounterSnapshot {
    pub entries: u64,
    pub exits: u64,
    #[serde(rename = "live_count")]
    pub live: u64,
}

#[derive(Debug, Default)]
pub struct Counters {
    entries: AtomicU64,
    exits: AtomicU64,
}

impl Counters {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn record_entry(&self) {
        self.entries.fetch_add(1, Ordering::Release);
    }

    #[inline]
    pub fn record_exit(&self) {
        self.exits.fetch_add(1, Ordering::Release);
    }

    pub fn snapshot(&self) -> CounterSnapshot {
        // Order matters: exits before entries
        let exits = self.exits.load(Ordering::Acquire);
        let entries = self.entries.load(Ordering::Acquire);
        debug_assert!(entries >= exits, "exit counted before its entry");
        CounterSnapshot { entries, exits, live: entries.saturating_sub(exits) }
    }

    #[inline]
    pub fn live_count(&self) -> u64 {
        self.snapshot().live
    }
}
