//! Append-only event log
//!
//! Events are stored as `Arc`s, so a snapshot is a cheap copy of pointers
//! taken under a short read lock and is never affected by later appends.

use crate::domain::event::OccupancyEvent;
use parking_lot::RwLock;
use std::sync::Arc;

#[derive(Default)]
pub struct EventHistory {
    events: RwLock<Vec<Arc<OccupancyEvent>>>,
}

impl EventHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an event, returning its index
    pub fn append(&self, event: OccupancyEvent) -> usize {
        let mut events = self.events.write();
        events.push(Arc::new(event));
        events.len() - 1
    }

    /// Point-in-time copy of the full log, in insertion order
    pub fn snapshot(&self) -> Vec<Arc<OccupancyEvent>> {
        self.events.read().clone()
    }

    /// Events at index `offset` and later
    pub fn since(&self, offset: usize) -> Vec<Arc<OccupancyEvent>> {
        let events = self.events.read();
        events.get(offset..).map(<[_]>::to_vec).unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.events.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.read().is_empty()
    }
}
