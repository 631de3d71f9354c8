//! Shared occupancy state
//!
//! One `Arc<OccupancyState>` is handed to the ingestion loop and to every
//! request handler. Each member carries its own synchronization.

use crate::domain::region::RegionState;
use crate::services::counters::Counters;
use crate::services::history::EventHistory;
use crate::services::polygon_store::PolygonStore;

#[derive(Default)]
pub struct OccupancyState {
    pub region: PolygonStore,
    pub history: EventHistory,
    pub counters: Counters,
}

impl OccupancyState {
    pub fn new(initial_region: RegionState) -> Self {
        Self {
            region: PolygonStore::new(initial_region),
            history: EventHistory::new(),
            counters: Counters::new(),
        }
    }
}
