//! Services - occupancy logic and shared state
//!
//! This module contains the core services:
//! - `tracker` - Per-track state machine, the only writer of counters and history
//! - `classifier` - Point-in-region membership with an explicit boundary policy
//! - `polygon_store` - Atomically swappable region
//! - `history` - Append-only event log
//! - `counters` - Lock-free entry/exit counters
//! - `state` - The shared bundle handed to every task
//! - `query` - Read facade (`QueryService`) and region writes (`ConfigService`)

pub mod classifier;
pub mod counters;
pub mod history;
pub mod polygon_store;
pub mod query;
pub mod state;
pub mod tracker;

// Re-export commonly used types
pub use classifier::{BoundaryPolicy, MembershipClassifier};
pub use counters::{CounterSnapshot, Counters};
pub use history::EventHistory;
pub use polygon_store::{AppendOutcome, PolygonStore, RegionView};
pub use query::{ConfigService, FrameBounds, QueryService};
pub use state::OccupancyState;
pub use tracker::{FrameOutcome, OccupancyTracker};
