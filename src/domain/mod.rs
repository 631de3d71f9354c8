//! Domain models - core types for region occupancy
//!
//! This module contains the canonical data types used throughout the system:
//! - `Point`, `Detection`, `DetectionFrame` - inbound per-frame detections
//! - `TrackedEntity` - per-track membership state
//! - `Polygon`, `RegionState` - the monitored boundary (active or pending)
//! - `OccupancyEvent` - immutable entry/exit record

pub mod event;
pub mod region;
pub mod types;

// Re-export commonly used types at module level
pub use event::{EventKind, OccupancyEvent};
pub use region::{Polygon, RegionState, POLYGON_VERTICES};
pub use types::{Detection, DetectionFrame, Membership, Point, TrackId, TrackedEntity};
