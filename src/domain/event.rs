//! Occupancy events: immutable entry/exit records

use crate::domain::region::RegionState;
use crate::domain::types::TrackId;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

/// Kind of region transition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Entered,
    Exited,
}

impl EventKind {
    #[inline]
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Entered => "entered",
            EventKind::Exited => "exited",
        }
    }
}

/// A recorded transition
///
/// Serializes as `{id, track_id, event, timestamp, coordinates}` where
/// `coordinates` is the region that was active when the event fired.
#[derive(Debug, Clone, Serialize)]
pub struct OccupancyEvent {
    /// UUIDv7, time-sortable
    pub id: Uuid,
    pub track_id: TrackId,
    #[serde(rename = "event")]
    pub kind: EventKind,
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "coordinates")]
    pub region: Arc<RegionState>,
}

impl OccupancyEvent {
    pub fn new(track_id: TrackId, kind: EventKind, region: Arc<RegionState>) -> Self {
        Self { id: Uuid::now_v7(), track_id, kind, timestamp: Utc::now(), region }
    }
}
