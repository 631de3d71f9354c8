//! Atomically swappable region boundary
//!
//! Readers take an `Arc<RegionState>` snapshot and classify a whole frame
//! against it; writers install a new snapshot under the write lock. A frame
//! therefore never sees a mix of old and new points.

use crate::domain::region::{RegionState, POLYGON_VERTICES};
use crate::domain::types::Point;
use crate::error::Result;
use parking_lot::RwLock;
use std::sync::Arc;

/// Current region plus a revision bumped on every successful write
#[derive(Debug, Clone)]
pub struct RegionView {
    pub state: Arc<RegionState>,
    pub revision: u64,
}

/// Result of an interactive add-point
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendOutcome {
    /// Point stored; region still pending with `count` points
    Added { count: usize },
    /// Point stored and the region became active
    Completed,
    /// Region already complete; reset before drawing a new one
    Ignored,
}

impl AppendOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            AppendOutcome::Added { .. } => "added",
            AppendOutcome::Completed => "completed",
            AppendOutcome::Ignored => "ignored",
        }
    }
}

struct Slot {
    state: Arc<RegionState>,
    revision: u64,
}

pub struct PolygonStore {
    slot: RwLock<Slot>,
}

impl Default for PolygonStore {
    fn default() -> Self {
        Self::new(RegionState::default())
    }
}

impl PolygonStore {
    pub fn new(initial: RegionState) -> Self {
        Self { slot: RwLock::new(Slot { state: Arc::new(initial), revision: 0 }) }
    }

    /// Snapshot of the current region
    #[inline]
    pub fn get(&self) -> Arc<RegionState> {
        self.slot.read().state.clone()
    }

    /// Snapshot of the current region with its revision
    pub fn view(&self) -> RegionView {
        let slot = self.slot.read();
        RegionView { state: slot.state.clone(), revision: slot.revision }
    }

    /// Install a new region built from up to 4 points
    ///
    /// On error the current region is left untouched.
    pub fn replace(&self, points: &[Point]) -> Result<RegionView> {
        // Validate before taking the lock
        let next = Arc::new(RegionState::from_points(points)?);
        let mut slot = self.slot.write();
        slot.state = next;
        slot.revision += 1;
        Ok(RegionView { state: slot.state.clone(), revision: slot.revision })
    }

    /// Add one vertex to a pending region
    pub fn append_point(&self, point: Point) -> (AppendOutcome, RegionView) {
        let mut slot = self.slot.write();

        let current = slot.state.points();
        if current.len() >= POLYGON_VERTICES {
            let view = RegionView { state: slot.state.clone(), revision: slot.revision };
            return (AppendOutcome::Ignored, view);
        }

        let mut points: Vec<Point> = current.to_vec();
        points.push(point);
        let count = points.len();

        // At most POLYGON_VERTICES points here, so this cannot be rejected
        let next = match RegionState::from_points(&points) {
            Ok(state) => state,
            Err(_) => {
                let view = RegionView { state: slot.state.clone(), revision: slot.revision };
                return (AppendOutcome::Ignored, view);
            }
        };
        let outcome = if next.is_active() {
            AppendOutcome::Completed
        } else {
            AppendOutcome::Added { count }
        };

        slot.state = Arc::new(next);
        slot.revision += 1;
        (outcome, RegionView { state: slot.state.clone(), revision: slot.revision })
    }

    /// Clear to a pending region with zero points
    pub fn reset(&self) -> RegionView {
        let mut slot = self.slot.write();
        slot.state = Arc::new(RegionState::default());
        slot.revision += 1;
        RegionView { state: slot.state.clone(), revision: slot.revision }
    }
}
