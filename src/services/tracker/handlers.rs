//! Detection filtering and the per-track transition rule
//!
//! Each transition updates counters before appending to history, so a
//! reader never sees an event whose count is missing.

use super::OccupancyTracker;
use crate::domain::event::{EventKind, OccupancyEvent};
use crate::domain::region::RegionState;
use crate::domain::types::{Detection, Membership, Point, TrackId, TrackedEntity};
use std::sync::Arc;
use tracing::{debug, info};

impl OccupancyTracker {
    /// Apply class, confidence, and identity filters
    ///
    /// Returns the track id and classification point for detections that count.
    pub(crate) fn accept(&self, detection: &Detection) -> Option<(TrackId, Point)> {
        if detection.class_label != self.filter.target_class {
            return None;
        }
        if detection.confidence.is_nan() || detection.confidence < self.filter.min_confidence {
            return None;
        }
        let track_id = TrackId(detection.track_id?);
        let position = detection.position()?;
        Some((track_id, position))
    }

    /// Transition rule for one track with this frame's classification
    ///
    /// - Inside, never entered: Entered
    /// - Outside, entered, not yet exited: Exited
    /// - anything else: state update only
    pub(crate) fn apply(
        &mut self,
        track_id: TrackId,
        membership: Membership,
        region: &Arc<RegionState>,
    ) -> Option<EventKind> {
        match self.entities.get_mut(&track_id) {
            None => {
                if membership == Membership::Outside {
                    return None;
                }
                let mut entity = TrackedEntity::new(track_id);
                entity.has_entered = true;
                entity.membership = Membership::Inside;
                self.entities.insert(track_id, entity);
                self.record(track_id, EventKind::Entered, region);
                Some(EventKind::Entered)
            }
            Some(entity) => {
                let exiting = membership == Membership::Outside
                    && entity.has_entered
                    && !entity.has_exited;
                entity.membership = membership;
                if !exiting {
                    return None;
                }
                entity.has_exited = true;
                self.record(track_id, EventKind::Exited, region);
                Some(EventKind::Exited)
            }
        }
    }

    fn record(&self, track_id: TrackId, kind: EventKind, region: &Arc<RegionState>) {
        match kind {
            EventKind::Entered => self.state.counters.record_entry(),
            EventKind::Exited => self.state.counters.record_exit(),
        }
        let index = self.state.history.append(OccupancyEvent::new(track_id, kind, region.clone()));

        let counters = self.state.counters.snapshot();
        match kind {
            EventKind::Entered => info!(
                track_id = %track_id,
                live_count = %counters.live,
                entries = %counters.entries,
                region_status = %region.status(),
                "track_entered"
            ),
            EventKind::Exited => info!(
                track_id = %track_id,
                live_count = %counters.live,
                exits = %counters.exits,
                region_status = %region.status(),
                "track_exited"
            ),
        }
        debug!(track_id = %track_id, history_index = %index, "event_appended");
    }
}
