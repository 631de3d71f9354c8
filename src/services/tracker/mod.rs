//! Per-track occupancy state machine and frame orchestration
//!
//! The tracker is the only writer of counters and history. For each frame it:
//! - takes one region snapshot (a concurrent replace applies from the next frame)
//! - filters detections by class, confidence, and track identity
//! - classifies each remaining track once and applies the transition rule
//!
//! Nothing between the snapshot and the last transition awaits, so a frame
//! is applied as a unit.

mod handlers;
#[cfg(test)]
mod tests;

use crate::domain::event::EventKind;
use crate::domain::types::{DetectionFrame, TrackId, TrackedEntity};
use crate::infra::config::Config;
use crate::infra::metrics::Metrics;
use crate::services::classifier::MembershipClassifier;
use crate::services::state::OccupancyState;
use rustc_hash::{FxHashMap, FxHashSet};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info};

/// Which detections the tracker counts
#[derive(Debug, Clone)]
pub(crate) struct DetectionFilter {
    pub(crate) target_class: String,
    pub(crate) min_confidence: f32,
}

/// Summary of one applied frame
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameOutcome {
    /// Detections that were classified
    pub accepted: u64,
    /// Detections filtered out, missing a position, or duplicated in the batch
    pub ignored: u64,
    pub entered: u64,
    pub exited: u64,
}

/// Central frame processor for region occupancy
pub struct OccupancyTracker {
    /// Tracks that have been inside at least once, by track id
    pub(crate) entities: FxHashMap<TrackId, TrackedEntity>,
    /// Shared region, counters, and history
    pub(crate) state: Arc<OccupancyState>,
    pub(crate) classifier: MembershipClassifier,
    pub(crate) filter: DetectionFilter,
    pub(crate) metrics: Arc<Metrics>,
    /// Reused per frame to drop repeated track ids
    seen: FxHashSet<TrackId>,
}

impl OccupancyTracker {
    pub fn new(config: &Config, state: Arc<OccupancyState>, metrics: Arc<Metrics>) -> Self {
        Self {
            entities: FxHashMap::default(),
            state,
            classifier: MembershipClassifier::new(config.boundary_policy()),
            filter: DetectionFilter {
                target_class: config.target_class().to_string(),
                min_confidence: config.min_confidence(),
            },
            metrics,
            seen: FxHashSet::default(),
        }
    }

    /// Consume frames until the channel closes or shutdown is signalled
    pub async fn run(
        &mut self,
        mut frame_rx: mpsc::Receiver<DetectionFrame>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        info!(
            target_class = %self.filter.target_class,
            min_confidence = %self.filter.min_confidence,
            boundary = %self.classifier.policy().as_str(),
            "tracker_started"
        );

        loop {
            tokio::select! {
                frame = frame_rx.recv() => {
                    match frame {
                        Some(frame) => {
                            self.process_frame(&frame);
                        }
                        None => {
                            info!("tracker_input_closed");
                            break;
                        }
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("tracker_shutdown");
                        break;
                    }
                }
            }
        }
    }

    /// Apply one detection batch
    pub fn process_frame(&mut self, frame: &DetectionFrame) -> FrameOutcome {
        let region = self.state.region.get();
        let mut outcome = FrameOutcome::default();
        self.seen.clear();

        for detection in &frame.detections {
            let Some((track_id, position)) = self.accept(detection) else {
                outcome.ignored += 1;
                continue;
            };
            if !self.seen.insert(track_id) {
                debug!(track_id = %track_id, frame = ?frame.frame, "duplicate_track_in_frame");
                outcome.ignored += 1;
                continue;
            }

            outcome.accepted += 1;
            let membership = self.classifier.classify(position, &region);
            match self.apply(track_id, membership, &region) {
                Some(EventKind::Entered) => outcome.entered += 1,
                Some(EventKind::Exited) => outcome.exited += 1,
                None => {}
            }
        }

        let latency_us = frame.received_at.elapsed().as_micros() as u64;
        self.metrics.record_frame_processed(latency_us, outcome.accepted, outcome.ignored);
        self.metrics.set_tracked_entities(self.entities.len() as u64);

        outcome
    }

    /// Number of tracks retained (all have entered at least once)
    pub fn tracked_entities(&self) -> usize {
        self.entities.len()
    }

    pub fn entity(&self, track_id: TrackId) -> Option<&TrackedEntity> {
        self.entities.get(&track_id)
    }
}
