//! Tests for the OccupancyTracker module

use super::*;
use crate::domain::event::EventKind;
use crate::domain::region::RegionState;
use crate::domain::types::{Detection, Membership, Point};
use crate::services::classifier::BoundaryPolicy;
use crate::services::counters::CounterSnapshot;
use std::thread;

fn square() -> Vec<Point> {
    vec![Point::new(0, 0), Point::new(10, 0), Point::new(10, 10), Point::new(0, 10)]
}

fn create_test_tracker() -> OccupancyTracker {
    create_test_tracker_with_config(&Config::default())
}

fn create_test_tracker_with_config(config: &Config) -> OccupancyTracker {
    let state = Arc::new(OccupancyState::new(config.initial_region().clone()));
    OccupancyTracker::new(config, state, Arc::new(Metrics::new()))
}

fn tracker_with_square() -> OccupancyTracker {
    let tracker = create_test_tracker();
    tracker.state.region.replace(&square()).unwrap();
    tracker
}

/// Builder for creating test Detection instances
struct DetectionBuilder {
    detection: Detection,
}

impl DetectionBuilder {
    fn at(track_id: i64, x: i32, y: i32) -> Self {
        Self {
            detection: Detection {
                track_id: Some(track_id),
                bbox: None,
                point: Some(Point::new(x, y)),
                class_label: "person".to_string(),
                confidence: 0.9,
            },
        }
    }

    fn with_class(mut self, class: &str) -> Self {
        self.detection.class_label = class.to_string();
        self
    }

    fn with_confidence(mut self, confidence: f32) -> Self {
        self.detection.confidence = confidence;
        self
    }

    fn without_track_id(mut self) -> Self {
        self.detection.track_id = None;
        self
    }

    fn build(self) -> Detection {
        self.detection
    }
}

fn frame(detections: Vec<Detection>) -> DetectionFrame {
    DetectionFrame::new(detections)
}

fn person_at(track_id: i64, x: i32, y: i32) -> DetectionFrame {
    frame(vec![DetectionBuilder::at(track_id, x, y).build()])
}

fn history_kinds(tracker: &OccupancyTracker) -> Vec<(i64, EventKind)> {
    tracker.state.history.snapshot().iter().map(|e| (e.track_id.0, e.kind)).collect()
}

fn counters(tracker: &OccupancyTracker) -> CounterSnapshot {
    tracker.state.counters.snapshot()
}

#[test]
fn test_enter_then_exit() {
    let mut tracker = tracker_with_square();

    let outcome = tracker.process_frame(&person_at(1, 5, 5));
    assert_eq!(outcome.entered, 1);
    assert_eq!(counters(&tracker), CounterSnapshot { entries: 1, exits: 0, live: 1 });

    let outcome = tracker.process_frame(&person_at(1, 50, 50));
    assert_eq!(outcome.exited, 1);
    assert_eq!(counters(&tracker), CounterSnapshot { entries: 1, exits: 1, live: 0 });
    assert_eq!(history_kinds(&tracker), vec![(1, EventKind::Entered), (1, EventKind::Exited)]);

    let entity = tracker.entity(TrackId(1)).unwrap();
    assert!(entity.has_entered && entity.has_exited);
    assert_eq!(entity.membership, Membership::Outside);
}

#[test]
fn test_reentry_after_exit_is_not_counted() {
    let mut tracker = tracker_with_square();
    tracker.process_frame(&person_at(1, 5, 5));
    tracker.process_frame(&person_at(1, 50, 50));

    let outcome = tracker.process_frame(&person_at(1, 5, 5));
    assert_eq!(outcome, FrameOutcome { accepted: 1, ignored: 0, entered: 0, exited: 0 });
    assert_eq!(counters(&tracker).live, 0);
    assert_eq!(tracker.state.history.len(), 2);
    assert_eq!(tracker.entity(TrackId(1)).unwrap().membership, Membership::Inside);

    // Leaving a second time is silent too
    tracker.process_frame(&person_at(1, 50, 50));
    assert_eq!(tracker.state.history.len(), 2);
}

#[test]
fn test_pending_region_produces_no_events() {
    let mut tracker = create_test_tracker();
    assert!(!tracker.state.region.get().is_active());

    let outcome = tracker.process_frame(&person_at(1, 5, 5));
    assert_eq!(outcome.accepted, 1);
    assert_eq!(outcome.entered, 0);
    assert_eq!(counters(&tracker).live, 0);
    assert!(tracker.state.history.is_empty());
    assert_eq!(tracker.tracked_entities(), 0);
}

#[test]
fn test_partial_points_still_pending() {
    let mut tracker = create_test_tracker();
    for point in &square()[..3] {
        tracker.state.region.append_point(*point);
    }

    tracker.process_frame(&person_at(1, 5, 5));
    assert!(tracker.state.history.is_empty());
}

#[test]
fn test_rejected_replace_keeps_previous_region() {
    let mut tracker = tracker_with_square();
    let result = tracker.state.region.replace(&[
        Point::new(0, 0),
        Point::new(100, 0),
        Point::new(100, 100),
        Point::new(0, 100),
        Point::new(50, 50),
    ]);
    assert!(result.is_err());

    // (5, 5) is still inside the first square
    tracker.process_frame(&person_at(1, 5, 5));
    assert_eq!(counters(&tracker).entries, 1);

    // (50, 50) would only be inside the rejected region
    tracker.process_frame(&person_at(2, 50, 50));
    assert_eq!(counters(&tracker).entries, 1);
}

#[test]
fn test_reset_while_inside_exits_on_next_frame() {
    let mut tracker = tracker_with_square();
    tracker.process_frame(&person_at(1, 5, 5));

    tracker.state.region.reset();
    let outcome = tracker.process_frame(&person_at(1, 5, 5));
    assert_eq!(outcome.exited, 1);
    assert_eq!(counters(&tracker), CounterSnapshot { entries: 1, exits: 1, live: 0 });

    let exit = tracker.state.history.snapshot().pop().unwrap();
    assert!(!exit.region.is_active());
}

#[test]
fn test_event_captures_region_snapshot() {
    let mut tracker = tracker_with_square();
    tracker.process_frame(&person_at(1, 5, 5));

    tracker
        .state
        .region
        .replace(&[Point::new(0, 0), Point::new(100, 0), Point::new(100, 100), Point::new(0, 100)])
        .unwrap();
    tracker.process_frame(&person_at(2, 50, 50));

    let history = tracker.state.history.snapshot();
    assert_eq!(history[0].region.points(), &square()[..]);
    assert_eq!(history[1].region.points()[2], Point::new(100, 100));
}

#[test]
fn test_absent_track_keeps_state() {
    let mut tracker = tracker_with_square();
    tracker.process_frame(&person_at(1, 5, 5));

    tracker.process_frame(&frame(vec![]));
    tracker.process_frame(&person_at(2, 50, 50));

    assert_eq!(counters(&tracker).live, 1);
    assert_eq!(tracker.entity(TrackId(1)).unwrap().membership, Membership::Inside);
}

#[test]
fn test_filters_class_confidence_and_identity() {
    let config = Config::default().with_detection_filter("person", 0.5);
    let mut tracker = create_test_tracker_with_config(&config);
    tracker.state.region.replace(&square()).unwrap();

    let outcome = tracker.process_frame(&frame(vec![
        DetectionBuilder::at(1, 5, 5).with_class("car").build(),
        DetectionBuilder::at(2, 5, 5).with_confidence(0.2).build(),
        DetectionBuilder::at(3, 5, 5).with_confidence(f32::NAN).build(),
        DetectionBuilder::at(4, 5, 5).without_track_id().build(),
        DetectionBuilder::at(5, 5, 5).with_confidence(0.5).build(),
    ]));

    assert_eq!(outcome, FrameOutcome { accepted: 1, ignored: 4, entered: 1, exited: 0 });
    assert_eq!(history_kinds(&tracker), vec![(5, EventKind::Entered)]);
}

#[test]
fn test_detection_without_position_ignored() {
    let mut tracker = tracker_with_square();
    let mut detection = DetectionBuilder::at(1, 5, 5).build();
    detection.point = None;

    let outcome = tracker.process_frame(&frame(vec![detection]));
    assert_eq!(outcome.ignored, 1);
    assert!(tracker.state.history.is_empty());
}

#[test]
fn test_bbox_centre_used_for_classification() {
    let mut tracker = tracker_with_square();
    let mut detection = DetectionBuilder::at(1, 0, 0).build();
    detection.point = None;
    // Centre (5, 5) even though the box pokes outside the square
    detection.bbox = Some([-5, -5, 15, 15]);

    tracker.process_frame(&frame(vec![detection]));
    assert_eq!(counters(&tracker).entries, 1);
}

#[test]
fn test_duplicate_track_in_frame_uses_first_occurrence() {
    let mut tracker = tracker_with_square();

    let outcome = tracker.process_frame(&frame(vec![
        DetectionBuilder::at(1, 5, 5).build(),
        DetectionBuilder::at(1, 50, 50).build(),
    ]));
    assert_eq!(outcome, FrameOutcome { accepted: 1, ignored: 1, entered: 1, exited: 0 });
    assert_eq!(counters(&tracker).live, 1);

    let outcome = tracker.process_frame(&frame(vec![
        DetectionBuilder::at(1, 50, 50).build(),
        DetectionBuilder::at(1, 5, 5).build(),
    ]));
    assert_eq!(outcome.exited, 1);
    assert_eq!(history_kinds(&tracker), vec![(1, EventKind::Entered), (1, EventKind::Exited)]);
}

#[test]
fn test_boundary_policy_applies_to_tracker() {
    let mut inclusive = tracker_with_square();
    inclusive.process_frame(&person_at(1, 10, 5));
    assert_eq!(counters(&inclusive).entries, 1);

    let config = Config::default().with_boundary_policy(BoundaryPolicy::Exclusive);
    let mut exclusive = create_test_tracker_with_config(&config);
    exclusive.state.region.replace(&square()).unwrap();
    exclusive.process_frame(&person_at(1, 10, 5));
    assert_eq!(counters(&exclusive).entries, 0);
}

#[test]
fn test_at_most_once_per_track_over_long_sequence() {
    let mut tracker = tracker_with_square();

    // Three tracks oscillating in and out for many frames
    for step in 0..200 {
        let detections = (0..3)
            .map(|track| {
                let inside = (step + track) % 3 != 0;
                let (x, y) = if inside { (5, 5) } else { (40, 40) };
                DetectionBuilder::at(track as i64, x, y).build()
            })
            .collect();
        tracker.process_frame(&frame(detections));

        let snap = counters(&tracker);
        assert!(snap.entries >= snap.exits);
        assert_eq!(snap.live, snap.entries - snap.exits);
    }

    for track in 0..3 {
        let entered = history_kinds(&tracker)
            .iter()
            .filter(|(id, kind)| *id == track && *kind == EventKind::Entered)
            .count();
        let exited = history_kinds(&tracker)
            .iter()
            .filter(|(id, kind)| *id == track && *kind == EventKind::Exited)
            .count();
        assert_eq!(entered, 1);
        assert_eq!(exited, 1);
    }
    assert_eq!(counters(&tracker), CounterSnapshot { entries: 3, exits: 3, live: 0 });
}

#[test]
fn test_exit_never_precedes_entry_in_history() {
    let mut tracker = tracker_with_square();
    tracker.process_frame(&person_at(7, 50, 50));
    tracker.process_frame(&person_at(7, 5, 5));
    tracker.process_frame(&person_at(7, 50, 50));

    assert_eq!(history_kinds(&tracker), vec![(7, EventKind::Entered), (7, EventKind::Exited)]);
}

#[test]
fn test_repeated_queries_are_identical() {
    let mut tracker = tracker_with_square();
    tracker.process_frame(&person_at(1, 5, 5));

    let first = serde_json::to_string(&tracker.state.history.snapshot()).unwrap();
    let second = serde_json::to_string(&tracker.state.history.snapshot()).unwrap();
    assert_eq!(first, second);
    assert_eq!(counters(&tracker), counters(&tracker));
}

#[test]
fn test_metrics_recorded_per_frame() {
    let mut tracker = tracker_with_square();
    tracker.process_frame(&frame(vec![
        DetectionBuilder::at(1, 5, 5).build(),
        DetectionBuilder::at(2, 5, 5).with_class("dog").build(),
    ]));

    let summary = tracker.metrics.snapshot();
    assert_eq!(summary.frames_total, 1);
    assert_eq!(summary.detections_accepted, 1);
    assert_eq!(summary.detections_ignored, 1);
    assert_eq!(summary.tracked_entities, 1);
}

#[test]
fn test_concurrent_replace_never_mixes_regions() {
    // Two disjoint squares; a frame classifying against a mix of their
    // points would see a degenerate quad and break the count below.
    let left = square();
    let right: Vec<Point> = left.iter().map(|p| Point::new(p.x + 100, p.y)).collect();

    let mut tracker = tracker_with_square();
    let state = tracker.state.clone();

    let writer = thread::spawn(move || {
        for i in 0..2_000 {
            let points = if i % 2 == 0 { &right } else { &left };
            state.region.replace(points).unwrap();
        }
    });

    // Each frame places track 2k in the left square and 2k+1 in the right one;
    // exactly one of them is inside whichever whole snapshot the frame sees.
    let mut frames = 0u64;
    while !writer.is_finished() || frames < 500 {
        let base = (frames * 2) as i64;
        let outcome = tracker.process_frame(&frame(vec![
            DetectionBuilder::at(base, 5, 5).build(),
            DetectionBuilder::at(base + 1, 105, 5).build(),
        ]));
        assert_eq!(outcome.entered, 1);
        frames += 1;
    }
    writer.join().unwrap();

    assert_eq!(counters(&tracker).entries, frames);
}

#[tokio::test]
async fn test_run_consumes_until_channel_closes() {
    let mut tracker = tracker_with_square();
    let state = tracker.state.clone();
    let (frame_tx, frame_rx) = mpsc::channel(8);
    let (_shutdown_tx, shutdown_rx) = watch::channel(false);

    frame_tx.send(person_at(1, 5, 5)).await.unwrap();
    frame_tx.send(person_at(1, 50, 50)).await.unwrap();
    drop(frame_tx);

    tracker.run(frame_rx, shutdown_rx).await;
    assert_eq!(state.counters.snapshot(), CounterSnapshot { entries: 1, exits: 1, live: 0 });
}

#[tokio::test]
async fn test_run_stops_on_shutdown() {
    let mut tracker = create_test_tracker();
    let (_frame_tx, frame_rx) = mpsc::channel::<DetectionFrame>(8);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let handle = tokio::spawn(async move {
        tracker.run(frame_rx, shutdown_rx).await;
    });
    shutdown_tx.send(true).unwrap();

    tokio::time::timeout(std::time::Duration::from_secs(1), handle).await.unwrap().unwrap();
}

#[test]
fn test_initial_region_from_config() {
    let state = Arc::new(OccupancyState::new(RegionState::from_points(&square()).unwrap()));
    let mut tracker = OccupancyTracker::new(&Config::default(), state, Arc::new(Metrics::new()));
    tracker.process_frame(&person_at(1, 5, 5));
    assert_eq!(counters(&tracker).entries, 1);
}
