//! Shared types for the region counter

use serde::{Deserialize, Serialize};
use std::time::Instant;

/// Newtype wrapper for track IDs to provide type safety
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(transparent)]
pub struct TrackId(pub i64);

impl std::fmt::Display for TrackId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Integer pixel coordinate, serialized as `[x, y]`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "[i32; 2]", into = "[i32; 2]")]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    #[inline]
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

impl From<[i32; 2]> for Point {
    fn from([x, y]: [i32; 2]) -> Self {
        Self { x, y }
    }
}

impl From<Point> for [i32; 2] {
    fn from(p: Point) -> Self {
        [p.x, p.y]
    }
}

impl std::fmt::Display for Point {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// Floor division midpoint, computed in i64 so extreme coordinates cannot overflow
#[inline]
fn midpoint(a: i32, b: i32) -> i32 {
    (i64::from(a) + i64::from(b)).div_euclid(2) as i32
}

/// A single detection as produced by the external detector/tracker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    /// Missing when the tracker has not yet assigned an identity
    #[serde(default)]
    pub track_id: Option<i64>,
    /// Bounding box `[x1, y1, x2, y2]`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bbox: Option<[i32; 4]>,
    /// Explicit anchor point; takes precedence over the bbox centre
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub point: Option<Point>,
    #[serde(rename = "class", alias = "label", default)]
    pub class_label: String,
    #[serde(default = "default_confidence")]
    pub confidence: f32,
}

fn default_confidence() -> f32 {
    1.0
}

impl Detection {
    /// Position used for region classification
    pub fn position(&self) -> Option<Point> {
        if let Some(point) = self.point {
            return Some(point);
        }
        self.bbox.map(|[x1, y1, x2, y2]| Point::new(midpoint(x1, x2), midpoint(y1, y2)))
    }
}

/// One frame's detection batch
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionFrame {
    /// Optional frame sequence number from the producer
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frame: Option<u64>,
    #[serde(default)]
    pub detections: Vec<Detection>,
    /// When the frame reached this process (for latency measurement)
    #[serde(skip, default = "Instant::now")]
    pub received_at: Instant,
}

impl DetectionFrame {
    pub fn new(detections: Vec<Detection>) -> Self {
        Self { frame: None, detections, received_at: Instant::now() }
    }
}

/// Classified position of an entity relative to the region
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Membership {
    Outside,
    Inside,
}

impl Membership {
    pub fn as_str(&self) -> &'static str {
        match self {
            Membership::Outside => "outside",
            Membership::Inside => "inside",
        }
    }
}

/// Per-track state kept for the life of the process
///
/// Only materialized once a track is first seen Inside, so a stored
/// entity always has `has_entered == true`.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackedEntity {
    pub track_id: TrackId,
    pub membership: Membership,
    pub has_entered: bool,
    pub has_exited: bool,
}

impl TrackedEntity {
    /// Fresh entity for a track that has never been inside
    #[inline]
    pub fn new(track_id: TrackId) -> Self {
        Self { track_id, membership: Membership::Outside, has_entered: false, has_exited: false }
    }
}
