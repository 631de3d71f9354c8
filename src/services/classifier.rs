//! Point-in-region membership classification
//!
//! Pending regions classify everything as Outside. Active regions use a
//! containment test whose edge handling is an explicit policy:
//! - `Inclusive` (default) - points on an edge or vertex are Inside
//! - `Exclusive` - points on an edge or vertex are Outside

use crate::domain::region::RegionState;
use crate::domain::types::{Membership, Point};
use geo::{Contains, Intersects};
use serde::Deserialize;

/// How points lying exactly on the boundary are classified
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BoundaryPolicy {
    #[default]
    Inclusive,
    Exclusive,
}

impl BoundaryPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            BoundaryPolicy::Inclusive => "inclusive",
            BoundaryPolicy::Exclusive => "exclusive",
        }
    }
}

/// Stateless classifier configured with a boundary policy
#[derive(Debug, Clone, Copy, Default)]
pub struct MembershipClassifier {
    policy: BoundaryPolicy,
}

impl MembershipClassifier {
    pub fn new(policy: BoundaryPolicy) -> Self {
        Self { policy }
    }

    #[inline]
    pub fn policy(&self) -> BoundaryPolicy {
        self.policy
    }

    /// Classify a point against one region snapshot
    pub fn classify(&self, point: Point, region: &RegionState) -> Membership {
        let Some(polygon) = region.polygon() else {
            return Membership::Outside;
        };

        let coord = geo::Coord { x: f64::from(point.x), y: f64::from(point.y) };
        let inside = match self.policy {
            // Intersects covers interior and boundary
            BoundaryPolicy::Inclusive => polygon.shape().intersects(&coord),
            // Contains covers the interior only
            BoundaryPolicy::Exclusive => polygon.shape().contains(&coord),
        };

        if inside {
            Membership::Inside
        } else {
            Membership::Outside
        }
    }
}
