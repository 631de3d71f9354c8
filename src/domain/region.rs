//! Monitored region: a complete 4-vertex polygon or a pending partial one

use crate::domain::types::Point;
use crate::error::{OccupancyError, Result};
use serde::{Serialize, Serializer};
use smallvec::SmallVec;

/// Number of vertices required for an active region
pub const POLYGON_VERTICES: usize = 4;

/// Vertex storage; never spills to the heap
pub type Vertices = SmallVec<[Point; POLYGON_VERTICES]>;

/// A closed quadrilateral boundary (last vertex connects back to the first)
#[derive(Debug, Clone)]
pub struct Polygon {
    vertices: Vertices,
    /// Float geometry for containment tests. i32 -> f64 is exact.
    shape: geo::Polygon<f64>,
}

impl Polygon {
    /// Build a polygon from exactly `POLYGON_VERTICES` points
    pub fn new(points: &[Point]) -> Result<Self> {
        if points.len() != POLYGON_VERTICES {
            return Err(OccupancyError::invalid(format!(
                "expected exactly {} points, got {}",
                POLYGON_VERTICES,
                points.len()
            )));
        }

        let ring: Vec<geo::Coord<f64>> = points
            .iter()
            .map(|p| geo::Coord { x: f64::from(p.x), y: f64::from(p.y) })
            .collect();
        let shape = geo::Polygon::new(geo::LineString::new(ring), Vec::new());

        Ok(Self { vertices: points.iter().copied().collect(), shape })
    }

    #[inline]
    pub fn vertices(&self) -> &[Point] {
        &self.vertices
    }

    #[inline]
    pub(crate) fn shape(&self) -> &geo::Polygon<f64> {
        &self.shape
    }
}

impl PartialEq for Polygon {
    fn eq(&self, other: &Self) -> bool {
        self.vertices == other.vertices
    }
}

impl Eq for Polygon {}

/// Region state as stored and shared by snapshot
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegionState {
    /// Fewer than 4 points accumulated; classification always yields Outside
    Pending(Vertices),
    Active(Polygon),
}

impl Default for RegionState {
    fn default() -> Self {
        RegionState::Pending(Vertices::new())
    }
}

impl RegionState {
    /// Build a state from up to 4 points. More than 4 is rejected.
    pub fn from_points(points: &[Point]) -> Result<Self> {
        match points.len() {
            POLYGON_VERTICES => Ok(RegionState::Active(Polygon::new(points)?)),
            n if n < POLYGON_VERTICES => Ok(RegionState::Pending(points.iter().copied().collect())),
            n => Err(OccupancyError::invalid(format!(
                "at most {} points allowed, got {}",
                POLYGON_VERTICES, n
            ))),
        }
    }

    pub fn points(&self) -> &[Point] {
        match self {
            RegionState::Pending(points) => &points[..],
            RegionState::Active(polygon) => polygon.vertices(),
        }
    }

    pub fn polygon(&self) -> Option<&Polygon> {
        match self {
            RegionState::Active(polygon) => Some(polygon),
            RegionState::Pending(_) => None,
        }
    }

    #[inline]
    pub fn is_active(&self) -> bool {
        matches!(self, RegionState::Active(_))
    }

    pub fn status(&self) -> &'static str {
        match self {
            RegionState::Active(_) => "active",
            RegionState::Pending(_) => "pending",
        }
    }
}

/// Serialized as the bare point list: `[[x, y], ...]`
impl Serialize for RegionState {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_seq(self.points())
    }
}
