//! Read and write facades over the shared state
//!
//! - `QueryService` - counters and history, read-only
//! - `ConfigService` - region writes from both the HTTP API and the
//!   interactive drawing client
//!
//! Neither holds business logic beyond input-shape validation.

use crate::domain::event::OccupancyEvent;
use crate::domain::region::POLYGON_VERTICES;
use crate::domain::types::Point;
use crate::error::{OccupancyError, Result};
use crate::infra::metrics::Metrics;
use crate::services::counters::CounterSnapshot;
use crate::services::polygon_store::{AppendOutcome, RegionView};
use crate::services::state::OccupancyState;
use std::sync::Arc;
use tracing::{info, warn};

/// Optional frame size used to bound incoming coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameBounds {
    pub width: u32,
    pub height: u32,
}

impl FrameBounds {
    fn check(&self, point: Point) -> Result<()> {
        let x_ok = point.x >= 0 && point.x as u32 <= self.width;
        let y_ok = point.y >= 0 && point.y as u32 <= self.height;
        if x_ok && y_ok {
            Ok(())
        } else {
            Err(OccupancyError::invalid(format!(
                "point {} outside frame {}x{}",
                point, self.width, self.height
            )))
        }
    }
}

/// Read-only access to counters and history
#[derive(Clone)]
pub struct QueryService {
    state: Arc<OccupancyState>,
}

impl QueryService {
    pub fn new(state: Arc<OccupancyState>) -> Self {
        Self { state }
    }

    pub fn live_count(&self) -> u64 {
        self.state.counters.live_count()
    }

    pub fn counters(&self) -> CounterSnapshot {
        self.state.counters.snapshot()
    }

    pub fn history(&self) -> Vec<Arc<OccupancyEvent>> {
        self.state.history.snapshot()
    }

    pub fn history_since(&self, offset: usize) -> Vec<Arc<OccupancyEvent>> {
        self.state.history.since(offset)
    }
}

/// Region writes for programmatic and interactive callers
#[derive(Clone)]
pub struct ConfigService {
    state: Arc<OccupancyState>,
    bounds: Option<FrameBounds>,
    metrics: Arc<Metrics>,
}

impl ConfigService {
    pub fn new(state: Arc<OccupancyState>, bounds: Option<FrameBounds>, metrics: Arc<Metrics>) -> Self {
        Self { state, bounds, metrics }
    }

    /// Convert raw `[x, y]` pairs into points, checking shape and range
    pub fn parse_points(&self, raw: &[Vec<i64>]) -> Result<Vec<Point>> {
        raw.iter()
            .enumerate()
            .map(|(i, pair)| {
                let [x, y] = pair.as_slice() else {
                    return Err(OccupancyError::invalid(format!(
                        "point {} must be an [x, y] pair, got {} values",
                        i,
                        pair.len()
                    )));
                };
                let point = Point::new(to_coord(*x)?, to_coord(*y)?);
                self.check_bounds(point)?;
                Ok(point)
            })
            .collect()
    }

    fn check_bounds(&self, point: Point) -> Result<()> {
        match self.bounds {
            Some(bounds) => bounds.check(point),
            None => Ok(()),
        }
    }

    /// Replace the region with exactly 4 points
    ///
    /// Any other shape is rejected and the current region stays active.
    pub fn set_area(&self, raw: &[Vec<i64>]) -> Result<RegionView> {
        let result = self.try_set_area(raw);
        match &result {
            Ok(view) => {
                self.metrics.record_region_write();
                info!(
                    revision = %view.revision,
                    points = ?view.state.points(),
                    "region_replaced"
                );
            }
            Err(e) => {
                self.metrics.record_region_rejected();
                warn!(error = %e, "region_replace_rejected");
            }
        }
        result
    }

    fn try_set_area(&self, raw: &[Vec<i64>]) -> Result<RegionView> {
        if raw.len() != POLYGON_VERTICES {
            return Err(OccupancyError::invalid(format!(
                "expected exactly {} points, got {}",
                POLYGON_VERTICES,
                raw.len()
            )));
        }
        let points = self.parse_points(raw)?;
        self.state.region.replace(&points)
    }

    pub fn area(&self) -> RegionView {
        self.state.region.view()
    }

    /// Interactive add-point
    pub fn add_point(&self, x: i64, y: i64) -> Result<(AppendOutcome, RegionView)> {
        let point = Point::new(to_coord(x)?, to_coord(y)?);
        self.check_bounds(point)?;

        let (outcome, view) = self.state.region.append_point(point);
        if outcome != AppendOutcome::Ignored {
            self.metrics.record_region_write();
        }
        info!(
            point = %point,
            outcome = %outcome.as_str(),
            revision = %view.revision,
            "region_point_added"
        );
        Ok((outcome, view))
    }

    /// Interactive reset to an empty pending region
    pub fn reset(&self) -> RegionView {
        let view = self.state.region.reset();
        self.metrics.record_region_write();
        info!(revision = %view.revision, "region_reset");
        view
    }
}

fn to_coord(value: i64) -> Result<i32> {
    i32::try_from(value)
        .map_err(|_| OccupancyError::invalid(format!("coordinate {} out of range", value)))
}
