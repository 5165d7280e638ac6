//! Mileage resolution by walking the junction chain to the network root

use crate::{GeometryAdapter, JunctionIndex, MileageError, Network, PointId, Result, SegmentId};
use geo::Coord;
use rayon::prelude::*;

/// Cumulative distance of one point on one segment
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MileageRecord {
    pub point_id: PointId,
    pub segment_id: SegmentId,
    /// Distance from the segment's start to the point
    pub local_distance: f64,
    /// Distance from the network root to the point
    pub full_distance: f64,
    /// Segments from the point's segment down to the root trunk
    pub path: Vec<SegmentId>,
}

impl MileageRecord {
    /// Path rendered as comma-joined ids, e.g. `"3,2,1"`
    pub fn path_string(&self) -> String {
        self.path
            .iter()
            .map(SegmentId::to_string)
            .collect::<Vec<_>>()
            .join(",")
    }
}

/// A point to resolve in batch mode
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PointOfInterest {
    pub id: PointId,
    pub location: Coord<f64>,
    /// Segment the point lies on; when unset every segment within tolerance is used
    pub segment: Option<SegmentId>,
}

impl PointOfInterest {
    pub fn new(id: PointId, location: Coord<f64>) -> Self {
        Self {
            id,
            location,
            segment: None,
        }
    }

    pub fn on_segment(id: PointId, location: Coord<f64>, segment: SegmentId) -> Self {
        Self {
            id,
            location,
            segment: Some(segment),
        }
    }
}

/// How a batch reacts to a failing point
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum BatchMode {
    /// The first failure in input order aborts the batch
    #[default]
    Abort,
    /// Failures are collected next to the successful records
    BestEffort,
}

/// A point that could not be resolved in best-effort mode
#[derive(Debug, Clone, PartialEq)]
pub struct PointFailure {
    pub point_id: PointId,
    pub error: MileageError,
}

/// Result of a batch resolution
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MileageTable {
    /// Records sorted by (point id, segment id)
    pub rows: Vec<MileageRecord>,
    /// Failures in input order (always empty in abort mode)
    pub failures: Vec<PointFailure>,
}

impl MileageTable {
    #[inline]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Resolves points against a read-only network and junction index
pub struct MileageResolver<'a, G: ?Sized> {
    network: &'a Network,
    junctions: &'a JunctionIndex,
    geometry: &'a G,
    tolerance: f64,
}

#[cfg_attr(feature = "profiling", profiling::all_functions)]
impl<'a, G> MileageResolver<'a, G>
where
    G: GeometryAdapter + ?Sized,
{
    pub fn new(
        network: &'a Network,
        junctions: &'a JunctionIndex,
        geometry: &'a G,
        tolerance: f64,
    ) -> Self {
        Self {
            network,
            junctions,
            geometry,
            tolerance,
        }
    }

    /// Resolve a point lying on `segment`
    pub fn resolve(
        &self,
        point_id: PointId,
        point: Coord<f64>,
        segment: SegmentId,
    ) -> Result<MileageRecord> {
        let local_distance = self
            .geometry
            .measure_along(self.network.segment(segment)?, point, self.tolerance)
            .ok_or(MileageError::NotOnSegment {
                segment,
                x: point.x,
                y: point.y,
            })?;

        let (full_distance, path) = self.walk_to_root(segment, local_distance)?;

        Ok(MileageRecord {
            point_id,
            segment_id: segment,
            local_distance,
            full_distance,
            path,
        })
    }

    /// Cumulative distance of `local_distance` on `segment`, with the segments crossed
    pub fn walk_to_root(
        &self,
        segment: SegmentId,
        local_distance: f64,
    ) -> Result<(f64, Vec<SegmentId>)> {
        let mut full_distance = local_distance;
        let mut path = vec![segment];
        let mut current = segment;

        while let Some(junction) = self.junctions.junction_of(current) {
            if path.len() > self.junctions.len() {
                return Err(MileageError::Consistency {
                    segments: path,
                    reason: "junction walk exceeded the junction count".to_string(),
                });
            }
            full_distance += junction.distance_along_parent;
            path.push(junction.parent);
            current = junction.parent;
        }

        Ok((full_distance, path))
    }

    /// Resolve one point of interest, locating it when no segment is given
    ///
    /// A point without a segment yields one record per segment within tolerance.
    pub fn resolve_point(&self, point: &PointOfInterest) -> Result<Vec<MileageRecord>> {
        if let Some(segment) = point.segment {
            return Ok(vec![self.resolve(point.id, point.location, segment)?]);
        }

        let segments = self.network.segments_within(point.location, self.tolerance);
        if segments.is_empty() {
            return Err(MileageError::Unlocated {
                point: point.id,
                x: point.location.x,
                y: point.location.y,
            });
        }

        segments
            .into_iter()
            .map(|segment| self.resolve(point.id, point.location, segment))
            .collect()
    }

    /// Resolve many points in parallel
    pub fn resolve_batch(
        &self,
        points: &[PointOfInterest],
        mode: BatchMode,
    ) -> Result<MileageTable> {
        #[cfg(feature = "profiling")]
        profiling::scope!("mileage::resolve_batch");

        let results: Vec<Result<Vec<MileageRecord>>> = points
            .par_iter()
            .map(|point| self.resolve_point(point))
            .collect();

        let mut table = MileageTable::default();
        for (point, result) in points.iter().zip(results) {
            match (result, mode) {
                (Ok(records), _) => table.rows.extend(records),
                (Err(error), BatchMode::Abort) => return Err(error),
                (Err(error), BatchMode::BestEffort) => {
                    tracing::warn!("Skipping point {}: {}", point.id, error);
                    table.failures.push(PointFailure {
                        point_id: point.id,
                        error,
                    });
                }
            }
        }

        table
            .rows
            .sort_by_key(|record| (record.point_id, record.segment_id));

        tracing::debug!(
            "Resolved {} points into {} records ({} failures)",
            points.len(),
            table.rows.len(),
            table.failures.len()
        );
        Ok(table)
    }
}
