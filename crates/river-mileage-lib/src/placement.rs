//! Point placement - the inverse of mileage resolution
//!
//! Turns a (segment, distance-from-start) pair back into a coordinate. Also
//! generates reproducible random points along every segment, which is how test
//! inputs for batch resolution are produced.

use crate::{GeometryAdapter, MileageError, Network, PointId, PointOfInterest, Result, SegmentId};
use geo::Coord;
use rand::{Rng, SeedableRng, rngs::SmallRng};
use rayon::prelude::*;

/// What to do with a distance outside `[0, length]`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum RangePolicy {
    /// Move the distance to the nearest end of the segment
    Clamp,
    /// Fail with [`MileageError::OutOfRange`]
    #[default]
    Reject,
}

/// A point placed on a segment
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PlacedPoint {
    pub segment_id: SegmentId,
    /// Distance actually used, after clamping
    pub distance: f64,
    pub point: Coord<f64>,
}

/// Places points on segments of a read-only network
pub struct PointPlacementService<'a, G: ?Sized> {
    network: &'a Network,
    geometry: &'a G,
    policy: RangePolicy,
}

#[cfg_attr(feature = "profiling", profiling::all_functions)]
impl<'a, G> PointPlacementService<'a, G>
where
    G: GeometryAdapter + ?Sized,
{
    pub fn new(network: &'a Network, geometry: &'a G, policy: RangePolicy) -> Self {
        Self {
            network,
            geometry,
            policy,
        }
    }

    /// Point at `distance` from the start of `segment`
    pub fn place(&self, segment: SegmentId, distance: f64) -> Result<PlacedPoint> {
        let target = self.network.segment(segment)?;
        let length = target.length();

        let distance = if (0.0..=length).contains(&distance) {
            distance
        } else {
            match self.policy {
                RangePolicy::Clamp if !distance.is_nan() => distance.clamp(0.0, length),
                _ => {
                    return Err(MileageError::OutOfRange {
                        segment,
                        distance,
                        length,
                    });
                }
            }
        };

        let point = self
            .geometry
            .interpolate(target, distance)
            .ok_or_else(|| MileageError::Geometry {
                segment,
                reason: format!("cannot interpolate at distance {distance}"),
            })?;

        Ok(PlacedPoint {
            segment_id: segment,
            distance,
            point: point.0,
        })
    }

    /// Place many (segment, distance) pairs, failing on the first bad pair in input order
    pub fn place_batch(&self, requests: &[(SegmentId, f64)]) -> Result<Vec<PlacedPoint>> {
        let placed: Vec<Result<PlacedPoint>> = requests
            .par_iter()
            .map(|&(segment, distance)| self.place(segment, distance))
            .collect();
        placed.into_iter().collect()
    }

    /// Random points spread uniformly along every segment
    ///
    /// The same `seed` always yields the same points. Ids are assigned from 1 in
    /// network order, and each point carries the segment it was placed on.
    pub fn sample_along(&self, per_segment: usize, seed: u64) -> Result<Vec<PointOfInterest>> {
        let mut rng = SmallRng::seed_from_u64(seed);
        let mut points = Vec::with_capacity(per_segment * self.network.len());

        for segment in self.network.segments() {
            for _ in 0..per_segment {
                let distance = rng.gen_range(0.0..=segment.length());
                let placed = self.place(segment.id(), distance)?;
                points.push(PointOfInterest::on_segment(
                    PointId(points.len() as u64 + 1),
                    placed.point,
                    segment.id(),
                ));
            }
        }

        tracing::debug!("Sampled {} points along {} segments", points.len(), self.network.len());
        Ok(points)
    }
}
