//! Geometry adapter - the seam between network algorithms and the geometry engine
//!
//! All proximity, measurement and interpolation work goes through the
//! [`GeometryAdapter`] trait. The algorithms never touch coordinates directly, so a
//! different engine (geodesic measurement, a database-backed index, ...) can be
//! plugged in without changing orientation, ranking or mileage code.
//!
//! [`PlanarGeometry`] is the default Euclidean implementation built on `geo`.

use crate::{EndpointClass, MileageError, Network, Result, Segment, SegmentId, utils};
use geo::algorithm::line_intersection::{LineIntersection, line_intersection};
use geo::{BoundingRect, Coord, Euclidean, InterpolatableLine, Intersects, LineLocatePoint, Point};
use rayon::prelude::*;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Caller-owned cancellation signal for long adapter calls
///
/// Clones share the same flag. The core only reads it; adapters decide how often
/// to check.
#[derive(Clone, Debug, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation of every operation holding a clone of this token
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Geometry capabilities consumed by the network algorithms
pub trait GeometryAdapter: Send + Sync {
    /// Classify both endpoints of `segment` as dangle or connected within `network`
    ///
    /// An endpoint is connected when another segment passes within `tolerance`.
    fn classify_endpoints(
        &self,
        network: &Network,
        segment: &Segment,
        tolerance: f64,
    ) -> EndpointClass;

    /// Distance from the segment's start to `point` measured along the segment
    ///
    /// Returns `None` when the point is farther than `tolerance` from the segment.
    fn measure_along(&self, segment: &Segment, point: Coord<f64>, tolerance: f64) -> Option<f64>;

    /// Point at `distance` from the segment's start
    fn interpolate(&self, segment: &Segment, distance: f64) -> Option<Point<f64>>;

    /// All unordered pairs of distinct segments that touch or cross
    ///
    /// Pairs closer than `tolerance` count as touching. Pairs are returned as
    /// `(smaller id, larger id)`, sorted.
    fn find_touches(
        &self,
        network: &Network,
        tolerance: f64,
        cancel: &CancellationToken,
    ) -> Result<Vec<(SegmentId, SegmentId)>>;

    /// Copy of the segment with reversed vertex order
    fn flip_direction(&self, segment: &Segment) -> Segment;

    /// Locations where two segments meet, merged within `tolerance`
    fn find_intersections(&self, a: &Segment, b: &Segment, tolerance: f64) -> Vec<Coord<f64>>;
}

/// Euclidean geometry engine backed by the `geo` crate
///
/// Stateless; every proximity query takes its tolerance from the caller.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlanarGeometry;

#[cfg_attr(feature = "profiling", profiling::all_functions)]
impl PlanarGeometry {
    /// Check if an endpoint is connected to any segment other than `owner`
    fn endpoint_connected(
        network: &Network,
        owner: SegmentId,
        endpoint: Coord<f64>,
        tolerance: f64,
    ) -> bool {
        network
            .candidates_near(endpoint, tolerance)
            .into_iter()
            .filter(|id| *id != owner)
            .filter_map(|id| network.get(id))
            .any(|other| utils::distance_to_line(other.geometry(), endpoint) <= tolerance)
    }

    /// Check if two segments touch anywhere within tolerance
    fn segments_touch(a: &Segment, b: &Segment, tolerance: f64) -> bool {
        let near = |endpoint: Option<Coord<f64>>, other: &Segment| {
            endpoint.is_some_and(|p| utils::distance_to_line(other.geometry(), p) <= tolerance)
        };

        near(a.start(), b)
            || near(a.end(), b)
            || near(b.start(), a)
            || near(b.end(), a)
            || a.geometry().intersects(b.geometry())
    }
}

#[cfg_attr(feature = "profiling", profiling::all_functions)]
impl GeometryAdapter for PlanarGeometry {
    fn classify_endpoints(
        &self,
        network: &Network,
        segment: &Segment,
        tolerance: f64,
    ) -> EndpointClass {
        let is_dangle = |endpoint: Option<Coord<f64>>| match endpoint {
            Some(p) => !Self::endpoint_connected(network, segment.id(), p, tolerance),
            None => true,
        };

        EndpointClass {
            start_is_dangle: is_dangle(segment.start()),
            end_is_dangle: is_dangle(segment.end()),
        }
    }

    fn measure_along(&self, segment: &Segment, point: Coord<f64>, tolerance: f64) -> Option<f64> {
        if utils::distance_to_line(segment.geometry(), point) > tolerance {
            return None;
        }
        let fraction = segment.geometry().line_locate_point(&Point::from(point))?;
        Some((fraction * segment.length()).clamp(0.0, segment.length()))
    }

    fn interpolate(&self, segment: &Segment, distance: f64) -> Option<Point<f64>> {
        if segment.length() <= 0.0 {
            return segment.start().map(Point::from);
        }
        let fraction = (distance / segment.length()).clamp(0.0, 1.0);
        segment
            .geometry()
            .point_at_ratio_from_start(&Euclidean, fraction)
    }

    fn find_touches(
        &self,
        network: &Network,
        tolerance: f64,
        cancel: &CancellationToken,
    ) -> Result<Vec<(SegmentId, SegmentId)>> {
        #[cfg(feature = "profiling")]
        profiling::scope!("geometry::find_touches");

        let per_segment: Result<Vec<Vec<(SegmentId, SegmentId)>>> = network
            .segments()
            .par_iter()
            .map(|segment| {
                if cancel.is_cancelled() {
                    return Err(MileageError::Cancelled);
                }
                Ok(network
                    .candidates_around(segment, tolerance)
                    .into_iter()
                    .filter(|other| *other > segment.id())
                    .filter_map(|other| network.get(other))
                    .filter(|other| Self::segments_touch(segment, other, tolerance))
                    .map(|other| (segment.id(), other.id()))
                    .collect())
            })
            .collect();

        let mut touches: Vec<(SegmentId, SegmentId)> =
            per_segment?.into_iter().flatten().collect();
        touches.sort_unstable();

        tracing::debug!("Found {} touching segment pairs", touches.len());
        Ok(touches)
    }

    fn flip_direction(&self, segment: &Segment) -> Segment {
        segment.reversed()
    }

    fn find_intersections(&self, a: &Segment, b: &Segment, tolerance: f64) -> Vec<Coord<f64>> {
        let mut points = Vec::new();

        // Endpoints first: they are exact vertices and absorb near-miss junctions
        for (endpoint, other) in [(a.start(), b), (a.end(), b), (b.start(), a), (b.end(), a)] {
            if let Some(p) = endpoint {
                if utils::distance_to_line(other.geometry(), p) <= tolerance {
                    points.push(p);
                }
            }
        }

        for line_a in a.geometry().lines() {
            let area = utils::expand_rect(line_a.bounding_rect(), tolerance);
            for line_b in b.geometry().lines() {
                if !utils::rects_intersect(area, line_b.bounding_rect()) {
                    continue;
                }
                match line_intersection(line_a, line_b) {
                    Some(LineIntersection::SinglePoint { intersection, .. }) => {
                        points.push(intersection)
                    }
                    Some(LineIntersection::Collinear { intersection }) => {
                        points.push(intersection.start);
                        points.push(intersection.end);
                    }
                    None => {}
                }
            }
        }

        dedup_within(points, tolerance)
    }
}

/// Drop coordinates that coincide with an earlier one
fn dedup_within(points: Vec<Coord<f64>>, tolerance: f64) -> Vec<Coord<f64>> {
    let mut unique: Vec<Coord<f64>> = Vec::with_capacity(points.len());
    for point in points {
        if !unique
            .iter()
            .any(|kept| utils::coords_coincide(*kept, point, tolerance))
        {
            unique.push(point);
        }
    }
    unique
}
