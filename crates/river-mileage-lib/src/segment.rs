//! Segment storage with precomputed metadata
//!
//! A [`Segment`] is one polyline of the river network. Its geometry is supplied by
//! the caller and never edited in place; orientation produces a reversed copy and
//! ranking fills in the `rank` attribute.

use crate::{MileageError, Result, utils};
use geo::algorithm::line_intersection::{LineIntersection, line_intersection};
use geo::{BoundingRect, Coord, Euclidean, Length, Line, LineString, Rect, RemoveRepeatedPoints};
use std::fmt;

/// Identifier of a segment, unique within a [`crate::Network`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct SegmentId(pub u64);

impl fmt::Display for SegmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of a point of interest
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct PointId(pub u64);

impl fmt::Display for PointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Dangle classification of both endpoints of a segment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct EndpointClass {
    pub start_is_dangle: bool,
    pub end_is_dangle: bool,
}

impl EndpointClass {
    /// Number of dangle endpoints (0, 1 or 2)
    #[inline]
    pub fn dangle_count(&self) -> usize {
        usize::from(self.start_is_dangle) + usize::from(self.end_is_dangle)
    }

    /// Classification after reversing the vertex order
    #[inline]
    pub fn flipped(&self) -> Self {
        Self {
            start_is_dangle: self.end_is_dangle,
            end_is_dangle: self.start_is_dangle,
        }
    }
}

/// Role of a segment in the river system, derived from its dangle count
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum SegmentRole {
    /// Both endpoints are dangles: the root of a river system
    Trunk,
    /// Exactly one dangle: a tributary joining a parent segment
    Branch,
}

/// A single polyline of the river network with cached metadata
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Segment {
    id: SegmentId,
    geometry: LineString<f64>,
    /// Cached Euclidean length (computed once during construction)
    length: f64,
    /// Cached bounding box (None for empty geometry)
    bounding_box: Option<Rect<f64>>,
    /// Hierarchical rank, unset until assigned
    rank: Option<u32>,
}

#[cfg_attr(feature = "profiling", profiling::all_functions)]
impl Segment {
    /// Create a new segment from its polyline
    ///
    /// Construction never fails; degenerate geometry is reported by [`Segment::validate`]
    /// so that all offending segments of a network can be found in one pass. Orientation
    /// logs every offender and returns the first in input order.
    pub fn new(id: SegmentId, geometry: LineString<f64>) -> Self {
        let length = Euclidean.length(&geometry);
        let bounding_box = geometry.bounding_rect();
        Self {
            id,
            geometry,
            length,
            bounding_box,
            rank: None,
        }
    }

    /// Convenience constructor from raw `(x, y)` tuples
    pub fn from_coords(id: SegmentId, coords: impl IntoIterator<Item = (f64, f64)>) -> Self {
        let coords: Vec<Coord<f64>> = coords.into_iter().map(|(x, y)| Coord { x, y }).collect();
        Self::new(id, LineString::new(coords))
    }

    #[inline]
    pub fn id(&self) -> SegmentId {
        self.id
    }

    #[inline]
    pub fn geometry(&self) -> &LineString<f64> {
        &self.geometry
    }

    /// Total length in map units
    ///
    /// This is O(1) as the value is cached during construction.
    #[inline]
    pub fn length(&self) -> f64 {
        self.length
    }

    #[inline]
    pub fn bounding_box(&self) -> Option<Rect<f64>> {
        self.bounding_box
    }

    #[inline]
    pub fn rank(&self) -> Option<u32> {
        self.rank
    }

    #[inline]
    pub(crate) fn set_rank(&mut self, rank: u32) {
        self.rank = Some(rank);
    }

    /// First vertex of the polyline
    #[inline]
    pub fn start(&self) -> Option<Coord<f64>> {
        self.geometry.0.first().copied()
    }

    /// Last vertex of the polyline
    #[inline]
    pub fn end(&self) -> Option<Coord<f64>> {
        self.geometry.0.last().copied()
    }

    /// Copy of this segment with the vertex order reversed
    ///
    /// Length, bounding box and rank are preserved.
    pub fn reversed(&self) -> Self {
        let mut coords = self.geometry.0.clone();
        coords.reverse();
        Self {
            id: self.id,
            geometry: LineString::new(coords),
            length: self.length,
            bounding_box: self.bounding_box,
            rank: self.rank,
        }
    }

    /// Check that the geometry is usable for network analysis
    ///
    /// Rejects polylines with fewer than two distinct vertices, zero length, and
    /// polylines that touch or cross themselves (closed rings included).
    pub fn validate(&self) -> Result<()> {
        let cleaned = self.geometry.remove_repeated_points();
        if cleaned.0.len() < 2 || self.length <= 0.0 || !self.length.is_finite() {
            return Err(MileageError::Geometry {
                segment: self.id,
                reason: "zero-length geometry".to_string(),
            });
        }

        if let Some(reason) = self_intersection(&cleaned) {
            return Err(MileageError::Geometry {
                segment: self.id,
                reason,
            });
        }

        Ok(())
    }
}

/// Find the first place where a polyline touches itself
///
/// Consecutive edges may only share their common vertex; any other contact,
/// including collinear backtracking, is a self-intersection.
fn self_intersection(geometry: &LineString<f64>) -> Option<String> {
    let lines: Vec<Line<f64>> = geometry.lines().collect();

    for i in 0..lines.len() {
        let bounds_i = lines[i].bounding_rect();
        for j in (i + 1)..lines.len() {
            if !utils::rects_intersect(bounds_i, lines[j].bounding_rect()) {
                continue;
            }
            let Some(hit) = line_intersection(lines[i], lines[j]) else {
                continue;
            };
            match hit {
                LineIntersection::SinglePoint { .. } if j == i + 1 => {}
                LineIntersection::SinglePoint { intersection, .. } => {
                    return Some(format!(
                        "self-intersection at ({}, {})",
                        intersection.x, intersection.y
                    ));
                }
                LineIntersection::Collinear { intersection } => {
                    return Some(format!(
                        "overlapping edges near ({}, {})",
                        intersection.start.x, intersection.start.y
                    ));
                }
            }
        }
    }

    None
}
