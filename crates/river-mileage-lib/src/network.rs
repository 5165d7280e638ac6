//! Network - segment storage with a spatial index
//!
//! The network owns the caller-supplied segments and a [`Quadtree`] over their
//! bounding boxes. Orientation swaps segments for their reversed copies, which
//! leaves every bounding box (and so the index) unchanged.

use crate::{MileageError, Quadtree, Result, Segment, SegmentId, utils};
use geo::Coord;
use std::collections::HashMap;

/// A collection of segments plus a spatial index for touch queries
#[derive(Clone, Debug)]
pub struct Network {
    /// All segments, in the order they were supplied
    segments: Vec<Segment>,
    /// Position of each segment in `segments`
    positions: HashMap<SegmentId, usize>,
    /// Spatial index over segment bounding boxes
    index: Quadtree,
}

#[cfg_attr(feature = "profiling", profiling::all_functions)]
impl Network {
    /// Create a network from segments with unique ids
    pub fn new(segments: Vec<Segment>) -> Result<Self> {
        #[cfg(feature = "profiling")]
        profiling::scope!("network::new");

        let mut positions = HashMap::with_capacity(segments.len());
        let mut duplicates = Vec::new();
        for (position, segment) in segments.iter().enumerate() {
            if positions.insert(segment.id(), position).is_some() {
                duplicates.push(segment.id());
            }
        }
        if !duplicates.is_empty() {
            duplicates.sort_unstable();
            duplicates.dedup();
            return Err(MileageError::Topology {
                segments: duplicates,
                reason: "duplicate segment id".to_string(),
            });
        }

        let index = Quadtree::from_entries(
            segments
                .iter()
                .filter_map(|segment| segment.bounding_box().map(|rect| (segment.id(), rect))),
        );

        tracing::debug!(
            "Built network index with {} of {} segments",
            index.len(),
            segments.len()
        );

        Ok(Self {
            segments,
            positions,
            index,
        })
    }

    /// All segments in input order
    #[inline]
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Get a segment by id
    #[inline]
    pub fn get(&self, id: SegmentId) -> Option<&Segment> {
        self.positions.get(&id).map(|&position| &self.segments[position])
    }

    /// Get a segment by id, failing with [`MileageError::UnknownSegment`]
    #[inline]
    pub fn segment(&self, id: SegmentId) -> Result<&Segment> {
        self.get(id).ok_or(MileageError::UnknownSegment(id))
    }

    #[inline]
    pub(crate) fn get_mut(&mut self, id: SegmentId) -> Option<&mut Segment> {
        let position = *self.positions.get(&id)?;
        self.segments.get_mut(position)
    }

    /// Swap in a new version of an existing segment (same id, same extent)
    pub(crate) fn replace(&mut self, segment: Segment) -> Result<()> {
        let slot = self
            .get_mut(segment.id())
            .ok_or(MileageError::UnknownSegment(segment.id()))?;
        *slot = segment;
        Ok(())
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.segments.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Ids of all segments in input order
    pub fn ids(&self) -> impl Iterator<Item = SegmentId> + '_ {
        self.segments.iter().map(Segment::id)
    }

    /// Total length of all segments
    pub fn total_length(&self) -> f64 {
        self.segments.iter().map(Segment::length).sum()
    }

    /// Access the spatial index
    #[inline]
    pub fn index(&self) -> &Quadtree {
        &self.index
    }

    /// Candidate segments whose bounding box lies within `tolerance` of a point
    ///
    /// This is a coarse filter; use [`Network::segments_within`] for an exact test.
    pub fn candidates_near(&self, point: Coord<f64>, tolerance: f64) -> Vec<SegmentId> {
        self.index.query(utils::rect_around(point, tolerance))
    }

    /// Candidate segments whose bounding box lies within `tolerance` of a segment's box
    pub fn candidates_around(&self, segment: &Segment, tolerance: f64) -> Vec<SegmentId> {
        match segment.bounding_box() {
            Some(rect) => self.index.query(utils::expand_rect(rect, tolerance)),
            None => Vec::new(),
        }
    }

    /// Segments passing within `tolerance` of a point, sorted by id
    pub fn segments_within(&self, point: Coord<f64>, tolerance: f64) -> Vec<SegmentId> {
        self.candidates_near(point, tolerance)
            .into_iter()
            .filter(|id| {
                self.get(*id).is_some_and(|segment| {
                    utils::distance_to_line(segment.geometry(), point) <= tolerance
                })
            })
            .collect()
    }
}
