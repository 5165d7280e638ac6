//! Quadtree spatial index over segment bounding boxes
//!
//! This module provides an adaptive quadtree that answers "which segments may touch
//! this rectangle" queries. Each entry is stored at the deepest node whose bounds
//! fully contain the entry's bounding box, so a query only visits nodes that
//! intersect the query rectangle.

use crate::{SegmentId, utils};
use geo::{Coord, Rect};

/// Maximum depth of the quadtree to prevent unbounded subdivision
const MAX_DEPTH: u32 = 12;

/// Number of entries a leaf holds before it is subdivided
const MAX_ENTRIES_PER_NODE: usize = 8;

/// A bounding box stored in the index
#[derive(Clone, Copy, Debug)]
struct IndexEntry {
    segment: SegmentId,
    bounding_box: Rect<f64>,
}

/// Root container for the quadtree spatial index
#[derive(Debug, Clone)]
pub struct Quadtree {
    /// Root node covering the whole network extent
    root: QuadtreeNode,
    /// Number of stored entries
    len: usize,
}

/// A single node in the quadtree
#[derive(Debug, Clone)]
struct QuadtreeNode {
    /// Bounding box of this node
    bounding_box: Rect<f64>,
    /// Depth level in the tree (0 = root)
    level: u32,
    /// Entries that do not fit entirely inside a single child
    entries: Vec<IndexEntry>,
    /// Child nodes (NW, NE, SW, SE) if subdivided
    children: Option<Box<[QuadtreeNode; 4]>>,
}

impl Quadtree {
    /// Create a new empty quadtree covering `bounds`
    pub fn new(bounds: Rect<f64>) -> Self {
        Self {
            root: QuadtreeNode::new(bounds, 0),
            len: 0,
        }
    }

    /// Build a quadtree sized to fit all given bounding boxes
    pub fn from_entries(entries: impl IntoIterator<Item = (SegmentId, Rect<f64>)>) -> Self {
        let entries: Vec<(SegmentId, Rect<f64>)> = entries.into_iter().collect();

        let bounds = entries
            .iter()
            .map(|(_, rect)| *rect)
            .reduce(|acc, rect| {
                Rect::new(
                    Coord {
                        x: acc.min().x.min(rect.min().x),
                        y: acc.min().y.min(rect.min().y),
                    },
                    Coord {
                        x: acc.max().x.max(rect.max().x),
                        y: acc.max().y.max(rect.max().y),
                    },
                )
            })
            .unwrap_or_else(|| Rect::new(Coord { x: 0.0, y: 0.0 }, Coord { x: 1.0, y: 1.0 }));

        // Pad so entries on the outer edge still fit inside the root
        let margin = (bounds.width().max(bounds.height()) * 0.01).max(1.0);
        let mut quadtree = Self::new(utils::expand_rect(bounds, margin));
        for (segment, bounding_box) in entries {
            quadtree.insert(segment, bounding_box);
        }
        quadtree
    }

    /// Insert a segment's bounding box
    pub fn insert(&mut self, segment: SegmentId, bounding_box: Rect<f64>) {
        self.root.insert(IndexEntry {
            segment,
            bounding_box,
        });
        self.len += 1;
    }

    /// Query for segments whose bounding box intersects `area`
    ///
    /// Results are sorted by id and free of duplicates.
    pub fn query(&self, area: Rect<f64>) -> Vec<SegmentId> {
        let mut results = Vec::new();
        self.root.query(area, &mut results);
        results.sort_unstable();
        results.dedup();
        results
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Extent covered by the root node
    #[inline]
    pub fn bounds(&self) -> Rect<f64> {
        self.root.bounding_box
    }
}

impl QuadtreeNode {
    fn new(bounding_box: Rect<f64>, level: u32) -> Self {
        Self {
            bounding_box,
            level,
            entries: Vec::new(),
            children: None,
        }
    }

    /// Subdivide this node into 4 children
    fn subdivide(&mut self) {
        if self.children.is_some() {
            return; // Already subdivided
        }

        let min = self.bounding_box.min();
        let max = self.bounding_box.max();
        let mid_x = (min.x + max.x) / 2.0;
        let mid_y = (min.y + max.y) / 2.0;
        let child_level = self.level + 1;

        let nw = QuadtreeNode::new(
            Rect::new(Coord { x: min.x, y: mid_y }, Coord { x: mid_x, y: max.y }),
            child_level,
        );
        let ne = QuadtreeNode::new(
            Rect::new(Coord { x: mid_x, y: mid_y }, Coord { x: max.x, y: max.y }),
            child_level,
        );
        let sw = QuadtreeNode::new(
            Rect::new(Coord { x: min.x, y: min.y }, Coord { x: mid_x, y: mid_y }),
            child_level,
        );
        let se = QuadtreeNode::new(
            Rect::new(Coord { x: mid_x, y: min.y }, Coord { x: max.x, y: mid_y }),
            child_level,
        );

        self.children = Some(Box::new([nw, ne, sw, se]));

        // Push down entries that now fit inside a single child
        let entries = std::mem::take(&mut self.entries);
        for entry in entries {
            self.place(entry);
        }
    }

    /// Insert an entry, splitting full leaves on the way
    fn insert(&mut self, entry: IndexEntry) {
        if self.children.is_none()
            && self.entries.len() >= MAX_ENTRIES_PER_NODE
            && self.level < MAX_DEPTH
        {
            self.subdivide();
        }
        self.place(entry);
    }

    /// Store the entry in the child that fully contains it, or here
    fn place(&mut self, entry: IndexEntry) {
        if let Some(children) = &mut self.children {
            for child in children.iter_mut() {
                if utils::rect_contains(child.bounding_box, entry.bounding_box) {
                    child.insert(entry);
                    return;
                }
            }
        }
        self.entries.push(entry);
    }

    /// Collect ids of entries intersecting `area`
    fn query(&self, area: Rect<f64>, results: &mut Vec<SegmentId>) {
        // The root also holds entries that overflow its bounds, so never cull it
        if self.level > 0 && !utils::rects_intersect(self.bounding_box, area) {
            return;
        }

        results.extend(
            self.entries
                .iter()
                .filter(|entry| utils::rects_intersect(entry.bounding_box, area))
                .map(|entry| entry.segment),
        );

        if let Some(children) = &self.children {
            for child in children.iter() {
                child.query(area, results);
            }
        }
    }

    #[cfg(test)]
    fn depth(&self) -> u32 {
        match &self.children {
            Some(children) => children.iter().map(|c| c.depth()).max().unwrap_or(self.level),
            None => self.level,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rect(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Rect<f64> {
        Rect::new(Coord { x: min_x, y: min_y }, Coord { x: max_x, y: max_y })
    }

    #[test]
    fn test_quadtree_creation() {
        let quadtree = Quadtree::new(rect(0.0, 0.0, 100.0, 100.0));

        assert!(quadtree.is_empty());
        assert!(quadtree.root.entries.is_empty());
        assert!(quadtree.root.children.is_none());
    }

    #[test]
    fn test_node_subdivide() {
        let mut node = QuadtreeNode::new(rect(0.0, 0.0, 100.0, 100.0), 0);
        node.subdivide();

        let children = node.children.as_ref().unwrap();
        assert_eq!(children[0].level, 1);
        // NW quadrant
        assert_eq!(children[0].bounding_box.min(), Coord { x: 0.0, y: 50.0 });
        // SE quadrant
        assert_eq!(children[3].bounding_box.max(), Coord { x: 100.0, y: 50.0 });
    }

    #[test]
    fn test_insert_and_query() {
        let mut quadtree = Quadtree::new(rect(0.0, 0.0, 100.0, 100.0));
        quadtree.insert(SegmentId(1), rect(0.0, 0.0, 100.0, 0.0));
        quadtree.insert(SegmentId(2), rect(30.0, 0.0, 30.0, 40.0));
        quadtree.insert(SegmentId(3), rect(70.0, 70.0, 80.0, 90.0));

        assert_eq!(quadtree.len(), 3);
        assert_eq!(
            quadtree.query(rect(29.0, -1.0, 31.0, 1.0)),
            vec![SegmentId(1), SegmentId(2)]
        );
        assert_eq!(quadtree.query(rect(75.0, 75.0, 76.0, 76.0)), vec![SegmentId(3)]);
        assert!(quadtree.query(rect(50.0, 50.0, 60.0, 60.0)).is_empty());
    }

    #[test]
    fn test_subdivision_keeps_every_entry_reachable() {
        let mut quadtree = Quadtree::new(rect(0.0, 0.0, 1000.0, 1000.0));
        for i in 0..200 {
            let x = (i % 20) as f64 * 50.0;
            let y = (i / 20) as f64 * 50.0;
            quadtree.insert(SegmentId(i), rect(x, y, x + 10.0, y + 10.0));
        }

        assert!(quadtree.root.depth() > 0);
        let everything = quadtree.query(rect(0.0, 0.0, 1000.0, 1000.0));
        assert_eq!(everything.len(), 200);

        let single = quadtree.query(rect(101.0, 51.0, 102.0, 52.0));
        assert_eq!(single, vec![SegmentId(22)]);
    }

    #[test]
    fn test_entries_outside_root_are_still_found() {
        let mut quadtree = Quadtree::new(rect(0.0, 0.0, 10.0, 10.0));
        quadtree.insert(SegmentId(9), rect(50.0, 50.0, 60.0, 60.0));
        assert_eq!(quadtree.query(rect(55.0, 55.0, 56.0, 56.0)), vec![SegmentId(9)]);
    }

    #[test]
    fn test_from_entries_bounds() {
        let quadtree = Quadtree::from_entries(vec![
            (SegmentId(1), rect(0.0, 0.0, 100.0, 0.0)),
            (SegmentId(2), rect(30.0, 0.0, 30.0, 40.0)),
        ]);
        let bounds = quadtree.bounds();
        assert!(bounds.min().x < 0.0 && bounds.min().y < 0.0);
        assert!(bounds.max().x > 100.0 && bounds.max().y > 40.0);
        assert_eq!(quadtree.len(), 2);
    }
}
