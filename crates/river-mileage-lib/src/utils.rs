//! Utility functions for planar distances and proximity tests

use geo::{Closest, ClosestPoint, Coord, LineString, Point, Rect};

/// Default proximity tolerance in map units (one millimetre for metric data)
pub const DEFAULT_TOLERANCE: f64 = 0.001;

/// Euclidean distance between two coordinates
#[inline(always)]
pub fn coord_distance(a: Coord<f64>, b: Coord<f64>) -> f64 {
    (a.x - b.x).hypot(a.y - b.y)
}

/// Check if two coordinates are the same location within `tolerance`
#[inline(always)]
pub fn coords_coincide(a: Coord<f64>, b: Coord<f64>, tolerance: f64) -> bool {
    coord_distance(a, b) <= tolerance
}

/// Shortest distance from a coordinate to any point of a polyline
///
/// Returns `f64::INFINITY` for empty polylines.
pub fn distance_to_line(line: &LineString<f64>, point: Coord<f64>) -> f64 {
    match line.closest_point(&Point::from(point)) {
        Closest::Intersection(p) | Closest::SinglePoint(p) => coord_distance(p.0, point),
        Closest::Indeterminate => f64::INFINITY,
    }
}

/// Grow a rectangle by `margin` on every side
#[inline]
pub fn expand_rect(rect: Rect<f64>, margin: f64) -> Rect<f64> {
    Rect::new(
        Coord {
            x: rect.min().x - margin,
            y: rect.min().y - margin,
        },
        Coord {
            x: rect.max().x + margin,
            y: rect.max().y + margin,
        },
    )
}

/// Square of half-width `margin` centred on a coordinate
#[inline]
pub fn rect_around(point: Coord<f64>, margin: f64) -> Rect<f64> {
    expand_rect(Rect::new(point, point), margin)
}

/// Check if two rectangles share at least one point (touching counts)
#[inline(always)]
pub fn rects_intersect(a: Rect<f64>, b: Rect<f64>) -> bool {
    !(a.max().x < b.min().x
        || a.min().x > b.max().x
        || a.max().y < b.min().y
        || a.min().y > b.max().y)
}

/// Check if `inner` lies completely inside `outer`
#[inline(always)]
pub fn rect_contains(outer: Rect<f64>, inner: Rect<f64>) -> bool {
    inner.min().x >= outer.min().x
        && inner.max().x <= outer.max().x
        && inner.min().y >= outer.min().y
        && inner.max().y <= outer.max().y
}

/// Integer grid cell of a coordinate for cells of size `cell`
#[inline]
pub fn grid_cell(point: Coord<f64>, cell: f64) -> (i64, i64) {
    ((point.x / cell).floor() as i64, (point.y / cell).floor() as i64)
}
