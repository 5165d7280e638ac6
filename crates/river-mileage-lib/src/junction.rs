//! Junction index - the confluence forest of an oriented network
//!
//! Every touch between two segments is located, touch points closer than the
//! tolerance are merged into one confluence site, and each site is split into the
//! segments that start there (children) and the single segment flowing past it
//! (parent). The resulting junctions are indexed by child id so a mileage walk is
//! one hash lookup per confluence.

use crate::{
    CancellationToken, GeometryAdapter, MileageError, OrientedNetwork, Result, SegmentId,
    SegmentRole, utils,
};
use geo::Coord;
use rayon::prelude::*;
use smallvec::SmallVec;
use std::collections::{BTreeMap, HashMap};

/// A confluence where `child` starts on `parent`
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Junction {
    pub point: Coord<f64>,
    pub parent: SegmentId,
    pub child: SegmentId,
    /// Distance from the parent's start to the confluence
    pub distance_along_parent: f64,
}

/// A touch point with the pair of segments meeting there
type Contact = (Coord<f64>, SegmentId, SegmentId);

/// Touch points merged within tolerance
#[derive(Debug)]
struct Site {
    point: Coord<f64>,
    /// Each member segment with the first contact point it contributed
    members: BTreeMap<SegmentId, Coord<f64>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Colour {
    White,
    Grey,
    Black,
}

/// Read-only junction forest indexed by child segment
#[derive(Debug, Clone, Default)]
pub struct JunctionIndex {
    /// Junctions sorted by child id
    junctions: Vec<Junction>,
    by_child: HashMap<SegmentId, usize>,
    /// Positions of each parent's junctions, in child order
    by_parent: HashMap<SegmentId, SmallVec<[usize; 4]>>,
}

#[cfg_attr(feature = "profiling", profiling::all_functions)]
impl JunctionIndex {
    /// Derive and validate the junction forest of an oriented network
    ///
    /// Touch pairs recorded during orientation are reused when they were found
    /// with at least `tolerance`; a wider tolerance enumerates touches again.
    pub fn build<G>(oriented: &OrientedNetwork, geometry: &G, tolerance: f64) -> Result<Self>
    where
        G: GeometryAdapter + ?Sized,
    {
        #[cfg(feature = "profiling")]
        profiling::scope!("junction::build");

        let network = oriented.network();

        let rescanned;
        let touches = if tolerance > oriented.tolerance() {
            tracing::debug!(
                "Junction tolerance {} exceeds orientation tolerance {}, rescanning touches",
                tolerance,
                oriented.tolerance()
            );
            rescanned = geometry.find_touches(network, tolerance, &CancellationToken::new())?;
            rescanned.as_slice()
        } else {
            oriented.touches()
        };

        let contacts: Vec<Result<Vec<Contact>>> = touches
            .par_iter()
            .map(|&(a, b)| -> Result<Vec<Contact>> {
                let (segment_a, segment_b) = (network.segment(a)?, network.segment(b)?);
                Ok(geometry
                    .find_intersections(segment_a, segment_b, tolerance)
                    .into_iter()
                    .map(|point| (point, a, b))
                    .collect())
            })
            .collect();
        let contacts: Vec<Vec<Contact>> = contacts.into_iter().collect::<Result<_>>()?;

        let sites = Self::cluster(contacts.into_iter().flatten(), tolerance);
        tracing::debug!("Merged touch points into {} confluence sites", sites.len());

        let mut junctions = Vec::new();
        for site in &sites {
            junctions.extend(Self::split_site(oriented, geometry, site, tolerance)?);
        }
        junctions.sort_by_key(|junction| junction.child);

        let mut by_child = HashMap::with_capacity(junctions.len());
        let mut by_parent: HashMap<SegmentId, SmallVec<[usize; 4]>> = HashMap::new();
        for (position, junction) in junctions.iter().enumerate() {
            if junction.parent == junction.child {
                return Err(MileageError::Consistency {
                    segments: vec![junction.child],
                    reason: "segment is its own parent".to_string(),
                });
            }
            if oriented.role(junction.child) == Some(SegmentRole::Trunk) {
                return Err(MileageError::Consistency {
                    segments: vec![junction.child, junction.parent],
                    reason: "trunk segment has a parent junction".to_string(),
                });
            }
            if let Some(previous) = by_child.insert(junction.child, position) {
                return Err(MileageError::Consistency {
                    segments: vec![junction.child, junctions[previous].parent, junction.parent],
                    reason: "segment has two parent junctions".to_string(),
                });
            }
            by_parent.entry(junction.parent).or_default().push(position);
        }

        let index = Self {
            junctions,
            by_child,
            by_parent,
        };
        index.check_acyclic()?;

        tracing::debug!("Built junction index with {} junctions", index.len());
        Ok(index)
    }

    /// Merge contact points closer than `tolerance` into sites
    fn cluster(contacts: impl Iterator<Item = Contact>, tolerance: f64) -> Vec<Site> {
        let cell = tolerance.max(f64::EPSILON);
        let mut sites: Vec<Site> = Vec::new();
        let mut grid: HashMap<(i64, i64), Vec<usize>> = HashMap::new();

        for (point, a, b) in contacts {
            let (cx, cy) = utils::grid_cell(point, cell);
            let existing = (-1..=1)
                .flat_map(|dx| (-1..=1).map(move |dy| (cx + dx, cy + dy)))
                .filter_map(|key| grid.get(&key))
                .flatten()
                .copied()
                .find(|&i| utils::coords_coincide(sites[i].point, point, tolerance));

            let site = match existing {
                Some(i) => i,
                None => {
                    sites.push(Site {
                        point,
                        members: BTreeMap::new(),
                    });
                    grid.entry((cx, cy)).or_default().push(sites.len() - 1);
                    sites.len() - 1
                }
            };
            sites[site].members.entry(a).or_insert(point);
            sites[site].members.entry(b).or_insert(point);
        }

        sites
    }

    /// Decide parent and children at one confluence site
    fn split_site<G>(
        oriented: &OrientedNetwork,
        geometry: &G,
        site: &Site,
        tolerance: f64,
    ) -> Result<Vec<Junction>>
    where
        G: GeometryAdapter + ?Sized,
    {
        let network = oriented.network();

        let mut children: Vec<(SegmentId, f64)> = Vec::new();
        let mut parents: Vec<(SegmentId, f64)> = Vec::new();
        for (&id, &contact) in &site.members {
            let segment = network.segment(id)?;
            let distance = geometry
                .measure_along(segment, contact, tolerance)
                .ok_or_else(|| MileageError::Geometry {
                    segment: id,
                    reason: format!(
                        "touch point ({}, {}) cannot be measured",
                        contact.x, contact.y
                    ),
                })?;

            // A segment's own end vertex never anchors a junction
            if distance >= segment.length() - tolerance {
                continue;
            }

            if distance <= tolerance {
                children.push((id, distance));
            } else {
                parents.push((id, distance));
            }
        }

        if children.is_empty() && parents.len() < 2 {
            return Ok(Vec::new());
        }

        let ambiguous = || MileageError::AmbiguousJunction {
            x: site.point.x,
            y: site.point.y,
            segments: site.members.keys().copied().collect(),
        };

        if children.is_empty() || parents.len() != 1 {
            return Err(ambiguous());
        }
        let (parent, distance_along_parent) = parents[0];

        let closest_child = children.iter().map(|(_, d)| *d).fold(0.0, f64::max);
        if distance_along_parent - closest_child <= tolerance {
            return Err(ambiguous());
        }

        Ok(children
            .into_iter()
            .map(|(child, _)| Junction {
                point: site.point,
                parent,
                child,
                distance_along_parent,
            })
            .collect())
    }

    /// Three-colour walk over child -> parent edges
    fn check_acyclic(&self) -> Result<()> {
        let mut colours: HashMap<SegmentId, Colour> = HashMap::with_capacity(self.by_child.len());
        let colour = |colours: &HashMap<SegmentId, Colour>, id: SegmentId| {
            colours.get(&id).copied().unwrap_or(Colour::White)
        };

        for junction in &self.junctions {
            if colour(&colours, junction.child) != Colour::White {
                continue;
            }

            let mut path = Vec::new();
            let mut current = junction.child;
            loop {
                match colour(&colours, current) {
                    Colour::Black => break,
                    Colour::Grey => {
                        let start = path.iter().position(|id| *id == current).unwrap_or(0);
                        let mut cycle = path[start..].to_vec();
                        cycle.sort_unstable();
                        return Err(MileageError::Consistency {
                            segments: cycle,
                            reason: "junction cycle".to_string(),
                        });
                    }
                    Colour::White => {
                        colours.insert(current, Colour::Grey);
                        path.push(current);
                        match self.parent_of(current) {
                            Some(parent) => current = parent,
                            None => break,
                        }
                    }
                }
            }

            for id in path {
                colours.insert(id, Colour::Black);
            }
        }

        Ok(())
    }

    /// Junction where `child` starts, if it is not a root
    #[inline]
    pub fn junction_of(&self, child: SegmentId) -> Option<&Junction> {
        self.by_child
            .get(&child)
            .map(|&position| &self.junctions[position])
    }

    #[inline]
    pub fn parent_of(&self, child: SegmentId) -> Option<SegmentId> {
        self.junction_of(child).map(|junction| junction.parent)
    }

    /// Junctions whose parent is `parent`, ordered by child id
    pub fn children_of(&self, parent: SegmentId) -> impl Iterator<Item = &Junction> + '_ {
        self.by_parent
            .get(&parent)
            .into_iter()
            .flatten()
            .map(|&position| &self.junctions[position])
    }

    /// All junctions sorted by child id
    #[inline]
    pub fn junctions(&self) -> &[Junction] {
        &self.junctions
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.junctions.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.junctions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{CancellationToken, Network, OrientationResolver, PlanarGeometry, Segment};

    fn oriented(segments: Vec<Segment>) -> OrientedNetwork {
        OrientationResolver::default()
            .orient(
                Network::new(segments).unwrap(),
                &[],
                &PlanarGeometry,
                &CancellationToken::new(),
            )
            .unwrap()
    }

    fn build(network: &OrientedNetwork) -> Result<JunctionIndex> {
        JunctionIndex::build(network, &PlanarGeometry, 0.001)
    }

    #[test]
    fn test_scenario_junctions() {
        let network = oriented(vec![
            Segment::from_coords(SegmentId(1), [(0.0, 0.0), (100.0, 0.0)]),
            Segment::from_coords(SegmentId(2), [(30.0, 0.0), (30.0, 40.0)]),
            Segment::from_coords(SegmentId(3), [(30.0, 10.0), (50.0, 10.0)]),
        ]);
        let index = build(&network).unwrap();

        assert_eq!(index.len(), 2);
        let a = index.junction_of(SegmentId(2)).unwrap();
        assert_eq!(a.parent, SegmentId(1));
        assert!((a.distance_along_parent - 30.0).abs() < 1e-9);

        let b = index.junction_of(SegmentId(3)).unwrap();
        assert_eq!(b.parent, SegmentId(2));
        assert!((b.distance_along_parent - 10.0).abs() < 1e-9);

        assert_eq!(index.parent_of(SegmentId(1)), None);
        assert_eq!(index.children_of(SegmentId(1)).count(), 1);

        // No junction sits on its parent's headwater end
        for junction in index.junctions() {
            let parent = network.network().get(junction.parent).unwrap();
            assert!(junction.distance_along_parent < parent.length() - 0.001);
            assert_ne!(Some(junction.point), parent.end());
        }
    }

    #[test]
    fn test_two_tributaries_at_one_point() {
        let network = oriented(vec![
            Segment::from_coords(SegmentId(1), [(0.0, 0.0), (100.0, 0.0)]),
            Segment::from_coords(SegmentId(2), [(50.0, 0.0), (50.0, 30.0)]),
            Segment::from_coords(SegmentId(3), [(50.0, 0.0), (80.0, 40.0)]),
        ]);
        let index = build(&network).unwrap();

        assert_eq!(index.len(), 2);
        assert_eq!(index.parent_of(SegmentId(2)), Some(SegmentId(1)));
        assert_eq!(index.parent_of(SegmentId(3)), Some(SegmentId(1)));
        assert!(
            index
                .junctions()
                .iter()
                .all(|j| (j.distance_along_parent - 50.0).abs() < 1e-9)
        );
    }

    #[test]
    fn test_near_miss_junction_is_merged() {
        let network = OrientationResolver::new(0.01)
            .orient(
                Network::new(vec![
                    Segment::from_coords(SegmentId(1), [(0.0, 0.0), (100.0, 0.0)]),
                    Segment::from_coords(SegmentId(2), [(40.0, 0.004), (40.0, 25.0)]),
                ])
                .unwrap(),
                &[],
                &PlanarGeometry,
                &CancellationToken::new(),
            )
            .unwrap();
        let index = JunctionIndex::build(&network, &PlanarGeometry, 0.01).unwrap();

        let junction = index.junction_of(SegmentId(2)).unwrap();
        assert_eq!(junction.parent, SegmentId(1));
        assert!((junction.distance_along_parent - 40.0).abs() < 1e-6);
    }

    #[test]
    fn test_children_indexed_by_parent() {
        let network = oriented(vec![
            Segment::from_coords(SegmentId(1), [(0.0, 0.0), (100.0, 0.0)]),
            Segment::from_coords(SegmentId(4), [(70.0, 0.0), (70.0, 30.0)]),
            Segment::from_coords(SegmentId(2), [(30.0, 0.0), (30.0, 40.0)]),
        ]);
        let index = build(&network).unwrap();

        let children: Vec<SegmentId> = index
            .children_of(SegmentId(1))
            .map(|junction| junction.child)
            .collect();
        assert_eq!(children, vec![SegmentId(2), SegmentId(4)]);
        assert_eq!(index.children_of(SegmentId(2)).count(), 0);
        assert_eq!(index.children_of(SegmentId(99)).count(), 0);
    }

    #[test]
    fn test_wider_tolerance_rescans_touches() {
        // Oriented at the default tolerance, 3 misses 2 by 0.004 and is a trunk
        let network = oriented(vec![
            Segment::from_coords(SegmentId(1), [(0.0, 0.0), (100.0, 0.0)]),
            Segment::from_coords(SegmentId(2), [(30.0, 0.0), (30.0, 40.0)]),
            Segment::from_coords(SegmentId(3), [(30.004, 10.0), (50.0, 10.0)]),
        ]);
        assert_eq!(network.role(SegmentId(3)), Some(SegmentRole::Trunk));
        assert_eq!(build(&network).unwrap().len(), 1);

        // At 0.01 the contact is found again and contradicts the trunk role
        match JunctionIndex::build(&network, &PlanarGeometry, 0.01) {
            Err(MileageError::Consistency { segments, .. }) => {
                assert_eq!(segments, vec![SegmentId(3), SegmentId(2)])
            }
            other => panic!("expected consistency error, got {other:?}"),
        }
    }

    #[test]
    fn test_two_starts_without_parent_are_ambiguous() {
        // Two segments sharing a start vertex with nothing flowing past it
        let network = oriented(vec![
            Segment::from_coords(SegmentId(1), [(0.0, 0.0), (100.0, 0.0)]),
            Segment::from_coords(SegmentId(2), [(100.0, 0.0), (100.0, 50.0)]),
        ]);
        // Both are branches, so orientation makes both start at (100, 0)
        assert_eq!(network.role(SegmentId(1)), Some(SegmentRole::Branch));
        assert_eq!(network.role(SegmentId(2)), Some(SegmentRole::Branch));

        match build(&network) {
            Err(MileageError::AmbiguousJunction { segments, .. }) => {
                assert_eq!(segments, vec![SegmentId(1), SegmentId(2)])
            }
            other => panic!("expected ambiguous junction, got {other:?}"),
        }
    }

    #[test]
    fn test_crossing_without_confluence_is_ambiguous() {
        // Segment 3 leaves the trunk and crosses tributary 2 mid-stream
        let network = oriented(vec![
            Segment::from_coords(SegmentId(1), [(0.0, 0.0), (100.0, 0.0)]),
            Segment::from_coords(SegmentId(2), [(30.0, 0.0), (30.0, 40.0)]),
            Segment::from_coords(SegmentId(3), [(60.0, 0.0), (20.0, 30.0)]),
        ]);

        match build(&network) {
            Err(MileageError::AmbiguousJunction { segments, .. }) => {
                assert_eq!(segments, vec![SegmentId(2), SegmentId(3)])
            }
            other => panic!("expected ambiguous junction, got {other:?}"),
        }
    }

    #[test]
    fn test_mutual_parents_are_a_cycle() {
        // Each segment starts on the other's interior
        let network = oriented(vec![
            Segment::from_coords(SegmentId(1), [(0.0, 0.0), (10.0, 0.0)]),
            Segment::from_coords(
                SegmentId(2),
                [(5.0, 0.0), (5.0, 5.0), (0.0, 5.0), (0.0, -5.0)],
            ),
        ]);

        match build(&network) {
            Err(MileageError::Consistency { segments, reason }) => {
                assert_eq!(segments, vec![SegmentId(1), SegmentId(2)]);
                assert_eq!(reason, "junction cycle");
            }
            other => panic!("expected consistency error, got {other:?}"),
        }
    }

    #[test]
    fn test_separate_trunk_stays_root() {
        // Segment 2 stops one unit short of the trunk, so it is a trunk itself
        let network = oriented(vec![
            Segment::from_coords(SegmentId(1), [(0.0, 0.0), (100.0, 0.0)]),
            Segment::from_coords(SegmentId(2), [(50.0, -50.0), (50.0, -1.0)]),
            Segment::from_coords(SegmentId(3), [(50.0, 0.0), (50.0, 20.0)]),
        ]);
        assert_eq!(network.role(SegmentId(2)), Some(SegmentRole::Trunk));
        let index = build(&network).unwrap();
        assert_eq!(index.parent_of(SegmentId(3)), Some(SegmentId(1)));
        assert_eq!(index.parent_of(SegmentId(2)), None);
    }

    #[test]
    fn test_isolated_trunk_has_no_junctions() {
        let network = oriented(vec![Segment::from_coords(
            SegmentId(1),
            [(0.0, 0.0), (100.0, 0.0)],
        )]);
        let index = build(&network).unwrap();
        assert!(index.is_empty());
        assert!(index.junction_of(SegmentId(1)).is_none());
    }
}
