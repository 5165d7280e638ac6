//! Orientation - start/end normalization from dangle classification
//!
//! Every segment leaves this module pointing upstream: branches start at their
//! junction end and finish at their headwater dangle, trunks start at their
//! outlet when a marker says where that is. The result is an [`OrientedNetwork`],
//! the only input accepted by ranking and junction building.

use crate::{
    CancellationToken, EndpointClass, GeometryAdapter, MileageError, Network, Result, SegmentId,
    SegmentRole, utils,
};
use geo::Coord;
use rayon::prelude::*;
use std::collections::HashMap;

/// A point marking the true mouth ("pour point") of a trunk segment
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct OutletMarker {
    pub point: Coord<f64>,
    /// Trunk this marker belongs to; when unset the nearest trunk is used
    pub segment: Option<SegmentId>,
}

impl OutletMarker {
    /// Marker bound to the nearest trunk within the outlet search distance
    pub fn new(point: Coord<f64>) -> Self {
        Self {
            point,
            segment: None,
        }
    }

    /// Marker bound to a specific trunk
    pub fn for_segment(point: Coord<f64>, segment: SegmentId) -> Self {
        Self {
            point,
            segment: Some(segment),
        }
    }
}

/// Summary of what orientation changed
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct OrientationReport {
    /// Segments whose vertex order was reversed, sorted by id
    pub flipped: Vec<SegmentId>,
    /// Trunk segments in input order
    pub trunks: Vec<SegmentId>,
    /// Trunks that kept their supplied direction for lack of an outlet marker
    pub unmarked_trunks: Vec<SegmentId>,
}

/// A network whose segments all point upstream
///
/// Carries the endpoint classes and touch pairs found while orienting, so later
/// stages never repeat the geometric read phase.
#[derive(Debug, Clone)]
pub struct OrientedNetwork {
    network: Network,
    roles: HashMap<SegmentId, SegmentRole>,
    /// Endpoint classes after flipping
    classes: HashMap<SegmentId, EndpointClass>,
    touches: Vec<(SegmentId, SegmentId)>,
    /// Tolerance the endpoint classes and touches were found with
    tolerance: f64,
    report: OrientationReport,
}

impl OrientedNetwork {
    #[inline]
    pub fn network(&self) -> &Network {
        &self.network
    }

    #[inline]
    pub(crate) fn network_mut(&mut self) -> &mut Network {
        &mut self.network
    }

    #[inline]
    pub fn role(&self, id: SegmentId) -> Option<SegmentRole> {
        self.roles.get(&id).copied()
    }

    #[inline]
    pub fn class(&self, id: SegmentId) -> Option<EndpointClass> {
        self.classes.get(&id).copied()
    }

    /// Trunk segments in input order
    pub fn trunks(&self) -> &[SegmentId] {
        &self.report.trunks
    }

    /// Touching segment pairs as `(smaller id, larger id)`, sorted
    #[inline]
    pub fn touches(&self) -> &[(SegmentId, SegmentId)] {
        &self.touches
    }

    #[inline]
    pub fn tolerance(&self) -> f64 {
        self.tolerance
    }

    #[inline]
    pub fn report(&self) -> &OrientationReport {
        &self.report
    }

    /// Give back the underlying network, e.g. to orient it again
    pub fn into_network(self) -> Network {
        self.network
    }
}

/// Normalizes segment direction using dangle classification and outlet markers
#[derive(Debug, Clone, Copy)]
pub struct OrientationResolver {
    tolerance: f64,
    /// Maximum distance between an unbound outlet marker and its trunk
    outlet_search_distance: f64,
}

impl Default for OrientationResolver {
    fn default() -> Self {
        Self::new(utils::DEFAULT_TOLERANCE)
    }
}

#[cfg_attr(feature = "profiling", profiling::all_functions)]
impl OrientationResolver {
    pub fn new(tolerance: f64) -> Self {
        Self {
            tolerance,
            outlet_search_distance: tolerance,
        }
    }

    pub fn with_outlet_search_distance(mut self, distance: f64) -> Self {
        self.outlet_search_distance = distance;
        self
    }

    #[inline]
    pub fn tolerance(&self) -> f64 {
        self.tolerance
    }

    /// Orient every segment of `network`
    ///
    /// The geometric read phase (validation, endpoint classification and touch
    /// enumeration) runs in parallel and completes before any segment is flipped.
    pub fn orient<G>(
        &self,
        mut network: Network,
        markers: &[OutletMarker],
        geometry: &G,
        cancel: &CancellationToken,
    ) -> Result<OrientedNetwork>
    where
        G: GeometryAdapter + ?Sized,
    {
        #[cfg(feature = "profiling")]
        profiling::scope!("orientation::orient");

        let mut invalid: Vec<MileageError> = network
            .segments()
            .par_iter()
            .filter_map(|segment| segment.validate().err())
            .collect();
        if !invalid.is_empty() {
            if invalid.len() > 1 {
                tracing::warn!(
                    "{} segments have invalid geometry: {}",
                    invalid.len(),
                    invalid
                        .iter()
                        .map(ToString::to_string)
                        .collect::<Vec<_>>()
                        .join("; ")
                );
            }
            return Err(invalid.swap_remove(0));
        }

        let classes: Vec<(SegmentId, EndpointClass)> = network
            .segments()
            .par_iter()
            .map(|segment| {
                let class = geometry.classify_endpoints(&network, segment, self.tolerance);
                (segment.id(), class)
            })
            .collect();
        if cancel.is_cancelled() {
            return Err(MileageError::Cancelled);
        }
        let touches = geometry.find_touches(&network, self.tolerance, cancel)?;

        let mut malformed: Vec<SegmentId> = classes
            .iter()
            .filter(|(_, class)| class.dangle_count() == 0)
            .map(|(id, _)| *id)
            .collect();
        if !malformed.is_empty() {
            malformed.sort_unstable();
            return Err(MileageError::Topology {
                segments: malformed,
                reason: "no dangle endpoint (loop or over-connected segment)".to_string(),
            });
        }

        let mut roles = HashMap::with_capacity(classes.len());
        let mut oriented_classes = HashMap::with_capacity(classes.len());
        let mut flipped = Vec::new();
        let mut trunks = Vec::new();

        for (id, class) in classes {
            let role = if class.dangle_count() == 2 {
                trunks.push(id);
                SegmentRole::Trunk
            } else {
                SegmentRole::Branch
            };
            roles.insert(id, role);

            let class = if role == SegmentRole::Branch && class.start_is_dangle {
                let reversed = geometry.flip_direction(network.segment(id)?);
                network.replace(reversed)?;
                flipped.push(id);
                class.flipped()
            } else {
                class
            };
            oriented_classes.insert(id, class);
        }

        let outlets = self.bind_markers(&network, &roles, markers)?;
        let mut unmarked_trunks = Vec::new();
        for &id in &trunks {
            let Some(&outlet) = outlets.get(&id) else {
                unmarked_trunks.push(id);
                continue;
            };
            let segment = network.segment(id)?;
            let (Some(start), Some(end)) = (segment.start(), segment.end()) else {
                continue;
            };
            if utils::coord_distance(outlet, end) < utils::coord_distance(outlet, start) {
                let reversed = geometry.flip_direction(segment);
                network.replace(reversed)?;
                flipped.push(id);
            }
        }

        if !unmarked_trunks.is_empty() {
            tracing::warn!(
                "{} trunk segment(s) have no outlet marker and keep their supplied direction: {:?}",
                unmarked_trunks.len(),
                unmarked_trunks
            );
        }

        flipped.sort_unstable();
        tracing::debug!(
            "Oriented {} segments: {} trunks, {} flipped, {} touch pairs",
            network.len(),
            trunks.len(),
            flipped.len(),
            touches.len()
        );

        Ok(OrientedNetwork {
            network,
            roles,
            classes: oriented_classes,
            touches,
            tolerance: self.tolerance,
            report: OrientationReport {
                flipped,
                trunks,
                unmarked_trunks,
            },
        })
    }

    /// Resolve each marker to the trunk it describes
    fn bind_markers(
        &self,
        network: &Network,
        roles: &HashMap<SegmentId, SegmentRole>,
        markers: &[OutletMarker],
    ) -> Result<HashMap<SegmentId, Coord<f64>>> {
        let mut outlets = HashMap::new();

        for marker in markers {
            let target = match marker.segment {
                Some(id) => {
                    network.segment(id)?;
                    Some(id)
                }
                None => self.nearest_trunk(network, roles, marker.point),
            };

            let Some(id) = target else {
                tracing::warn!(
                    "Outlet marker at ({}, {}) is not within {} of any trunk",
                    marker.point.x,
                    marker.point.y,
                    self.outlet_search_distance
                );
                continue;
            };

            if roles.get(&id) != Some(&SegmentRole::Trunk) {
                tracing::warn!("Outlet marker names segment {id}, which is not a trunk");
                continue;
            }

            if outlets.contains_key(&id) {
                tracing::warn!("Trunk {id} has several outlet markers, keeping the first");
                continue;
            }
            outlets.insert(id, marker.point);
        }

        Ok(outlets)
    }

    fn nearest_trunk(
        &self,
        network: &Network,
        roles: &HashMap<SegmentId, SegmentRole>,
        point: Coord<f64>,
    ) -> Option<SegmentId> {
        network
            .candidates_near(point, self.outlet_search_distance)
            .into_iter()
            .filter(|id| roles.get(id) == Some(&SegmentRole::Trunk))
            .filter_map(|id| {
                network
                    .get(id)
                    .map(|segment| (id, utils::distance_to_line(segment.geometry(), point)))
            })
            .filter(|(_, distance)| *distance <= self.outlet_search_distance)
            .min_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(id, _)| id)
    }
}
