//! RiverSystem - Top-level facade running orientation, ranking and junction building
//!
//! This module provides the high-level API: build once from segments and outlet
//! markers under a single [`Config`], then serve mileage and placement queries
//! against the read-only result.

use crate::{
    BatchMode, CancellationToken, GeometryAdapter, JunctionIndex, MileageRecord, MileageResolver,
    MileageTable, Network, OrientationResolver, OrientedNetwork, OutletMarker, PlacedPoint,
    PlanarGeometry, PointId, PointOfInterest, PointPlacementService, RangePolicy, RankAssigner,
    Ranks, Result, Segment, SegmentId, utils,
};

use geo::Coord;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Configuration shared by every stage of the build
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Config {
    /// Proximity tolerance in map units.
    /// Governs touch detection, parent/child disambiguation and point location.
    /// Default: 0.001
    pub tolerance: f64,
    /// Maximum distance between an outlet marker without a segment id and its trunk.
    /// Default: same as `tolerance`
    pub outlet_search_distance: f64,
    /// Handling of placement distances outside the segment
    pub range_policy: RangePolicy,
    /// Handling of failing points in batch resolution
    pub batch_mode: BatchMode,
}

impl Default for Config {
    fn default() -> Self {
        Self::with_tolerance(utils::DEFAULT_TOLERANCE)
    }
}

impl Config {
    /// Default configuration with a different tolerance (and matching outlet search distance)
    pub fn with_tolerance(tolerance: f64) -> Self {
        Self {
            tolerance,
            outlet_search_distance: tolerance,
            range_policy: RangePolicy::default(),
            batch_mode: BatchMode::default(),
        }
    }
}

/// Summary of a built river system
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SystemInfo {
    pub segment_count: usize,
    pub trunk_count: usize,
    pub junction_count: usize,
    pub max_rank: u32,
    /// Total length of all segments in map units
    pub total_length: f64,
}

/// An oriented, ranked river network with its junction forest
///
/// The system is never patched: any change to segment membership or geometry
/// means building a new one.
pub struct RiverSystem<G = PlanarGeometry> {
    oriented: OrientedNetwork,
    ranks: Ranks,
    junctions: JunctionIndex,
    geometry: G,
    config: Config,
    info: SystemInfo,
}

impl RiverSystem<PlanarGeometry> {
    /// Build with the planar geometry engine
    pub fn build(segments: Vec<Segment>, markers: &[OutletMarker], config: Config) -> Result<Self> {
        Self::build_with(
            segments,
            markers,
            PlanarGeometry,
            config,
            &CancellationToken::new(),
        )
    }
}

#[cfg_attr(feature = "profiling", profiling::all_functions)]
impl<G> RiverSystem<G>
where
    G: GeometryAdapter,
{
    /// Build with a custom geometry engine and a cancellation token
    pub fn build_with(
        segments: Vec<Segment>,
        markers: &[OutletMarker],
        geometry: G,
        config: Config,
        cancel: &CancellationToken,
    ) -> Result<Self> {
        #[cfg(feature = "profiling")]
        profiling::scope!("system::build");

        let network = Network::new(segments)?;
        let mut oriented = OrientationResolver::new(config.tolerance)
            .with_outlet_search_distance(config.outlet_search_distance)
            .orient(network, markers, &geometry, cancel)?;
        let ranks = RankAssigner::new().assign(&mut oriented)?;
        let junctions = JunctionIndex::build(&oriented, &geometry, config.tolerance)?;

        let info = SystemInfo {
            segment_count: oriented.network().len(),
            trunk_count: oriented.trunks().len(),
            junction_count: junctions.len(),
            max_rank: ranks.max_rank(),
            total_length: oriented.network().total_length(),
        };
        tracing::debug!(
            "Built river system: {} segments, {} trunks, {} junctions, max rank {}",
            info.segment_count,
            info.trunk_count,
            info.junction_count,
            info.max_rank
        );

        Ok(Self {
            oriented,
            ranks,
            junctions,
            geometry,
            config,
            info,
        })
    }

    /// Get system information
    ///
    /// This is O(1) as all values are cached.
    #[inline]
    pub fn info(&self) -> SystemInfo {
        self.info.clone()
    }

    #[inline]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The oriented segments, with ranks assigned
    #[inline]
    pub fn network(&self) -> &Network {
        self.oriented.network()
    }

    #[inline]
    pub fn oriented(&self) -> &OrientedNetwork {
        &self.oriented
    }

    #[inline]
    pub fn ranks(&self) -> &Ranks {
        &self.ranks
    }

    #[inline]
    pub fn junctions(&self) -> &JunctionIndex {
        &self.junctions
    }

    #[inline]
    pub fn geometry(&self) -> &G {
        &self.geometry
    }

    /// Mileage resolver bound to this system
    pub fn resolver(&self) -> MileageResolver<'_, G> {
        MileageResolver::new(
            self.oriented.network(),
            &self.junctions,
            &self.geometry,
            self.config.tolerance,
        )
    }

    /// Placement service bound to this system
    pub fn placement(&self) -> PointPlacementService<'_, G> {
        PointPlacementService::new(
            self.oriented.network(),
            &self.geometry,
            self.config.range_policy,
        )
    }

    pub fn resolve(
        &self,
        point_id: PointId,
        point: Coord<f64>,
        segment: SegmentId,
    ) -> Result<MileageRecord> {
        self.resolver().resolve(point_id, point, segment)
    }

    /// Resolve points using the configured batch mode
    pub fn resolve_batch(&self, points: &[PointOfInterest]) -> Result<MileageTable> {
        self.resolver().resolve_batch(points, self.config.batch_mode)
    }

    pub fn place(&self, segment: SegmentId, distance: f64) -> Result<PlacedPoint> {
        self.placement().place(segment, distance)
    }

    pub fn place_batch(&self, requests: &[(SegmentId, f64)]) -> Result<Vec<PlacedPoint>> {
        self.placement().place_batch(requests)
    }

    pub fn sample_along(&self, per_segment: usize, seed: u64) -> Result<Vec<PointOfInterest>> {
        self.placement().sample_along(per_segment, seed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MileageError;

    const T: SegmentId = SegmentId(1);
    const A: SegmentId = SegmentId(2);
    const B: SegmentId = SegmentId(3);

    fn scenario_segments() -> Vec<Segment> {
        vec![
            Segment::from_coords(T, [(0.0, 0.0), (100.0, 0.0)]),
            Segment::from_coords(A, [(30.0, 0.0), (30.0, 40.0)]),
            Segment::from_coords(B, [(30.0, 10.0), (50.0, 10.0)]),
        ]
    }

    #[test]
    fn test_config_defaults() {
        let config = Config::default();
        assert_eq!(config.tolerance, 0.001);
        assert_eq!(config.outlet_search_distance, 0.001);
        assert_eq!(config.range_policy, RangePolicy::Reject);
        assert_eq!(config.batch_mode, BatchMode::Abort);
    }

    #[test]
    fn test_system_info() {
        let system = RiverSystem::build(scenario_segments(), &[], Config::default()).unwrap();
        let info = system.info();

        assert_eq!(info.segment_count, 3);
        assert_eq!(info.trunk_count, 1);
        assert_eq!(info.junction_count, 2);
        assert_eq!(info.max_rank, 3);
        assert!((info.total_length - 160.0).abs() < 1e-9);
    }

    #[test]
    fn test_scenario_end_to_end() {
        let marker = OutletMarker::new(Coord { x: 0.0, y: 0.0 });
        let system = RiverSystem::build(scenario_segments(), &[marker], Config::default()).unwrap();

        let record = system
            .resolve(PointId(1), Coord { x: 35.0, y: 10.0 }, B)
            .unwrap();
        assert!((record.full_distance - 45.0).abs() < 1e-9);
        assert_eq!(record.path, vec![B, A, T]);
        assert_eq!(system.ranks().get(T), Some(1));
    }

    #[test]
    fn test_config_tolerance_joins_near_miss() {
        let segments = vec![
            Segment::from_coords(T, [(0.0, 0.0), (100.0, 0.0)]),
            Segment::from_coords(A, [(40.0, 0.004), (40.0, 25.0)]),
        ];

        let coarse =
            RiverSystem::build(segments.clone(), &[], Config::with_tolerance(0.01)).unwrap();
        assert_eq!(coarse.info().trunk_count, 1);
        assert_eq!(coarse.junctions().parent_of(A), Some(T));
        assert_eq!(coarse.oriented().tolerance(), 0.01);

        let fine = RiverSystem::build(segments, &[], Config::default()).unwrap();
        assert_eq!(fine.info().trunk_count, 2);
        assert!(fine.junctions().is_empty());
    }

    #[test]
    fn test_digitizing_direction_does_not_matter() {
        let reversed: Vec<Segment> = scenario_segments().iter().map(Segment::reversed).collect();
        let marker = OutletMarker::new(Coord { x: 0.0, y: 0.0 });
        let system = RiverSystem::build(reversed, &[marker], Config::default()).unwrap();

        assert_eq!(system.oriented().report().flipped, vec![T, A, B]);
        let record = system
            .resolve(PointId(1), Coord { x: 35.0, y: 10.0 }, B)
            .unwrap();
        assert!((record.full_distance - 45.0).abs() < 1e-9);
    }

    #[test]
    fn test_place_resolve_round_trip() {
        let system = RiverSystem::build(scenario_segments(), &[], Config::default()).unwrap();
        let tolerance = system.config().tolerance;

        for point in system.sample_along(4, 7).unwrap() {
            let segment = point.segment.unwrap();
            let record = system.resolve(point.id, point.location, segment).unwrap();
            let placed = system.place(segment, record.local_distance).unwrap();
            assert!(utils::coords_coincide(placed.point, point.location, tolerance));
        }
    }

    #[test]
    fn test_batch_mode_from_config() {
        let config = Config {
            batch_mode: BatchMode::BestEffort,
            ..Config::default()
        };
        let system = RiverSystem::build(scenario_segments(), &[], config).unwrap();
        let points = vec![
            PointOfInterest::on_segment(PointId(1), Coord { x: 50.0, y: 0.0 }, T),
            PointOfInterest::on_segment(PointId(2), Coord { x: 50.0, y: 3.0 }, T),
        ];

        let table = system.resolve_batch(&points).unwrap();
        assert_eq!(table.len(), 1);
        assert_eq!(table.failures.len(), 1);
    }

    #[test]
    fn test_disconnected_build_fails() {
        let mut segments = scenario_segments();
        segments.push(Segment::from_coords(SegmentId(8), [(500.0, 0.0), (510.0, 0.0)]));
        segments.push(Segment::from_coords(SegmentId(9), [(510.0, 0.0), (520.0, 0.0)]));

        match RiverSystem::build(segments, &[], Config::default()) {
            Err(MileageError::DisconnectedNetwork { orphans }) => {
                assert_eq!(orphans, vec![SegmentId(8), SegmentId(9)])
            }
            Err(other) => panic!("expected disconnected network, got {other:?}"),
            Ok(_) => panic!("expected disconnected network"),
        }
    }

    #[test]
    fn test_cancelled_build() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = RiverSystem::build_with(
            scenario_segments(),
            &[],
            PlanarGeometry,
            Config::default(),
            &cancel,
        );
        assert!(matches!(result, Err(MileageError::Cancelled)));
    }
}
