//! Hierarchical ranking by breadth-first layering from trunk segments

use crate::{MileageError, OrientedNetwork, Result, SegmentId};
use smallvec::SmallVec;
use std::collections::{BTreeMap, HashMap};

/// Most confluences join two or three segments
type Neighbours = SmallVec<[SegmentId; 4]>;

/// Rank of every segment, ordered by segment id
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Ranks(BTreeMap<SegmentId, u32>);

impl Ranks {
    #[inline]
    pub fn get(&self, id: SegmentId) -> Option<u32> {
        self.0.get(&id).copied()
    }

    /// Highest rank in the network (0 for an empty network)
    pub fn max_rank(&self) -> u32 {
        self.0.values().copied().max().unwrap_or(0)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (SegmentId, u32)> + '_ {
        self.0.iter().map(|(id, rank)| (*id, *rank))
    }
}

/// Assigns rank 1 to trunks and rank n + 1 to unranked segments touching rank n
#[derive(Debug, Clone, Copy, Default)]
pub struct RankAssigner;

#[cfg_attr(feature = "profiling", profiling::all_functions)]
impl RankAssigner {
    pub fn new() -> Self {
        Self
    }

    /// Compute ranks and write them back onto the segments
    pub fn assign(&self, oriented: &mut OrientedNetwork) -> Result<Ranks> {
        let ranks = self.compute(oriented)?;

        let network = oriented.network_mut();
        for (id, rank) in ranks.iter() {
            if let Some(segment) = network.get_mut(id) {
                segment.set_rank(rank);
            }
        }

        Ok(ranks)
    }

    /// Compute ranks without touching the network
    pub fn compute(&self, oriented: &OrientedNetwork) -> Result<Ranks> {
        #[cfg(feature = "profiling")]
        profiling::scope!("rank::compute");

        let network = oriented.network();
        if network.is_empty() {
            return Ok(Ranks::default());
        }

        let trunks = oriented.trunks();
        if trunks.is_empty() {
            let mut orphans: Vec<SegmentId> = network.ids().collect();
            orphans.sort_unstable();
            return Err(MileageError::DisconnectedNetwork { orphans });
        }

        let adjacency = Self::adjacency(oriented.touches());

        let mut ranks: BTreeMap<SegmentId, u32> = trunks.iter().map(|id| (*id, 1)).collect();
        let mut frontier: Vec<SegmentId> = trunks.to_vec();
        let mut rank = 1u32;

        while !frontier.is_empty() {
            // Every layer ranks at least one new segment, so more layers than
            // segments means the bookkeeping is broken
            if rank as usize > network.len() {
                return Err(MileageError::Consistency {
                    segments: frontier,
                    reason: "rank layering made no progress".to_string(),
                });
            }

            let mut next = Vec::new();
            for id in &frontier {
                let Some(neighbours) = adjacency.get(id) else {
                    continue;
                };
                for neighbour in neighbours {
                    if !ranks.contains_key(neighbour) {
                        ranks.insert(*neighbour, rank + 1);
                        next.push(*neighbour);
                    }
                }
            }

            tracing::debug!("Rank {} layer: {} segments", rank + 1, next.len());
            next.sort_unstable();
            frontier = next;
            rank += 1;
        }

        let mut orphans: Vec<SegmentId> = network
            .ids()
            .filter(|id| !ranks.contains_key(id))
            .collect();
        if !orphans.is_empty() {
            orphans.sort_unstable();
            return Err(MileageError::DisconnectedNetwork { orphans });
        }

        Ok(Ranks(ranks))
    }

    fn adjacency(touches: &[(SegmentId, SegmentId)]) -> HashMap<SegmentId, Neighbours> {
        let mut adjacency: HashMap<SegmentId, Neighbours> = HashMap::new();
        for &(a, b) in touches {
            adjacency.entry(a).or_default().push(b);
            adjacency.entry(b).or_default().push(a);
        }
        adjacency
    }
}
