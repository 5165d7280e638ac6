use crate::document::{
    DistanceRecord, FailureRow, MileageOutput, MileageRow, PlacedRow, PointRecord, RankRow,
};
use river_mileage_lib::{PointOfInterest, Result, RiverSystem, SegmentId, SegmentRole};

/// Oriented segments with their ranks, in input order
pub fn ranks(system: &RiverSystem) -> Vec<RankRow> {
    let oriented = system.oriented();
    let flipped = &oriented.report().flipped;

    system
        .network()
        .segments()
        .iter()
        .map(|segment| RankRow {
            id: segment.id().0,
            rank: segment.rank(),
            role: oriented.role(segment.id()).map(|role| match role {
                SegmentRole::Trunk => "trunk",
                SegmentRole::Branch => "branch",
            }),
            flipped: flipped.binary_search(&segment.id()).is_ok(),
            length: segment.length(),
            coordinates: segment.geometry().coords().map(|c| [c.x, c.y]).collect(),
        })
        .collect()
}

/// Mileage table for the given points
pub fn mileage(system: &RiverSystem, points: Vec<PointRecord>) -> Result<MileageOutput> {
    let points: Vec<PointOfInterest> = points.into_iter().map(PointOfInterest::from).collect();
    let table = system.resolve_batch(&points)?;

    Ok(MileageOutput {
        rows: table.rows.iter().map(MileageRow::from).collect(),
        failures: table.failures.iter().map(FailureRow::from).collect(),
    })
}

/// Points placed from (segment, distance) rows
pub fn place(system: &RiverSystem, rows: Vec<DistanceRecord>) -> Result<Vec<PlacedRow>> {
    let requests: Vec<(SegmentId, f64)> = rows.into_iter().map(Into::into).collect();
    Ok(system
        .place_batch(&requests)?
        .into_iter()
        .map(PlacedRow::from)
        .collect())
}

/// Random points of interest, ready to feed back into `mileage`
pub fn sample(system: &RiverSystem, per_segment: usize, seed: u64) -> Result<Vec<PointRecord>> {
    Ok(system
        .sample_along(per_segment, seed)?
        .into_iter()
        .map(PointRecord::from)
        .collect())
}
