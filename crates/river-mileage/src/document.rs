//! JSON interchange documents read and written by the command line

use crate::CliError;
use geo::Coord;
use river_mileage_lib::{
    MileageRecord, OutletMarker, PlacedPoint, PointFailure, PointId, PointOfInterest, Segment,
    SegmentId,
};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

/// Input network: segments plus optional outlet markers
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NetworkDocument {
    pub segments: Vec<SegmentRecord>,
    #[serde(default)]
    pub outlets: Vec<OutletRecord>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SegmentRecord {
    pub id: u64,
    /// Polyline vertices as `[x, y]` pairs
    pub coordinates: Vec<[f64; 2]>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct OutletRecord {
    pub x: f64,
    pub y: f64,
    #[serde(default)]
    pub segment: Option<u64>,
}

/// A point of interest, as read by `mileage` and written by `sample`
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct PointRecord {
    pub id: u64,
    pub x: f64,
    pub y: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub segment: Option<u64>,
}

/// A (segment, distance) request for `place`
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct DistanceRecord {
    pub segment: u64,
    pub distance: f64,
}

/// One row of the `ranks` output
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct RankRow {
    pub id: u64,
    pub rank: Option<u32>,
    pub role: Option<&'static str>,
    pub flipped: bool,
    pub length: f64,
    /// Oriented vertices, upstream last
    pub coordinates: Vec<[f64; 2]>,
}

/// One row of the mileage table
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct MileageRow {
    pub point_id: u64,
    pub segment_id: u64,
    pub local_distance: f64,
    pub full_distance: f64,
    /// Comma-joined segment ids from the point's segment to the root
    pub path: String,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct FailureRow {
    pub point_id: u64,
    pub error: String,
}

/// Output of the `mileage` command
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct MileageOutput {
    pub rows: Vec<MileageRow>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub failures: Vec<FailureRow>,
}

/// One row of the `place` output
#[derive(Debug, Clone, Copy, Serialize, PartialEq)]
pub struct PlacedRow {
    pub segment: u64,
    pub distance: f64,
    pub x: f64,
    pub y: f64,
}

impl NetworkDocument {
    pub fn segments(&self) -> Vec<Segment> {
        self.segments
            .iter()
            .map(|record| {
                Segment::from_coords(
                    SegmentId(record.id),
                    record.coordinates.iter().map(|[x, y]| (*x, *y)),
                )
            })
            .collect()
    }

    pub fn outlets(&self) -> Vec<OutletMarker> {
        self.outlets
            .iter()
            .map(|outlet| OutletMarker {
                point: Coord {
                    x: outlet.x,
                    y: outlet.y,
                },
                segment: outlet.segment.map(SegmentId),
            })
            .collect()
    }
}

impl From<PointRecord> for PointOfInterest {
    fn from(record: PointRecord) -> Self {
        PointOfInterest {
            id: PointId(record.id),
            location: Coord {
                x: record.x,
                y: record.y,
            },
            segment: record.segment.map(SegmentId),
        }
    }
}

impl From<PointOfInterest> for PointRecord {
    fn from(point: PointOfInterest) -> Self {
        PointRecord {
            id: point.id.0,
            x: point.location.x,
            y: point.location.y,
            segment: point.segment.map(|segment| segment.0),
        }
    }
}

impl From<DistanceRecord> for (SegmentId, f64) {
    fn from(record: DistanceRecord) -> Self {
        (SegmentId(record.segment), record.distance)
    }
}

impl From<&MileageRecord> for MileageRow {
    fn from(record: &MileageRecord) -> Self {
        MileageRow {
            point_id: record.point_id.0,
            segment_id: record.segment_id.0,
            local_distance: record.local_distance,
            full_distance: record.full_distance,
            path: record.path_string(),
        }
    }
}

impl From<&PointFailure> for FailureRow {
    fn from(failure: &PointFailure) -> Self {
        FailureRow {
            point_id: failure.point_id.0,
            error: failure.error.to_string(),
        }
    }
}

impl From<PlacedPoint> for PlacedRow {
    fn from(placed: PlacedPoint) -> Self {
        PlacedRow {
            segment: placed.segment_id.0,
            distance: placed.distance,
            x: placed.point.x,
            y: placed.point.y,
        }
    }
}

/// Read and parse a JSON document
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, CliError> {
    let file = File::open(path).map_err(|source| CliError::Io {
        path: path.display().to_string(),
        source,
    })?;
    serde_json::from_reader(BufReader::new(file)).map_err(|source| CliError::Json {
        path: path.display().to_string(),
        source,
    })
}

/// Write a value as pretty JSON to a file, or stdout when no path is given
pub fn write_json<T: Serialize>(value: &T, path: Option<&Path>) -> Result<(), CliError> {
    let target = path.map_or_else(|| "<stdout>".to_string(), |p| p.display().to_string());
    let io_error = |source| CliError::Io {
        path: target.clone(),
        source,
    };

    let mut writer: Box<dyn Write> = match path {
        Some(path) => Box::new(BufWriter::new(File::create(path).map_err(io_error)?)),
        None => Box::new(BufWriter::new(std::io::stdout().lock())),
    };
    serde_json::to_writer_pretty(&mut writer, value).map_err(|source| CliError::Json {
        path: target.clone(),
        source,
    })?;
    writeln!(writer).map_err(io_error)?;
    writer.flush().map_err(io_error)
}
