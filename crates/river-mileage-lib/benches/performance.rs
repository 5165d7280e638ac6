//! Performance benchmarks for river-mileage-lib
//!
//! Run with: cargo bench --package river-mileage-lib

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use river_mileage_lib::{Config, RiverSystem, Segment, SegmentId};

/// Generate a comb-shaped river system
///
/// One trunk along the x axis with `teeth` tributaries, each carrying
/// `sub_per_tooth` sub-tributaries. Tributaries are slightly wavy polylines so
/// measurement has to walk several edges.
fn generate_comb(teeth: usize, sub_per_tooth: usize) -> Vec<Segment> {
    let spacing = 100.0;
    let tooth_length = 50.0 * (sub_per_tooth as f64 + 1.0);
    let mut segments = Vec::with_capacity(1 + teeth * (1 + sub_per_tooth));
    let mut next_id = 1u64;

    let trunk_length = spacing * (teeth as f64 + 1.0);
    segments.push(Segment::from_coords(
        SegmentId(next_id),
        [(0.0, 0.0), (trunk_length, 0.0)],
    ));
    next_id += 1;

    for t in 0..teeth {
        let x = spacing * (t as f64 + 1.0);
        let tooth: Vec<(f64, f64)> = (0..=20)
            .map(|i| {
                let y = tooth_length * i as f64 / 20.0;
                let wobble = if i == 0 { 0.0 } else { (y * 0.1).sin() * 2.0 };
                (x + wobble, y)
            })
            .collect();
        let tooth_segment = Segment::from_coords(SegmentId(next_id), tooth.iter().copied());
        next_id += 1;

        for s in 0..sub_per_tooth {
            // Start exactly on a tooth vertex so the confluence is exact
            let (sx, sy) = tooth[(s + 1) * 20 / (sub_per_tooth + 1)];
            segments.push(Segment::from_coords(
                SegmentId(next_id),
                [(sx, sy), (sx + 30.0, sy + 5.0)],
            ));
            next_id += 1;
        }
        segments.push(tooth_segment);
    }

    segments
}

// ============================================================================
// Core Benchmarks - Key performance indicators
// ============================================================================

fn bench_build(c: &mut Criterion) {
    let mut group = c.benchmark_group("build");
    group.sample_size(20);

    for teeth in [50, 200] {
        let segments = generate_comb(teeth, 2);
        group.throughput(Throughput::Elements(segments.len() as u64));
        group.bench_with_input(BenchmarkId::new("comb", teeth), &segments, |b, segments| {
            b.iter(|| RiverSystem::build(segments.clone(), &[], Config::default()).unwrap());
        });
    }

    group.finish();
}

fn bench_resolve(c: &mut Criterion) {
    let mut group = c.benchmark_group("resolve");

    let system = RiverSystem::build(generate_comb(200, 2), &[], Config::default()).unwrap();
    let points = system.sample_along(10, 42).unwrap();

    group.throughput(Throughput::Elements(points.len() as u64));
    group.bench_function("batch_200x2_10_per_segment", |b| {
        b.iter(|| system.resolve_batch(&points).unwrap());
    });

    let single = points[points.len() / 2];
    group.bench_function("single_point", |b| {
        b.iter(|| {
            system
                .resolve(single.id, single.location, single.segment.unwrap())
                .unwrap()
        });
    });

    group.finish();
}

fn bench_place(c: &mut Criterion) {
    let mut group = c.benchmark_group("place");

    let system = RiverSystem::build(generate_comb(200, 2), &[], Config::default()).unwrap();
    let requests: Vec<(SegmentId, f64)> = system
        .network()
        .segments()
        .iter()
        .map(|segment| (segment.id(), segment.length() / 2.0))
        .collect();

    group.throughput(Throughput::Elements(requests.len() as u64));
    group.bench_function("midpoints", |b| {
        b.iter(|| system.place_batch(&requests).unwrap());
    });

    group.bench_function("info", |b| {
        b.iter(|| system.info());
    });

    group.finish();
}

// ============================================================================
// Criterion Configuration
// ============================================================================

criterion_group!(benches, bench_build, bench_resolve, bench_place);

criterion_main!(benches);
