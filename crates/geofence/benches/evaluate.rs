use criterion::{Criterion, black_box, criterion_group, criterion_main};

use rollcall_geofence::{Coordinate, DEFAULT_THRESHOLD_METERS, Geofence, evaluate};

fn bench_evaluate(c: &mut Criterion) {
    let campus = Coordinate::new(23.7957, 86.4304).unwrap();
    let reading = Coordinate::new(23.8100, 86.4450).unwrap();
    let fence = Geofence::with_default_threshold(campus);

    c.bench_function("evaluate", |b| {
        b.iter(|| evaluate(black_box(reading), black_box(campus), DEFAULT_THRESHOLD_METERS))
    });

    c.bench_function("geofence_evaluate", |b| {
        b.iter(|| fence.evaluate(black_box(reading)))
    });
}

criterion_group!(benches, bench_evaluate);
criterion_main!(benches);
