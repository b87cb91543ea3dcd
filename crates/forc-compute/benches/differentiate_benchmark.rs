use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use forc_compute::{CancelToken, ComputePool, FitSettings, build_grid, differentiate};
use forc_core::{MeasurementSet, NeighborhoodPolicy, ReversalCurve};
use std::hint::black_box;

fn make_measurement_set(n_curves: usize) -> MeasurementSet {
    // Unit-spaced triangle of curves with a smooth switching response.
    let curves = (0..n_curves)
        .map(|k| {
            let hb = k as f64;
            let ha: Vec<f64> = (k..=n_curves).map(|h| h as f64).collect();
            let m = ha.iter().map(|&h| ((h - hb) / 10.0).tanh() + 1e-3 * h * hb).collect();
            ReversalCurve::new(hb, ha, m).unwrap()
        })
        .collect();
    MeasurementSet::new(curves).unwrap()
}

fn bench_differentiate(c: &mut Criterion) {
    let mut group = c.benchmark_group("differentiate");
    group.sample_size(10);

    let data = make_measurement_set(100);
    let threads = std::thread::available_parallelism().map_or(1, |n| n.get());
    let pool = ComputePool::new(threads).unwrap();
    let cancel = CancelToken::new();

    for sf in [2usize, 3, 5] {
        let grid = build_grid(&data, 100, sf).unwrap();
        for policy in [NeighborhoodPolicy::SampleIndex, NeighborhoodPolicy::FieldDistance] {
            let settings =
                FitSettings { smoothing_factor: sf, neighborhood: policy, density_scale: 1.0 };
            let id = BenchmarkId::new(format!("{policy:?}"), sf);
            group.bench_with_input(id, &sf, |b, _| {
                b.iter(|| {
                    let map = differentiate(&data, &grid, &settings, &pool, &cancel).unwrap();
                    black_box(map.counts())
                })
            });
        }
    }

    group.finish();
}

criterion_group!(benches, bench_differentiate);
criterion_main!(benches);
