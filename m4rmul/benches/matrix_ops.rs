use criterion::{criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion};
use m4rmul::{transpose, BitMatrix, Config, Engine, Strategy};
use rand::prelude::*;

fn random_pair(size: usize) -> (BitMatrix, BitMatrix) {
    let mut rng = SmallRng::seed_from_u64(size as u64);
    (
        BitMatrix::random(&mut rng, size, size),
        BitMatrix::random(&mut rng, size, size),
    )
}

pub fn multiply_benchmark(criterion: &mut Criterion) {
    let engine = Engine::new(Config::default()).unwrap();
    let mut group = criterion.benchmark_group("BitMatrix::multiply");
    group.sample_size(10);
    for size in [256usize, 512, 1024] {
        let (a, b) = random_pair(size);
        for strategy in Strategy::ALL {
            // the reference multiplier is only worth timing at small sizes
            if strategy == Strategy::Naive && size > 512 {
                continue;
            }
            group.bench_with_input(
                BenchmarkId::new(strategy.to_string(), size),
                &(&a, &b),
                |bencher, (a, b)| bencher.iter(|| engine.multiply(strategy, a, b).unwrap()),
            );
        }
    }
    group.finish();
}

pub fn subvector_width_benchmark(criterion: &mut Criterion) {
    let mut group = criterion.benchmark_group("m4r_multiply::subvector_width");
    group.sample_size(10);
    let (a, b) = random_pair(1024);
    let b_tr = transpose(&b);
    for k in [2usize, 4, 8, 16] {
        let config = Config::default().with_subvector_width(k).with_block_size(16 * k);
        group.bench_with_input(BenchmarkId::from_parameter(k), &config, |bencher, config| {
            bencher.iter(|| m4rmul::m4r::m4r_multiply(&a, &b_tr, config).unwrap())
        });
    }
    group.finish();
}

pub fn transpose_benchmark(criterion: &mut Criterion) {
    let mut group = criterion.benchmark_group("BitMatrix::transpose");
    for size in [64usize, 100, 1000, 4096] {
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |bencher, &size| {
            bencher.iter_batched(
                || random_pair(size).0,
                |matrix| matrix.transposed(),
                BatchSize::SmallInput,
            );
        });
    }
    group.finish();
}

criterion_group!(
    benches,
    multiply_benchmark,
    subvector_width_benchmark,
    transpose_benchmark
);
criterion_main!(benches);
