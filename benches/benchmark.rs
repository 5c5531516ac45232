use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use rand::prelude::*;
use simlayout::reduce::{Algorithm, LayoutReducer, TsneParams};
use simlayout::{store, Dataset, DocumentRecord};

const DIMENSIONS: usize = 384; // Width of the synthetic embeddings
const SIZES: [usize; 3] = [50, 200, 500]; // Records per dataset

fn configure_criterion() -> Criterion {
    Criterion::default()
        .sample_size(10)
        .measurement_time(std::time::Duration::from_secs(30))
        .warm_up_time(std::time::Duration::from_secs(3))
        .configure_from_args()
}

fn synthetic_dataset(records: usize) -> Dataset {
    let mut rng = StdRng::seed_from_u64(7);
    let rows = (0..records)
        .map(|i| {
            let vector = (0..DIMENSIONS).map(|_| rng.gen_range(-1.0..1.0)).collect();
            DocumentRecord::new(format!("notes/{}.md", i), vector)
        })
        .collect();
    Dataset::new(rows).unwrap()
}

fn store_round_trip(c: &mut Criterion) {
    let dataset = synthetic_dataset(500);
    let text = store::serialize_dataset(&dataset).unwrap();

    c.bench_function("serialize 500 records", |b| {
        b.iter(|| store::serialize_dataset(&dataset).unwrap())
    });
    c.bench_function("deserialize 500 records", |b| {
        b.iter(|| store::deserialize_str(&text).unwrap())
    });
}

fn layouts(c: &mut Criterion) {
    let mut group = c.benchmark_group("layout");
    for &size in SIZES.iter() {
        let dataset = synthetic_dataset(size);

        group.bench_with_input(BenchmarkId::new("pca", size), &dataset, |b, dataset| {
            let reducer = LayoutReducer::new(Algorithm::LinearProjection);
            b.iter(|| reducer.reduce(dataset).unwrap())
        });

        group.bench_with_input(BenchmarkId::new("tsne", size), &dataset, |b, dataset| {
            let reducer = LayoutReducer::new(Algorithm::StochasticNeighborEmbedding(TsneParams {
                seed: Some(42),
                iterations: 300,
                ..TsneParams::default()
            }));
            b.iter(|| reducer.reduce(dataset).unwrap())
        });
    }
    group.finish();
}

criterion_group! {
    name = benches;
    config = configure_criterion();
    targets = store_round_trip, layouts
}
criterion_main!(benches);
