use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use hnsw_core::{Cosine, HnswConfig, Index, InMemoryCommitLog, InMemoryVectorProvider, NodeId, Vector};

const DIM: usize = 25;
const DATASET_SIZE: usize = 2_000;

fn standard_normal(rng: &mut StdRng) -> f32 {
    let u1: f64 = rng.gen_range(f64::EPSILON..1.0);
    let u2: f64 = rng.gen();
    ((-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos()) as f32
}

fn synthetic_dataset(n: usize, dim: usize, seed: u64) -> Vec<Vec<f32>> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..n)
        .map(|_| (0..dim).map(|_| standard_normal(&mut rng)).collect())
        .collect()
}

fn build_index(dataset: &[Vec<f32>]) -> Index<Cosine, InMemoryVectorProvider, InMemoryCommitLog> {
    let provider: InMemoryVectorProvider = dataset
        .iter()
        .enumerate()
        .map(|(i, v)| (i as u64, Vector::new(v.clone())))
        .collect();
    let config = HnswConfig::new(16, 100).unwrap();
    Index::new(config, Cosine, provider, InMemoryCommitLog::new(), 7)
}

fn bench_hnsw_insert(c: &mut Criterion) {
    let dataset = synthetic_dataset(DATASET_SIZE, DIM, 1);

    c.bench_function("hnsw_insert_synthetic_2k", |b| {
        b.iter(|| {
            let index = build_index(&dataset);
            for i in 0..dataset.len() as u64 {
                index.insert_node(NodeId(i)).unwrap();
            }
            black_box(index.len());
        })
    });
}

fn bench_hnsw_incremental_insert(c: &mut Criterion) {
    let dataset = synthetic_dataset(DATASET_SIZE, DIM, 1);
    let query = synthetic_dataset(1, DIM, 99).remove(0);
    let new_id = NodeId(dataset.len() as u64);

    c.bench_function("hnsw_incremental_insert", |b| {
        b.iter_batched(
            || {
                let mut provider = InMemoryVectorProvider::new();
                for (i, v) in dataset.iter().enumerate() {
                    provider.insert(i as u64, Vector::new(v.clone()));
                }
                provider.insert(new_id.0, Vector::new(query.clone()));

                let config = HnswConfig::new(16, 100).unwrap();
                let index = Index::new(config, Cosine, provider, InMemoryCommitLog::new(), 7);
                for i in 0..dataset.len() as u64 {
                    index.insert_node(NodeId(i)).unwrap();
                }
                index
            },
            |index| {
                index.insert_node(black_box(new_id)).unwrap();
            },
            BatchSize::SmallInput,
        )
    });
}

fn bench_knn_search(c: &mut Criterion) {
    let dataset = synthetic_dataset(DATASET_SIZE, DIM, 1);
    let query = synthetic_dataset(1, DIM, 99).remove(0);

    let index = Arc::new(build_index(&dataset));
    for i in 0..dataset.len() as u64 {
        index.insert_node(NodeId(i)).unwrap();
    }

    c.bench_function("hnsw_knn_search_k10", |b| {
        b.iter(|| {
            index
                .knn_search(black_box(&query), 10, 50)
                .unwrap();
        })
    });
}

criterion_group!(
    benches,
    bench_hnsw_insert,
    bench_hnsw_incremental_insert,
    bench_knn_search
);

criterion_main!(benches);
