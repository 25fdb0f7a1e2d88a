//! End-to-end scenarios S1-S6, verbatim from spec §8.

use std::sync::Arc;

use crate::commit_log::InMemoryCommitLog;
use crate::distance::{Cosine, Metric};
use crate::error::Error;
use crate::hnsw::index::Index;
use crate::hnsw::{HnswConfig, LayerIndex, NodeId};
use crate::provider::InMemoryVectorProvider;
use crate::vector::Vector;
use crate::worker::BuildPool;

use super::fixtures::canonical_basis;

fn basis_provider(dim: usize) -> InMemoryVectorProvider {
    canonical_basis(dim)
        .into_iter()
        .enumerate()
        .map(|(i, v)| (i as u64, v))
        .collect()
}

/// S1: an empty index returns no results for any query.
#[test]
fn s1_empty_index_returns_empty() {
    let index = Index::new(
        HnswConfig::default(),
        Cosine,
        InMemoryVectorProvider::new(),
        InMemoryCommitLog::new(),
        1,
    );
    let results = index.knn_search(&[1.0, 0.0, 0.0], 5, 10).unwrap();
    assert!(results.is_empty());
}

/// S2: a singleton index returns that one id as its own nearest neighbor.
#[test]
fn s2_singleton_returns_itself() {
    let mut provider = InMemoryVectorProvider::new();
    provider.insert(0, Vector::new(vec![1.0, 0.0, 0.0]));
    let index = Index::new(
        HnswConfig::default(),
        Cosine,
        provider,
        InMemoryCommitLog::new(),
        1,
    );
    index.insert_node(NodeId(0)).unwrap();
    let results = index.knn_search(&[1.0, 0.0, 0.0], 1, 1).unwrap();
    assert_eq!(results, vec![NodeId(0)]);
}

fn build_s3() -> Index<Cosine, InMemoryVectorProvider, InMemoryCommitLog> {
    let provider = basis_provider(8);
    let config = HnswConfig::new(4, 16).unwrap();
    let index = Index::new(config, Cosine, provider, InMemoryCommitLog::new(), 42);
    for id in 0..8u64 {
        index.insert_node(NodeId(id)).unwrap();
    }
    index
}

/// S3: with seed=42, M=4, ef_construction=16 over the canonical basis of
/// R^8, a query for e_3 returns id 3 first, with the remaining two at
/// cosine distance 1 (every other basis vector is orthogonal to e_3).
#[test]
fn s3_deterministic_small_index() {
    let index = build_s3();
    let e3 = canonical_basis(8)[3].clone();
    let results = index.knn_search(e3.as_slice(), 3, 8).unwrap();

    assert_eq!(results.len(), 3);
    assert_eq!(results[0], NodeId(3));

    let basis = canonical_basis(8);
    for &id in &results[1..] {
        let d = Cosine
            .distance(e3.as_slice(), basis[id.0 as usize].as_slice())
            .unwrap();
        assert!((d - 1.0).abs() < 1e-5, "expected distance 1, got {d}");
    }
}

/// S4: encoding and decoding S3's index and repeating the query reproduces
/// the identical result.
#[test]
fn s4_snapshot_round_trip_reproduces_query() {
    let index = build_s3();
    let e3 = canonical_basis(8)[3].clone();
    let before = index.knn_search(e3.as_slice(), 3, 8).unwrap();

    let bytes = crate::snapshot::encode(&index, false).unwrap();
    let decoded = crate::snapshot::decode(
        &bytes,
        Cosine,
        basis_provider(8),
        InMemoryCommitLog::new(),
        42,
    )
    .unwrap();
    let after = decoded.knn_search(e3.as_slice(), 3, 8).unwrap();

    assert_eq!(before, after);
}

/// S5: sequential and 4-worker-concurrent builds of the same inserts both
/// satisfy invariants 1-4 and agree on every basis query's top-1 id.
#[tokio::test]
async fn s5_concurrent_build_matches_sequential_top1() {
    let sequential = build_s3();

    let concurrent = Arc::new(Index::new(
        HnswConfig::new(4, 16).unwrap(),
        Cosine,
        basis_provider(8),
        InMemoryCommitLog::new(),
        42,
    ));
    let pool = BuildPool::spawn(concurrent.clone(), 4, 8).await;
    for id in 0..8u64 {
        pool.insert(NodeId(id)).await.unwrap();
    }

    for id in 0..8u64 {
        let level = concurrent.node_level(NodeId(id)).unwrap();
        for layer in 0..=level {
            let layer = LayerIndex(layer as u16);
            let a = concurrent.connections_at(NodeId(id), layer).unwrap_or_default();
            for &neighbor in &a {
                let back = concurrent.connections_at(neighbor, layer).unwrap_or_default();
                assert!(back.contains(&NodeId(id)), "missing back-edge at {layer:?}");
            }
            let config = concurrent.config();
            let cap = if layer.0 == 0 { config.m_max0 } else { config.m };
            assert!(a.len() <= cap);
        }
        let ep = concurrent.entry_point_id().unwrap();
        assert_eq!(concurrent.node_level(ep), Some(concurrent.current_max_layer()));
    }

    let basis = canonical_basis(8);
    for (id, vector) in basis.iter().enumerate() {
        let seq_top1 = sequential.knn_search(vector.as_slice(), 1, 8).unwrap();
        let con_top1 = concurrent.knn_search(vector.as_slice(), 1, 8).unwrap();
        assert_eq!(seq_top1[0], NodeId(id as u64));
        assert_eq!(con_top1[0], NodeId(id as u64));
    }
}

/// S6: querying with a vector of mismatched dimensionality fails with
/// `DimensionMismatch` and leaves the index unchanged.
#[test]
fn s6_dimension_mismatch_leaves_index_unchanged() {
    let mut provider = InMemoryVectorProvider::new();
    let mut v = vec![0.0f32; 8];
    v[0] = 1.0;
    provider.insert(0, Vector::new(v));
    let index = Index::new(
        HnswConfig::default(),
        Cosine,
        provider,
        InMemoryCommitLog::new(),
        1,
    );
    index.insert_node(NodeId(0)).unwrap();

    let mismatched_query = vec![0.0f32; 7];
    let err = index.knn_search(&mismatched_query, 1, 1).unwrap_err();
    assert!(matches!(err, Error::DimensionMismatch { expected: 7, found: 8 }));
    assert_eq!(index.len(), 1);
    assert_eq!(index.node_level(NodeId(0)), Some(0));
}
