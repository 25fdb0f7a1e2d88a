//! Concurrent HNSW approximate nearest-neighbor index core.
//!
//! The crate is organized around a generic [`hnsw::index::Index`] that is
//! parameterized over a distance [`distance::Metric`], a
//! [`provider::VectorProvider`] the index fetches vectors from on demand,
//! and a [`commit_log::CommitLogSink`] that every structural mutation is
//! written through before it is applied in memory.

pub mod commit_log;
pub mod distance;
pub mod error;
pub mod hnsw;
pub mod ods;
pub mod provider;
pub mod snapshot;
pub mod telemetry;
pub mod vector;
pub mod worker;

#[cfg(test)]
pub mod tests;

pub use error::Error;
pub use vector::Vector;

pub use commit_log::{CommitLogSink, CommitRecord, FileCommitLog, InMemoryCommitLog, NullCommitLog};
pub use distance::{Cosine, Metric};
pub use hnsw::external::{build_external_insert, import, ExternalInsert, ExternalInsertHook, NullExternalInsertHook};
pub use hnsw::index::Index;
pub use hnsw::{HnswConfig, LayerIndex, LevelFormula, NeighborSelection, Node, NodeId};
pub use ods::OrderedDistanceSet;
pub use provider::{InMemoryVectorProvider, VectorProvider};
pub use telemetry::{NullTelemetry, RecordingTelemetry, Telemetry};
pub use worker::BuildPool;
