//! Write-ahead commit log: a typed append-only stream of graph-mutation
//! records, produced synchronously with every mutation to the Index.

use std::fs::File;
use std::io::{self, BufWriter, Read, Write};
use std::path::Path;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::hnsw::{index::Index, LayerIndex, NodeId};
use crate::{distance::Metric, provider::VectorProvider};

/// One graph-mutation record. Record kinds mirror §4.2 exactly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CommitRecord {
    SetEntryPointWithMaxLayer {
        id: NodeId,
        layer: u8,
    },
    AddNode {
        id: NodeId,
        level: u8,
    },
    AddLinkAtLevel {
        node_id: NodeId,
        layer: LayerIndex,
        neighbor_id: NodeId,
    },
    ReplaceLinksAtLevel {
        node_id: NodeId,
        layer: LayerIndex,
        neighbors: Vec<NodeId>,
    },
}

impl Serialize for NodeId {
    fn serialize<S: serde::Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(self.0)
    }
}

impl<'de> Deserialize<'de> for NodeId {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        Ok(NodeId(u64::deserialize(d)?))
    }
}

impl Serialize for LayerIndex {
    fn serialize<S: serde::Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u16(self.0)
    }
}

impl<'de> Deserialize<'de> for LayerIndex {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        Ok(LayerIndex(u16::deserialize(d)?))
    }
}

/// A sink that a mutation's `emit` call hands each record to. Implementors
/// may append to a file, a network stream, or an in-memory buffer — the
/// engine is agnostic (§6.3). A failed append is a fatal error of the
/// mutation that produced it; the log never retries silently.
pub trait CommitLogSink: Send + Sync {
    fn emit(&self, record: CommitRecord) -> Result<(), Error>;
}

impl<T: CommitLogSink + ?Sized> CommitLogSink for std::sync::Arc<T> {
    fn emit(&self, record: CommitRecord) -> Result<(), Error> {
        (**self).emit(record)
    }
}

/// Records kept in memory, used by tests and by replay-equivalence checks.
#[derive(Debug, Default)]
pub struct InMemoryCommitLog {
    records: Mutex<Vec<CommitRecord>>,
}

impl InMemoryCommitLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<CommitRecord> {
        self.records.lock().clone()
    }
}

impl CommitLogSink for InMemoryCommitLog {
    fn emit(&self, record: CommitRecord) -> Result<(), Error> {
        self.records.lock().push(record);
        Ok(())
    }
}

/// A sink that discards every record — used where the engine needs an
/// `Index` but no durability (e.g. reconstructing a snapshot in memory).
#[derive(Debug, Clone, Copy, Default)]
pub struct NullCommitLog;

impl CommitLogSink for NullCommitLog {
    fn emit(&self, _record: CommitRecord) -> Result<(), Error> {
        Ok(())
    }
}

/// Appends length-prefixed, `bincode`-encoded records to a file.
pub struct FileCommitLog {
    writer: Mutex<BufWriter<File>>,
}

impl FileCommitLog {
    pub fn create(path: impl AsRef<Path>) -> io::Result<Self> {
        let file = File::create(path)?;
        Ok(Self {
            writer: Mutex::new(BufWriter::new(file)),
        })
    }

    /// Read every frame back from a log file written by this type.
    pub fn read_all(path: impl AsRef<Path>) -> io::Result<Vec<CommitRecord>> {
        let mut file = File::open(path)?;
        let mut bytes = Vec::new();
        file.read_to_end(&mut bytes)?;

        let mut records = Vec::new();
        let mut cursor = &bytes[..];
        while !cursor.is_empty() {
            if cursor.len() < 8 {
                break;
            }
            let mut len_bytes = [0u8; 8];
            len_bytes.copy_from_slice(&cursor[..8]);
            let len = u64::from_le_bytes(len_bytes) as usize;
            cursor = &cursor[8..];
            let frame = &cursor[..len];
            let record: CommitRecord = bincode::deserialize(frame)
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
            records.push(record);
            cursor = &cursor[len..];
        }
        Ok(records)
    }
}

impl CommitLogSink for FileCommitLog {
    fn emit(&self, record: CommitRecord) -> Result<(), Error> {
        let encoded = bincode::serialize(&record)
            .map_err(|e| Error::LogAppendFailure(e.to_string()))?;
        let mut writer = self.writer.lock();
        writer
            .write_all(&(encoded.len() as u64).to_le_bytes())
            .and_then(|_| writer.write_all(&encoded))
            .and_then(|_| writer.flush())
            .map_err(|e| Error::LogAppendFailure(e.to_string()))
    }
}

/// Reconstruct an index by applying `records` in order to an empty
/// `Index`, without running search. `index` must be freshly constructed
/// (empty) — this is the mechanical counterpart of §8 property 6.
pub fn replay<D: Metric, P: VectorProvider, S: CommitLogSink>(
    records: &[CommitRecord],
    index: &Index<D, P, S>,
) -> Result<(), Error> {
    for record in records {
        index.apply_commit_record(record)?;
    }
    Ok(())
}
