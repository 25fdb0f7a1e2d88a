//! Binary snapshot codec (§4.5 / §6.1). Little-endian, self-describing,
//! optionally gzip-wrapped. The layout is hand-rolled rather than derived
//! through `bincode`/`serde` because the wire format is a fixed, ragged
//! table (a flat header followed by a per-node, per-layer nested array)
//! that does not correspond to any single Rust struct a generic
//! serializer would produce without writing this same code by hand, with
//! extra ceremony, behind a custom `Serialize` impl.

use std::io::{self, Cursor, Read, Write};

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;

use crate::distance::Metric;
use crate::error::Error;
use crate::hnsw::{index::Index, HnswConfig, LayerIndex, NeighborSelection, NodeId};
use crate::provider::VectorProvider;

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Encode `index` to the wire format described in §6.1, optionally wrapped
/// in gzip, with a trailing CRC32 checksum over the uncompressed payload.
pub fn encode<D: Metric, P: VectorProvider, S: crate::commit_log::CommitLogSink>(
    index: &Index<D, P, S>,
    gzip: bool,
) -> io::Result<Vec<u8>> {
    let mut payload = Vec::new();
    write_payload(index, &mut payload)?;

    let mut crc = flate2::Crc::new();
    crc.update(&payload);
    payload.extend_from_slice(&crc.sum().to_le_bytes());

    if gzip {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&payload)?;
        encoder.finish()
    } else {
        Ok(payload)
    }
}

fn write_payload<D: Metric, P: VectorProvider, S: crate::commit_log::CommitLogSink>(
    index: &Index<D, P, S>,
    out: &mut Vec<u8>,
) -> io::Result<()> {
    let config = index.config();
    let ids = index.node_ids();

    out.write_all(&(config.m as i64).to_le_bytes())?;
    out.write_all(&(config.m_max0 as i64).to_le_bytes())?;
    out.write_all(&(index.current_max_layer() as i64).to_le_bytes())?;
    let entry_point_id = index.entry_point_id().map(|n| n.0 as i64).unwrap_or(-1);
    out.write_all(&entry_point_id.to_le_bytes())?;
    out.write_all(&(config.ef_construction as i64).to_le_bytes())?;
    out.write_all(&config.level_normalizer.to_le_bytes())?;
    out.write_all(&(ids.len() as i64).to_le_bytes())?;

    for id in ids {
        let level = index.node_level(id).unwrap_or(0);
        out.write_all(&(id.0 as i64).to_le_bytes())?;
        out.write_all(&(level as i64).to_le_bytes())?;

        let mut layers: Vec<LayerIndex> = (0..=level).map(|l| LayerIndex(l as u16)).collect();
        layers.retain(|layer| {
            index
                .connections_at(id, *layer)
                .map(|c| !c.is_empty())
                .unwrap_or(false)
        });

        out.write_all(&(layers.len() as i64).to_le_bytes())?;
        for layer in layers {
            let connections = index.connections_at(id, layer).unwrap_or_default();
            out.write_all(&(layer.0 as i64).to_le_bytes())?;
            out.write_all(&(connections.len() as i64).to_le_bytes())?;
            for neighbor in connections {
                out.write_all(&(neighbor.0 as u32).to_le_bytes())?;
            }
        }
    }

    Ok(())
}

/// Decode a snapshot into a fresh `Index`, wired up with the supplied
/// distance metric, vector provider, and commit-log sink. Gzip vs. raw is
/// auto-detected from the leading magic bytes.
pub fn decode<D: Metric, P: VectorProvider, S: crate::commit_log::CommitLogSink>(
    bytes: &[u8],
    distance: D,
    provider: P,
    log: S,
    seed: u64,
) -> Result<Index<D, P, S>, Error> {
    let raw = if bytes.starts_with(&GZIP_MAGIC) {
        let mut decoder = GzDecoder::new(bytes);
        let mut out = Vec::new();
        decoder
            .read_to_end(&mut out)
            .map_err(|e| Error::SnapshotFormat(e.to_string()))?;
        out
    } else {
        bytes.to_vec()
    };

    if raw.len() < 4 {
        return Err(Error::SnapshotFormat("truncated snapshot".to_string()));
    }
    let (payload, checksum_bytes) = raw.split_at(raw.len() - 4);
    let mut crc = flate2::Crc::new();
    crc.update(payload);
    let mut expected = [0u8; 4];
    expected.copy_from_slice(checksum_bytes);
    if crc.sum().to_le_bytes() != expected {
        return Err(Error::SnapshotFormat("checksum mismatch".to_string()));
    }

    let mut cursor = Cursor::new(payload);
    let m = read_i64(&mut cursor)? as usize;
    let m_max0 = read_i64(&mut cursor)? as usize;
    let current_max_layer = read_i64(&mut cursor)? as u8;
    let entry_point_id = read_i64(&mut cursor)?;
    let ef_construction = read_i64(&mut cursor)? as usize;
    let level_normalizer = read_f64(&mut cursor)?;
    let node_count = read_i64(&mut cursor)?;

    let mut config = HnswConfig::new(m.max(2), ef_construction.max(1))
        .map_err(|e| Error::SnapshotFormat(e.to_string()))?;
    config.m_max0 = m_max0;
    config.level_normalizer = level_normalizer;
    config.neighbor_selection = NeighborSelection::Simple;

    let index = Index::new(config, distance, provider, log, seed);

    for _ in 0..node_count {
        let id = NodeId(read_i64(&mut cursor)? as u64);
        let level = read_i64(&mut cursor)? as u8;
        index.apply_commit_record(&crate::commit_log::CommitRecord::AddNode { id, level })?;

        let layer_count = read_i64(&mut cursor)?;
        for _ in 0..layer_count {
            let layer = LayerIndex(read_i64(&mut cursor)? as u16);
            let conn_count = read_i64(&mut cursor)?;
            let mut neighbors = Vec::with_capacity(conn_count as usize);
            for _ in 0..conn_count {
                neighbors.push(NodeId(read_u32(&mut cursor)? as u64));
            }
            index.apply_commit_record(&crate::commit_log::CommitRecord::ReplaceLinksAtLevel {
                node_id: id,
                layer,
                neighbors,
            })?;
        }
    }

    if entry_point_id >= 0 {
        index.apply_commit_record(&crate::commit_log::CommitRecord::SetEntryPointWithMaxLayer {
            id: NodeId(entry_point_id as u64),
            layer: current_max_layer,
        })?;
    }

    Ok(index)
}

fn read_i64(cursor: &mut Cursor<&[u8]>) -> Result<i64, Error> {
    let mut buf = [0u8; 8];
    cursor
        .read_exact(&mut buf)
        .map_err(|e| Error::SnapshotFormat(e.to_string()))?;
    Ok(i64::from_le_bytes(buf))
}

fn read_f64(cursor: &mut Cursor<&[u8]>) -> Result<f64, Error> {
    let mut buf = [0u8; 8];
    cursor
        .read_exact(&mut buf)
        .map_err(|e| Error::SnapshotFormat(e.to_string()))?;
    Ok(f64::from_le_bytes(buf))
}

fn read_u32(cursor: &mut Cursor<&[u8]>) -> Result<u32, Error> {
    let mut buf = [0u8; 4];
    cursor
        .read_exact(&mut buf)
        .map_err(|e| Error::SnapshotFormat(e.to_string()))?;
    Ok(u32::from_le_bytes(buf))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commit_log::InMemoryCommitLog;
    use crate::distance::Cosine;
    use crate::provider::InMemoryVectorProvider;
    use crate::vector::Vector;

    fn sample_index() -> Index<Cosine, InMemoryVectorProvider, InMemoryCommitLog> {
        let mut provider = InMemoryVectorProvider::new();
        for i in 0..8u64 {
            let mut v = vec![0.0; 8];
            v[i as usize] = 1.0;
            provider.insert(i, Vector::new(v));
        }
        let index = Index::new(
            HnswConfig::new(4, 16).unwrap(),
            Cosine,
            provider,
            InMemoryCommitLog::new(),
            42,
        );
        for i in 0..8u64 {
            index.insert_node(NodeId(i)).unwrap();
        }
        index
    }

    #[test]
    fn round_trips_structure() {
        let index = sample_index();
        let bytes = encode(&index, false).unwrap();
        let decoded = decode(
            &bytes,
            Cosine,
            InMemoryVectorProvider::new(),
            InMemoryCommitLog::new(),
            0,
        )
        .unwrap();

        assert_eq!(index.entry_point_id(), decoded.entry_point_id());
        assert_eq!(index.current_max_layer(), decoded.current_max_layer());
        for id in index.node_ids() {
            assert_eq!(index.node_level(id), decoded.node_level(id));
            for layer in 0..=index.node_level(id).unwrap() {
                let layer = LayerIndex(layer as u16);
                let mut a = index.connections_at(id, layer).unwrap_or_default();
                let mut b = decoded.connections_at(id, layer).unwrap_or_default();
                a.sort_by_key(|n| n.0);
                b.sort_by_key(|n| n.0);
                assert_eq!(a, b);
            }
        }
    }

    #[test]
    fn round_trips_through_gzip() {
        let index = sample_index();
        let bytes = encode(&index, true).unwrap();
        assert_eq!(&bytes[..2], &GZIP_MAGIC);
        let decoded = decode(
            &bytes,
            Cosine,
            InMemoryVectorProvider::new(),
            InMemoryCommitLog::new(),
            0,
        )
        .unwrap();
        assert_eq!(index.len(), decoded.len());
    }

    #[test]
    fn corrupted_checksum_is_rejected() {
        let index = sample_index();
        let mut bytes = encode(&index, false).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xFF;
        let result = decode(
            &bytes,
            Cosine,
            InMemoryVectorProvider::new(),
            InMemoryCommitLog::new(),
            0,
        );
        assert!(matches!(result, Err(Error::SnapshotFormat(_))));
    }
}
