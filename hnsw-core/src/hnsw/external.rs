//! External-insert callback and the import path that reconstructs a node
//! from a replicated message (§4.4.7 / §6.4).

use std::collections::HashMap;

use crate::commit_log::{CommitLogSink, CommitRecord};
use crate::distance::Metric;
use crate::error::Error;
use crate::provider::VectorProvider;

use super::index::Index;
use super::{LayerIndex, NodeId};

/// Payload carried to replication/mirroring consumers after a successful
/// local insert.
#[derive(Debug, Clone)]
pub struct ExternalInsert {
    pub id: NodeId,
    pub level: u8,
    pub neighbors_by_layer: HashMap<LayerIndex, Vec<NodeId>>,
}

/// Invoked in the background after a local insert; failures are logged,
/// never propagated to the caller of `insert_node`.
pub trait ExternalInsertHook: Send + Sync {
    fn on_insert(&self, message: ExternalInsert);
}

/// A hook that drops every message; the default when no replication
/// consumer is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullExternalInsertHook;

impl ExternalInsertHook for NullExternalInsertHook {
    fn on_insert(&self, _message: ExternalInsert) {}
}

/// Build the `ExternalInsert` payload for a node already present in the
/// index, suitable for handing to an `ExternalInsertHook`.
pub fn build_external_insert<D: Metric, P: VectorProvider, S: CommitLogSink>(
    index: &Index<D, P, S>,
    id: NodeId,
) -> Option<ExternalInsert> {
    let level = index.node_level(id)?;
    let mut neighbors_by_layer = HashMap::new();
    for layer in 0..=level {
        let layer = LayerIndex(layer as u16);
        if let Some(neighbors) = index.connections_at(id, layer) {
            if !neighbors.is_empty() {
                neighbors_by_layer.insert(layer, neighbors);
            }
        }
    }
    Some(ExternalInsert {
        id,
        level,
        neighbors_by_layer,
    })
}

/// Reconstruct a node from an `ExternalInsert` message. Creates the node if
/// absent, installs the declared neighbors on each layer, then prunes per
/// §4.4.2 step 4. Tolerates forward references: a declared neighbor that
/// does not yet exist locally is created as an empty placeholder and is
/// filled in when its own import arrives.
pub fn import<D: Metric, P: VectorProvider, S: CommitLogSink>(
    index: &Index<D, P, S>,
    message: ExternalInsert,
) -> Result<(), Error> {
    index.apply_commit_record(&CommitRecord::AddNode {
        id: message.id,
        level: message.level,
    })?;

    for (layer, neighbors) in message.neighbors_by_layer {
        for &neighbor_id in &neighbors {
            index.apply_commit_record(&CommitRecord::AddLinkAtLevel {
                node_id: message.id,
                layer,
                neighbor_id,
            })?;
            index.apply_commit_record(&CommitRecord::AddLinkAtLevel {
                node_id: neighbor_id,
                layer,
                neighbor_id: message.id,
            })?;
        }

        index.reprune_node(message.id, layer)?;
        // Each declared neighbor's degree may have grown past its cap too
        // (§4.4.7 step 4 applies to every affected `m`, not just the
        // imported node itself).
        for neighbor_id in neighbors {
            index.reprune_node(neighbor_id, layer)?;
        }
    }
    Ok(())
}
