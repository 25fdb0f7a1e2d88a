use ordered_float::OrderedFloat;
use std::collections::BTreeSet;

use crate::hnsw::NodeId;

/// Ordered multiset of `(id, dist)` pairs, ordered by ascending `dist` with
/// ties broken by `id`. Equal pairs coalesce on insert, which is what keeps
/// the builder/search hot loop from expanding the same candidate twice.
///
/// Backed by a `BTreeSet` keyed on `(OrderedFloat<f32>, NodeId)`: the tree's
/// own total order already encodes the tiebreak rule, so no auxiliary
/// dedup map is needed, and `extract_min`/`extract_max` are the tree's own
/// `pop_first`/`pop_last`.
#[derive(Debug, Clone, Default)]
pub struct OrderedDistanceSet {
    entries: BTreeSet<(OrderedFloat<f32>, NodeId)>,
}

impl OrderedDistanceSet {
    pub fn new() -> Self {
        Self {
            entries: BTreeSet::new(),
        }
    }

    /// Returns `true` if this was a new pair (a duplicate insert is a no-op).
    pub fn insert(&mut self, id: NodeId, dist: f32) -> bool {
        self.entries.insert((OrderedFloat(dist), id))
    }

    pub fn delete(&mut self, id: NodeId, dist: f32) -> bool {
        self.entries.remove(&(OrderedFloat(dist), id))
    }

    pub fn extract_min(&mut self) -> Option<(NodeId, f32)> {
        self.entries.pop_first().map(|(d, id)| (id, d.0))
    }

    pub fn extract_max(&mut self) -> Option<(NodeId, f32)> {
        self.entries.pop_last().map(|(d, id)| (id, d.0))
    }

    pub fn peek_min(&self) -> Option<(NodeId, f32)> {
        self.entries.iter().next().map(|(d, id)| (*id, d.0))
    }

    pub fn peek_max(&self) -> Option<(NodeId, f32)> {
        self.entries.iter().next_back().map(|(d, id)| (*id, d.0))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Enumerate pairs sorted by ascending `dist`.
    pub fn in_order(&self) -> impl Iterator<Item = (NodeId, f32)> + '_ {
        self.entries.iter().map(|(d, id)| (*id, d.0))
    }
}
