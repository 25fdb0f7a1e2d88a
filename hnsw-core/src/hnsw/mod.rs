pub mod external;
pub mod index;

/// Hierarchical Navigable Small Worlds organizes points into a layered
/// proximity graph and navigates from a sparse top layer down to the dense
/// bottom layer, narrowing the search at each step.
use parking_lot::RwLock;
use std::collections::HashMap;

/// LayerIndex wraps a u16 to represent a layer in the graph.
#[derive(Debug, Clone, Copy, PartialEq, Hash)]
pub struct LayerIndex(pub u16);

impl Eq for LayerIndex {}

impl PartialOrd for LayerIndex {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for LayerIndex {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.0.cmp(&other.0)
    }
}

/// NodeId is a caller-assigned, non-negative integer identifying a node
/// across all layers. Unlike a content hash, two distinct calls to insert
/// the same vector under different ids produce two distinct nodes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(pub u64);

/// One indexed point.
///
/// `connections` is guarded by its own reader-writer lock rather than
/// living in a lock-free map: readers of `connections[l]` take shared,
/// writers take exclusive, exactly as the concurrency model specifies.
/// The vector itself is not stored here — it is fetched from the Vector
/// Provider on demand, so a Node is cheap to hold even for large graphs.
#[derive(Debug)]
pub struct Node {
    id: NodeId,
    level: std::sync::atomic::AtomicU8,
    connections: RwLock<HashMap<LayerIndex, Vec<NodeId>>>,
}

impl Clone for Node {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            level: std::sync::atomic::AtomicU8::new(self.level()),
            connections: RwLock::new(self.connections.read().clone()),
        }
    }
}

impl Node {
    pub fn new(id: NodeId, level: u8) -> Self {
        Self {
            id,
            level: std::sync::atomic::AtomicU8::new(level),
            connections: RwLock::new(HashMap::new()),
        }
    }

    /// Correct the level of an existing (possibly placeholder) node once
    /// its real `AddNode` record arrives, without disturbing any
    /// connections already recorded against it as a forward reference.
    pub fn set_level(&self, level: u8) {
        self.level.store(level, std::sync::atomic::Ordering::Release);
    }

    /// Construct a placeholder node for a forward-referenced neighbor
    /// arriving via the external-insert import path (§4.4.7). Its real
    /// level and connections are installed when its own import arrives.
    pub fn placeholder(id: NodeId) -> Self {
        Self::new(id, 0)
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn level(&self) -> u8 {
        self.level.load(std::sync::atomic::Ordering::Acquire)
    }

    pub fn connections_at(&self, layer: LayerIndex) -> Vec<NodeId> {
        self.connections
            .read()
            .get(&layer)
            .cloned()
            .unwrap_or_default()
    }

    pub fn degree_at(&self, layer: LayerIndex) -> usize {
        self.connections
            .read()
            .get(&layer)
            .map(|v| v.len())
            .unwrap_or(0)
    }

    pub fn layers(&self) -> Vec<LayerIndex> {
        self.connections.read().keys().copied().collect()
    }

    /// Add a single directed link at `layer`, if not already present.
    pub fn add_link(&self, layer: LayerIndex, neighbor: NodeId) {
        let mut guard = self.connections.write();
        let list = guard.entry(layer).or_default();
        if !list.contains(&neighbor) {
            list.push(neighbor);
        }
    }

    pub fn remove_link(&self, layer: LayerIndex, neighbor: NodeId) {
        let mut guard = self.connections.write();
        if let Some(list) = guard.get_mut(&layer) {
            list.retain(|n| *n != neighbor);
        }
    }

    /// Replace the full neighbor list at `layer` (used by pruning).
    pub fn replace_links(&self, layer: LayerIndex, neighbors: Vec<NodeId>) {
        self.connections.write().insert(layer, neighbors);
    }
}

/// Which policy `select_neighbours` uses to pick the `M` (or `M_max0`)
/// survivors from a candidate list. The specification requires only
/// `Simple` and mandates it as the default; `Heuristic` is offered for
/// callers who want the diversity-aware variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NeighborSelection {
    Simple,
    Heuristic,
}

/// Which level-assignment formula `draw_level` uses. `Reference` is the
/// formula the specification pins tests to; `Classical` is the textbook
/// variant, offered behind an explicit opt-in only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LevelFormula {
    Reference,
    Classical,
}

/// Validated index parameters.
#[derive(Debug, Clone, Copy)]
pub struct HnswConfig {
    pub m: usize,
    pub m_max0: usize,
    pub ef_construction: usize,
    pub level_normalizer: f64,
    pub neighbor_selection: NeighborSelection,
    pub level_formula: LevelFormula,
}

impl HnswConfig {
    pub fn new(m: usize, ef_construction: usize) -> Result<Self, crate::error::Error> {
        if m <= 1 {
            return Err(crate::error::Error::InvalidArgument(format!(
                "M must be > 1, got {m}"
            )));
        }
        if ef_construction == 0 {
            return Err(crate::error::Error::InvalidArgument(
                "ef_construction must be > 0".to_string(),
            ));
        }
        Ok(Self {
            m,
            m_max0: m * 2,
            ef_construction,
            level_normalizer: 1.0 / (m as f64).ln(),
            neighbor_selection: NeighborSelection::Simple,
            level_formula: LevelFormula::Reference,
        })
    }

    pub fn with_neighbor_selection(mut self, selection: NeighborSelection) -> Self {
        self.neighbor_selection = selection;
        self
    }

    pub fn with_level_formula(mut self, formula: LevelFormula) -> Self {
        self.level_formula = formula;
        self
    }
}

impl Default for HnswConfig {
    fn default() -> Self {
        Self::new(16, 100).expect("default M=16, ef_construction=100 are always valid")
    }
}

/// Draw a level for a newly inserted node from the geometrically decaying
/// distribution the specification pins (§4.4.1). `u` must be sampled
/// uniformly on (0, 1] by the caller so the RNG itself stays swappable.
pub(crate) fn draw_level(u: f64, level_normalizer: f64, formula: LevelFormula) -> u8 {
    debug_assert!(u > 0.0 && u <= 1.0);
    let level = match formula {
        LevelFormula::Reference => -(u * level_normalizer).ln() - 1.0,
        LevelFormula::Classical => -(u.ln()) * level_normalizer,
    }
    .floor();
    level.max(0.0).min(255.0) as u8
}
