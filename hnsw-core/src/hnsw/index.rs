//! The layered graph, its entry point, and the construction/query
//! algorithms (Algorithms 1, 2, 4, 5 of the HNSW paper, adapted to the
//! concurrency and commit-log requirements of this specification).

use std::cmp::min;
use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use smallvec::{smallvec, SmallVec};

use crate::commit_log::{CommitLogSink, CommitRecord};
use crate::distance::Metric;
use crate::error::Error;
use crate::ods::OrderedDistanceSet;
use crate::provider::VectorProvider;
use crate::telemetry::{NullTelemetry, Telemetry};

use super::external::{self, ExternalInsertHook, NullExternalInsertHook};
use super::{draw_level, HnswConfig, LayerIndex, NeighborSelection, Node, NodeId};

/// A Hierarchical Navigable Small World graph.
///
/// `nodes` is a lock-free concurrent map and the single source of truth for
/// node existence; `graph` tracks per-layer membership for fast iteration;
/// `enter_point` and `top_most_layer` are updated together under
/// `enter_point`'s write lock so a reader never observes one without the
/// other. Locks are always acquired Index → Node, never the reverse, and
/// the Index exclusive lock (here: `enter_point`'s write lock) is never
/// held while computing distances or walking neighbors.
pub struct Index<D: Metric, P: VectorProvider, S: CommitLogSink> {
    config: HnswConfig,
    top_most_layer: AtomicU8,
    nodes: papaya::HashMap<NodeId, Node>,
    graph: papaya::HashMap<LayerIndex, papaya::HashSet<NodeId>>,
    enter_point: RwLock<SmallVec<[NodeId; 1]>>,
    distance: D,
    provider: P,
    log: S,
    rng: Mutex<StdRng>,
    orphan_placeholder_count: AtomicUsize,
    telemetry: Box<dyn Telemetry>,
    external_insert_hook: Arc<dyn ExternalInsertHook>,
}

impl<D: Metric, P: VectorProvider, S: CommitLogSink> Index<D, P, S> {
    pub fn new(config: HnswConfig, distance: D, provider: P, log: S, seed: u64) -> Self {
        Self {
            config,
            top_most_layer: AtomicU8::new(0),
            nodes: papaya::HashMap::new(),
            graph: papaya::HashMap::new(),
            enter_point: RwLock::new(SmallVec::new()),
            distance,
            provider,
            log,
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
            orphan_placeholder_count: AtomicUsize::new(0),
            telemetry: Box::new(NullTelemetry),
            external_insert_hook: Arc::new(NullExternalInsertHook),
        }
    }

    /// Install a telemetry collaborator (§9 Design Notes). Purely additive:
    /// no public entry point's behavior or return value depends on whether
    /// one is installed.
    pub fn with_telemetry(mut self, telemetry: impl Telemetry + 'static) -> Self {
        self.telemetry = Box::new(telemetry);
        self
    }

    /// Install a replication/mirroring collaborator (§4.4.7 / §6.4). Every
    /// successful `insert_node` dispatches `on_insert` on a background
    /// thread once this is installed; the default `NullExternalInsertHook`
    /// makes the dispatch a no-op lookup.
    pub fn with_external_insert_hook(mut self, hook: impl ExternalInsertHook + 'static) -> Self {
        self.external_insert_hook = Arc::new(hook);
        self
    }

    pub fn config(&self) -> HnswConfig {
        self.config
    }

    pub fn current_max_layer(&self) -> u8 {
        self.top_most_layer.load(Ordering::Acquire)
    }

    pub fn entry_point_id(&self) -> Option<NodeId> {
        self.enter_point.read().first().copied()
    }

    pub fn len(&self) -> usize {
        self.nodes.pin().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn orphan_placeholder_count(&self) -> usize {
        self.orphan_placeholder_count.load(Ordering::Relaxed)
    }

    pub fn node_level(&self, id: NodeId) -> Option<u8> {
        self.nodes.pin().get(&id).map(|n| n.level())
    }

    pub fn connections_at(&self, id: NodeId, layer: LayerIndex) -> Option<Vec<NodeId>> {
        self.nodes.pin().get(&id).map(|n| n.connections_at(layer))
    }

    pub fn node_ids(&self) -> Vec<NodeId> {
        self.nodes.pin().keys().copied().collect()
    }

    /// All node ids present on `layer`, tracked separately from `nodes` so
    /// callers don't have to scan every node and its level to answer "who
    /// is on layer N" (used by health/debugging tooling; the search and
    /// insert hot paths never need it, since they start from an explicit
    /// entry point and walk edges).
    pub fn nodes_at_layer(&self, layer: LayerIndex) -> Vec<NodeId> {
        self.graph
            .pin()
            .get(&layer)
            .map(|set| set.pin().iter().copied().collect())
            .unwrap_or_default()
    }

    fn emit(&self, record: CommitRecord) -> Result<(), Error> {
        self.log.emit(record)
    }

    /// Insert a new node, given its id and the vector resolved for it via
    /// the Vector Provider. Corresponds to Algorithm 1 (INSERT), split into
    /// Phases A-D per §4.4.2.
    #[tracing::instrument(skip(self))]
    pub fn insert_node(&self, id: NodeId) -> Result<(), Error> {
        let start = std::time::Instant::now();
        let result = self.insert_node_inner(id);
        self.telemetry.record("insert_node", start.elapsed());
        if result.is_ok() {
            self.dispatch_external_insert(id);
        }
        result
    }

    /// Hand `id`'s freshly installed node to the external-insert hook on a
    /// background thread (§6.4: "invoked after every successful local
    /// insert"). Dispatch failures (the hook panicking, or the OS refusing
    /// to spawn a thread) are logged, never surfaced to the caller of
    /// `insert_node` — per §4.4.7 the callback's failures do not affect the
    /// local insert.
    fn dispatch_external_insert(&self, id: NodeId) {
        let Some(message) = external::build_external_insert(self, id) else {
            return;
        };
        let hook = self.external_insert_hook.clone();
        let spawned = std::thread::Builder::new()
            .name(format!("hnsw-external-insert-{}", id.0))
            .spawn(move || {
                if std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| hook.on_insert(message))).is_err() {
                    tracing::warn!(node_id = id.0, "external-insert hook panicked");
                }
            });
        if let Err(err) = spawned {
            tracing::warn!(node_id = id.0, error = %err, "failed to spawn external-insert hook thread");
        }
    }

    fn insert_node_inner(&self, id: NodeId) -> Result<(), Error> {
        let nodes = self.nodes.pin();
        if nodes.contains_key(&id) {
            return Ok(());
        }

        let query_vector = self.provider.fetch(id.0)?;

        // Phase A — empty graph.
        if nodes.len() == 0 {
            let node = Node::new(id, 0);
            nodes.insert(id, node);
            self.emit(CommitRecord::AddNode { id, level: 0 })?;
            self.emit(CommitRecord::SetEntryPointWithMaxLayer { id, layer: 0 })?;
            *self.enter_point.write() = smallvec![id];
            self.top_most_layer.store(0, Ordering::Release);
            self.graph
                .pin()
                .get_or_insert_with(LayerIndex(0), papaya::HashSet::new)
                .pin()
                .insert(id);
            return Ok(());
        }

        let u = {
            let mut rng = self.rng.lock();
            1.0 - rng.gen::<f64>()
        };
        let target_level = draw_level(u, self.config.level_normalizer, self.config.level_formula);

        let l_cur = self.top_most_layer.load(Ordering::Acquire);
        let mut enter_point: SmallVec<[NodeId; 1]> = self.enter_point.read().clone();

        // Publish the node immediately with empty connections; concurrent
        // readers may observe it partially linked while Phase C runs,
        // which §4.4.6 explicitly allows.
        nodes.insert(id, Node::new(id, target_level));
        self.emit(CommitRecord::AddNode {
            id,
            level: target_level,
        })?;

        // Phase B — descend from the top with a single-candidate walk.
        for level in ((target_level + 1)..=l_cur).rev() {
            let layer = LayerIndex(level as u16);
            let results = self.search_layer(query_vector.as_slice(), &enter_point, 1, layer)?;
            let (closest, _) = results
                .peek_min()
                .ok_or_else(|| Error::NotFound(enter_point.first().map(|n| n.0).unwrap_or(0)))?;
            enter_point = smallvec![closest];
        }

        // Phase C — link on each layer from min(L_t, L_cur) down to 0.
        for level in (0..=min(l_cur, target_level)).rev() {
            let layer = LayerIndex(level as u16);
            let cap = if level == 0 {
                self.config.m_max0
            } else {
                self.config.m
            };

            let candidates =
                self.search_layer(query_vector.as_slice(), &enter_point, self.config.ef_construction, layer)?;

            let chosen = self.select_neighbours(&candidates, cap, query_vector.as_slice(), layer)?;

            let new_node = nodes
                .get(&id)
                .ok_or(Error::NotFound(id.0))?;

            for &neighbor_id in &chosen {
                let neighbor_node = nodes.get(&neighbor_id).ok_or(Error::NotFound(neighbor_id.0))?;

                new_node.add_link(layer, neighbor_id);
                self.emit(CommitRecord::AddLinkAtLevel {
                    node_id: id,
                    layer,
                    neighbor_id,
                })?;

                neighbor_node.add_link(layer, id);
                self.emit(CommitRecord::AddLinkAtLevel {
                    node_id: neighbor_id,
                    layer,
                    neighbor_id: id,
                })?;

                if neighbor_node.degree_at(layer) > cap {
                    self.reprune_node(neighbor_id, layer)?;
                }
            }

            if let Some((best, _)) = candidates.peek_min() {
                enter_point = smallvec![best];
            }

            self.graph
                .pin()
                .get_or_insert_with(layer, papaya::HashSet::new)
                .pin()
                .insert(id);
        }

        // Phase D — promote the entry point.
        if target_level > l_cur {
            let mut ep = self.enter_point.write();
            self.top_most_layer.store(target_level, Ordering::Release);
            *ep = smallvec![id];
            drop(ep);
            self.emit(CommitRecord::SetEntryPointWithMaxLayer {
                id,
                layer: target_level,
            })?;
        }

        Ok(())
    }

    /// Re-select `id`'s neighbor list at `layer` down to the configured cap,
    /// by distance from `id`'s own vector, and record the replacement.
    /// Shared by Phase C step 4 of `insert_node` and by the external-insert
    /// import path (§4.4.7), which must prune a reconstructed node's
    /// over-full connection list the same way a local insert would.
    ///
    /// Eviction must stay symmetric (§3 invariant 1): any neighbor dropped
    /// from `id`'s list has `id` removed from its own list in turn, so a
    /// prune never leaves a dangling one-directional edge behind.
    pub fn reprune_node(&self, id: NodeId, layer: LayerIndex) -> Result<(), Error> {
        let cap = if layer.0 == 0 {
            self.config.m_max0
        } else {
            self.config.m
        };

        let nodes = self.nodes.pin();
        let node = nodes.get(&id).ok_or(Error::NotFound(id.0))?;
        let before = node.connections_at(layer);
        if before.len() <= cap {
            return Ok(());
        }

        let vector = self.provider.fetch(id.0)?;
        let candidates = self.distances_from(vector.as_slice(), &before)?;
        let pruned = self.select_neighbours(&candidates, cap, vector.as_slice(), layer)?;
        node.replace_links(layer, pruned.clone());
        self.emit(CommitRecord::ReplaceLinksAtLevel {
            node_id: id,
            layer,
            neighbors: pruned.clone(),
        })?;

        let kept: std::collections::HashSet<NodeId> = pruned.into_iter().collect();
        for evicted in before.into_iter().filter(|n| !kept.contains(n)) {
            if let Some(evicted_node) = nodes.get(&evicted) {
                evicted_node.remove_link(layer, id);
                self.emit(CommitRecord::ReplaceLinksAtLevel {
                    node_id: evicted,
                    layer,
                    neighbors: evicted_node.connections_at(layer),
                })?;
            }
        }

        Ok(())
    }

    /// Apply a single commit-log record directly to the graph, without
    /// running any search — used to reconstruct an index from a replayed
    /// log (§8 property 6) or from a snapshot's implicit edge list.
    pub fn apply_commit_record(&self, record: &CommitRecord) -> Result<(), Error> {
        let nodes = self.nodes.pin();
        match *record {
            CommitRecord::AddNode { id, level } => {
                match nodes.get(&id) {
                    Some(existing) => existing.set_level(level),
                    None => {
                        nodes.insert(id, Node::new(id, level));
                    }
                }
                self.graph
                    .pin()
                    .get_or_insert_with(LayerIndex(0), papaya::HashSet::new)
                    .pin()
                    .insert(id);
            }
            CommitRecord::SetEntryPointWithMaxLayer { id, layer } => {
                nodes.get_or_insert_with(id, || Node::placeholder(id));
                *self.enter_point.write() = smallvec![id];
                self.top_most_layer.store(layer, Ordering::Release);
            }
            CommitRecord::AddLinkAtLevel {
                node_id,
                layer,
                neighbor_id,
            } => {
                let node = nodes.get_or_insert_with(node_id, || {
                    self.orphan_placeholder_count.fetch_add(1, Ordering::Relaxed);
                    Node::placeholder(node_id)
                });
                node.add_link(layer, neighbor_id);
                self.graph
                    .pin()
                    .get_or_insert_with(layer, papaya::HashSet::new)
                    .pin()
                    .insert(node_id);
            }
            CommitRecord::ReplaceLinksAtLevel {
                node_id,
                layer,
                ref neighbors,
            } => {
                let node = nodes.get_or_insert_with(node_id, || Node::placeholder(node_id));
                node.replace_links(layer, neighbors.clone());
            }
        }
        Ok(())
    }

    /// Compute distance from `query_vector` to each candidate id, skipping
    /// ids the provider cannot resolve (used only for re-pruning a node's
    /// own connection list, where ids are already known-good).
    fn distances_from(&self, query_vector: &[f32], ids: &[NodeId]) -> Result<OrderedDistanceSet, Error> {
        let mut ods = OrderedDistanceSet::new();
        for &id in ids {
            let vector = self.provider.fetch(id.0)?;
            let dist = self.distance.distance(query_vector, vector.as_slice())?;
            ods.insert(id, dist);
        }
        Ok(ods)
    }

    /// Return the `ef` closest nodes to `query_vector` reachable from
    /// `entry_points` on `layer`. Corresponds to Algorithm 2 (SEARCH-LAYER).
    pub fn search_layer(
        &self,
        query_vector: &[f32],
        entry_points: &[NodeId],
        ef: usize,
        layer: LayerIndex,
    ) -> Result<OrderedDistanceSet, Error> {
        let nodes = self.nodes.pin();
        let mut visited: std::collections::HashSet<NodeId> = entry_points.iter().copied().collect();

        let mut candidates = OrderedDistanceSet::new();
        let mut results = OrderedDistanceSet::new();

        for &id in entry_points {
            if let Some(node) = nodes.get(&id) {
                let vector = self.provider.fetch(node.id().0)?;
                let dist = self.distance.distance(query_vector, vector.as_slice())?;
                candidates.insert(id, dist);
                results.insert(id, dist);
            }
        }

        while let Some((current_id, current_dist)) = candidates.extract_min() {
            let f_max = results.peek_max().map(|(_, d)| d);
            if let Some(f_max) = f_max {
                if current_dist > f_max && results.len() >= ef {
                    break;
                }
            }

            let current_node = nodes.get(&current_id).ok_or(Error::NotFound(current_id.0))?;
            let mut neighbor_ids = current_node.connections_at(layer);
            neighbor_ids.sort_by_key(|n| n.0);

            for neighbor_id in neighbor_ids {
                if visited.contains(&neighbor_id) {
                    continue;
                }
                visited.insert(neighbor_id);

                let neighbor_node = match nodes.get(&neighbor_id) {
                    Some(n) => n,
                    None => continue,
                };
                let neighbor_vector = self.provider.fetch(neighbor_node.id().0)?;
                let dist = self.distance.distance(query_vector, neighbor_vector.as_slice())?;

                let f_max = results.peek_max().map(|(_, d)| d);
                let should_add = match f_max {
                    Some(f_max) => dist < f_max || results.len() < ef,
                    None => true,
                };

                if should_add {
                    candidates.insert(neighbor_id, dist);
                    results.insert(neighbor_id, dist);
                    while results.len() > ef {
                        results.extract_max();
                    }
                }
            }
        }

        Ok(results)
    }

    /// Pick up to `m` neighbors from `candidates` according to the
    /// configured `NeighborSelection` policy. Defaults to simple top-k.
    fn select_neighbours(
        &self,
        candidates: &OrderedDistanceSet,
        m: usize,
        query_vector: &[f32],
        _layer: LayerIndex,
    ) -> Result<Vec<NodeId>, Error> {
        match self.config.neighbor_selection {
            NeighborSelection::Simple => {
                Ok(candidates.in_order().take(m).map(|(id, _)| id).collect())
            }
            NeighborSelection::Heuristic => {
                let _ = query_vector;
                self.select_neighbours_heuristic(candidates, m)
            }
        }
    }

    /// Diversity-aware selection (Algorithm 4): a candidate is discarded if
    /// it is closer to an already-selected neighbor than to the query,
    /// since that means it is redundant with something already kept.
    fn select_neighbours_heuristic(
        &self,
        candidates: &OrderedDistanceSet,
        m: usize,
    ) -> Result<Vec<NodeId>, Error> {
        let mut selected: Vec<(NodeId, Vec<f32>)> = Vec::new();

        for (candidate_id, dist_to_query) in candidates.in_order() {
            if selected.len() >= m {
                break;
            }
            let candidate_vector = self.provider.fetch(candidate_id.0)?;

            let mut is_diverse = true;
            for (_, selected_vector) in &selected {
                let dist_to_selected = self.distance.distance(candidate_vector.as_slice(), selected_vector)?;
                if dist_to_selected < dist_to_query {
                    is_diverse = false;
                    break;
                }
            }

            if is_diverse {
                selected.push((candidate_id, candidate_vector.as_slice().to_vec()));
            }
        }

        Ok(selected.into_iter().map(|(id, _)| id).collect())
    }

    /// Top-k approximate nearest-neighbor query. Corresponds to
    /// Algorithm 5 (K-NN-SEARCH).
    #[tracing::instrument(skip(self, query_vector))]
    pub fn knn_search(&self, query_vector: &[f32], k: usize, ef: usize) -> Result<Vec<NodeId>, Error> {
        let start = std::time::Instant::now();
        let result = self.knn_search_inner(query_vector, k, ef);
        self.telemetry.record("knn_search", start.elapsed());
        result
    }

    fn knn_search_inner(&self, query_vector: &[f32], k: usize, ef: usize) -> Result<Vec<NodeId>, Error> {
        if ef < k {
            return Err(Error::InvalidArgument(format!(
                "ef ({ef}) must be >= k ({k})"
            )));
        }
        if ef == 0 {
            return Err(Error::InvalidArgument("ef must be > 0".to_string()));
        }

        if self.is_empty() {
            return Ok(Vec::new());
        }

        let l_cur = self.current_max_layer();
        let mut enter_point: SmallVec<[NodeId; 1]> = self.enter_point.read().clone();

        for level in (1..=l_cur).rev() {
            let layer = LayerIndex(level as u16);
            let results = self.search_layer(query_vector, &enter_point, 1, layer)?;
            let (best, _) = results.peek_min().ok_or(Error::QueueEmpty)?;
            enter_point = smallvec![best];
        }

        let results = self.search_layer(query_vector, &enter_point, ef, LayerIndex(0))?;
        Ok(results.in_order().take(k).map(|(id, _)| id).collect())
    }
}
