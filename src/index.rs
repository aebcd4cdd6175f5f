//! The HNSW engine: insert, remove, search, stats.
//!
//! All graph state lives behind a single [`parking_lot::RwLock`]. `search`
//! and `stats` take a read lock; `add` and `remove` take a write lock and
//! hold it for the whole operation, including ID allocation, so that
//! concurrent inserts can never race on `sequence` or on `count_level`.

use std::collections::HashMap;

use parking_lot::RwLock;
use rand::Rng;

use crate::config::IndexParams;
use crate::distance::SquaredEuclidean;
use crate::error::Error;
use crate::heap::{DistQueue, Polarity};
use crate::node::{Node, NodeId};
use crate::select::{self, DelaunayType};
use crate::store::NodeStore;
use crate::visited::VisitedPool;
use crate::DistanceFn;

struct IndexState {
    max_layer: u64,
    enterpoint: NodeId,
    count_level: HashMap<u64, u64>,
    sequence: u64,
    nodes: NodeStore,
}

/// Read-only view of one node's topology, returned by
/// [`Hnsw::debug_snapshot`].
#[derive(Debug, Clone)]
pub struct NodeSnapshot {
    pub level: u64,
    pub friends: HashMap<u64, Vec<NodeId>>,
    pub reverse_friends: HashMap<u64, Vec<NodeId>>,
}

/// A point-in-time copy of the whole graph's topology, used by invariant
/// tests. Cloning the graph like this is not something the hot paths do.
#[derive(Debug, Clone)]
pub struct GraphSnapshot {
    pub m: u64,
    pub m0: u64,
    pub max_layer: u64,
    pub enterpoint: NodeId,
    pub nodes: HashMap<NodeId, NodeSnapshot>,
}

/// The full logical state of an index, as named in the persistence
/// contract: every `Index` field plus, per node, `(id, p, level, friends,
/// reverse_friends)`. Round-tripping through this type (e.g. via
/// `serde_json` or `bincode`) must reproduce an index with identical
/// behavior; the wire format itself is left to the embedder.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PersistedIndex {
    pub m: u64,
    pub m0: u64,
    pub ef_construction: u64,
    pub delaunay_type: DelaunayType,
    pub level_mult: f64,
    pub dim: usize,
    pub max_layer: u64,
    pub enterpoint: NodeId,
    pub count_level: HashMap<u64, u64>,
    pub sequence: u64,
    pub nodes: NodeStore,
}

/// A Hierarchical Navigable Small World index over `f32` vectors, generic
/// over the distance metric `D`.
pub struct Hnsw<D: DistanceFn = SquaredEuclidean> {
    m: u64,
    m0: u64,
    ef_construction: u64,
    delaunay_type: DelaunayType,
    level_mult: f64,
    dim: usize,
    distance: D,
    visited: VisitedPool,
    state: RwLock<IndexState>,
}

impl<D: DistanceFn> Hnsw<D> {
    /// Build a new index seeded with `initial_point`. Node 0 is reserved for
    /// this seed and is never returned as a search result unless it
    /// genuinely ties for nearest (it's a real point, just also the bootstrap
    /// enterpoint).
    pub fn new(params: IndexParams, initial_point: Vec<f32>, distance: D) -> Result<Self, Error> {
        if params.m < 2 {
            return Err(Error::InvalidM(params.m));
        }
        let dim = initial_point.len();
        let mut nodes = NodeStore::new();
        nodes.insert(Node::new(0, initial_point, 0));

        let mut count_level = HashMap::new();
        count_level.insert(0, 1);

        Ok(Self {
            m: params.m,
            m0: params.m0,
            ef_construction: params.ef_construction,
            delaunay_type: params.delaunay_type,
            level_mult: params.level_mult(),
            dim,
            distance,
            visited: VisitedPool::new(),
            state: RwLock::new(IndexState {
                max_layer: 0,
                enterpoint: 0,
                count_level,
                sequence: 1,
                nodes,
            }),
        })
    }

    fn random_level(&self) -> u64 {
        let u: f64 = rand::thread_rng().gen_range(f64::MIN_POSITIVE..1.0);
        let level = (-(u * self.level_mult).ln()).floor();
        if level < 0.0 {
            0
        } else {
            level as u64
        }
    }

    fn max_conn(&self, level: u64) -> usize {
        if level == 0 {
            self.m0 as usize
        } else {
            self.m as usize
        }
    }

    /// Greedy descent from `(ep, d_ep)` down to (but not including) layer
    /// `target`, always moving to a strictly closer neighbor when one exists.
    fn find_best_entrypoint(
        &self,
        state: &IndexState,
        q: &[f32],
        mut ep: NodeId,
        mut d_ep: f32,
        top: u64,
        target: u64,
    ) -> (NodeId, f32) {
        let mut layer = top;
        while layer > target {
            loop {
                let mut improved = false;
                if let Some(node) = state.nodes.get(ep) {
                    for &candidate in node.friends_at(layer) {
                        if let Some(cand_node) = state.nodes.get(candidate) {
                            let d = self.distance.distance(q, &cand_node.p);
                            if d < d_ep {
                                d_ep = d;
                                ep = candidate;
                                improved = true;
                            }
                        }
                    }
                }
                if !improved {
                    break;
                }
            }
            if layer == 0 {
                break;
            }
            layer -= 1;
        }
        (ep, d_ep)
    }

    /// Bounded beam search at one layer, seeded by `(ep, d_ep)`. Returns a
    /// `ClosestLast` queue of at most `ef` results (root = farthest).
    #[tracing::instrument(skip(self, state, q))]
    fn search_at_layer(
        &self,
        state: &IndexState,
        q: &[f32],
        ep: NodeId,
        d_ep: f32,
        layer: u64,
        ef: u64,
    ) -> DistQueue {
        let ef = ef.max(1) as usize;
        let mut result = DistQueue::new(Polarity::ClosestLast);
        let mut candidates = DistQueue::new(Polarity::ClosestFirst);
        let mut visited = self.visited.acquire();

        visited.insert(ep);
        result.push(ep, d_ep);
        candidates.push(ep, d_ep);

        while let Some(current) = candidates.pop() {
            if let Some(worst) = result.top() {
                if current.d > worst.d && result.len() >= ef {
                    break;
                }
            }

            let friends: Vec<NodeId> = state
                .nodes
                .get(current.node)
                .map(|n| n.friends_at(layer).to_vec())
                .unwrap_or_default();

            for neighbor in friends {
                if !visited.insert(neighbor) {
                    continue;
                }
                let Some(neighbor_node) = state.nodes.get(neighbor) else {
                    continue;
                };
                let d = self.distance.distance(q, &neighbor_node.p);

                if result.len() < ef {
                    result.push(neighbor, d);
                    candidates.push(neighbor, d);
                } else if let Some(worst) = result.top() {
                    if d < worst.d {
                        result.pop_and_push(neighbor, d);
                        candidates.push(neighbor, d);
                    }
                }
            }
        }

        self.visited.release(visited);
        result
    }

    /// Add one directed edge `first -> second` at `level`, then rebalance
    /// `first`'s friend list at that level if it now exceeds the degree
    /// bound.
    fn link(&self, state: &mut IndexState, first: NodeId, second: NodeId, level: u64) {
        let max_conn = self.max_conn(level);

        {
            let Some(first_node) = state.nodes.get_mut(first) else {
                return;
            };
            first_node.allocate_friends_up_to(level, max_conn);
            first_node
                .friends
                .get_mut(&level)
                .expect("allocated above")
                .nodes
                .push(second);
        }
        if let Some(second_node) = state.nodes.get_mut(second) {
            second_node.add_reverse_link(first, level);
        }

        let over_capacity = state
            .nodes
            .get(first)
            .map(|n| n.friend_count_at(level) > max_conn)
            .unwrap_or(false);
        if !over_capacity {
            return;
        }

        let first_point = state.nodes.get(first).unwrap().p.clone();
        let current_friends = state.nodes.get(first).unwrap().friends_at(level).to_vec();

        let mut pool = DistQueue::new(Polarity::ClosestFirst);
        for &candidate in &current_friends {
            if let Some(node) = state.nodes.get(candidate) {
                let d = self.distance.distance(&first_point, &node.p);
                pool.push(candidate, d);
            }
        }

        let selected = select::select_neighbors(
            self.delaunay_type,
            &first_point,
            pool,
            max_conn,
            &state.nodes,
            self.distance,
        );
        let new_friends = select::to_ordered_ids(selected);

        for &old_friend in &current_friends {
            if let Some(node) = state.nodes.get_mut(old_friend) {
                node.remove_reverse_link(first, level);
            }
        }
        for &new_friend in &new_friends {
            if let Some(node) = state.nodes.get_mut(new_friend) {
                node.add_reverse_link(first, level);
            }
        }
        if let Some(first_node) = state.nodes.get_mut(first) {
            first_node.friends.insert(
                level,
                crate::node::LinkList {
                    nodes: new_friends,
                },
            );
        }
    }

    /// Insert `q`, returning its assigned ID.
    #[tracing::instrument(skip(self, q))]
    pub fn add(&self, q: &[f32]) -> Result<NodeId, Error> {
        if q.len() != self.dim {
            return Err(Error::DimensionMisMatch {
                expected: self.dim,
                found: q.len(),
            });
        }

        let mut state = self.state.write();

        let level = self.random_level();
        let id = state.sequence;
        state.sequence += 1;

        *state.count_level.entry(level).or_insert(0) += 1;

        let top = state.max_layer;
        let entry_id = state.enterpoint;
        let entry_dist = {
            let entry_point = state.nodes.get(entry_id).expect("enterpoint always live");
            self.distance.distance(q, &entry_point.p)
        };

        let target = level.min(top);
        let (mut ep, mut d_ep) = self.find_best_entrypoint(&state, q, entry_id, entry_dist, top, target);

        state.nodes.insert(Node::new(id, q.to_vec(), level));

        let mut per_layer_friends: Vec<(u64, Vec<NodeId>)> = Vec::new();
        let search_top = level.min(top);
        for layer in (0..=search_top).rev() {
            let result = self.search_at_layer(&state, q, ep, d_ep, layer, self.ef_construction);
            if let Some(closest) = result.iter().min_by(|a, b| a.d.total_cmp(&b.d)) {
                ep = closest.node;
                d_ep = closest.d;
            }

            let max_conn = self.max_conn(layer);
            let selected = select::select_neighbors(
                self.delaunay_type,
                q,
                result,
                max_conn,
                &state.nodes,
                self.distance,
            );
            let neighbor_ids = select::to_ordered_ids(selected);
            per_layer_friends.push((layer, neighbor_ids));
        }

        for (layer, neighbor_ids) in &per_layer_friends {
            if let Some(new_node) = state.nodes.get_mut(id) {
                new_node.allocate_friends_up_to(*layer, self.max_conn(*layer));
                new_node.friends.insert(
                    *layer,
                    crate::node::LinkList {
                        nodes: neighbor_ids.clone(),
                    },
                );
            }
            for &neighbor in neighbor_ids {
                if let Some(neighbor_node) = state.nodes.get_mut(neighbor) {
                    neighbor_node.add_reverse_link(id, *layer);
                }
            }
        }

        for (layer, neighbor_ids) in &per_layer_friends {
            for &neighbor in neighbor_ids {
                self.link(&mut state, neighbor, id, *layer);
            }
        }

        if level > top {
            state.max_layer = level;
            state.enterpoint = id;
        }

        Ok(id)
    }

    /// Remove `id` from the index. Fails fatally (panics) if `id` was the
    /// only node at `max_layer` and no replacement enterpoint can be found —
    /// that represents an unrecoverable invariant violation.
    #[tracing::instrument(skip(self))]
    pub fn remove(&self, id: NodeId) -> Result<(), Error> {
        let mut state = self.state.write();

        if !state.nodes.contains(id) {
            return Err(Error::UnknownNode(id));
        }

        state.nodes.unlink_from_friends(id);

        let removed_level = state.nodes.get(id).unwrap().level;
        state.nodes.remove(id);

        if let Some(count) = state.count_level.get_mut(&removed_level) {
            *count = count.saturating_sub(1);
        }

        if state.enterpoint == id {
            let mut reassigned = false;
            let mut layer = state.max_layer;
            loop {
                let mut candidates: Vec<NodeId> = state
                    .nodes
                    .iter()
                    .filter(|(_, n)| n.level == layer)
                    .map(|(&nid, _)| nid)
                    .collect();
                candidates.sort_unstable();
                if let Some(&new_ep) = candidates.first() {
                    state.enterpoint = new_ep;
                    reassigned = true;
                    break;
                }
                if layer == 0 {
                    break;
                }
                layer -= 1;
            }
            if !reassigned {
                panic!("hnsw: failed to reassign enterpoint after removing node {id}; index is corrupt");
            }
        }

        while state.max_layer > 0 && state.count_level.get(&state.max_layer).copied().unwrap_or(0) == 0 {
            state.max_layer -= 1;
        }

        Ok(())
    }

    /// Approximate K nearest neighbors of `q`: a `ClosestLast` queue of at
    /// most `k` results, whose pop order is farthest-to-closest.
    #[tracing::instrument(skip(self, q))]
    pub fn search(&self, q: &[f32], ef: u64, k: u64) -> Result<DistQueue, Error> {
        if q.len() != self.dim {
            return Err(Error::DimensionMisMatch {
                expected: self.dim,
                found: q.len(),
            });
        }
        if ef < k {
            return Err(Error::EfLessThanK { ef, k });
        }

        let state = self.state.read();

        let entry_id = state.enterpoint;
        let entry_dist = {
            let entry_point = state.nodes.get(entry_id).expect("enterpoint always live");
            self.distance.distance(q, &entry_point.p)
        };
        let top = state.max_layer;
        let (ep, d_ep) = self.find_best_entrypoint(&state, q, entry_id, entry_dist, top, 0);

        let mut result = self.search_at_layer(&state, q, ep, d_ep, 0, ef);

        // `result` is ClosestLast (root = farthest); trim down to k by
        // evicting the farthest items until at most k remain.
        while result.len() as u64 > k {
            result.pop();
        }
        Ok(result)
    }

    /// Exact top-K via linear scan. Intended for recall measurement against
    /// [`Self::search`], not for production queries.
    pub fn search_brute(&self, q: &[f32], k: u64) -> Vec<(NodeId, f32)> {
        use itertools::Itertools;

        let state = self.state.read();
        state
            .nodes
            .iter()
            .map(|(&id, n)| (id, self.distance.distance(q, &n.p)))
            .sorted_by(|a, b| {
                a.1.partial_cmp(&b.1).unwrap_or_else(|| {
                    if a.1.is_nan() && b.1.is_nan() {
                        std::cmp::Ordering::Equal
                    } else if a.1.is_nan() {
                        std::cmp::Ordering::Greater
                    } else {
                        std::cmp::Ordering::Less
                    }
                })
            })
            .take(k as usize)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.state.read().nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// A consistent snapshot of the graph topology, for invariant checking
    /// in tests. Not part of the index's normal operational surface.
    pub fn debug_snapshot(&self) -> GraphSnapshot {
        let state = self.state.read();
        let nodes = state
            .nodes
            .iter()
            .map(|(&id, n)| {
                (
                    id,
                    NodeSnapshot {
                        level: n.level,
                        friends: n
                            .friends
                            .iter()
                            .map(|(&l, list)| (l, list.nodes.clone()))
                            .collect(),
                        reverse_friends: n
                            .reverse_friends
                            .iter()
                            .map(|(&l, set)| (l, set.nodes.iter().copied().collect()))
                            .collect(),
                    },
                )
            })
            .collect();

        GraphSnapshot {
            m: self.m,
            m0: self.m0,
            max_layer: state.max_layer,
            enterpoint: state.enterpoint,
            nodes,
        }
    }

    /// Export the full logical state for persistence. See
    /// [`PersistedIndex`].
    pub fn export(&self) -> PersistedIndex {
        let state = self.state.read();
        PersistedIndex {
            m: self.m,
            m0: self.m0,
            ef_construction: self.ef_construction,
            delaunay_type: self.delaunay_type,
            level_mult: self.level_mult,
            dim: self.dim,
            max_layer: state.max_layer,
            enterpoint: state.enterpoint,
            count_level: state.count_level.clone(),
            sequence: state.sequence,
            nodes: state.nodes.clone(),
        }
    }

    /// Rebuild an index from a previously [`Self::export`]ed state. The
    /// distance function is supplied fresh since it isn't part of the
    /// serialized state (it's a behavior, not data).
    pub fn import(persisted: PersistedIndex, distance: D) -> Self {
        Self {
            m: persisted.m,
            m0: persisted.m0,
            ef_construction: persisted.ef_construction,
            delaunay_type: persisted.delaunay_type,
            level_mult: persisted.level_mult,
            dim: persisted.dim,
            distance,
            visited: VisitedPool::new(),
            state: RwLock::new(IndexState {
                max_layer: persisted.max_layer,
                enterpoint: persisted.enterpoint,
                count_level: persisted.count_level,
                sequence: persisted.sequence,
                nodes: persisted.nodes,
            }),
        }
    }

    /// Human-readable summary: config, node counts per layer, average
    /// out-degree per layer, and rough memory accounting.
    pub fn stats(&self) -> String {
        let state = self.state.read();
        let mut s = String::from("HNSW Index\n");
        s += &format!("M: {}, efConstruction: {}\n", self.m, self.ef_construction);
        s += &format!("DelaunayType: {:?}\n", self.delaunay_type);
        s += &format!("Number of nodes: {}\n", state.nodes.len());
        s += &format!("Max layer: {}\n", state.max_layer);

        let mut data_bytes: usize = 0;
        let mut index_bytes: u64 = 0;
        let mut level_counts = vec![0u64; (state.max_layer + 1) as usize];
        let mut conns = vec![0u64; (state.max_layer + 1) as usize];
        let mut conns_with_data = vec![0u64; (state.max_layer + 1) as usize];

        for (_, node) in state.nodes.iter() {
            level_counts[node.level as usize] += 1;
            for layer in 0..=node.level {
                if let Some(list) = node.friends.get(&layer) {
                    conns[layer as usize] += list.nodes.len() as u64;
                    conns_with_data[layer as usize] += 1;
                }
            }
            data_bytes += node.p.len() * 4;
            index_bytes += node.level * self.m * 4 + self.m0 * 4;
        }

        for (layer, count) in level_counts.iter().enumerate() {
            let avg = conns[layer] / conns_with_data[layer].max(1);
            let recorded = state.count_level.get(&(layer as u64)).copied().unwrap_or(0);
            s += &format!(
                "Level {layer}: {count} ({recorded}) nodes, average number of connections {avg}\n"
            );
        }

        let n = state.nodes.len().max(1);
        s += &format!(
            "Memory use for data: {data_bytes} ({} bytes / point)\n",
            data_bytes / n
        );
        s += &format!(
            "Memory use for index: {index_bytes} (avg {} bytes / point)\n",
            index_bytes / n as u64
        );
        s
    }
}
