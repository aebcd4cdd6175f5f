//! Neighbor-selection policies: reducing an over-full candidate pool down to
//! at most `m` neighbors for one node at one layer.
//!
//! Both policies are expressed against the node store directly (rather than
//! against an in-memory slice of points) since they need to look up each
//! candidate's actual vector to compute distances.

use crate::heap::{DistQueue, Item, Polarity};
use crate::node::NodeId;
use crate::store::NodeStore;
use crate::DistanceFn;

/// Which neighbor-reduction policy an index uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize)
)]
pub enum DelaunayType {
    /// Keep the `m` nearest candidates outright.
    Simple,
    /// The "Malkov heuristic": diversify around the query point instead of
    /// just taking the nearest `m`, improving graph navigability.
    Heuristic,
}

/// Sort a queue's contents ascending by distance, independent of the
/// queue's own polarity (`into_sorted_vec()` drains in pop order, which is
/// only ascending for a `ClosestFirst` queue).
fn ascending(candidates: DistQueue) -> Vec<Item> {
    let mut items: Vec<Item> = candidates.iter().copied().collect();
    items.sort_by(|a, b| a.d.total_cmp(&b.d));
    items
}

/// Reduce `candidates` (a pool of up to `m`-or-more items, in either
/// polarity) to at most `m` neighbors of `query`, according to `policy`.
/// The result is returned in the same polarity as `candidates`.
pub fn select_neighbors(
    policy: DelaunayType,
    query: &[f32],
    candidates: DistQueue,
    m: usize,
    store: &NodeStore,
    distance: impl DistanceFn,
) -> DistQueue {
    let polarity = candidates.polarity();
    match policy {
        DelaunayType::Simple => select_simple(candidates, m, polarity),
        DelaunayType::Heuristic => select_heuristic(query, candidates, m, store, distance, polarity),
    }
}

fn select_simple(candidates: DistQueue, m: usize, polarity: Polarity) -> DistQueue {
    let sorted = ascending(candidates);
    let mut out = DistQueue::with_capacity(polarity, m.min(sorted.len()));
    for item in sorted.into_iter().take(m) {
        out.push_item(item);
    }
    out
}

fn select_heuristic(
    query: &[f32],
    candidates: DistQueue,
    m: usize,
    store: &NodeStore,
    distance: impl DistanceFn,
    polarity: Polarity,
) -> DistQueue {
    let sorted = ascending(candidates);

    let mut accepted: Vec<Item> = Vec::with_capacity(m);
    let mut discarded: Vec<Item> = Vec::new();

    for candidate in sorted {
        if accepted.len() >= m {
            break;
        }
        if accepted.is_empty() {
            accepted.push(candidate);
            continue;
        }

        let candidate_point = match store.get(candidate.node) {
            Some(n) => n.p.as_slice(),
            None => continue,
        };

        let is_diverse = accepted.iter().all(|selected| {
            let selected_point = match store.get(selected.node) {
                Some(n) => n.p.as_slice(),
                None => return true,
            };
            let dist_to_selected = distance.distance(candidate_point, selected_point);
            dist_to_selected >= candidate.d
        });

        if is_diverse {
            accepted.push(candidate);
        } else {
            discarded.push(candidate);
        }
    }

    // Backfill from discarded candidates, nearest first, if we're short.
    if accepted.len() < m {
        for candidate in discarded {
            if accepted.len() >= m {
                break;
            }
            accepted.push(candidate);
        }
    }

    let _ = query; // distances were already computed relative to query by the caller
    let mut out = DistQueue::with_capacity(polarity, accepted.len());
    for item in accepted {
        out.push_item(item);
    }
    out
}

/// Copy a `ClosestFirst`-or-`ClosestLast` queue's contents into a plain
/// ascending-by-distance `Vec<NodeId>`, matching the layout stored in
/// [`crate::node::Node::friends`].
pub fn to_ordered_ids(queue: DistQueue) -> Vec<NodeId> {
    ascending(queue).into_iter().map(|i| i.node).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::distance::SquaredEuclidean;
    use crate::node::Node;

    fn store_with(points: &[(u64, [f32; 2])]) -> NodeStore {
        let mut store = NodeStore::new();
        for (id, p) in points {
            store.insert(Node::new(*id, p.to_vec(), 0));
        }
        store
    }

    #[test]
    fn simple_keeps_m_nearest() {
        let store = store_with(&[(1, [0.0, 0.0]), (2, [1.0, 0.0]), (3, [5.0, 0.0])]);
        let mut q = DistQueue::new(Polarity::ClosestFirst);
        q.push(1, 0.0);
        q.push(2, 1.0);
        q.push(3, 25.0);
        let out = select_neighbors(
            DelaunayType::Simple,
            &[0.0, 0.0],
            q,
            2,
            &store,
            SquaredEuclidean,
        );
        let ids = to_ordered_ids(out);
        assert_eq!(ids, vec![1, 2]);
    }

    #[test]
    fn heuristic_diversifies_away_from_clustered_points() {
        // Query at origin. Two candidates are nearly colocated with each
        // other but both close to the query; one far candidate sits in a
        // completely different direction. With m=2 the heuristic should
        // prefer diversity over the second-closest clustered point.
        let store = store_with(&[
            (1, [1.0, 0.0]),
            (2, [1.1, 0.0]),
            (3, [0.0, 10.0]),
        ]);
        let mut q = DistQueue::new(Polarity::ClosestFirst);
        q.push(1, 1.0);
        q.push(2, 1.21);
        q.push(3, 100.0);
        let out = select_neighbors(
            DelaunayType::Heuristic,
            &[0.0, 0.0],
            q,
            2,
            &store,
            SquaredEuclidean,
        );
        let ids = to_ordered_ids(out);
        assert_eq!(ids.len(), 2);
        assert_eq!(ids[0], 1);
    }

    #[test]
    fn simple_keeps_m_nearest_from_closest_last_pool() {
        // Beam search hands select_neighbors a ClosestLast pool (root =
        // farthest); selection must still keep the m *nearest* candidates,
        // not the m farthest, and must hand back a ClosestLast queue.
        let store = store_with(&[(1, [0.0, 0.0]), (2, [1.0, 0.0]), (3, [5.0, 0.0])]);
        let mut q = DistQueue::new(Polarity::ClosestLast);
        q.push(1, 0.0);
        q.push(2, 1.0);
        q.push(3, 25.0);
        let out = select_neighbors(
            DelaunayType::Simple,
            &[0.0, 0.0],
            q,
            2,
            &store,
            SquaredEuclidean,
        );
        assert_eq!(out.polarity(), Polarity::ClosestLast);
        let ids = to_ordered_ids(out);
        assert_eq!(ids, vec![1, 2]);
    }

    #[test]
    fn heuristic_backfills_when_not_enough_diverse_candidates() {
        let store = store_with(&[(1, [1.0, 0.0]), (2, [1.05, 0.0]), (3, [1.1, 0.0])]);
        let mut q = DistQueue::new(Polarity::ClosestFirst);
        q.push(1, 1.0);
        q.push(2, 1.1025);
        q.push(3, 1.21);
        let out = select_neighbors(
            DelaunayType::Heuristic,
            &[0.0, 0.0],
            q,
            3,
            &store,
            SquaredEuclidean,
        );
        assert_eq!(out.len(), 3);
    }
}
