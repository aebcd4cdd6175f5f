//! Node representation: a point, the layer it was assigned, and its forward
//! and reverse friend lists per layer.

use std::collections::HashMap;
use std::collections::HashSet;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Stable identifier for a node. Assigned once from a monotonic counter and
/// never reused, even after the node is removed.
pub type NodeId = u64;

/// Forward friends at one layer, kept sorted by ascending distance to the
/// owning node (closest at index 0).
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct LinkList {
    pub nodes: Vec<NodeId>,
}

impl LinkList {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            nodes: Vec::with_capacity(capacity),
        }
    }
}

/// Reverse friends at one layer: the set of nodes that currently list the
/// owning node as a forward friend at that layer.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct LinkSet {
    pub nodes: HashSet<NodeId>,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Node {
    pub id: NodeId,
    pub p: Vec<f32>,
    pub level: u64,
    pub friends: HashMap<u64, LinkList>,
    pub reverse_friends: HashMap<u64, LinkSet>,
}

impl Node {
    pub fn new(id: NodeId, p: Vec<f32>, level: u64) -> Self {
        Self {
            id,
            p,
            level,
            friends: HashMap::new(),
            reverse_friends: HashMap::new(),
        }
    }

    /// Highest layer at which this node currently holds any friend slot
    /// (allocated or not). Used to decide how far `AllocateFriendsUpTo` must
    /// reach.
    pub fn friend_level_count(&self) -> u64 {
        self.friends.keys().copied().max().unwrap_or(0)
    }

    pub fn friends_at(&self, level: u64) -> &[NodeId] {
        self.friends
            .get(&level)
            .map(|l| l.nodes.as_slice())
            .unwrap_or(&[])
    }

    pub fn friend_count_at(&self, level: u64) -> usize {
        self.friends.get(&level).map_or(0, |l| l.nodes.len())
    }

    /// Ensure a (possibly empty) friend list exists for every layer up to and
    /// including `level`.
    pub fn allocate_friends_up_to(&mut self, level: u64, capacity: usize) {
        for l in 0..=level {
            self.friends
                .entry(l)
                .or_insert_with(|| LinkList::with_capacity(capacity));
        }
    }

    pub fn add_reverse_link(&mut self, other: NodeId, level: u64) {
        self.reverse_friends
            .entry(level)
            .or_default()
            .nodes
            .insert(other);
    }

    pub fn remove_reverse_link(&mut self, other: NodeId, level: u64) {
        if let Some(set) = self.reverse_friends.get_mut(&level) {
            set.nodes.remove(&other);
        }
    }
}
