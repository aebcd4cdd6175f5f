//! Node store: an ID-keyed arena owning every node in the graph.
//!
//! The graph is inherently cyclic (friends and reverse friends point at each
//! other), so nodes are never referenced directly; everything outside this
//! module addresses nodes by [`NodeId`] and goes through the store.

use std::collections::HashMap;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::node::{Node, NodeId};

#[derive(Debug, Clone, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct NodeStore {
    nodes: HashMap<NodeId, Node>,
}

impl NodeStore {
    pub fn new() -> Self {
        Self {
            nodes: HashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains_key(&id)
    }

    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(&id)
    }

    pub fn get_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(&id)
    }

    pub fn insert(&mut self, node: Node) {
        self.nodes.insert(node.id, node);
    }

    pub fn remove(&mut self, id: NodeId) -> Option<Node> {
        self.nodes.remove(&id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&NodeId, &Node)> {
        self.nodes.iter()
    }

    /// For every reverse friend of `id` at every layer, drop `id` from that
    /// neighbor's forward friend list. Called right before the node itself is
    /// dropped from the store.
    pub fn unlink_from_friends(&mut self, id: NodeId) {
        let reverse = match self.nodes.get(&id) {
            Some(n) => n.reverse_friends.clone(),
            None => return,
        };
        for (level, set) in reverse.iter() {
            for &other in set.nodes.iter() {
                if let Some(other_node) = self.nodes.get_mut(&other) {
                    if let Some(list) = other_node.friends.get_mut(level) {
                        list.nodes.retain(|&n| n != id);
                    }
                }
            }
        }
    }
}
