//! # Node arena
//!
//! Index nodes live in a slab addressed by [`NodeId`]. Parents are stored as
//! ids, so a node never owns its parent and removing a subtree is a matter of
//! freeing slots. Freed slots are reused, so an id must not be held across a
//! removal of the node it names.

use crate::grouping::GroupBy;
use core_library::Song;
use serde::{Deserialize, Serialize};

/// Handle to a node in a [`NodeArena`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(usize);

impl NodeId {
    pub fn index(self) -> usize {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeKind {
    Root,
    Container,
    Song,
    Divider,
    LoadingIndicator,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub kind: NodeKind,
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
    /// Ancestor keys joined with this level's key by a unit separator.
    /// Unique per level.
    pub key: String,
    pub display_text: String,
    pub sort_text: String,
    /// Grouping level of a container, `None` for every other kind.
    pub container_level: Option<usize>,
    pub group_by: GroupBy,
    /// The song of a leaf, or the group fields a container summarizes.
    pub metadata: Option<Song>,
    /// Section a top-level container belongs to.
    pub divider_key: Option<String>,
    /// The "Various artists" child of this container, if one exists.
    pub compilation_artist_node: Option<NodeId>,
    pub is_compilation_artist_node: bool,
}

impl Node {
    pub fn new(kind: NodeKind) -> Self {
        Self {
            kind,
            parent: None,
            children: Vec::new(),
            key: String::new(),
            display_text: String::new(),
            sort_text: String::new(),
            container_level: None,
            group_by: GroupBy::None,
            metadata: None,
            divider_key: None,
            compilation_artist_node: None,
            is_compilation_artist_node: false,
        }
    }

    pub fn is_container(&self) -> bool {
        self.kind == NodeKind::Container
    }

    /// The backing song of a leaf.
    pub fn song(&self) -> Option<&Song> {
        match self.kind {
            NodeKind::Song => self.metadata.as_ref(),
            _ => None,
        }
    }
}

#[derive(Debug, Default)]
pub struct NodeArena {
    slots: Vec<Option<Node>>,
    free: Vec<usize>,
}

impl NodeArena {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `node` and link it under its `parent`, if any.
    pub fn insert(&mut self, node: Node) -> NodeId {
        let parent = node.parent;
        let id = match self.free.pop() {
            Some(index) => {
                self.slots[index] = Some(node);
                NodeId(index)
            }
            None => {
                self.slots.push(Some(node));
                NodeId(self.slots.len() - 1)
            }
        };
        if let Some(parent) = parent.and_then(|p| self.get_mut(p)) {
            parent.children.push(id);
        }
        id
    }

    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.slots.get(id.0).and_then(Option::as_ref)
    }

    pub fn get_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.slots.get_mut(id.0).and_then(Option::as_mut)
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.get(id).is_some()
    }

    /// Unlink `id` from its parent and free it together with its subtree.
    pub fn remove(&mut self, id: NodeId) -> Option<Node> {
        let node = self.slots.get_mut(id.0)?.take()?;
        self.free.push(id.0);

        if let Some(parent) = node.parent.and_then(|p| self.get_mut(p)) {
            parent.children.retain(|child| *child != id);
        }

        let mut pending = node.children.clone();
        while let Some(child) = pending.pop() {
            if let Some(removed) = self.slots.get_mut(child.0).and_then(Option::take) {
                self.free.push(child.0);
                pending.extend(removed.children);
            }
        }
        Some(node)
    }

    /// Live nodes.
    pub fn len(&self) -> usize {
        self.slots.len() - self.free.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&mut self) {
        self.slots.clear();
        self.free.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn child_of(parent: NodeId, kind: NodeKind) -> Node {
        Node {
            parent: Some(parent),
            ..Node::new(kind)
        }
    }

    #[test]
    fn test_insert_links_parent() {
        let mut arena = NodeArena::new();
        let root = arena.insert(Node::new(NodeKind::Root));
        let a = arena.insert(child_of(root, NodeKind::Container));
        let b = arena.insert(child_of(root, NodeKind::Container));

        assert_eq!(arena.get(root).unwrap().children, vec![a, b]);
        assert_eq!(arena.get(a).unwrap().parent, Some(root));
        assert_eq!(arena.len(), 3);
    }

    #[test]
    fn test_remove_frees_subtree_and_reuses_slots() {
        let mut arena = NodeArena::new();
        let root = arena.insert(Node::new(NodeKind::Root));
        let container = arena.insert(child_of(root, NodeKind::Container));
        let leaf = arena.insert(child_of(container, NodeKind::Song));

        let removed = arena.remove(container).unwrap();
        assert_eq!(removed.kind, NodeKind::Container);
        assert!(!arena.contains(leaf));
        assert!(arena.get(root).unwrap().children.is_empty());
        assert_eq!(arena.len(), 1);
        assert!(arena.remove(container).is_none());

        let reused = arena.insert(child_of(root, NodeKind::Divider));
        assert!(reused == container || reused == leaf);
        assert_eq!(arena.len(), 2);
    }
}
