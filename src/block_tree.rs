//! The in-memory tree of known, not-yet-pruned blocks: every block since the last finalized one,
//! indexed by arena handle rather than raw parent pointers.
//!
//! Grounded on the "Cyclic references" rule: a naive `Rc<RefCell<Node>>` parent/children
//! tree needs weak back-pointers to avoid leaks; this crate instead keeps nodes in a flat `Vec`
//! and refers to parents/children by index, the same arena pattern `allchain-substrate-lite` uses
//! for its block-authoring tree.

use alloc::collections::BTreeMap;
use alloc::vec::Vec;

/// An index into a [`BlockTree`]'s arena. Stable for the lifetime of the node (never reused while
/// the node is live), but only meaningful relative to the tree that issued it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeHandle(usize);

struct Node<T> {
    hash: [u8; 32],
    number: u64,
    parent: Option<NodeHandle>,
    children: Vec<NodeHandle>,
    payload: T,
}

/// A tree of blocks rooted at the last finalized block, supporting insertion, ancestry walks and
/// pruning of everything outside a newly-finalized block's own subtree.
pub struct BlockTree<T> {
    nodes: Vec<Option<Node<T>>>,
    by_hash: BTreeMap<[u8; 32], NodeHandle>,
    root: NodeHandle,
    finalized: NodeHandle,
}

impl<T> BlockTree<T> {
    /// Creates a tree whose only member is the finalized root block.
    pub fn new(root_hash: [u8; 32], root_number: u64, root_payload: T) -> Self {
        let root = Node {
            hash: root_hash,
            number: root_number,
            parent: None,
            children: Vec::new(),
            payload: root_payload,
        };
        let handle = NodeHandle(0);
        let mut by_hash = BTreeMap::new();
        by_hash.insert(root_hash, handle);
        BlockTree {
            nodes: alloc::vec![Some(root)],
            by_hash,
            root: handle,
            finalized: handle,
        }
    }

    pub fn handle_of(&self, hash: &[u8; 32]) -> Option<NodeHandle> {
        self.by_hash.get(hash).copied()
    }

    pub fn number_of(&self, handle: NodeHandle) -> u64 {
        self.get(handle).number
    }

    pub fn hash_of(&self, handle: NodeHandle) -> [u8; 32] {
        self.get(handle).hash
    }

    pub fn payload(&self, handle: NodeHandle) -> &T {
        &self.get(handle).payload
    }

    pub fn payload_mut(&mut self, handle: NodeHandle) -> &mut T {
        &mut self.nodes[handle.0].as_mut().expect("handle still live").payload
    }

    pub fn parent_of(&self, handle: NodeHandle) -> Option<NodeHandle> {
        self.get(handle).parent
    }

    pub fn children_of(&self, handle: NodeHandle) -> &[NodeHandle] {
        &self.get(handle).children
    }

    pub fn finalized(&self) -> NodeHandle {
        self.finalized
    }

    pub fn root(&self) -> NodeHandle {
        self.root
    }

    /// Inserts a new block whose parent is already known. Returns `None` if the parent hash
    /// isn't present in the tree (the caller should treat this as `PARENT_NOT_FOUND`).
    pub fn insert(&mut self, hash: [u8; 32], number: u64, parent_hash: &[u8; 32], payload: T) -> Option<NodeHandle> {
        let parent = *self.by_hash.get(parent_hash)?;
        let handle = NodeHandle(self.nodes.len());
        self.nodes.push(Some(Node {
            hash,
            number,
            parent: Some(parent),
            children: Vec::new(),
            payload,
        }));
        self.nodes[parent.0].as_mut().expect("parent still live").children.push(handle);
        self.by_hash.insert(hash, handle);
        Some(handle)
    }

    /// Returns every leaf (childless block) reachable from the root, for best-chain selection.
    pub fn leaves(&self) -> Vec<NodeHandle> {
        self.nodes
            .iter()
            .enumerate()
            .filter_map(|(i, node)| node.as_ref().filter(|n| n.children.is_empty()).map(|_| NodeHandle(i)))
            .collect()
    }

    /// Marks `handle` (which must be a descendant of the current finalized block) as the new
    /// finalized block, pruning every node outside its subtree. Returns the hashes of pruned
    /// blocks so the caller can drop their state from the backing trie store.
    pub fn finalize(&mut self, handle: NodeHandle) -> Vec<[u8; 32]> {
        let mut keep = alloc::collections::BTreeSet::new();
        let mut cursor = Some(handle);
        while let Some(h) = cursor {
            keep.insert(h);
            cursor = self.get(h).parent;
        }
        let mut stack = self.get(handle).children.clone();
        while let Some(h) = stack.pop() {
            keep.insert(h);
            stack.extend(self.get(h).children.iter().copied());
        }

        let mut pruned = Vec::new();
        for i in 0..self.nodes.len() {
            let handle_i = NodeHandle(i);
            if self.nodes[i].is_some() && !keep.contains(&handle_i) {
                let node = self.nodes[i].take().expect("checked Some above");
                self.by_hash.remove(&node.hash);
                pruned.push(node.hash);
            }
        }

        if let Some(old_root) = self.nodes[self.root.0].as_mut() {
            old_root.parent = None;
        }
        self.finalized = handle;
        tracing::info!(pruned = pruned.len(), "finalized a block, pruned non-finalized siblings");
        pruned
    }

    fn get(&self, handle: NodeHandle) -> &Node<T> {
        self.nodes[handle.0].as_ref().expect("handle still live")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_with_unknown_parent_returns_none() {
        let mut tree = BlockTree::new([0u8; 32], 0, ());
        assert!(tree.insert([9u8; 32], 1, &[8u8; 32], ()).is_none());
    }

    #[test]
    fn finalize_prunes_siblings_off_the_finalized_path() {
        let mut tree = BlockTree::new([0u8; 32], 0, ());
        let a = tree.insert([1u8; 32], 1, &[0u8; 32], ()).unwrap();
        let _b = tree.insert([2u8; 32], 1, &[0u8; 32], ()).unwrap();
        let pruned = tree.finalize(a);
        assert_eq!(pruned, alloc::vec![[2u8; 32]]);
        assert!(tree.handle_of(&[2u8; 32]).is_none());
        assert!(tree.handle_of(&[1u8; 32]).is_some());
    }

    #[test]
    fn leaves_reports_every_childless_block() {
        let mut tree = BlockTree::new([0u8; 32], 0, ());
        tree.insert([1u8; 32], 1, &[0u8; 32], ()).unwrap();
        tree.insert([2u8; 32], 1, &[0u8; 32], ()).unwrap();
        assert_eq!(tree.leaves().len(), 2);
    }
}
