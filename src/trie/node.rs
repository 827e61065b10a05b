//! The trie node model: tagged node variants, value slots and child references.
//!
//! Grounded on the node variant taxonomy of the Polkadot trie format and on the `PolkadotCodec`
//! node shapes (`encodeLeaf`/`encodeBranch`) from the kagome storage engine, generalized here into
//! Rust enum/trait form rather than a C++ class hierarchy per the repository's own design notes on
//! preferring tagged variants over deep inheritance.

use crate::nibble::NibbleVec;
use alloc::vec::Vec;

/// A node's stored value, prior to the merkle-value hashing decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValueSlot {
    /// No value at this node (a pure branch).
    Absent,
    /// Value stored inline in the node encoding.
    Inline(Vec<u8>),
    /// Value evicted to the backing store; this is its 32-byte address.
    ///
    /// The raw bytes live in the KV under this hash. Only possible for nodes encoded under state
    /// version V1 whose value is at least 33 bytes.
    Hashed([u8; 32]),
}

impl ValueSlot {
    pub fn is_absent(&self) -> bool {
        matches!(self, ValueSlot::Absent)
    }
}

/// A reference to a child node: either the child is held inline (useful while building a fresh
/// trie in memory) or only its Merkle value is known and it must be resolved from the backing
/// store on demand.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChildRef {
    Inline(alloc::boxed::Box<Node>),
    /// Only the Merkle value is known; the node lives in the backing store (verbatim if short,
    /// else addressed by its hash).
    Stored(MerkleValue),
}

/// The result of hashing or verbatim-encoding a node: either the raw encoding (if under 32
/// bytes) or its blake2b-256 hash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MerkleValue {
    Inline(Vec<u8>),
    Hash([u8; 32]),
}

impl MerkleValue {
    /// Computes the Merkle value for an encoded node: verbatim if short, hashed otherwise.
    /// `is_root` forces hashing even for a short encoding, per the Merkle-value rule.
    pub fn of_encoding(encoding: Vec<u8>, is_root: bool, hasher: impl FnOnce(&[u8]) -> [u8; 32]) -> Self {
        if is_root || encoding.len() >= 32 {
            MerkleValue::Hash(hasher(&encoding))
        } else {
            MerkleValue::Inline(encoding)
        }
    }

    pub fn as_hash(&self) -> Option<&[u8; 32]> {
        match self {
            MerkleValue::Hash(h) => Some(h),
            MerkleValue::Inline(_) => None,
        }
    }
}

/// 16 child slots, each possibly occupied.
pub type Children = [Option<ChildRef>; 16];

pub fn empty_children() -> Children {
    Default::default()
}

/// A trie node. The five variants (leaf, branch-no-value, branch-with-value, leaf-with-hashed-value,
/// branch-with-hashed-value) collapse here into two structural shapes (leaf vs branch) crossed
/// with the value-slot kind, which is exactly how the node is actually serialized (see
/// [`crate::trie::codec`]).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Leaf {
        partial_key: NibbleVec,
        value: ValueSlot,
    },
    Branch {
        partial_key: NibbleVec,
        value: ValueSlot,
        children: Children,
    },
}

impl Node {
    pub fn partial_key(&self) -> &NibbleVec {
        match self {
            Node::Leaf { partial_key, .. } => partial_key,
            Node::Branch { partial_key, .. } => partial_key,
        }
    }

    pub fn value(&self) -> &ValueSlot {
        match self {
            Node::Leaf { value, .. } => value,
            Node::Branch { value, .. } => value,
        }
    }

    pub fn children(&self) -> Option<&Children> {
        match self {
            Node::Leaf { .. } => None,
            Node::Branch { children, .. } => Some(children),
        }
    }

    pub fn child_count(&self) -> usize {
        self.children()
            .map(|c| c.iter().filter(|s| s.is_some()).count())
            .unwrap_or(0)
    }

    /// A branch with a single child and no value must be fused with that child (see
    /// `storage::collapse`); this reports whether that rule applies.
    pub fn should_collapse(&self) -> bool {
        matches!(self, Node::Branch { value, children, .. }
            if value.is_absent() && children.iter().filter(|c| c.is_some()).count() == 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn leaf_has_no_children() {
        let n = Node::Leaf {
            partial_key: NibbleVec::new(),
            value: ValueSlot::Inline(alloc::vec![1, 2, 3]),
        };
        assert_eq!(n.child_count(), 0);
        assert!(n.children().is_none());
    }

    #[test]
    fn branch_collapse_rule() {
        let mut children = empty_children();
        children[3] = Some(ChildRef::Stored(MerkleValue::Hash([0u8; 32])));
        let n = Node::Branch {
            partial_key: NibbleVec::new(),
            value: ValueSlot::Absent,
            children,
        };
        assert!(n.should_collapse());
    }
}
