//! The persisted trie engine: `get`/`put`/`remove`/`clear_prefix`/`root`/`next_key` over a
//! content-addressed backing store, with ref-counted commits.
//!
//! Grounded on the overlay/commit shape described for kagome's `TrieStorageBackend` (consumed by
//! `StateSyncRequestFlow::onResponse`, which `db_->put(hash, encoded)`s individual nodes) and on
//! the collapse/fuse rule that a trie node must exist only either if it contains a value, or if
//! its key is the longest shared prefix of two or more nodes that contain a value. The node codec
//! itself is `crate::trie::codec`.

use crate::kv::{Hasher, KeyValueStore};
use crate::nibble::{Nibble, NibbleVec};
use crate::trie::codec::{self, StateVersion};
use crate::trie::node::{empty_children, ChildRef, MerkleValue, Node, ValueSlot};
use alloc::boxed::Box;
use alloc::collections::BTreeMap;
use alloc::vec::Vec;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    #[error("trie codec error: {0}")]
    Codec(#[from] codec::Error),
    #[error("node referenced by hash {0:x?} is missing from the backing store")]
    MissingNode([u8; 32]),
    #[error("child-trie root at {0:x?} does not exist")]
    MissingChildRoot([u8; 32]),
}

/// One mutation recorded against the trie since the last commit.
#[derive(Debug, Clone)]
enum Edit {
    Put(Vec<u8>),
    Remove,
}

/// A trie engine over a [`KeyValueStore`]. Mutations accumulate in an in-memory overlay; nothing
/// touches the backing store until [`Self::commit`].
pub struct TrieDb<'s, S: KeyValueStore, H: Hasher> {
    store: &'s mut S,
    hasher: H,
    root: [u8; 32],
    overlay: BTreeMap<Vec<u8>, Edit>,
    state_version: StateVersion,
    /// Monotonic counter stamped on every commit's journal entries, so a later revert can target
    /// exactly the ref-count changes that one commit made.
    next_commit_seq: u64,
}

/// Callback invoked once per node actually written to the backing store during a commit, with
/// its hash and encoded bytes. Used by [`crate::trie::proof`] to build a proof without copying
/// the whole subtree, and by state sync to mirror newly-written nodes into a journal.
pub type ChildVisitor<'a> = dyn FnMut(&[u8; 32], &[u8]) + 'a;

impl<'s, S: KeyValueStore, H: Hasher> TrieDb<'s, S, H> {
    pub fn new(store: &'s mut S, hasher: H, root: [u8; 32], state_version: StateVersion) -> Self {
        TrieDb {
            store,
            hasher,
            root,
            overlay: BTreeMap::new(),
            state_version,
            next_commit_seq: 0,
        }
    }

    pub fn root(&self) -> [u8; 32] {
        self.root
    }

    /// Reads a key, checking the overlay before falling through to the persisted trie.
    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, Error> {
        match self.overlay.get(key) {
            Some(Edit::Put(v)) => return Ok(Some(v.clone())),
            Some(Edit::Remove) => return Ok(None),
            None => {}
        }
        self.get_persisted(key)
    }

    fn get_persisted(&self, key: &[u8]) -> Result<Option<Vec<u8>>, Error> {
        let nibbles = NibbleVec::from_bytes(key);
        let mut current_hash = self.root;
        let mut remaining = nibbles.as_slice();

        loop {
            let encoded = self
                .store
                .get_node(&current_hash)
                .ok_or(Error::MissingNode(current_hash))?;
            let node = codec::decode_node(&encoded)?;
            let pk = node.partial_key();

            if !remaining.starts_with(pk.as_slice()) {
                return Ok(None);
            }
            remaining = &remaining[pk.len()..];

            if remaining.is_empty() {
                return Ok(match node.value() {
                    ValueSlot::Absent => None,
                    ValueSlot::Inline(v) => Some(v.clone()),
                    ValueSlot::Hashed(h) => self.store.get_value(h),
                });
            }

            let children = match node.children() {
                Some(c) => c,
                None => return Ok(None),
            };
            let idx = remaining[0].0 as usize;
            remaining = &remaining[1..];
            match &children[idx] {
                None => return Ok(None),
                Some(ChildRef::Stored(MerkleValue::Hash(h))) => current_hash = *h,
                Some(ChildRef::Stored(MerkleValue::Inline(bytes))) => {
                    // Inline child: decode directly rather than looking it up by hash.
                    let node = codec::decode_node(bytes)?;
                    if remaining.is_empty() && node.value() != &ValueSlot::Absent {
                        return Ok(match node.value() {
                            ValueSlot::Inline(v) => Some(v.clone()),
                            ValueSlot::Hashed(h) => self.store.get_value(h),
                            ValueSlot::Absent => None,
                        });
                    }
                    return Ok(None);
                }
                Some(ChildRef::Inline(_)) => unreachable!("persisted tries never hold unresolved inline children"),
            }
        }
    }

    pub fn put(&mut self, key: &[u8], value: Vec<u8>) {
        self.overlay.insert(key.to_vec(), Edit::Put(value));
    }

    pub fn remove(&mut self, key: &[u8]) {
        self.overlay.insert(key.to_vec(), Edit::Remove);
    }

    /// Removes every persisted key starting with `prefix`, up to `limit` entries (`None` means
    /// unbounded). Returns `(removed_count, more_to_do)`.
    pub fn clear_prefix(&mut self, prefix: &[u8], limit: Option<u32>) -> Result<(u32, bool), Error> {
        let mut removed = 0u32;
        let mut more = false;
        let keys = self.collect_keys_with_prefix(prefix)?;
        for key in keys {
            if let Some(limit) = limit {
                if removed >= limit {
                    more = true;
                    break;
                }
            }
            self.remove(&key);
            removed += 1;
        }
        Ok((removed, more))
    }

    fn collect_keys_with_prefix(&self, prefix: &[u8]) -> Result<Vec<Vec<u8>>, Error> {
        // Deterministic in-order walk of the persisted trie restricted to `prefix`, merged with
        // overlay puts/removes so a caller sees a consistent view before commit.
        let mut out = Vec::new();
        self.walk_persisted(prefix, &mut out)?;
        let mut set: alloc::collections::BTreeSet<Vec<u8>> = out.into_iter().collect();
        for (k, edit) in self.overlay.range(prefix.to_vec()..) {
            if !k.starts_with(prefix) {
                break;
            }
            match edit {
                Edit::Put(_) => {
                    set.insert(k.clone());
                }
                Edit::Remove => {
                    set.remove(k);
                }
            }
        }
        Ok(set.into_iter().collect())
    }

    fn walk_persisted(&self, prefix: &[u8], out: &mut Vec<Vec<u8>>) -> Result<(), Error> {
        fn recurse<S: KeyValueStore, H: Hasher>(
            db: &TrieDb<S, H>,
            hash: [u8; 32],
            path: NibbleVec,
            prefix_nibbles: &[Nibble],
            out: &mut Vec<Vec<u8>>,
        ) -> Result<(), Error> {
            let encoded = db.store.get_node(&hash).ok_or(Error::MissingNode(hash))?;
            let node = codec::decode_node(&encoded)?;
            let mut full = path.clone();
            full.extend(node.partial_key().as_slice());

            let shorter = full.len().min(prefix_nibbles.len());
            if !full.as_slice()[..shorter].starts_with(&prefix_nibbles[..shorter]) {
                return Ok(());
            }

            if full.len() >= prefix_nibbles.len() {
                if let ValueSlot::Inline(_) | ValueSlot::Hashed(_) = node.value() {
                    if full.len() % 2 == 0 {
                        out.push(full.to_bytes_truncate());
                    }
                }
            }

            if let Some(children) = node.children() {
                for (i, c) in children.iter().enumerate() {
                    if let Some(ChildRef::Stored(MerkleValue::Hash(h))) = c {
                        let mut child_path = full.clone();
                        child_path.push(Nibble::new(i as u8));
                        recurse(db, *h, child_path, prefix_nibbles, out)?;
                    }
                }
            }
            Ok(())
        }

        let prefix_nibbles = NibbleVec::from_bytes(prefix);
        recurse(self, self.root, NibbleVec::new(), prefix_nibbles.as_slice(), out)
    }

    /// Computes what [`Self::commit`] would install as the new root, without writing anything to
    /// the backing store. Lets a caller verify a block's claimed `state_root` before deciding
    /// whether its execution's writes should be persisted at all.
    pub fn preview_root(&self) -> Result<[u8; 32], Error> {
        if self.overlay.is_empty() {
            return Ok(self.root);
        }
        let root_node = apply_overlay(self.store, self.root, &self.overlay)?;
        Ok(match root_node {
            None => self.hasher.hash(&EMPTY_TRIE_ENCODING),
            Some(node) => match merkle_hash_only(node, &self.hasher, self.state_version, true)? {
                MerkleValue::Hash(h) => h,
                MerkleValue::Inline(bytes) => self.hasher.hash(&bytes),
            },
        })
    }

    /// Flushes the overlay onto the persisted trie: only the nodes on a root-to-leaf path touched
    /// by a pending edit are re-encoded and re-written; every sibling subtree the edits never
    /// visited is carried forward by its existing hash. `child_visitor`, if given, is called once
    /// per node actually written.
    pub fn commit(&mut self, mut child_visitor: Option<&mut ChildVisitor<'_>>) -> Result<[u8; 32], Error> {
        if self.overlay.is_empty() {
            return Ok(self.root);
        }

        let seq = self.next_commit_seq;
        self.next_commit_seq += 1;

        let root_node = apply_overlay(self.store, self.root, &self.overlay)?;
        let new_root = match root_node {
            None => {
                let h = self.hasher.hash(&EMPTY_TRIE_ENCODING);
                self.store.put_node(h, EMPTY_TRIE_ENCODING.to_vec());
                self.store.record_add(seq, h);
                h
            }
            Some(node) => {
                let mv = persist_tree(node, self.store, &self.hasher, self.state_version, true, seq, &mut child_visitor)?;
                match mv {
                    MerkleValue::Hash(h) => h,
                    MerkleValue::Inline(bytes) => {
                        let h = self.hasher.hash(&bytes);
                        self.store.put_node(h, bytes);
                        self.store.record_add(seq, h);
                        h
                    }
                }
            }
        };
        self.root = new_root;
        self.overlay.clear();
        Ok(new_root)
    }

    /// Smallest persisted key strictly greater than `key`, honoring the overlay.
    pub fn next_key(&self, key: &[u8]) -> Result<Option<Vec<u8>>, Error> {
        let all = self.collect_keys_with_prefix(&[])?;
        Ok(all.into_iter().find(|k| k.as_slice() > key))
    }
}

/// The canonical encoding of a trie with no entries: a single zero byte, special-cased by
/// [`codec::decode_node`] and never produced by [`codec::encode_node`]'s normal dispatch.
const EMPTY_TRIE_ENCODING: [u8; 1] = [0u8];

/// Number of leading nibbles two nibble slices have in common.
fn common_len(a: &[Nibble], b: &[Nibble]) -> usize {
    a.iter().zip(b.iter()).take_while(|(x, y)| x.0 == y.0).count()
}

/// Loads the current root node, if any, and folds every pending overlay edit into it. Returns
/// `None` once the resulting trie holds no entries at all.
fn apply_overlay<S: KeyValueStore>(
    store: &S,
    root: [u8; 32],
    edits: &BTreeMap<Vec<u8>, Edit>,
) -> Result<Option<Node>, Error> {
    let mut current = match store.get_node(&root) {
        Some(encoded) => Some(codec::decode_node(&encoded)?),
        None => None,
    };
    for (key, edit) in edits.iter() {
        let nibbles = NibbleVec::from_bytes(key);
        current = match edit {
            Edit::Put(value) => Some(insert_node(current, store, nibbles.as_slice(), value.clone())?),
            Edit::Remove => remove_node(current, store, nibbles.as_slice())?,
        };
    }
    Ok(current)
}

/// Resolves a child reference to its node, decoding from the backing store only when the
/// reference hasn't already been materialized in memory.
fn load_child<S: KeyValueStore>(store: &S, child: ChildRef) -> Result<Node, Error> {
    match child {
        ChildRef::Inline(boxed) => Ok(*boxed),
        ChildRef::Stored(MerkleValue::Hash(h)) => {
            let encoded = store.get_node(&h).ok_or(Error::MissingNode(h))?;
            Ok(codec::decode_node(&encoded)?)
        }
        ChildRef::Stored(MerkleValue::Inline(bytes)) => Ok(codec::decode_node(&bytes)?),
    }
}

fn with_partial_key(node: Node, partial_key: NibbleVec) -> Node {
    match node {
        Node::Leaf { value, .. } => Node::Leaf { partial_key, value },
        Node::Branch { value, children, .. } => Node::Branch { partial_key, value, children },
    }
}

/// Inserts `value` at `key` into the subtree rooted at `node` (`None` meaning an empty subtree),
/// touching only the nodes on the path from `node` down to the insertion point. Every node it
/// rebuilds is returned wrapped as [`ChildRef::Inline`] by the caller, marking it dirty for the
/// next [`persist_tree`] pass; nodes it never visits are left as [`ChildRef::Stored`] untouched.
fn insert_node<S: KeyValueStore>(node: Option<Node>, store: &S, key: &[Nibble], value: Vec<u8>) -> Result<Node, Error> {
    let node = match node {
        None => {
            return Ok(Node::Leaf {
                partial_key: NibbleVec::from_nibbles(key.to_vec()),
                value: ValueSlot::Inline(value),
            });
        }
        Some(n) => n,
    };

    let pk: Vec<Nibble> = node.partial_key().as_slice().to_vec();
    let common = common_len(&pk, key);

    if common == pk.len() && common == key.len() {
        return Ok(match node {
            Node::Leaf { partial_key, .. } => Node::Leaf { partial_key, value: ValueSlot::Inline(value) },
            Node::Branch { partial_key, children, .. } => {
                Node::Branch { partial_key, value: ValueSlot::Inline(value), children }
            }
        });
    }

    if common == pk.len() {
        // The node's partial key is fully consumed; the insertion continues into a child slot.
        let idx = key[common].0 as usize;
        let rest = &key[common + 1..];
        return Ok(match node {
            Node::Leaf { partial_key, value: leaf_value } => {
                let mut children = empty_children();
                let child = insert_node(None, store, rest, value)?;
                children[idx] = Some(ChildRef::Inline(Box::new(child)));
                Node::Branch { partial_key, value: leaf_value, children }
            }
            Node::Branch { partial_key, value: branch_value, mut children } => {
                let child_node = match children[idx].take() {
                    Some(existing) => Some(load_child(store, existing)?),
                    None => None,
                };
                let updated = insert_node(child_node, store, rest, value)?;
                children[idx] = Some(ChildRef::Inline(Box::new(updated)));
                Node::Branch { partial_key, value: branch_value, children }
            }
        });
    }

    // The node's partial key diverges from `key` partway through: split at the common prefix.
    let existing_partial = NibbleVec::from_nibbles(pk[common + 1..].to_vec());
    let existing_idx = pk[common].0 as usize;
    let existing_at_branch = with_partial_key(node, existing_partial);

    let mut children = empty_children();
    children[existing_idx] = Some(ChildRef::Inline(Box::new(existing_at_branch)));

    let branch_partial = NibbleVec::from_nibbles(pk[..common].to_vec());

    if common == key.len() {
        // The new key ends exactly at the split point; its value lives on the branch itself.
        return Ok(Node::Branch { partial_key: branch_partial, value: ValueSlot::Inline(value), children });
    }

    let new_idx = key[common].0 as usize;
    let new_leaf = Node::Leaf {
        partial_key: NibbleVec::from_nibbles(key[common + 1..].to_vec()),
        value: ValueSlot::Inline(value),
    };
    children[new_idx] = Some(ChildRef::Inline(Box::new(new_leaf)));

    Ok(Node::Branch { partial_key: branch_partial, value: ValueSlot::Absent, children })
}

/// Removes `key` from the subtree rooted at `node`, mirroring [`insert_node`]'s descent and then
/// collapsing any branch left holding too little to justify existing on its own.
fn remove_node<S: KeyValueStore>(node: Option<Node>, store: &S, key: &[Nibble]) -> Result<Option<Node>, Error> {
    let node = match node {
        None => return Ok(None),
        Some(n) => n,
    };

    let pk: Vec<Nibble> = node.partial_key().as_slice().to_vec();
    if key.len() < pk.len() || common_len(&pk, key) != pk.len() {
        // `key` isn't under this subtree at all.
        return Ok(Some(node));
    }
    let rest = &key[pk.len()..];

    if rest.is_empty() {
        return match node {
            Node::Leaf { .. } => Ok(None),
            Node::Branch { partial_key, children, .. } => {
                collapse_if_needed(Node::Branch { partial_key, value: ValueSlot::Absent, children }, store)
            }
        };
    }

    match node {
        Node::Leaf { partial_key, value } => Ok(Some(Node::Leaf { partial_key, value })),
        Node::Branch { partial_key, value, mut children } => {
            let idx = rest[0].0 as usize;
            let child_rest = &rest[1..];
            match children[idx].take() {
                None => Ok(Some(Node::Branch { partial_key, value, children })),
                Some(child_ref) => {
                    let child_node = load_child(store, child_ref)?;
                    let updated = remove_node(Some(child_node), store, child_rest)?;
                    children[idx] = updated.map(|n| ChildRef::Inline(Box::new(n)));
                    collapse_if_needed(Node::Branch { partial_key, value, children }, store)
                }
            }
        }
    }
}

/// Enforces the invariant that a node exists only if it holds a value or is the longest shared
/// prefix of two or more value-holding descendants: drops an empty, childless branch, and fuses a
/// valueless single-child branch with that child.
fn collapse_if_needed<S: KeyValueStore>(node: Node, store: &S) -> Result<Option<Node>, Error> {
    if let Node::Branch { ref value, ref children, .. } = node {
        if value.is_absent() && children.iter().all(|c| c.is_none()) {
            return Ok(None);
        }
    }
    if !node.should_collapse() {
        return Ok(Some(node));
    }
    match node {
        Node::Branch { partial_key, children, .. } => {
            let (idx, child_ref) = children
                .into_iter()
                .enumerate()
                .find_map(|(i, c)| c.map(|c| (i, c)))
                .expect("should_collapse guarantees exactly one child");
            let child_node = load_child(store, child_ref)?;
            let mut fused_partial = partial_key;
            fused_partial.push(Nibble::new(idx as u8));
            fused_partial.extend(child_node.partial_key().as_slice());
            Ok(Some(with_partial_key(child_node, fused_partial)))
        }
        _ => unreachable!("should_collapse only returns true for Branch nodes"),
    }
}

/// Whether a value is large enough, under `state_version`, to be evicted out of the node into the
/// value table and referenced by hash instead.
fn should_evict_value(value: &ValueSlot, state_version: StateVersion) -> bool {
    matches!(state_version, StateVersion::V1)
        && matches!(value, ValueSlot::Inline(v) if v.len() >= codec::HASHED_VALUE_THRESHOLD)
}

fn evict_value_if_needed<S: KeyValueStore, H: Hasher>(node: Node, store: &mut S, hasher: &H, state_version: StateVersion) -> Node {
    match node {
        Node::Leaf { partial_key, value } if should_evict_value(&value, state_version) => {
            let v = match value { ValueSlot::Inline(v) => v, _ => unreachable!() };
            let h = hasher.hash(&v);
            store.put_value(h, v);
            Node::Leaf { partial_key, value: ValueSlot::Hashed(h) }
        }
        Node::Branch { partial_key, value, children } if should_evict_value(&value, state_version) => {
            let v = match value { ValueSlot::Inline(v) => v, _ => unreachable!() };
            let h = hasher.hash(&v);
            store.put_value(h, v);
            Node::Branch { partial_key, value: ValueSlot::Hashed(h), children }
        }
        other => other,
    }
}

fn evict_value_dry_run<H: Hasher>(node: Node, hasher: &H, state_version: StateVersion) -> Node {
    match node {
        Node::Leaf { partial_key, value } if should_evict_value(&value, state_version) => {
            let v = match value { ValueSlot::Inline(v) => v, _ => unreachable!() };
            let h = hasher.hash(&v);
            Node::Leaf { partial_key, value: ValueSlot::Hashed(h) }
        }
        Node::Branch { partial_key, value, children } if should_evict_value(&value, state_version) => {
            let v = match value { ValueSlot::Inline(v) => v, _ => unreachable!() };
            let h = hasher.hash(&v);
            Node::Branch { partial_key, value: ValueSlot::Hashed(h), children }
        }
        other => other,
    }
}

/// Recursively persists only the dirty ([`ChildRef::Inline`]) part of a subtree, bottom-up.
/// Children already [`ChildRef::Stored`] are carried forward by their existing hash without being
/// read back from the store, so a commit's cost is proportional to the number of touched nodes,
/// not to the size of the whole trie.
fn persist_tree<S: KeyValueStore, H: Hasher>(
    node: Node,
    store: &mut S,
    hasher: &H,
    state_version: StateVersion,
    is_root: bool,
    seq: u64,
    child_visitor: &mut Option<&mut ChildVisitor<'_>>,
) -> Result<MerkleValue, Error> {
    let node = match node {
        Node::Branch { partial_key, value, mut children } => {
            for slot in children.iter_mut() {
                let taken = slot.take();
                *slot = match taken {
                    Some(ChildRef::Inline(child)) => {
                        let mv = persist_tree(*child, store, hasher, state_version, false, seq, child_visitor)?;
                        Some(ChildRef::Stored(mv))
                    }
                    other => other,
                };
            }
            Node::Branch { partial_key, value, children }
        }
        leaf @ Node::Leaf { .. } => leaf,
    };

    let node = evict_value_if_needed(node, store, hasher, state_version);

    let encoded = codec::encode_node(&node, state_version);
    let mv = MerkleValue::of_encoding(encoded.clone(), is_root, |e| hasher.hash(e));
    if let MerkleValue::Hash(h) = &mv {
        store.put_node(*h, encoded.clone());
        store.record_add(seq, *h);
        if let Some(visitor) = child_visitor.as_deref_mut() {
            visitor(h, &encoded);
        }
    }
    Ok(mv)
}

/// Dry-run counterpart to [`persist_tree`] used by [`TrieDb::preview_root`]: computes the would-be
/// root hash of the dirty subtree without writing anything to the store or the commit journal.
fn merkle_hash_only<H: Hasher>(node: Node, hasher: &H, state_version: StateVersion, is_root: bool) -> Result<MerkleValue, Error> {
    let node = match node {
        Node::Branch { partial_key, value, mut children } => {
            for slot in children.iter_mut() {
                let taken = slot.take();
                *slot = match taken {
                    Some(ChildRef::Inline(child)) => {
                        let mv = merkle_hash_only(*child, hasher, state_version, false)?;
                        Some(ChildRef::Stored(mv))
                    }
                    other => other,
                };
            }
            Node::Branch { partial_key, value, children }
        }
        leaf @ Node::Leaf { .. } => leaf,
    };

    let node = evict_value_dry_run(node, hasher, state_version);

    let encoded = codec::encode_node(&node, state_version);
    Ok(MerkleValue::of_encoding(encoded, is_root, |e| hasher.hash(e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::MemoryStore;

    struct Blake2bHasher;
    impl Hasher for Blake2bHasher {
        fn hash(&self, data: &[u8]) -> [u8; 32] {
            use blake2::digest::{Input as _, VariableOutput as _};
            let mut hasher = blake2::VarBlake2b::new_keyed(&[], 32);
            hasher.input(data);
            let mut out = [0u8; 32];
            hasher.variable_result(|res| out.copy_from_slice(res));
            out
        }
    }

    fn empty_root() -> [u8; 32] {
        Blake2bHasher.hash(&[0u8])
    }

    #[test]
    fn put_then_get() {
        let mut store = MemoryStore::new();
        let mut trie = TrieDb::new(&mut store, Blake2bHasher, empty_root(), StateVersion::V0);
        trie.put(b"abc", b"123".to_vec());
        trie.commit(None).unwrap();
        assert_eq!(trie.get(b"abc").unwrap(), Some(b"123".to_vec()));
        assert_eq!(trie.get(b"missing").unwrap(), None);
    }

    #[test]
    fn remove_drops_key() {
        let mut store = MemoryStore::new();
        let mut trie = TrieDb::new(&mut store, Blake2bHasher, empty_root(), StateVersion::V0);
        trie.put(b"abc", b"123".to_vec());
        trie.commit(None).unwrap();
        trie.remove(b"abc");
        trie.commit(None).unwrap();
        assert_eq!(trie.get(b"abc").unwrap(), None);
    }

    #[test]
    fn root_matches_calculate_root() {
        use crate::trie::calculate_root;
        use alloc::borrow::Cow;
        use alloc::collections::BTreeMap as StdBTreeMap;

        let mut store = MemoryStore::new();
        let mut trie = TrieDb::new(&mut store, Blake2bHasher, empty_root(), StateVersion::V0);
        trie.put(b"abc", b"123".to_vec());
        trie.put(b"cde", b"345".to_vec());
        let root = trie.commit(None).unwrap();

        let mut flat: StdBTreeMap<Vec<u8>, Vec<u8>> = StdBTreeMap::new();
        flat.insert(b"abc".to_vec(), b"123".to_vec());
        flat.insert(b"cde".to_vec(), b"345".to_vec());
        let expected = calculate_root::root_merkle_value(calculate_root::Config {
            get_value: &|k: &[u8]| flat.get(k).map(|v| &v[..]),
            prefix_keys: &|prefix: &[u8]| {
                flat.range(prefix.to_vec()..)
                    .take_while(|(k, _)| k.starts_with(prefix))
                    .map(|(k, _)| Cow::from(&k[..]))
                    .collect()
            },
            cache: None,
            state_version: StateVersion::V0,
        });

        assert_eq!(root, expected);
    }
}
