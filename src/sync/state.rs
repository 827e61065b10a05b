//! Cursor-based state (warp) sync: walks the target block's state trie top-down, requesting
//! unknown subtrees a batch at a time, until every reachable node (including child-trie
//! subtrees) has been pulled and persisted.
//!
//! Directly grounded on kagome's `StateSyncRequestFlow::nextRequest()`/`onResponse()`/`isKnown()`
//! (`network/impl/state_sync_request_flow.cpp`): a stack of partially-descended nodes per trie
//! "level", where a level is pushed whenever descent crosses into a child trie, and a response
//! that doesn't fully resolve the current stack just leaves it in place for the next request.

use crate::kv::{Hasher, KeyValueStore};
use crate::nibble::{Nibble, NibbleVec};
use crate::proto;
use crate::trie::codec::{self};
use crate::trie::node::{ChildRef, MerkleValue, Node, ValueSlot};
use crate::trie::{is_child_storage_key, CHILD_STORAGE_PREFIX};
use alloc::collections::BTreeSet;
use alloc::vec::Vec;
use hashbrown::HashMap;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    #[error("state response contained no usable proof nodes")]
    EmptyResponse,
    #[error("trie codec error decoding a state response node: {0}")]
    Codec(#[from] codec::Error),
    #[error("scale codec error decoding a state response proof: {0}")]
    Scale(parity_scale_codec::Error),
}

/// The wire request a [`StateSyncFlow`] wants sent next: one nibble-prefix per open level,
/// serialized to bytes with odd-length prefixes padded by one trailing zero nibble.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateRequest {
    pub block_hash: [u8; 32],
    pub start: Vec<Vec<u8>>,
    pub no_proof: bool,
}

impl StateRequest {
    pub fn to_proto(&self) -> proto::StateRequest {
        proto::StateRequest {
            block: self.block_hash.to_vec(),
            start: self.start.clone(),
            no_proof: self.no_proof,
        }
    }

    pub fn from_proto(request: proto::StateRequest) -> Self {
        let mut block_hash = [0u8; 32];
        let n = request.block.len().min(32);
        block_hash[..n].copy_from_slice(&request.block[..n]);
        StateRequest {
            block_hash,
            start: request.start,
            no_proof: request.no_proof,
        }
    }
}

/// One flat key/value batch for a trie level, returned instead of a proof when the request set
/// `no_proof`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateEntry {
    pub state_root: [u8; 32],
    pub entries: Vec<(Vec<u8>, Vec<u8>)>,
    pub complete: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StateResponse {
    pub entries: Vec<StateEntry>,
    pub proof: Vec<u8>,
}

impl StateResponse {
    pub fn to_proto(&self) -> proto::StateResponse {
        proto::StateResponse {
            entries: self
                .entries
                .iter()
                .map(|entry| proto::StateEntry {
                    state_root: entry.state_root.to_vec(),
                    entries: entry
                        .entries
                        .iter()
                        .map(|(k, v)| proto::KeyValue { key: k.clone(), value: v.clone() })
                        .collect(),
                    complete: entry.complete,
                })
                .collect(),
            proof: self.proof.clone(),
        }
    }

    pub fn from_proto(response: proto::StateResponse) -> Self {
        StateResponse {
            entries: response
                .entries
                .into_iter()
                .map(|entry| {
                    let mut state_root = [0u8; 32];
                    let n = entry.state_root.len().min(32);
                    state_root[..n].copy_from_slice(&entry.state_root[..n]);
                    StateEntry {
                        state_root,
                        entries: entry.entries.into_iter().map(|kv| (kv.key, kv.value)).collect(),
                        complete: entry.complete,
                    }
                })
                .collect(),
            proof: response.proof,
        }
    }
}

struct Item {
    node: Node,
    /// Nibble child index we're currently resuming descent from; `None` until the value at this
    /// node has been checked and we start walking children.
    branch: Option<u8>,
    /// Whether this item's value, once resolved, should be interpreted as a child-trie root
    /// rather than ordinary storage. Only ever `true` while still in the outermost level.
    is_child_root_candidate: bool,
}

struct Level {
    root: [u8; 32],
    stack: Vec<Item>,
}

/// What happened while trying to fully resolve one level's stack against the currently-available
/// proof nodes.
enum Progress {
    /// The level's stack was fully walked and popped; the level is done.
    Done,
    /// A child-trie root was found; the caller should push a new level and revisit this one once
    /// that level completes.
    DescendIntoChildTrie([u8; 32]),
    /// A needed node isn't in `nodes` yet; wait for the next response.
    Stalled,
}

/// Drives one state-sync target (one block's state root) to completion across possibly many
/// request/response round trips.
pub struct StateSyncFlow<'s, S: KeyValueStore, H: Hasher> {
    store: &'s mut S,
    hasher: H,
    block_hash: [u8; 32],
    known: BTreeSet<[u8; 32]>,
    levels: Vec<Level>,
}

impl<'s, S: KeyValueStore, H: Hasher> StateSyncFlow<'s, S, H> {
    pub fn new(store: &'s mut S, hasher: H, block_hash: [u8; 32], state_root: [u8; 32]) -> Self {
        let known_root = hasher.hash(&[0u8]) == state_root || store.contains_node(&state_root);
        let mut flow =
            StateSyncFlow { store, hasher, block_hash, known: BTreeSet::new(), levels: Vec::new() };
        if !known_root {
            flow.levels.push(Level { root: state_root, stack: Vec::new() });
        }
        flow
    }

    pub fn is_complete(&self) -> bool {
        self.levels.is_empty()
    }

    /// Builds the next [`StateRequest`] to send the peer, always proof-carrying: this flow only
    /// understands proof nodes, never the flat `no_proof` key/value form.
    pub fn next_wire_request(&self) -> StateRequest {
        StateRequest { block_hash: self.block_hash, start: self.next_request(), no_proof: false }
    }

    /// Unwraps a [`StateResponse`]'s `proof` field, a SCALE-encoded flat list of raw trie nodes
    /// keyed by their own hash (not the node-elided `encode_compact` form `[crate::trie::proof]`
    /// uses, since this flow resolves nodes by hash lookup rather than by positional descent), and
    /// feeds it through [`Self::on_response`]. Flat `no_proof` entries are rejected: this flow only
    /// ever reconstructs a trie from proof nodes.
    pub fn apply_wire_response(&mut self, response: &StateResponse) -> Result<(), Error> {
        if !response.entries.is_empty() {
            return Err(Error::EmptyResponse);
        }
        let nodes: Vec<Vec<u8>> =
            parity_scale_codec::Decode::decode(&mut &response.proof[..]).map_err(Error::Scale)?;
        self.on_response(&nodes)
    }

    /// Builds the set of nibble-path prefixes the peer should send proof nodes for: one path per
    /// currently-open level, reconstructed from that level's descent stack.
    pub fn next_request(&self) -> Vec<Vec<u8>> {
        self.levels
            .iter()
            .map(|level| {
                let mut nibbles = NibbleVec::new();
                for item in &level.stack {
                    nibbles.extend(item.node.partial_key().as_slice());
                    if let Some(branch) = item.branch {
                        nibbles.push(Nibble(branch));
                    }
                }
                nibbles.to_packed_bytes()
            })
            .collect()
    }

    /// Feeds a batch of raw encoded proof nodes into the flow, persisting everything that becomes
    /// resolvable and advancing the descent. Returns `Ok(())` whether or not sync reached
    /// completion; check [`Self::is_complete`] afterwards. An empty, unusable response is reported
    /// as an error so the caller can penalize the peer.
    pub fn on_response(&mut self, proof_nodes: &[Vec<u8>]) -> Result<(), Error> {
        if proof_nodes.is_empty() {
            tracing::warn!("aborting state sync flow: peer sent an empty proof response");
            return Err(Error::EmptyResponse);
        }

        let mut nodes: HashMap<[u8; 32], Vec<u8>> = HashMap::new();
        for encoded in proof_nodes {
            nodes.insert(self.hasher.hash(encoded), encoded.clone());
        }

        while let Some(mut level) = self.levels.pop() {
            let is_outermost = self.levels.is_empty();
            match advance_level(&mut level, &mut nodes, &mut self.known, self.store, is_outermost)? {
                Progress::Done => {}
                Progress::DescendIntoChildTrie(child_root) => {
                    self.levels.push(level);
                    if !self.known.contains(&child_root) && !self.store.contains_node(&child_root) {
                        self.levels.push(Level { root: child_root, stack: Vec::new() });
                    }
                }
                Progress::Stalled => {
                    self.levels.push(level);
                    return Ok(());
                }
            }
        }

        Ok(())
    }
}

/// Walks `level`'s stack as far as the currently-available `nodes` allow, persisting every node
/// it resolves along the way.
fn advance_level<S: KeyValueStore>(
    level: &mut Level,
    nodes: &mut HashMap<[u8; 32], Vec<u8>>,
    known: &mut BTreeSet<[u8; 32]>,
    store: &mut S,
    is_outermost: bool,
) -> Result<Progress, Error> {
    loop {
        if level.stack.is_empty() {
            let Some(encoded) = nodes.remove(&level.root) else {
                return Ok(Progress::Stalled);
            };
            let node = codec::decode_node(&encoded)?;
            store.put_node(level.root, encoded);
            known.insert(level.root);
            level.stack.push(Item { node, branch: None, is_child_root_candidate: is_outermost });
        }

        let value_resolved = {
            let top = level.stack.last_mut().expect("just ensured non-empty");
            if top.branch.is_none() {
                if let ValueSlot::Hashed(hash) = top.node.value() {
                    if !known.contains(hash) && !store.contains_node(hash) {
                        let Some(value_bytes) = nodes.remove(hash) else {
                            return Ok(Progress::Stalled);
                        };
                        store.put_value(*hash, value_bytes);
                        known.insert(*hash);
                    }
                }
                top.branch = Some(0);
            }
            true
        };
        let _ = value_resolved;

        let accumulated_prefix_is_child_storage = {
            let top = level.stack.last().expect("just ensured non-empty");
            top.is_child_root_candidate && path_so_far_is_child_storage_prefix(level)
        };

        if accumulated_prefix_is_child_storage {
            let top = level.stack.last().expect("just ensured non-empty");
            if let ValueSlot::Inline(bytes) = top.node.value() {
                if bytes.len() == 32 {
                    let mut root = [0u8; 32];
                    root.copy_from_slice(bytes);
                    return Ok(Progress::DescendIntoChildTrie(root));
                }
            }
        }

        let mut next_child: Option<(u8, [u8; 32])> = None;
        {
            let top = level.stack.last().expect("just ensured non-empty");
            let start = top.branch.unwrap_or(0);
            if let Node::Branch { children, .. } = &top.node {
                for index in start..16 {
                    if let Some(ChildRef::Stored(MerkleValue::Hash(hash))) = &children[index as usize] {
                        if !known.contains(hash) && !store.contains_node(hash) {
                            next_child = Some((index, *hash));
                            break;
                        }
                    }
                }
            }
        }

        if let Some((index, hash)) = next_child {
            let Some(encoded) = nodes.remove(&hash) else {
                return Ok(Progress::Stalled);
            };
            let child_node = codec::decode_node(&encoded)?;
            store.put_node(hash, encoded);
            known.insert(hash);
            level.stack.last_mut().expect("just ensured non-empty").branch = Some(index + 1);
            level.stack.push(Item { node: child_node, branch: None, is_child_root_candidate: is_outermost });
            continue;
        }

        level.stack.pop();
        if level.stack.is_empty() {
            return Ok(Progress::Done);
        }
    }
}

fn path_so_far_is_child_storage_prefix(level: &Level) -> bool {
    let mut nibbles = NibbleVec::new();
    for item in &level.stack {
        nibbles.extend(item.node.partial_key().as_slice());
    }
    let bytes = nibbles.to_bytes_truncate();
    is_child_storage_key(&bytes) || CHILD_STORAGE_PREFIX.starts_with(&bytes) || bytes.starts_with(CHILD_STORAGE_PREFIX)
}
