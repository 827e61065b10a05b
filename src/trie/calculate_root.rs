//! Freestanding function that calculates the root of a radix-16 Merkle-Patricia trie directly
//! from a key/value callback, without building a persisted node graph first.
//!
//! This is a direct generalization of the original `calculate_root` module: same callback-based
//! [`Config`] and the same recursive node-value algorithm, extended here with the state-version-1
//! hashed-value eviction policy and switched from `blake2_rfc` to the `blake2` crate used
//! elsewhere in this crate. Kept as its own entry point (rather than folded into
//! [`crate::trie::storage`]) because, like the original, it is useful whenever the caller already
//! has the full key set in a plain map and does not need incremental commits — e.g. building the
//! one-shot extrinsics-root or a changes-trie root.

use crate::nibble::{common_prefix, Nibble, NibbleVec};
use crate::trie::codec::{StateVersion, HASHED_VALUE_THRESHOLD};
use alloc::borrow::Cow;
use alloc::collections::BTreeMap;
use alloc::vec::Vec;
use blake2::digest::{Input as _, VariableOutput as _};
use parity_scale_codec::Encode as _;

/// How to access the trie's flat key/value storage.
pub struct Config<'a, 'b> {
    /// Returns the value associated with a key, if any.
    pub get_value: &'a dyn Fn(&[u8]) -> Option<&'b [u8]>,
    /// Returns every key that starts with the given prefix.
    pub prefix_keys: &'a dyn Fn(&[u8]) -> Vec<Cow<'b, [u8]>>,
    /// Cache of previously computed node values, read and updated in place.
    pub cache: Option<&'a mut CalculationCache>,
    /// Whether values of at least [`HASHED_VALUE_THRESHOLD`] bytes are stored by hash.
    pub state_version: StateVersion,
}

/// Cache of intermediate node-value calculations, keyed by the node's full nibble key.
///
/// Must be explicitly invalidated (`invalidate_prefix`) whenever the underlying storage changes;
/// this implementation takes the same shortcut as the original and clears the whole cache on any
/// invalidation rather than tracking which entries are actually affected.
pub struct CalculationCache {
    node_values: BTreeMap<NibbleVec, Vec<u8>>,
}

impl CalculationCache {
    pub fn empty() -> Self {
        CalculationCache {
            node_values: BTreeMap::new(),
        }
    }

    pub fn invalidate_prefix(&mut self, _prefix: &[u8]) {
        self.node_values.clear();
    }
}

impl Default for CalculationCache {
    fn default() -> Self {
        Self::empty()
    }
}

fn blake2b_256(data: &[u8]) -> [u8; 32] {
    let mut hasher = blake2::VarBlake2b::new_keyed(&[], 32);
    hasher.input(data);
    let mut out = [0u8; 32];
    hasher.variable_result(|res| out.copy_from_slice(res));
    out
}

/// Calculates the Merkle value of the root node over the whole key set.
pub fn root_merkle_value(mut config: Config) -> [u8; 32] {
    let keys = (config.prefix_keys)(&[]);
    let key_from_root = common_prefix(keys.iter().map(|k| &**k)).unwrap_or_else(NibbleVec::new);

    let val_vec = merkle_value(&mut config, NibbleVec::new(), None, key_from_root);

    let mut out = [0; 32];
    out.copy_from_slice(&val_vec);
    out
}

fn merkle_value(
    config: &mut Config,
    parent_key: NibbleVec,
    child_index: Option<Nibble>,
    partial_key: NibbleVec,
) -> Vec<u8> {
    let is_root = child_index.is_none();
    let node_value = node_value(config, parent_key, child_index, partial_key);

    if is_root || node_value.len() >= 32 {
        blake2b_256(&node_value).to_vec()
    } else {
        node_value
    }
}

fn node_value(
    config: &mut Config,
    parent_key: NibbleVec,
    child_index: Option<Nibble>,
    partial_key: NibbleVec,
) -> Vec<u8> {
    let combined_key = {
        let mut combined = parent_key.clone();
        if let Some(idx) = child_index {
            combined.push(idx);
        }
        combined.extend(partial_key.as_slice());
        combined
    };

    if let Some(cache) = &mut config.cache {
        if let Some(value) = cache.node_values.get(&combined_key) {
            return value.clone();
        }
    }

    let partial_key_packed = partial_key.to_packed_bytes();

    let stored_value = if combined_key.len() % 2 == 0 {
        (config.get_value)(&combined_key.to_bytes_truncate()).map(|v| v.to_vec())
    } else {
        None
    };

    let mut children_bitmap = 0u16;
    let mut children_partial_keys = Vec::<(Nibble, NibbleVec)>::new();
    for child in child_nodes(config, &combined_key) {
        let child_index = child.as_slice()[combined_key.len()];
        children_bitmap |= 1 << u32::from(child_index.0);
        let child_partial_key =
            NibbleVec::from_nibbles(child.as_slice()[combined_key.len() + 1..].to_vec());
        children_partial_keys.push((child_index, child_partial_key));
    }

    let hashed_value = matches!(config.state_version, StateVersion::V1)
        && stored_value.as_ref().map_or(false, |v| v.len() >= HASHED_VALUE_THRESHOLD);

    let header = {
        let two_msb: u8 = match (stored_value.is_some(), children_bitmap != 0) {
            (false, false) => {
                debug_assert!(combined_key.is_empty());
                0b00
            }
            (true, false) => 0b01,
            (false, true) => 0b10,
            (true, true) => 0b11,
        };

        let mut pk_len = partial_key.len();
        if pk_len >= 63 {
            pk_len -= 63;
            let mut header = alloc::vec![(two_msb << 6) + 63];
            while pk_len > 255 {
                pk_len -= 255;
                header.push(255);
            }
            header.push(u8::try_from(pk_len).unwrap());
            header
        } else {
            alloc::vec![(two_msb << 6) + u8::try_from(pk_len).unwrap()]
        }
    };

    let node_subvalue = {
        if children_bitmap == 0 {
            match (stored_value, hashed_value) {
                (Some(v), true) => blake2b_256(&v).to_vec(),
                (Some(v), false) => v.encode(),
                (None, _) => Vec::new(),
            }
        } else {
            let mut out = children_bitmap.to_le_bytes().to_vec();
            for (child_index, child_partial_key) in children_partial_keys {
                let child_merkle_value =
                    merkle_value(config, combined_key.clone(), Some(child_index), child_partial_key);
                out.extend(child_merkle_value.encode());
            }
            match (stored_value, hashed_value) {
                (Some(v), true) => out.extend(blake2b_256(&v)),
                (Some(v), false) => out.extend(v.encode()),
                (None, _) => {}
            }
            out
        }
    };

    let mut node_value = header;
    node_value.extend(partial_key_packed);
    node_value.extend(node_subvalue);

    if let Some(cache) = &mut config.cache {
        cache.node_values.insert(combined_key, node_value.clone());
    }

    node_value
}

fn child_nodes(config: &mut Config, key: &NibbleVec) -> impl Iterator<Item = NibbleVec> {
    let base_len = key.len();

    let mut out = Vec::new();
    for n in 0..16 {
        let mut key_clone = key.clone();
        key_clone.truncate(base_len);
        key_clone.push(Nibble(n));
        let descendants = descendant_storage_keys(config, &key_clone).collect::<Vec<_>>();
        if let Some(prefix) = common_prefix(descendants.iter().map(|k| &**k)) {
            out.push(prefix);
        }
    }
    out.into_iter()
}

fn descendant_storage_keys<'a>(
    config: &'a Config,
    key: &'a NibbleVec,
) -> impl Iterator<Item = Cow<'a, [u8]>> + 'a {
    let equiv_full_bytes = key.to_bytes_truncate();
    (config.prefix_keys)(&equiv_full_bytes)
        .into_iter()
        .filter(move |k| key.is_ancestor_or_equal_bytes(k))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_of_empty_trie() {
        let storage: BTreeMap<Vec<u8>, Vec<u8>> = BTreeMap::new();
        let root = root_merkle_value(Config {
            get_value: &|k: &[u8]| storage.get(k).map(|v| &v[..]),
            prefix_keys: &|prefix: &[u8]| {
                storage
                    .range(prefix.to_vec()..)
                    .take_while(|(k, _)| k.starts_with(prefix))
                    .map(|(k, _)| Cow::from(&k[..]))
                    .collect()
            },
            cache: None,
            state_version: StateVersion::V0,
        });
        // blake2b-256 of the single empty-node byte 0x00.
        assert_eq!(root, blake2b_256(&[0x00]));
    }

    #[test]
    fn root_order_independent() {
        let mut a: BTreeMap<Vec<u8>, Vec<u8>> = BTreeMap::new();
        a.insert(b"abc".to_vec(), b"123".to_vec());
        a.insert(b"cde".to_vec(), b"345".to_vec());

        let mut b: BTreeMap<Vec<u8>, Vec<u8>> = BTreeMap::new();
        b.insert(b"cde".to_vec(), b"345".to_vec());
        b.insert(b"abc".to_vec(), b"123".to_vec());

        let root_of = |storage: &BTreeMap<Vec<u8>, Vec<u8>>| {
            root_merkle_value(Config {
                get_value: &|k: &[u8]| storage.get(k).map(|v| &v[..]),
                prefix_keys: &|prefix: &[u8]| {
                    storage
                        .range(prefix.to_vec()..)
                        .take_while(|(k, _)| k.starts_with(prefix))
                        .map(|(k, _)| Cow::from(&k[..]))
                        .collect()
                },
                cache: None,
                state_version: StateVersion::V0,
            })
        };

        assert_eq!(root_of(&a), root_of(&b));
    }
}
