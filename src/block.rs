//! Blocks, extrinsics and the extrinsics-root calculation.
//!
//! Shapes grounded on `allchain-substrate-lite`'s `network/legacy_message/block.rs`
//! (`Header{parent_hash, number, state_root, extrinsics_root, digest}`, `Extrinsic(Vec<u8>)`,
//! `Block{header, extrinsics}`, `StorageProof{trie_nodes}`), adapted here to the crate's own
//! header type ([`crate::header`]) instead of a hand-rolled `Digest`.

use crate::header::{self, HeaderRef};
use crate::trie::calculate_root::{self, Config};
use crate::trie::codec::StateVersion;
use alloc::borrow::Cow;
use alloc::collections::BTreeMap;
use alloc::vec::Vec;
use parity_scale_codec::{Compact, Encode};

/// A cheap `{hash, number}` block reference, used pervasively in place of a full header wherever
/// only identity/height matters (kagome's `primitives::BlockInfo`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BlockInfo {
    pub hash: [u8; 32],
    pub number: u64,
}

/// An opaque extrinsic: this crate never interprets its contents, only orders and hashes them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extrinsic(pub Vec<u8>);

/// A full block: header plus body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    pub header: Vec<u8>,
    pub extrinsics: Vec<Extrinsic>,
}

/// A set of trie nodes sufficient to verify some claim about a block's state, in the same shape
/// produced by [`crate::trie::proof`].
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StorageProof {
    pub trie_nodes: Vec<Vec<u8>>,
}

/// Computes the extrinsics-root: the trie root of the mapping `compact(index) -> encode(extrinsic)`
/// over the block body, built as an ordered trie.
pub fn extrinsics_root(extrinsics: &[Extrinsic]) -> [u8; 32] {
    let mut flat: BTreeMap<Vec<u8>, Vec<u8>> = BTreeMap::new();
    for (index, extrinsic) in extrinsics.iter().enumerate() {
        let key = Compact(index as u64).encode();
        flat.insert(key, extrinsic.0.clone());
    }

    calculate_root::root_merkle_value(Config {
        get_value: &|k: &[u8]| flat.get(k).map(|v| &v[..]),
        prefix_keys: &|prefix: &[u8]| {
            flat.range(prefix.to_vec()..)
                .take_while(|(k, _)| k.starts_with(prefix))
                .map(|(k, _)| Cow::from(&k[..]))
                .collect()
        },
        cache: None,
        state_version: StateVersion::V0,
    })
}

/// Verifies that `header`'s `extrinsics_root` matches the actual body.
pub fn verify_extrinsics_root(header: &HeaderRef<'_>, extrinsics: &[Extrinsic]) -> bool {
    *header.extrinsics_root == extrinsics_root(extrinsics)
}

/// Decodes a block's header bytes, a thin wrapper kept so callers needn't import
/// [`crate::header`] directly just to look at a [`Block`].
pub fn decode_header(block: &Block) -> Result<HeaderRef<'_>, header::Error> {
    header::decode(&block.header)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extrinsics_root_empty_body() {
        let root = extrinsics_root(&[]);
        // blake2b-256 of the single empty-node byte 0x00.
        use blake2::digest::{Input as _, VariableOutput as _};
        let mut hasher = blake2::VarBlake2b::new_keyed(&[], 32);
        hasher.input(&[0x00]);
        let mut expected = [0u8; 32];
        hasher.variable_result(|r| expected.copy_from_slice(r));
        assert_eq!(root, expected);
    }

    #[test]
    fn extrinsics_root_is_order_sensitive_on_index() {
        let a = [Extrinsic(alloc::vec![1]), Extrinsic(alloc::vec![2])];
        let b = [Extrinsic(alloc::vec![2]), Extrinsic(alloc::vec![1])];
        assert_ne!(extrinsics_root(&a), extrinsics_root(&b));
    }
}
