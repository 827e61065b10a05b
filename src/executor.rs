//! The WASM runtime boundary: this crate drives block execution by calling into a host-supplied
//! engine, never by interpreting runtime bytecode itself (an explicit Non-goal).
//!
//! Grounded on the `crypto::Hasher`/`RuntimeEngine`-style capability-set
//! traits named in the design notes; the entry point names (`Core_execute_block`,
//! `Core_initialize_block`) mirror Substrate's runtime API naming convention.

use crate::block::Block;
use alloc::vec::Vec;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("runtime trapped: {0}")]
    Trapped(alloc::string::String),
    #[error("runtime returned data that failed to decode")]
    BadOutput,
    #[error("storage access failed: {0}")]
    Storage(alloc::string::String),
}

/// A read/write view over state that the runtime observes and mutates during execution, backed
/// by a [`crate::overlay::WorkingState`] in the concrete implementation.
pub trait RuntimeExternalities {
    fn storage_get(&self, key: &[u8]) -> Option<Vec<u8>>;
    fn storage_set(&mut self, key: &[u8], value: Vec<u8>);
    fn storage_remove(&mut self, key: &[u8]);
}

/// The host-supplied WASM engine. A concrete implementation instantiates the runtime blob,
/// exposes host functions (storage, crypto, logging) and invokes exported entry points.
pub trait RuntimeEngine {
    /// Runs `Core_execute_block`, applying `block`'s extrinsics against `externalities` and
    /// returning an error if the runtime traps or any invariant it checks fails.
    fn execute_block(&self, block: &Block, externalities: &mut dyn RuntimeExternalities) -> Result<(), Error>;

    /// Runs `Core_initialize_block`, called before extrinsics are applied.
    fn initialize_block(&self, header: &[u8], externalities: &mut dyn RuntimeExternalities) -> Result<(), Error>;

    /// Runs `BlockBuilder_finalize_block` during production, returning the finished header.
    fn finalize_block(&self, externalities: &mut dyn RuntimeExternalities) -> Result<Vec<u8>, Error>;

    /// Runs `BlockBuilder_apply_extrinsic` during production, returning whether the extrinsic was
    /// accepted into the block.
    fn apply_extrinsic(
        &self,
        extrinsic: &[u8],
        externalities: &mut dyn RuntimeExternalities,
    ) -> Result<bool, Error>;

    /// Runs `BlockBuilder_inherent_extrinsics`, asking the runtime for the extrinsics it wants
    /// pushed first into a block under construction (timestamp, parachain bits, etc.), called
    /// once right after [`Self::initialize_block`] during production.
    fn inherent_extrinsics(&self, externalities: &mut dyn RuntimeExternalities) -> Result<Vec<Vec<u8>>, Error>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::collections::BTreeMap;

    struct MapExternalities(BTreeMap<Vec<u8>, Vec<u8>>);

    impl RuntimeExternalities for MapExternalities {
        fn storage_get(&self, key: &[u8]) -> Option<Vec<u8>> {
            self.0.get(key).cloned()
        }
        fn storage_set(&mut self, key: &[u8], value: Vec<u8>) {
            self.0.insert(key.to_vec(), value);
        }
        fn storage_remove(&mut self, key: &[u8]) {
            self.0.remove(key);
        }
    }

    #[test]
    fn map_externalities_roundtrip_set_get_remove() {
        let mut ext = MapExternalities(BTreeMap::new());
        ext.storage_set(b"a", alloc::vec![1, 2, 3]);
        assert_eq!(ext.storage_get(b"a"), Some(alloc::vec![1, 2, 3]));
        ext.storage_remove(b"a");
        assert_eq!(ext.storage_get(b"a"), None);
    }
}
