//! The working state a block executes against: a trie view plus an in-memory overlay of pending
//! writes, with every mutation forwarded to a [`crate::changes_trie::ChangesTracker`].
//!
//! Grounded on the "Overlay + trie" rule: rather than mutating the persisted trie directly
//! during execution, writes accumulate in the overlay and are only pushed into the
//! [`crate::trie::storage::TrieDb`] at commit time, mirroring Substrate's `OverlayedChanges`.

use crate::changes_trie::ChangesTracker;
use crate::executor::RuntimeExternalities;
use crate::kv::{Hasher, KeyValueStore};
use crate::trie::storage::{self, TrieDb};
use alloc::collections::BTreeMap;
use alloc::vec::Vec;

enum Change {
    Set(Vec<u8>),
    Remove,
}

/// A trie view with an overlay of not-yet-committed writes, exposed to the runtime as
/// [`RuntimeExternalities`] and reconciled into the backing trie by [`Self::commit`].
pub struct WorkingState<'s, S: KeyValueStore, H: Hasher> {
    trie: TrieDb<'s, S, H>,
    overlay: BTreeMap<Vec<u8>, Change>,
    current_extrinsic_index: u32,
    changes: ChangesTracker,
}

impl<'s, S: KeyValueStore, H: Hasher> WorkingState<'s, S, H> {
    pub fn new(trie: TrieDb<'s, S, H>) -> Self {
        WorkingState {
            trie,
            overlay: BTreeMap::new(),
            current_extrinsic_index: crate::changes_trie::NO_EXTRINSIC_INDEX,
            changes: ChangesTracker::new(),
        }
    }

    /// Marks the extrinsic index that subsequent writes should be attributed to in the changes
    /// trie, called by the executor before/after each `apply_extrinsic`.
    pub fn set_current_extrinsic_index(&mut self, index: u32) {
        self.current_extrinsic_index = index;
    }

    pub fn changes(&self) -> &ChangesTracker {
        &self.changes
    }

    /// Pushes every pending overlay write into the wrapped [`TrieDb`]'s own overlay, without
    /// committing it to the backing store. Lets a caller inspect [`Self::preview_root`] before
    /// deciding whether to [`Self::commit`].
    fn stage(&mut self) {
        for (key, change) in core::mem::take(&mut self.overlay) {
            match change {
                Change::Set(value) => self.trie.put(&key, value),
                Change::Remove => self.trie.remove(&key),
            }
        }
    }

    /// Computes what the new storage root would be if [`Self::commit`] were called now, without
    /// writing anything to the backing store.
    pub fn preview_root(&mut self) -> Result<[u8; 32], storage::Error> {
        self.stage();
        self.trie.preview_root()
    }

    /// Pushes all overlay writes into the backing trie, clearing the overlay. Returns the new
    /// storage root. The changes tracker is left populated; callers build the changes-trie root
    /// separately and call [`ChangesTracker::reset`] when moving to the next block.
    pub fn commit(&mut self) -> Result<[u8; 32], storage::Error> {
        self.stage();
        self.trie.commit(None)
    }
}

impl<'s, S: KeyValueStore, H: Hasher> RuntimeExternalities for WorkingState<'s, S, H> {
    fn storage_get(&self, key: &[u8]) -> Option<Vec<u8>> {
        match self.overlay.get(key) {
            Some(Change::Set(value)) => Some(value.clone()),
            Some(Change::Remove) => None,
            None => self.trie.get(key).ok().flatten(),
        }
    }

    fn storage_set(&mut self, key: &[u8], value: Vec<u8>) {
        self.overlay.insert(key.to_vec(), Change::Set(value));
        self.changes.note_write(key, self.current_extrinsic_index);
    }

    fn storage_remove(&mut self, key: &[u8]) {
        self.overlay.insert(key.to_vec(), Change::Remove);
        self.changes.note_write(key, self.current_extrinsic_index);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::MemoryStore;

    struct TestHasher;
    impl Hasher for TestHasher {
        fn hash(&self, data: &[u8]) -> [u8; 32] {
            let mut out = [0u8; 32];
            let n = data.len().min(32);
            out[..n].copy_from_slice(&data[..n]);
            out
        }
    }

    #[test]
    fn uncommitted_writes_are_visible_through_overlay() {
        let mut store = MemoryStore::new();
        let trie = TrieDb::new(&mut store, TestHasher, [0u8; 32], crate::trie::codec::StateVersion::V1);
        let mut state = WorkingState::new(trie);
        assert_eq!(state.storage_get(b"a"), None);
        state.storage_set(b"a", alloc::vec![1]);
        assert_eq!(state.storage_get(b"a"), Some(alloc::vec![1]));
    }

    #[test]
    fn writes_are_attributed_to_current_extrinsic() {
        let mut store = MemoryStore::new();
        let trie = TrieDb::new(&mut store, TestHasher, [0u8; 32], crate::trie::codec::StateVersion::V1);
        let mut state = WorkingState::new(trie);
        state.set_current_extrinsic_index(3);
        state.storage_set(b"a", alloc::vec![1]);
        assert_eq!(state.changes().extrinsic_indices_for(b"a"), alloc::vec![3]);
    }
}
