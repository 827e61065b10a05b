//! The block import pipeline: validates a header, fetches its body if needed, executes it against
//! state, and commits or rejects it.
//!
//! Grounded on kagome's `BlockExecutor`/`BlockAppender` staging
//! (header validation before body execution, a 3-way error split so callers can distinguish a
//! block that will never be valid from one whose parent just hasn't arrived yet).

use crate::block::{self, Block};
use crate::block_tree::{BlockTree, NodeHandle};
use crate::executor::{self, RuntimeEngine};
use crate::header;
use crate::kv::{Hasher, KeyValueStore};
use crate::overlay::WorkingState;
use crate::trie::codec::StateVersion;
use crate::trie::storage::TrieDb;

/// Where a block under import currently sits in the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportStage {
    Received,
    AwaitingParent,
    HeaderValidated,
    BodyFetch,
    Executed,
    Committed,
    Finalized,
}

/// The 3-way split callers need: a block can be permanently invalid, merely blocked on a parent
/// that hasn't arrived yet (retry later), or import can fail for reasons unrelated to the block's
/// own validity.
#[derive(Debug, thiserror::Error)]
pub enum ImportError {
    #[error("block is invalid: {0}")]
    InvalidBlock(InvalidBlockReason),
    #[error("parent block {0:x?} not found")]
    ParentNotFound([u8; 32]),
    #[error("internal error during import: {0}")]
    InternalError(executor::Error),
    #[error("trie storage error during import: {0}")]
    Storage(#[from] crate::trie::storage::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, derive_more::Display)]
pub enum InvalidBlockReason {
    #[display(fmt = "header failed to decode: {}", _0)]
    HeaderDecode(HeaderDecodeDisplay),
    #[display(fmt = "extrinsics root does not match body")]
    ExtrinsicsRootMismatch,
    #[display(fmt = "runtime rejected the block: {}", _0)]
    ExecutionRejected(alloc::string::String),
    #[display(fmt = "declared state root does not match the root computed from execution")]
    StateRootMismatch,
}

/// Wraps [`header::Error`] so [`InvalidBlockReason`] can derive the display traits the rest of
/// this module's errors use, without requiring `header::Error` itself to implement them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderDecodeDisplay(pub alloc::string::String);

impl core::fmt::Display for HeaderDecodeDisplay {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Drives a single block through [`ImportStage::Received`] to [`ImportStage::Committed`],
/// threading it into `tree` on success. Finalization is a separate, later step driven by GRANDPA
/// justifications (see [`finalize`]).
///
/// Execution always runs against a [`WorkingState`] overlay; its root is checked against the
/// header's declared `state_root` *before* anything is persisted (invariant: a block with a bad
/// root must not leave any trace in `store`), so a [`InvalidBlockReason::StateRootMismatch`]
/// rejection never writes a single KV entry.
pub fn import_block<S, H, E>(
    block: &Block,
    store: &mut S,
    hasher: H,
    state_version: StateVersion,
    tree: &mut BlockTree<[u8; 32]>,
    engine: &E,
) -> Result<(ImportStage, NodeHandle), ImportError>
where
    S: KeyValueStore,
    H: Hasher,
    E: RuntimeEngine,
{
    let header = header::decode(&block.header).map_err(|err| {
        tracing::warn!(error = %err, "rejecting block with an undecodable header");
        ImportError::InvalidBlock(InvalidBlockReason::HeaderDecode(HeaderDecodeDisplay(
            alloc::format!("{err}"),
        )))
    })?;

    let parent_handle = tree.handle_of(header.parent_hash).ok_or_else(|| {
        tracing::debug!(parent_hash = ?header.parent_hash, "parent not found, enqueueing for retry");
        ImportError::ParentNotFound(*header.parent_hash)
    })?;
    let parent_state_root = *tree.payload(parent_handle);

    if !block::verify_extrinsics_root(&header, &block.extrinsics) {
        tracing::warn!(number = header.number, "rejecting block: extrinsics root does not match body");
        return Err(ImportError::InvalidBlock(InvalidBlockReason::ExtrinsicsRootMismatch));
    }

    let trie = TrieDb::new(store, hasher, parent_state_root, state_version);
    let mut working = WorkingState::new(trie);

    engine
        .initialize_block(block.header.as_slice(), &mut working)
        .map_err(ImportError::InternalError)?;

    engine
        .execute_block(block, &mut working)
        .map_err(|err| match err {
            executor::Error::Trapped(reason) => {
                tracing::warn!(number = header.number, %reason, "runtime trapped executing block");
                ImportError::InvalidBlock(InvalidBlockReason::ExecutionRejected(reason))
            }
            other => {
                tracing::error!(number = header.number, error = %other, "internal error executing block");
                ImportError::InternalError(other)
            }
        })?;

    let computed_root = working.preview_root()?;
    if computed_root != *header.state_root {
        tracing::warn!(
            number = header.number,
            declared = ?header.state_root,
            computed = ?computed_root,
            "consensus fault: declared state root does not match execution"
        );
        return Err(ImportError::InvalidBlock(InvalidBlockReason::StateRootMismatch));
    }
    working.commit()?;

    let block_hash = header::hash_from_scale_encoded_header(&block.header);
    let handle = tree
        .insert(block_hash, header.number, header.parent_hash, computed_root)
        .ok_or(ImportError::ParentNotFound(*header.parent_hash))?;

    Ok((ImportStage::Committed, handle))
}

/// Finalizes `handle` (driven by a GRANDPA justification the caller has already verified),
/// pruning every block outside its ancestry from `tree`. Returns the hashes of pruned blocks so
/// the caller can release their state from the backing trie store.
pub fn finalize(tree: &mut BlockTree<[u8; 32]>, handle: NodeHandle) -> alloc::vec::Vec<[u8; 32]> {
    tree.finalize(handle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::Extrinsic;
    use alloc::vec::Vec;

    struct AcceptingEngine;

    impl RuntimeEngine for AcceptingEngine {
        fn execute_block(&self, _: &Block, _: &mut dyn crate::executor::RuntimeExternalities) -> Result<(), executor::Error> {
            Ok(())
        }
        fn initialize_block(&self, _: &[u8], _: &mut dyn crate::executor::RuntimeExternalities) -> Result<(), executor::Error> {
            Ok(())
        }
        fn finalize_block(&self, _: &mut dyn crate::executor::RuntimeExternalities) -> Result<Vec<u8>, executor::Error> {
            Ok(Vec::new())
        }
        fn apply_extrinsic(&self, _: &[u8], _: &mut dyn crate::executor::RuntimeExternalities) -> Result<bool, executor::Error> {
            Ok(true)
        }
        fn inherent_extrinsics(&self, _: &mut dyn crate::executor::RuntimeExternalities) -> Result<Vec<Vec<u8>>, executor::Error> {
            Ok(Vec::new())
        }
    }

    #[derive(Clone)]
    struct TestHasher;
    impl Hasher for TestHasher {
        fn hash(&self, data: &[u8]) -> [u8; 32] {
            let mut out = [0u8; 32];
            let n = data.len().min(32);
            out[..n].copy_from_slice(&data[..n]);
            out
        }
    }

    /// Writes `key -> value` into whatever externalities it's given, so tests can assert the
    /// resulting state root differs from a block that writes nothing.
    struct WritingEngine(&'static [u8], &'static [u8]);
    impl RuntimeEngine for WritingEngine {
        fn execute_block(&self, _: &Block, ext: &mut dyn crate::executor::RuntimeExternalities) -> Result<(), executor::Error> {
            ext.storage_set(self.0, self.1.to_vec());
            Ok(())
        }
        fn initialize_block(&self, _: &[u8], _: &mut dyn crate::executor::RuntimeExternalities) -> Result<(), executor::Error> {
            Ok(())
        }
        fn finalize_block(&self, _: &mut dyn crate::executor::RuntimeExternalities) -> Result<Vec<u8>, executor::Error> {
            Ok(Vec::new())
        }
        fn apply_extrinsic(&self, _: &[u8], _: &mut dyn crate::executor::RuntimeExternalities) -> Result<bool, executor::Error> {
            Ok(true)
        }
        fn inherent_extrinsics(&self, _: &mut dyn crate::executor::RuntimeExternalities) -> Result<Vec<Vec<u8>>, executor::Error> {
            Ok(Vec::new())
        }
    }

    fn sample_block_with_state_root(state_root: [u8; 32]) -> Block {
        let extrinsics = alloc::vec![Extrinsic(alloc::vec![1, 2, 3])];
        let root = block::extrinsics_root(&extrinsics);
        let header = header::HeaderRef {
            parent_hash: &[0u8; 32],
            number: 1,
            state_root: &state_root,
            extrinsics_root: &root,
            digest: header::DigestRef::empty(),
        };
        let header_bytes = header
            .scale_encoding()
            .fold(Vec::new(), |mut buf, chunk| {
                buf.extend_from_slice(chunk.as_ref());
                buf
            });
        Block { header: header_bytes, extrinsics }
    }

    fn sample_block() -> Block {
        sample_block_with_state_root([0u8; 32])
    }

    fn fresh_tree() -> BlockTree<[u8; 32]> {
        BlockTree::new([0u8; 32], 0, [0u8; 32])
    }

    #[test]
    fn missing_parent_is_reported_distinctly_from_invalid_block() {
        let mut block = sample_block();
        block.header[0] = 0xff; // parent_hash no longer [0u8; 32]
        let mut store = crate::kv::MemoryStore::new();
        let mut tree = fresh_tree();
        let result = import_block(&block, &mut store, TestHasher, StateVersion::V0, &mut tree, &AcceptingEngine);
        assert!(matches!(result, Err(ImportError::ParentNotFound(_))));
    }

    #[test]
    fn well_formed_block_with_known_parent_commits() {
        let block = sample_block();
        let mut store = crate::kv::MemoryStore::new();
        let mut tree = fresh_tree();
        let result = import_block(&block, &mut store, TestHasher, StateVersion::V0, &mut tree, &AcceptingEngine);
        assert!(matches!(result, Ok((ImportStage::Committed, _))));
        let (_, handle) = result.unwrap();
        assert_eq!(tree.hash_of(handle), header::hash_from_scale_encoded_header(&block.header));
    }

    #[test]
    fn tampered_extrinsics_root_is_rejected() {
        let mut block = sample_block();
        block.extrinsics = alloc::vec![Extrinsic(alloc::vec![9, 9, 9])];
        let mut store = crate::kv::MemoryStore::new();
        let mut tree = fresh_tree();
        let result = import_block(&block, &mut store, TestHasher, StateVersion::V0, &mut tree, &AcceptingEngine);
        assert!(matches!(
            result,
            Err(ImportError::InvalidBlock(InvalidBlockReason::ExtrinsicsRootMismatch))
        ));
    }

    #[test]
    fn bad_state_root_is_rejected_and_writes_nothing() {
        // Declares a state root that can't possibly match what `WritingEngine` will produce.
        let block = sample_block_with_state_root([0u8; 32]);
        let mut store = crate::kv::MemoryStore::new();
        let mut tree = fresh_tree();
        let engine = WritingEngine(b"k", b"v");
        let result = import_block(&block, &mut store, TestHasher, StateVersion::V0, &mut tree, &engine);
        assert!(matches!(
            result,
            Err(ImportError::InvalidBlock(InvalidBlockReason::StateRootMismatch))
        ));
        assert!(tree.handle_of(&header::hash_from_scale_encoded_header(&block.header)).is_none());
        assert!(store.is_empty());
    }
}
