//! Radix-16 Merkle-Patricia trie: node codec, persisted storage engine, and proof generation.
//!
//! This Substrate/Polkadot-specific trie is a data structure that associates keys with values and
//! allows efficient verification of the integrity of the data. See [`calculate_root`] for the
//! freestanding root-only entry point and [`storage`] for the full read/write engine.

pub mod calculate_root;
pub mod codec;
pub mod node;
pub mod proof;
pub mod storage;

pub use codec::{Error as CodecError, StateVersion};
pub use node::{ChildRef, MerkleValue, Node, ValueSlot};
pub use proof::{is_child_storage_key, CHILD_STORAGE_PREFIX};
pub use storage::{Error as StorageError, TrieDb};
