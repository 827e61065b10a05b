//! The light-client request/response protocol (`/{chain}/light/2`): remote call
//! and remote (child-)storage read requests, each answered with a compact storage proof.
//!
//! Grounded on substrate's `sc-network-light` request shapes (`RemoteCallRequest`,
//! `RemoteReadRequest`, `RemoteReadChildRequest`) one-of'd the same way here, with the response
//! carrying the [`crate::trie::proof`] compact encoding rather than a raw node list.

use crate::kv::{Hasher, KeyValueStore};
use crate::proto;
use crate::trie::codec::StateVersion;
use crate::trie::proof;
use crate::trie::storage::TrieDb;
use alloc::string::String;
use alloc::vec::Vec;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    #[error("light-client request carried neither a call, read nor child-read variant")]
    EmptyRequest,
    #[error("light-client response carried neither a call-response nor read-response variant")]
    EmptyResponse,
    #[error("light-client response proof is invalid: {0}")]
    Proof(#[from] proof::Error),
    #[error("trie storage error: {0}")]
    Storage(#[from] crate::trie::storage::Error),
}

/// A `Core_execute_block`-style remote call: run `method(data)` against state at `block`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteCallRequest {
    pub block: [u8; 32],
    pub method: String,
    pub data: Vec<u8>,
}

/// A remote top-trie storage read for a set of keys at `block`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteReadRequest {
    pub block: [u8; 32],
    pub keys: Vec<Vec<u8>>,
}

/// A remote child-trie storage read for a set of keys under `storage_key` at `block`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteReadChildRequest {
    pub block: [u8; 32],
    pub storage_key: Vec<u8>,
    pub keys: Vec<Vec<u8>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LightRequest {
    RemoteCall(RemoteCallRequest),
    RemoteRead(RemoteReadRequest),
    RemoteReadChild(RemoteReadChildRequest),
}

/// Either response carries the same shape: a compact proof sufficient to verify the call's
/// or read's result against the block's `state_root`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LightResponse {
    Call { proof: Vec<u8> },
    Read { proof: Vec<u8> },
}

fn hash32(bytes: &[u8]) -> [u8; 32] {
    let mut out = [0u8; 32];
    let n = bytes.len().min(32);
    out[..n].copy_from_slice(&bytes[..n]);
    out
}

impl LightRequest {
    pub fn to_proto(&self) -> proto::LightClientRequest {
        let request = match self {
            LightRequest::RemoteCall(req) => {
                proto::light_client_request::Request::RemoteCall(proto::RemoteCallRequest {
                    block: req.block.to_vec(),
                    method: req.method.clone(),
                    data: req.data.clone(),
                })
            }
            LightRequest::RemoteRead(req) => {
                proto::light_client_request::Request::RemoteRead(proto::RemoteReadRequest {
                    block: req.block.to_vec(),
                    keys: req.keys.clone(),
                })
            }
            LightRequest::RemoteReadChild(req) => {
                proto::light_client_request::Request::RemoteReadChild(proto::RemoteReadChildRequest {
                    block: req.block.to_vec(),
                    storage_key: req.storage_key.clone(),
                    keys: req.keys.clone(),
                })
            }
        };
        proto::LightClientRequest { request: Some(request) }
    }

    pub fn from_proto(request: proto::LightClientRequest) -> Result<Self, Error> {
        match request.request.ok_or(Error::EmptyRequest)? {
            proto::light_client_request::Request::RemoteCall(req) => {
                Ok(LightRequest::RemoteCall(RemoteCallRequest {
                    block: hash32(&req.block),
                    method: req.method,
                    data: req.data,
                }))
            }
            proto::light_client_request::Request::RemoteRead(req) => {
                Ok(LightRequest::RemoteRead(RemoteReadRequest {
                    block: hash32(&req.block),
                    keys: req.keys,
                }))
            }
            proto::light_client_request::Request::RemoteReadChild(req) => {
                Ok(LightRequest::RemoteReadChild(RemoteReadChildRequest {
                    block: hash32(&req.block),
                    storage_key: req.storage_key,
                    keys: req.keys,
                }))
            }
        }
    }
}

impl LightResponse {
    pub fn to_proto(&self) -> proto::LightClientResponse {
        let response = match self {
            LightResponse::Call { proof } => {
                proto::light_client_response::Response::CallResponse(proto::CallResponse { proof: proof.clone() })
            }
            LightResponse::Read { proof } => {
                proto::light_client_response::Response::ReadResponse(proto::ReadResponse { proof: proof.clone() })
            }
        };
        proto::LightClientResponse { response: Some(response) }
    }

    pub fn from_proto(response: proto::LightClientResponse) -> Result<Self, Error> {
        match response.response.ok_or(Error::EmptyResponse)? {
            proto::light_client_response::Response::CallResponse(r) => Ok(LightResponse::Call { proof: r.proof }),
            proto::light_client_response::Response::ReadResponse(r) => Ok(LightResponse::Read { proof: r.proof }),
        }
    }
}

/// Verifies a [`LightResponse`]'s compact storage proof against `state_root`, persisting its
/// nodes into `store`. A caller that already has a [`TrieDb`] backed by `store` can read through
/// it afterwards; [`verify_read_response`] does this for the common remote-read case directly.
pub fn verify_proof<S: KeyValueStore, H: Hasher>(
    store: &mut S,
    hasher: &H,
    state_root: [u8; 32],
    response: &LightResponse,
) -> Result<(), Error> {
    let proof_bytes = match response {
        LightResponse::Call { proof } => proof,
        LightResponse::Read { proof } => proof,
    };
    proof::decode_compact(store, hasher, proof_bytes, state_root)?;
    Ok(())
}

/// Verifies a [`LightResponse::Read`]'s proof against `state_root`, then resolves each of `keys`
/// against the now-locally-backed trie. A key the proof didn't need to touch (because it's
/// provably absent) resolves to `None` rather than an error.
pub fn verify_read_response<S: KeyValueStore, H: Hasher + Clone>(
    store: &mut S,
    hasher: H,
    state_root: [u8; 32],
    response: &LightResponse,
    keys: &[Vec<u8>],
) -> Result<Vec<(Vec<u8>, Option<Vec<u8>>)>, Error> {
    verify_proof(store, &hasher, state_root, response)?;
    let trie = TrieDb::new(store, hasher, state_root, StateVersion::V1);
    let mut out = Vec::with_capacity(keys.len());
    for key in keys {
        out.push((key.clone(), trie.get(key)?));
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remote_call_request_round_trips_through_proto() {
        let request = LightRequest::RemoteCall(RemoteCallRequest {
            block: [1u8; 32],
            method: "Core_version".into(),
            data: alloc::vec![1, 2, 3],
        });
        let decoded = LightRequest::from_proto(request.to_proto()).unwrap();
        assert_eq!(decoded, request);
    }

    #[test]
    fn remote_read_child_request_round_trips_through_proto() {
        let request = LightRequest::RemoteReadChild(RemoteReadChildRequest {
            block: [2u8; 32],
            storage_key: b":child_storage:default:foo".to_vec(),
            keys: alloc::vec![b"a".to_vec(), b"b".to_vec()],
        });
        let decoded = LightRequest::from_proto(request.to_proto()).unwrap();
        assert_eq!(decoded, request);
    }

    #[test]
    fn empty_request_is_rejected() {
        let proto_request = proto::LightClientRequest { request: None };
        assert!(matches!(LightRequest::from_proto(proto_request), Err(Error::EmptyRequest)));
    }

    #[test]
    fn call_response_round_trips_through_proto() {
        let response = LightResponse::Call { proof: alloc::vec![9, 9] };
        let decoded = LightResponse::from_proto(response.to_proto()).unwrap();
        assert_eq!(decoded, response);
    }

    use crate::kv::MemoryStore;
    use crate::trie::node::{ChildRef, MerkleValue, Node};
    use crate::trie::proof::Recorder;

    #[derive(Clone)]
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

    /// Commits `alice`/`bob` into a fresh trie and records every node reachable from its root,
    /// returning the root and the compact proof covering it.
    fn build_proof() -> ([u8; 32], Vec<u8>, MemoryStore) {
        let mut store = MemoryStore::new();
        let mut trie = TrieDb::new(&mut store, Blake2bHasher, empty_root(), StateVersion::V1);
        trie.put(b"alice", b"100".to_vec());
        trie.put(b"bob", b"200".to_vec());
        let root = trie.commit(None).unwrap();

        let mut recorder = Recorder::new();
        let mut frontier = alloc::vec::Vec::from([root]);
        while let Some(hash) = frontier.pop() {
            let encoded = store.get_node(&hash).expect("node referenced by the committed trie must exist");
            recorder.record(hash, encoded.clone());
            if let Node::Branch { children, .. } = crate::trie::codec::decode_node(&encoded).unwrap() {
                for child in children.iter().flatten() {
                    if let ChildRef::Stored(MerkleValue::Hash(h)) = child {
                        frontier.push(*h);
                    }
                }
            }
        }
        let compact = proof::encode_compact(root, &recorder.into_nodes(), StateVersion::V1).unwrap();
        (root, compact, store)
    }

    #[test]
    fn verify_read_response_recovers_values_from_a_compact_proof() {
        let (root, compact, _source_store) = build_proof();
        let response = LightResponse::Read { proof: compact };

        let mut verifier_store = MemoryStore::new();
        let keys = alloc::vec![b"alice".to_vec(), b"bob".to_vec(), b"carol".to_vec()];
        let resolved = verify_read_response(&mut verifier_store, Blake2bHasher, root, &response, &keys).unwrap();

        assert_eq!(resolved[0], (b"alice".to_vec(), Some(b"100".to_vec())));
        assert_eq!(resolved[1], (b"bob".to_vec(), Some(b"200".to_vec())));
        assert_eq!(resolved[2], (b"carol".to_vec(), None));
    }

    #[test]
    fn verify_read_response_rejects_a_proof_for_the_wrong_root() {
        let (_root, compact, _source_store) = build_proof();
        let response = LightResponse::Read { proof: compact };

        let mut verifier_store = MemoryStore::new();
        let keys = alloc::vec![b"alice".to_vec()];
        let wrong_root = [0xffu8; 32];
        assert!(matches!(
            verify_read_response(&mut verifier_store, Blake2bHasher, wrong_root, &response, &keys),
            Err(Error::Proof(_))
        ));
    }
}
