//! The transport capability set and protocol identifiers consumed by [`crate::sync`].
//!
//! Grounded on sc-network's `StreamTransport`/per-chain protocol naming conventions
//! (`/{chain}/sync/2`, `/{chain}/state/2`, `/{chain}/light/2`); actual substream multiplexing,
//! NAT traversal and peer scoring are out of scope and live entirely behind this trait.

use alloc::string::String;
use alloc::vec::Vec;

pub mod codec;

/// Opaque remote peer handle; equality and ordering are all this crate ever needs from a peer
/// identity (e.g. for per-peer request dedup in [`crate::sync::blocks`]).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PeerId(pub Vec<u8>);

/// A single length-delimited request/response exchange over some named protocol, abstracting away
/// whatever multiplexed-stream transport carries it.
#[async_trait::async_trait]
pub trait StreamTransport {
    type Error;

    async fn request(
        &self,
        peer: &PeerId,
        protocol: &str,
        request: Vec<u8>,
    ) -> Result<Vec<u8>, Self::Error>;
}

/// Builds the sync-protocol name for a given chain, e.g. `/polkadot/sync/2`.
pub fn sync_protocol_id(chain_name: &str) -> String {
    alloc::format!("/{chain_name}/sync/2")
}

/// Builds the state-sync protocol name for a given chain, e.g. `/polkadot/state/2`.
pub fn state_protocol_id(chain_name: &str) -> String {
    alloc::format!("/{chain_name}/state/2")
}

/// Builds the light-client protocol name for a given chain, e.g. `/polkadot/light/2`.
pub fn light_protocol_id(chain_name: &str) -> String {
    alloc::format!("/{chain_name}/light/2")
}
