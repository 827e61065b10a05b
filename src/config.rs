//! Host-wide tunables, deserializable from whatever configuration format the embedder chooses.
//!
//! The fields here are exactly the knobs the import, production and sync subsystems need
//! (state version, sync timeouts, finality-lag backoff, request batching), gathered into one
//! struct the way `sc-service`'s `Configuration` gathers per-subsystem settings.

use crate::trie::codec::StateVersion;
use serde::{Deserialize, Serialize};
use core::time::Duration;

/// Number of unfinalized blocks past which block production begins backing off.
pub const DEFAULT_UNFINALIZED_SLACK: u64 = 50;

/// Upper bound on the production backoff interval computed from finality lag.
pub const DEFAULT_MAX_BACKOFF_SLOTS: u64 = 100;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HostConfig {
    /// Trie node encoding version used for newly-written state.
    #[serde(with = "state_version_serde")]
    pub state_version: StateVersion,

    /// How long a sync round-trip (blocks request/response) may take before the peer is
    /// considered unresponsive and the request is retried against another peer.
    pub sync_round_trip_timeout: Duration,

    /// How long to wait for a GRANDPA justification before treating a finalized-but-unjustified
    /// block as still-awaiting-justification.
    pub justification_fetch_timeout: Duration,

    /// Number of unfinalized blocks allowed to accumulate before production backs off.
    pub unfinalized_slack: u64,

    /// Cap, in slots, on the computed backoff interval.
    pub max_backoff_slots: u64,

    /// Maximum number of blocks requested in a single sync `BlocksRequest`.
    pub block_request_batch_size: u32,

    /// Maximum accepted encoded size of a single block, used to bound decode buffers.
    pub max_encoded_block_size: u32,
}

impl Default for HostConfig {
    fn default() -> Self {
        HostConfig {
            state_version: StateVersion::V1,
            sync_round_trip_timeout: Duration::from_secs(10),
            justification_fetch_timeout: Duration::from_secs(30),
            unfinalized_slack: DEFAULT_UNFINALIZED_SLACK,
            max_backoff_slots: DEFAULT_MAX_BACKOFF_SLOTS,
            block_request_batch_size: 128,
            max_encoded_block_size: 16 * 1024 * 1024,
        }
    }
}

mod state_version_serde {
    use super::StateVersion;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(version: &StateVersion, serializer: S) -> Result<S::Ok, S::Error> {
        let raw: u8 = match version {
            StateVersion::V0 => 0,
            StateVersion::V1 => 1,
        };
        serializer.serialize_u8(raw)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<StateVersion, D::Error> {
        let raw = u8::deserialize(deserializer)?;
        match raw {
            0 => Ok(StateVersion::V0),
            1 => Ok(StateVersion::V1),
            other => Err(serde::de::Error::custom(alloc::format!("unknown state version {other}"))),
        }
    }
}
