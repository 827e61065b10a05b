//! The block-production slot loop: wait for a slot, claim it via VRF, drain the transaction pool,
//! bake and seal a block, and apply the finality-lag backoff when the chain isn't finalizing.
//!
//! Grounded on kagome's `consensus/babe/impl/babe.hpp` (`Babe::Context` and
//! `processSlotLeadership`) for the slot/epoch/keypair shape and the backoff formula; the
//! C++ `propose.cpp` abort-after-proposing debug harness is not carried over here; production
//! is instead driven in tests by calling [`claim_slot`] directly.

use crate::block::{Block, Extrinsic};
use crate::crypto::{PublicKey, Signer, VrfProver, VrfVerifier};
use crate::executor::{self, RuntimeEngine};
use crate::header::{self, AllowedSlots, BabePreDigestRef, DigestItemRef};
use crate::kv::{Hasher, KeyValueStore};
use crate::overlay::WorkingState;
use crate::trie::codec::StateVersion;
use crate::trie::storage::TrieDb;
use alloc::vec::Vec;
use parity_scale_codec::{Compact, Encode};

/// Whether this node is currently participating in authoring, gating the slot loop entirely:
/// an inactive validator still follows the chain but never attempts to claim a slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidatorStatus {
    Active,
    Inactive,
}

/// Everything the slot-claiming logic needs to know about where in the chain/epoch it stands.
#[derive(Debug, Clone, Copy)]
pub struct SlotContext {
    pub parent_number: u64,
    pub parent_hash: [u8; 32],
    pub epoch_number: u64,
    pub slot_number: u64,
    pub slot_timestamp_millis: u64,
    pub authority_index: u32,
    pub epoch_randomness: [u8; 32],
}

/// The outcome of attempting to claim a slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotClaim {
    NotClaimed,
    Primary { vrf_output: [u8; 32], vrf_proof: [u8; 64] },
    SecondaryPlain,
    SecondaryVrf { vrf_output: [u8; 32], vrf_proof: [u8; 64] },
}

/// Builds the VRF transcript for a given slot: `epoch_randomness || slot_number`, matching the
/// input kagome's BABE VRF context hashes over.
fn vrf_transcript(epoch_randomness: &[u8; 32], slot_number: u64) -> alloc::vec::Vec<u8> {
    let mut out = alloc::vec::Vec::with_capacity(40);
    out.extend_from_slice(epoch_randomness);
    out.extend_from_slice(&slot_number.to_le_bytes());
    out
}

/// Attempts to claim `ctx.slot_number` under `allowed_slots`, given this authority's
/// per-authority VRF threshold (pre-computed from its weight in the active authority set).
///
/// Primary (VRF-threshold) claiming is attempted first whenever the policy allows it; if the VRF
/// output doesn't clear `threshold`, falls back to the round-robin secondary mechanism when the
/// policy allows it.
pub fn claim_slot<P: VrfProver + VrfVerifier>(
    ctx: &SlotContext,
    status: ValidatorStatus,
    allowed_slots: AllowedSlots,
    threshold: u128,
    vrf: &P,
    authorities_count: u32,
) -> SlotClaim {
    if status == ValidatorStatus::Inactive {
        return SlotClaim::NotClaimed;
    }

    let transcript = vrf_transcript(&ctx.epoch_randomness, ctx.slot_number);

    if matches!(
        allowed_slots,
        AllowedSlots::PrimaryOnly | AllowedSlots::PrimaryAndSecondaryPlain | AllowedSlots::PrimaryAndSecondaryVRF
    ) {
        let (output, proof) = vrf.prove(&transcript);
        if vrf.output_to_threshold_value(&output) < threshold {
            return SlotClaim::Primary { vrf_output: output, vrf_proof: proof };
        }
    }

    if authorities_count == 0 {
        return SlotClaim::NotClaimed;
    }
    let round_robin_slot = (ctx.slot_number % u64::from(authorities_count)) as u32;
    if round_robin_slot != ctx.authority_index {
        return SlotClaim::NotClaimed;
    }

    match allowed_slots {
        AllowedSlots::PrimaryAndSecondaryPlain => SlotClaim::SecondaryPlain,
        AllowedSlots::PrimaryAndSecondaryVRF => {
            let (output, proof) = vrf.prove(&transcript);
            SlotClaim::SecondaryVrf { vrf_output: output, vrf_proof: proof }
        }
        AllowedSlots::PrimaryOnly => SlotClaim::NotClaimed,
    }
}

/// Signs a header hash as the BABE seal, using the authoring keypair.
pub fn seal_header<S: Signer>(signer: &S, header_hash: &[u8; 32]) -> [u8; 64] {
    signer.sign(header_hash)
}

pub fn authoring_public_key<S: Signer>(signer: &S) -> PublicKey {
    signer.public_key()
}

/// Computes the production backoff interval (in slots) once the gap between best and finalized
/// blocks exceeds `unfinalized_slack`: `(best - finalized - slack) / 2`, capped at
/// `max_backoff_slots`. Returns `0` (no backoff) while the gap is within slack.
pub fn finality_lag_backoff(best_number: u64, finalized_number: u64, unfinalized_slack: u64, max_backoff_slots: u64) -> u64 {
    let gap = best_number.saturating_sub(finalized_number);
    if gap <= unfinalized_slack {
        return 0;
    }
    let backoff = ((gap - unfinalized_slack) / 2).min(max_backoff_slots);
    tracing::info!(gap, backoff, "finality is lagging behind best block, backing off authoring");
    backoff
}

/// Converts a successful [`SlotClaim`] into the BABE pre-runtime digest that should be embedded
/// in the block this node is about to author. Returns `None` for [`SlotClaim::NotClaimed`].
pub fn pre_digest_for_claim(claim: &SlotClaim, authority_index: u32, slot_number: u64) -> Option<BabePreDigestRef<'_>> {
    match claim {
        SlotClaim::NotClaimed => None,
        SlotClaim::Primary { vrf_output, vrf_proof } => Some(BabePreDigestRef::Primary {
            authority_index,
            slot_number,
            vrf_output,
            vrf_proof,
        }),
        SlotClaim::SecondaryPlain => Some(BabePreDigestRef::SecondaryPlain { authority_index, slot_number }),
        SlotClaim::SecondaryVrf { vrf_output, vrf_proof } => Some(BabePreDigestRef::SecondaryVRF {
            authority_index,
            slot_number,
            vrf_output,
            vrf_proof,
        }),
    }
}

/// A source of pending extrinsics a [`Proposer`] drains while building a block, in priority
/// order. A concrete implementation backs this with a real mempool; the ordering and validity
/// re-checking it performs are outside this crate.
pub trait TransactionPool {
    /// Removes and returns the next extrinsic to try including, highest priority first.
    fn pop_highest_priority(&mut self) -> Option<Vec<u8>>;

    /// Puts an extrinsic back, e.g. after the runtime rejected it only because the block is full
    /// rather than because it's invalid.
    fn requeue(&mut self, extrinsic: Vec<u8>);
}

/// Bounds how much a single proposal may grow before [`Proposer::drain_pool`] stops pulling from
/// the pool, independent of whether the pool still has more to offer.
#[derive(Debug, Clone, Copy)]
pub struct ProposalBudget {
    pub max_block_size: usize,
    pub deadline_millis: u64,
}

impl ProposalBudget {
    fn exhausted(&self, encoded_size_so_far: usize, elapsed_millis: u64) -> bool {
        encoded_size_so_far >= self.max_block_size || elapsed_millis >= self.deadline_millis
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ProposeError {
    #[error("runtime error while proposing: {0}")]
    Runtime(#[from] executor::Error),
    #[error("trie storage error while proposing: {0}")]
    Storage(#[from] crate::trie::storage::Error),
    #[error("proposal cancelled: a deeper best block appeared underneath it")]
    Cancelled,
}

/// Encodes the fixed header fields plus a digest section declaring `digest_logs_len` items, with
/// none of the items themselves appended yet. Shared by the unsealed proposal header (used to
/// compute the pre-seal hash) and the final sealed header.
fn header_prefix(parent_hash: &[u8; 32], number: u64, state_root: &[u8; 32], extrinsics_root: &[u8; 32], digest_logs_len: u64) -> Vec<u8> {
    let mut out = Vec::with_capacity(32 + 10 + 32 + 32 + 10);
    out.extend_from_slice(parent_hash);
    out.extend_from_slice(&Compact(number).encode());
    out.extend_from_slice(state_root);
    out.extend_from_slice(extrinsics_root);
    out.extend_from_slice(&Compact(digest_logs_len).encode());
    out
}

fn encode_digest_item(item: &DigestItemRef<'_>) -> Vec<u8> {
    item.scale_encoding().fold(Vec::new(), |mut buf, chunk| {
        buf.extend_from_slice(chunk.as_ref());
        buf
    })
}

/// Drives one proposal from an opened [`WorkingState`] through to a sealed [`Block`].
///
/// Mirrors kagome's block-authoring pipeline: `open` pushes the runtime's inherents first,
/// `drain_pool` then pulls extrinsics from a [`TransactionPool`] under a [`ProposalBudget`], and
/// `bake` asks the runtime to finalize execution, computes the storage root via
/// [`WorkingState::preview_root`] (nothing is persisted here; the authored block is committed the
/// same way any other block is, by running it back through [`crate::import::import_block`]), and
/// seals the resulting header with the BABE signature.
pub struct Proposer<'s, S: KeyValueStore, H: Hasher> {
    working: WorkingState<'s, S, H>,
    parent_hash: [u8; 32],
    parent_number: u64,
    extrinsics: Vec<Extrinsic>,
    encoded_size: usize,
    cancelled: bool,
}

impl<'s, S: KeyValueStore, H: Hasher> Proposer<'s, S, H> {
    /// Opens a proposal for the block that will sit on top of `parent_hash`/`parent_number`,
    /// running the runtime's inherent extrinsics before anything from the pool.
    pub fn open<E: RuntimeEngine>(
        store: &'s mut S,
        hasher: H,
        state_version: StateVersion,
        parent_hash: [u8; 32],
        parent_number: u64,
        parent_state_root: [u8; 32],
        engine: &E,
    ) -> Result<Self, ProposeError> {
        let trie = TrieDb::new(store, hasher, parent_state_root, state_version);
        let mut working = WorkingState::new(trie);

        let stub_header = header_prefix(&parent_hash, parent_number + 1, &[0u8; 32], &[0u8; 32], 0);
        engine.initialize_block(&stub_header, &mut working)?;

        let mut proposer = Proposer {
            working,
            parent_hash,
            parent_number,
            extrinsics: Vec::new(),
            encoded_size: 0,
            cancelled: false,
        };

        let inherents = engine.inherent_extrinsics(&mut proposer.working)?;
        for inherent in inherents {
            proposer.apply(inherent, engine)?;
        }
        Ok(proposer)
    }

    fn apply<E: RuntimeEngine>(&mut self, extrinsic: Vec<u8>, engine: &E) -> Result<bool, ProposeError> {
        let accepted = engine.apply_extrinsic(&extrinsic, &mut self.working)?;
        if accepted {
            self.encoded_size += extrinsic.len();
            self.extrinsics.push(Extrinsic(extrinsic));
        }
        Ok(accepted)
    }

    /// Pulls extrinsics from `pool`, applying each against the runtime, until the pool runs dry
    /// or `budget` is exhausted. `elapsed_millis` is polled before each pull so a caller's own
    /// clock decides when the deadline has passed. An extrinsic the runtime rejects only because
    /// the block is full is requeued and draining stops; extrinsics invalid for any other reason
    /// are simply dropped, matching [`RuntimeEngine::apply_extrinsic`]'s boolean contract.
    pub fn drain_pool<E: RuntimeEngine>(
        &mut self,
        pool: &mut dyn TransactionPool,
        budget: &ProposalBudget,
        engine: &E,
        elapsed_millis: &dyn Fn() -> u64,
    ) -> Result<(), ProposeError> {
        if self.cancelled {
            return Err(ProposeError::Cancelled);
        }
        while !budget.exhausted(self.encoded_size, elapsed_millis()) {
            let Some(extrinsic) = pool.pop_highest_priority() else {
                break;
            };
            if !self.apply(extrinsic.clone(), engine)? {
                pool.requeue(extrinsic);
                break;
            }
        }
        Ok(())
    }

    /// Marks this proposal cancelled if `current_best_number` shows a deeper block has been
    /// imported underneath it while it was being built abandon-on-reorg rule. Returns
    /// whether the proposal is (now, or already was) cancelled.
    pub fn cancel_if_best_advanced(&mut self, current_best_number: u64) -> bool {
        if current_best_number > self.parent_number {
            self.cancelled = true;
        }
        self.cancelled
    }

    /// Finalizes execution, computes the storage root, and seals the header with `pre_digest`
    /// and a signature from `signer` over the pre-seal header hash.
    pub fn bake<E: RuntimeEngine, Sg: Signer>(
        mut self,
        engine: &E,
        pre_digest: BabePreDigestRef<'_>,
        signer: &Sg,
    ) -> Result<Block, ProposeError> {
        if self.cancelled {
            return Err(ProposeError::Cancelled);
        }

        // The runtime's own finalize_block output is discarded: this crate assembles the header
        // itself so it can attach the BABE pre-digest and seal, which the runtime doesn't know
        // how to encode.
        let _ = engine.finalize_block(&mut self.working)?;

        let extrinsics_root = crate::block::extrinsics_root(&self.extrinsics);
        let state_root = self.working.preview_root()?;
        let number = self.parent_number + 1;

        let pre_digest_item = DigestItemRef::BabePreDigest(pre_digest);
        let pre_digest_bytes = encode_digest_item(&pre_digest_item);

        let mut unsealed = header_prefix(&self.parent_hash, number, &state_root, &extrinsics_root, 1);
        unsealed.extend_from_slice(&pre_digest_bytes);
        let pre_seal_hash = header::hash_from_scale_encoded_header(&unsealed);
        let seal = signer.sign(&pre_seal_hash);

        let seal_item = DigestItemRef::BabeSeal(&seal);
        let seal_bytes = encode_digest_item(&seal_item);

        let mut sealed = header_prefix(&self.parent_hash, number, &state_root, &extrinsics_root, 2);
        sealed.extend_from_slice(&pre_digest_bytes);
        sealed.extend_from_slice(&seal_bytes);

        Ok(Block { header: sealed, extrinsics: self.extrinsics })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct AlwaysClaimsVrf;
    impl VrfProver for AlwaysClaimsVrf {
        fn prove(&self, _transcript: &[u8]) -> ([u8; 32], [u8; 64]) {
            ([0u8; 32], [0u8; 64])
        }
    }
    impl VrfVerifier for AlwaysClaimsVrf {
        fn verify(&self, _: &PublicKey, _: &[u8], _: &[u8; 32], _: &[u8; 64]) -> bool {
            true
        }
        fn output_to_threshold_value(&self, _output: &[u8; 32]) -> u128 {
            0
        }
    }

    struct NeverClaimsVrf;
    impl VrfProver for NeverClaimsVrf {
        fn prove(&self, _transcript: &[u8]) -> ([u8; 32], [u8; 64]) {
            ([0xff; 32], [0u8; 64])
        }
    }
    impl VrfVerifier for NeverClaimsVrf {
        fn verify(&self, _: &PublicKey, _: &[u8], _: &[u8; 32], _: &[u8; 64]) -> bool {
            false
        }
        fn output_to_threshold_value(&self, _output: &[u8; 32]) -> u128 {
            u128::MAX
        }
    }

    fn ctx() -> SlotContext {
        SlotContext {
            parent_number: 10,
            parent_hash: [1u8; 32],
            epoch_number: 2,
            slot_number: 100,
            slot_timestamp_millis: 6_000,
            authority_index: 0,
            epoch_randomness: [7u8; 32],
        }
    }

    #[test]
    fn primary_claim_succeeds_when_vrf_clears_threshold() {
        let claim = claim_slot(&ctx(), ValidatorStatus::Active, AllowedSlots::PrimaryOnly, u128::MAX, &AlwaysClaimsVrf, 4);
        assert!(matches!(claim, SlotClaim::Primary { .. }));
    }

    #[test]
    fn falls_back_to_secondary_plain_when_primary_vrf_misses_and_slot_is_ours() {
        let mut context = ctx();
        context.slot_number = 4; // 4 % 4 == 0 == authority_index
        let claim = claim_slot(&context, ValidatorStatus::Active, AllowedSlots::PrimaryAndSecondaryPlain, 0, &NeverClaimsVrf, 4);
        assert_eq!(claim, SlotClaim::SecondaryPlain);
    }

    #[test]
    fn secondary_not_claimed_when_round_robin_slot_belongs_to_another_authority() {
        let mut context = ctx();
        context.slot_number = 5; // 5 % 4 == 1 != authority_index 0
        let claim = claim_slot(&context, ValidatorStatus::Active, AllowedSlots::PrimaryAndSecondaryPlain, 0, &NeverClaimsVrf, 4);
        assert_eq!(claim, SlotClaim::NotClaimed);
    }

    #[test]
    fn inactive_validator_never_claims_a_slot() {
        let mut context = ctx();
        context.slot_number = 4; // would otherwise win both the primary VRF and the round robin
        let claim = claim_slot(&context, ValidatorStatus::Inactive, AllowedSlots::PrimaryOnly, u128::MAX, &AlwaysClaimsVrf, 4);
        assert_eq!(claim, SlotClaim::NotClaimed);
    }

    #[test]
    fn no_backoff_within_slack() {
        assert_eq!(finality_lag_backoff(100, 60, 50, 100), 0);
    }

    #[test]
    fn backoff_grows_and_is_capped() {
        assert_eq!(finality_lag_backoff(160, 50, 50, 100), 30);
        assert_eq!(finality_lag_backoff(1000, 0, 50, 100), 100);
    }

    #[test]
    fn pre_digest_for_claim_maps_each_variant() {
        assert!(pre_digest_for_claim(&SlotClaim::NotClaimed, 0, 1).is_none());
        let primary = SlotClaim::Primary { vrf_output: [1u8; 32], vrf_proof: [2u8; 64] };
        assert!(matches!(
            pre_digest_for_claim(&primary, 5, 42),
            Some(BabePreDigestRef::Primary { authority_index: 5, slot_number: 42, .. })
        ));
    }

    use crate::kv::MemoryStore;

    #[derive(Clone)]
    struct TestHasher;
    impl crate::kv::Hasher for TestHasher {
        fn hash(&self, data: &[u8]) -> [u8; 32] {
            let mut out = [0u8; 32];
            let n = data.len().min(32);
            out[..n].copy_from_slice(&data[..n]);
            out
        }
    }

    /// Always accepts extrinsics and contributes one inherent, so tests can observe it land
    /// ahead of anything pulled from the pool.
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
            Ok(alloc::vec![alloc::vec![0xaa]])
        }
    }

    struct FixedPool(alloc::collections::VecDeque<Vec<u8>>);
    impl TransactionPool for FixedPool {
        fn pop_highest_priority(&mut self) -> Option<Vec<u8>> {
            self.0.pop_front()
        }
        fn requeue(&mut self, extrinsic: Vec<u8>) {
            self.0.push_front(extrinsic);
        }
    }

    struct FixedSigner;
    impl Signer for FixedSigner {
        fn public_key(&self) -> PublicKey {
            [9u8; 32]
        }
        fn sign(&self, message: &[u8]) -> [u8; 64] {
            let mut out = [0u8; 64];
            let n = message.len().min(64);
            out[..n].copy_from_slice(&message[..n]);
            out
        }
    }

    #[test]
    fn open_runs_inherents_before_pool_extrinsics() {
        let mut store = MemoryStore::new();
        let proposer =
            Proposer::open(&mut store, TestHasher, StateVersion::V0, [0u8; 32], 10, [0u8; 32], &AcceptingEngine).unwrap();
        assert_eq!(proposer.extrinsics.len(), 1);
        assert_eq!(proposer.extrinsics[0].0, alloc::vec![0xaa]);
    }

    #[test]
    fn drain_pool_stops_once_size_budget_is_exhausted() {
        let mut store = MemoryStore::new();
        let mut proposer =
            Proposer::open(&mut store, TestHasher, StateVersion::V0, [0u8; 32], 10, [0u8; 32], &AcceptingEngine).unwrap();
        let mut pool = FixedPool(alloc::collections::VecDeque::from(alloc::vec![
            alloc::vec![1, 2],
            alloc::vec![3, 4],
            alloc::vec![5, 6],
        ]));
        let budget = ProposalBudget { max_block_size: 2, deadline_millis: 1_000 };
        proposer.drain_pool(&mut pool, &budget, &AcceptingEngine, &|| 0).unwrap();
        // one inherent (1 byte) plus one pool entry (2 bytes) crosses the 2-byte budget.
        assert_eq!(proposer.extrinsics.len(), 2);
        assert_eq!(pool.0.len(), 1);
    }

    #[test]
    fn drain_pool_stops_at_deadline_without_touching_the_pool() {
        let mut store = MemoryStore::new();
        let mut proposer =
            Proposer::open(&mut store, TestHasher, StateVersion::V0, [0u8; 32], 10, [0u8; 32], &AcceptingEngine).unwrap();
        let mut pool = FixedPool(alloc::collections::VecDeque::from(alloc::vec![alloc::vec![1, 2]]));
        let budget = ProposalBudget { max_block_size: 1_000, deadline_millis: 5 };
        proposer.drain_pool(&mut pool, &budget, &AcceptingEngine, &|| 10).unwrap();
        assert_eq!(proposer.extrinsics.len(), 1);
        assert_eq!(pool.0.len(), 1);
    }

    #[test]
    fn drain_pool_requeues_an_extrinsic_the_runtime_rejects() {
        struct RejectsEverything;
        impl RuntimeEngine for RejectsEverything {
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
                Ok(false)
            }
            fn inherent_extrinsics(&self, _: &mut dyn crate::executor::RuntimeExternalities) -> Result<Vec<Vec<u8>>, executor::Error> {
                Ok(Vec::new())
            }
        }

        let mut store = MemoryStore::new();
        let mut proposer =
            Proposer::open(&mut store, TestHasher, StateVersion::V0, [0u8; 32], 10, [0u8; 32], &RejectsEverything).unwrap();
        let mut pool = FixedPool(alloc::collections::VecDeque::from(alloc::vec![alloc::vec![1, 2]]));
        let budget = ProposalBudget { max_block_size: 1_000, deadline_millis: 1_000 };
        proposer.drain_pool(&mut pool, &budget, &RejectsEverything, &|| 0).unwrap();
        assert_eq!(proposer.extrinsics.len(), 0);
        assert_eq!(pool.0.len(), 1); // requeued, not dropped
    }

    #[test]
    fn bake_produces_a_header_with_pre_digest_and_seal() {
        let mut store = MemoryStore::new();
        let proposer =
            Proposer::open(&mut store, TestHasher, StateVersion::V0, [0u8; 32], 10, [0u8; 32], &AcceptingEngine).unwrap();
        let pre_digest = BabePreDigestRef::SecondaryPlain { authority_index: 0, slot_number: 42 };
        let block = proposer.bake(&AcceptingEngine, pre_digest, &FixedSigner).unwrap();
        let decoded = header::decode(&block.header).unwrap();
        assert_eq!(decoded.number, 11);
        assert!(decoded.digest.babe_pre_runtime().is_some());
        assert!(decoded.digest.babe_seal().is_some());
    }

    #[test]
    fn bake_refuses_a_cancelled_proposal() {
        let mut store = MemoryStore::new();
        let mut proposer =
            Proposer::open(&mut store, TestHasher, StateVersion::V0, [0u8; 32], 10, [0u8; 32], &AcceptingEngine).unwrap();
        assert!(proposer.cancel_if_best_advanced(11));
        let pre_digest = BabePreDigestRef::SecondaryPlain { authority_index: 0, slot_number: 42 };
        let result = proposer.bake(&AcceptingEngine, pre_digest, &FixedSigner);
        assert!(matches!(result, Err(ProposeError::Cancelled)));
    }
}
