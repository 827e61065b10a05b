//! Cryptographic capability sets consumed, not implemented, by this crate.
//!
//! The actual cryptography (hash function, VRF, signature scheme) lives outside this crate;
//! these traits are the seam a concrete provider plugs into, in the same
//! polymorphism-over-capability-sets style used for [`crate::kv::KeyValueStore`] and
//! [`crate::executor::RuntimeEngine`].

pub use crate::kv::Hasher;

/// A 32-byte public key, opaque to this crate.
pub type PublicKey = [u8; 32];

/// Verifies and produces signatures over header hashes (BABE seals) and VRF claims (slot
/// lottery). A concrete implementation wraps an sr25519 (or equivalent) keypair.
pub trait Signer {
    fn public_key(&self) -> PublicKey;

    /// Signs `message` (typically a pre-seal header hash), returning a 64-byte signature.
    fn sign(&self, message: &[u8]) -> [u8; 64];
}

/// Verifies a signature produced by a [`Signer`] without needing the private key.
pub trait SignatureVerifier {
    fn verify(&self, public_key: &PublicKey, message: &[u8], signature: &[u8; 64]) -> bool;
}

/// The VRF primitive used by BABE's slot lottery: evaluates `(epoch_randomness, slot,
/// authority_index)` and returns an output plus a proof that can later be checked against the
/// claimant's public key.
pub trait VrfProver {
    fn prove(&self, transcript: &[u8]) -> ([u8; 32], [u8; 64]);
}

pub trait VrfVerifier {
    fn verify(&self, public_key: &PublicKey, transcript: &[u8], output: &[u8; 32], proof: &[u8; 64]) -> bool;

    /// Converts a VRF output into a uniformly-distributed value usable against the per-authority
    /// leadership threshold.
    fn output_to_threshold_value(&self, output: &[u8; 32]) -> u128 {
        let mut buf = [0u8; 16];
        buf.copy_from_slice(&output[..16]);
        u128::from_le_bytes(buf)
    }
}

/// A no-op hasher useful only for tests that don't care about collision resistance.
#[cfg(test)]
pub(crate) struct IdentityHasher;

#[cfg(test)]
impl Hasher for IdentityHasher {
    fn hash(&self, data: &[u8]) -> [u8; 32] {
        let mut out = [0u8; 32];
        let n = data.len().min(32);
        out[..n].copy_from_slice(&data[..n]);
        out
    }
}
