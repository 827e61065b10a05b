// Copyright 2017-2020 Parity Technologies (UK) Ltd.
// This file is part of Substrate.

// Substrate is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.

// Substrate is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.

// You should have received a copy of the GNU General Public License
// along with Substrate.  If not, see <http://www.gnu.org/licenses/>.

//! BABE-specific digest log items: the per-block pre-runtime digest, the end-of-epoch
//! consensus digests, and the seal.
//!
//! Field shapes are grounded on kagome's `consensus/babe/impl/babe.hpp` (`Context{epoch, slot,
//! slot_timestamp, keypair}` maps onto [`BabePreDigestRef`]'s `authority_index`/`slot_number`
//! plus the VRF output/proof pair) and on the pre-runtime digest tag numbering used by
//! `allchain-substrate-lite`'s `DigestItemType` (`PreRuntime = 6`).

use super::Error;
use core::{convert::TryFrom, iter};

/// The pre-runtime digest authored by the slot leader: proves the claim and carries the
/// information needed to verify it without re-running the VRF.
#[derive(Debug, PartialEq, Eq, Clone)]
pub enum BabePreDigestRef<'a> {
    /// Claimed via the primary VRF-threshold mechanism.
    Primary {
        authority_index: u32,
        slot_number: u64,
        vrf_output: &'a [u8; 32],
        vrf_proof: &'a [u8; 64],
    },
    /// Claimed via the round-robin secondary mechanism, no VRF proof required.
    SecondaryPlain { authority_index: u32, slot_number: u64 },
    /// Claimed via the round-robin secondary mechanism, with a VRF proof (used once
    /// `SecondaryVRFSlots` is the allowed-slots policy).
    SecondaryVRF {
        authority_index: u32,
        slot_number: u64,
        vrf_output: &'a [u8; 32],
        vrf_proof: &'a [u8; 64],
    },
}

impl<'a> BabePreDigestRef<'a> {
    pub(super) fn from_slice(slice: &'a [u8]) -> Result<Self, Error> {
        let kind = *slice.get(0).ok_or(Error::BadBabePreDigestRefType)?;
        let rest = &slice[1..];
        match kind {
            1 => {
                let (authority_index, slot_number, vrf_output, vrf_proof) = decode_vrf_fields(rest)?;
                Ok(BabePreDigestRef::Primary {
                    authority_index,
                    slot_number,
                    vrf_output,
                    vrf_proof,
                })
            }
            2 => {
                if rest.len() != 4 + 8 {
                    return Err(Error::BadBabePreDigestRefType);
                }
                let authority_index = u32::from_le_bytes(TryFrom::try_from(&rest[0..4]).unwrap());
                let slot_number = u64::from_le_bytes(TryFrom::try_from(&rest[4..12]).unwrap());
                Ok(BabePreDigestRef::SecondaryPlain {
                    authority_index,
                    slot_number,
                })
            }
            3 => {
                let (authority_index, slot_number, vrf_output, vrf_proof) = decode_vrf_fields(rest)?;
                Ok(BabePreDigestRef::SecondaryVRF {
                    authority_index,
                    slot_number,
                    vrf_output,
                    vrf_proof,
                })
            }
            _ => Err(Error::BadBabePreDigestRefType),
        }
    }

    pub fn scale_encoding(&self) -> impl Iterator<Item = impl AsRef<[u8]> + Clone + 'a> + Clone + 'a {
        let mut out = alloc::vec::Vec::new();
        match *self {
            BabePreDigestRef::Primary {
                authority_index,
                slot_number,
                vrf_output,
                vrf_proof,
            } => {
                out.push(1);
                out.extend_from_slice(&authority_index.to_le_bytes());
                out.extend_from_slice(&slot_number.to_le_bytes());
                out.extend_from_slice(vrf_output);
                out.extend_from_slice(vrf_proof);
            }
            BabePreDigestRef::SecondaryPlain {
                authority_index,
                slot_number,
            } => {
                out.push(2);
                out.extend_from_slice(&authority_index.to_le_bytes());
                out.extend_from_slice(&slot_number.to_le_bytes());
            }
            BabePreDigestRef::SecondaryVRF {
                authority_index,
                slot_number,
                vrf_output,
                vrf_proof,
            } => {
                out.push(3);
                out.extend_from_slice(&authority_index.to_le_bytes());
                out.extend_from_slice(&slot_number.to_le_bytes());
                out.extend_from_slice(vrf_output);
                out.extend_from_slice(vrf_proof);
            }
        }
        iter::once(out)
    }

    pub fn slot_number(&self) -> u64 {
        match *self {
            BabePreDigestRef::Primary { slot_number, .. }
            | BabePreDigestRef::SecondaryPlain { slot_number, .. }
            | BabePreDigestRef::SecondaryVRF { slot_number, .. } => slot_number,
        }
    }

    pub fn authority_index(&self) -> u32 {
        match *self {
            BabePreDigestRef::Primary { authority_index, .. }
            | BabePreDigestRef::SecondaryPlain { authority_index, .. }
            | BabePreDigestRef::SecondaryVRF { authority_index, .. } => authority_index,
        }
    }
}

fn decode_vrf_fields(rest: &[u8]) -> Result<(u32, u64, &[u8; 32], &[u8; 64]), Error> {
    if rest.len() != 4 + 8 + 32 + 64 {
        return Err(Error::BadBabePreDigestRefType);
    }
    let authority_index = u32::from_le_bytes(TryFrom::try_from(&rest[0..4]).unwrap());
    let slot_number = u64::from_le_bytes(TryFrom::try_from(&rest[4..12]).unwrap());
    let vrf_output: &[u8; 32] = TryFrom::try_from(&rest[12..44]).unwrap();
    let vrf_proof: &[u8; 64] = TryFrom::try_from(&rest[44..108]).unwrap();
    Ok((authority_index, slot_number, vrf_output, vrf_proof))
}

/// The authority set and randomness effective for the next epoch, as announced by the last
/// block of the current one.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct BabeNextEpochRef<'a> {
    /// `(authority public key, weight)` pairs, in the order authority indices refer to them.
    pub authorities: &'a [u8],
    pub authorities_len: usize,
    pub randomness: &'a [u8; 32],
}

/// The slot-claiming policy allowed during an epoch.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum AllowedSlots {
    PrimaryOnly,
    PrimaryAndSecondaryPlain,
    PrimaryAndSecondaryVRF,
}

/// A change to the BABE slot-duration/allowed-slots configuration, announced alongside (never
/// without) a [`BabeNextEpochRef`].
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct BabeNextConfig {
    pub c: (u64, u64),
    pub allowed_slots: AllowedSlots,
}

/// A BABE end-of-epoch consensus digest.
#[derive(Debug, PartialEq, Eq, Clone)]
pub enum BabeConsensusLogRef<'a> {
    NextEpochData(BabeNextEpochRef<'a>),
    OnDisabled(u32),
    NextConfigData(BabeNextConfig),
}

impl<'a> BabeConsensusLogRef<'a> {
    pub(super) fn from_slice(slice: &'a [u8]) -> Result<Self, Error> {
        let kind = *slice.get(0).ok_or(Error::BadBabeConsensusRefType)?;
        let rest = &slice[1..];
        match kind {
            1 => {
                if rest.len() < 4 {
                    return Err(Error::BadBabeConsensusRefType);
                }
                let authorities_len = u32::from_le_bytes(TryFrom::try_from(&rest[0..4]).unwrap()) as usize;
                let authorities_bytes = authorities_len.checked_mul(40).ok_or(Error::BadBabeConsensusRefType)?;
                if rest.len() != 4 + authorities_bytes + 32 {
                    return Err(Error::BadBabeConsensusRefType);
                }
                let authorities = &rest[4..4 + authorities_bytes];
                let randomness: &[u8; 32] = TryFrom::try_from(&rest[4 + authorities_bytes..]).unwrap();
                Ok(BabeConsensusLogRef::NextEpochData(BabeNextEpochRef {
                    authorities,
                    authorities_len,
                    randomness,
                }))
            }
            2 => {
                if rest.len() != 4 {
                    return Err(Error::BadBabeConsensusRefType);
                }
                Ok(BabeConsensusLogRef::OnDisabled(u32::from_le_bytes(
                    TryFrom::try_from(rest).unwrap(),
                )))
            }
            3 => {
                if rest.len() != 17 {
                    return Err(Error::BadBabeConsensusRefType);
                }
                let c0 = u64::from_le_bytes(TryFrom::try_from(&rest[0..8]).unwrap());
                let c1 = u64::from_le_bytes(TryFrom::try_from(&rest[8..16]).unwrap());
                let allowed_slots = match rest[16] {
                    0 => AllowedSlots::PrimaryOnly,
                    1 => AllowedSlots::PrimaryAndSecondaryPlain,
                    2 => AllowedSlots::PrimaryAndSecondaryVRF,
                    _ => return Err(Error::BadBabeConsensusRefType),
                };
                Ok(BabeConsensusLogRef::NextConfigData(BabeNextConfig {
                    c: (c0, c1),
                    allowed_slots,
                }))
            }
            _ => Err(Error::BadBabeConsensusRefType),
        }
    }

    pub fn scale_encoding(&self) -> impl Iterator<Item = impl AsRef<[u8]> + Clone + 'a> + Clone + 'a {
        let mut out = alloc::vec::Vec::new();
        match *self {
            BabeConsensusLogRef::NextEpochData(ref epoch) => {
                out.push(1);
                out.extend_from_slice(&(epoch.authorities_len as u32).to_le_bytes());
                out.extend_from_slice(epoch.authorities);
                out.extend_from_slice(epoch.randomness);
            }
            BabeConsensusLogRef::OnDisabled(index) => {
                out.push(2);
                out.extend_from_slice(&index.to_le_bytes());
            }
            BabeConsensusLogRef::NextConfigData(config) => {
                out.push(3);
                out.extend_from_slice(&config.c.0.to_le_bytes());
                out.extend_from_slice(&config.c.1.to_le_bytes());
                out.push(match config.allowed_slots {
                    AllowedSlots::PrimaryOnly => 0,
                    AllowedSlots::PrimaryAndSecondaryPlain => 1,
                    AllowedSlots::PrimaryAndSecondaryVRF => 2,
                });
            }
        }
        iter::once(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn secondary_plain_round_trips() {
        let mut bytes = alloc::vec![2u8];
        bytes.extend_from_slice(&7u32.to_le_bytes());
        bytes.extend_from_slice(&99u64.to_le_bytes());
        let decoded = BabePreDigestRef::from_slice(&bytes).unwrap();
        assert_eq!(
            decoded,
            BabePreDigestRef::SecondaryPlain {
                authority_index: 7,
                slot_number: 99,
            }
        );
        assert_eq!(decoded.slot_number(), 99);
    }

    #[test]
    fn on_disabled_round_trips() {
        let mut bytes = alloc::vec![2u8];
        bytes.extend_from_slice(&3u32.to_le_bytes());
        let decoded = BabeConsensusLogRef::from_slice(&bytes).unwrap();
        assert_eq!(decoded, BabeConsensusLogRef::OnDisabled(3));
    }

    #[test]
    fn next_config_data_rejects_unknown_allowed_slots() {
        let mut bytes = alloc::vec![3u8];
        bytes.extend_from_slice(&1u64.to_le_bytes());
        bytes.extend_from_slice(&4u64.to_le_bytes());
        bytes.push(9); // invalid
        assert!(BabeConsensusLogRef::from_slice(&bytes).is_err());
    }
}
