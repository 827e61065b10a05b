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

//! GRANDPA-specific digest log items: scheduled and forced authority-set changes, plus the
//! pause/resume signals used around a stalled round.

use super::Error;
use core::{convert::TryFrom, iter};

/// A GRANDPA consensus digest, carried under engine id `FRNK`.
#[derive(Debug, PartialEq, Eq, Clone)]
pub enum GrandpaConsensusLogRef<'a> {
    /// The authority set will change after `delay` further blocks.
    ScheduledChange(GrandpaScheduledChangeRef<'a>),
    /// Same as `ScheduledChange`, but announced (and takes effect) at a fixed block number
    /// rather than relative to the announcing block, used to force a change after a stall.
    ForcedChange {
        median_last_finalized: u64,
        change: GrandpaScheduledChangeRef<'a>,
    },
    /// An authority has been reported for equivocation; disables it from further rounds.
    OnDisabled(u64),
    /// Pauses GRANDPA finalization for `delay` blocks.
    Pause(u64),
    /// Resumes GRANDPA finalization after `delay` blocks.
    Resume(u64),
}

#[derive(Debug, PartialEq, Eq, Clone)]
pub struct GrandpaScheduledChangeRef<'a> {
    /// `(authority public key, weight)` pairs.
    pub next_authorities: &'a [u8],
    pub next_authorities_len: usize,
    pub delay: u64,
}

impl<'a> GrandpaConsensusLogRef<'a> {
    pub(super) fn from_slice(slice: &'a [u8]) -> Result<Self, Error> {
        let kind = *slice.get(0).ok_or(Error::BadGrandpaConsensusRefType)?;
        let rest = &slice[1..];
        match kind {
            1 => Ok(GrandpaConsensusLogRef::ScheduledChange(decode_scheduled_change(rest)?)),
            2 => {
                if rest.len() < 8 {
                    return Err(Error::BadGrandpaConsensusRefType);
                }
                let median_last_finalized = u64::from_le_bytes(TryFrom::try_from(&rest[0..8]).unwrap());
                let change = decode_scheduled_change(&rest[8..])?;
                Ok(GrandpaConsensusLogRef::ForcedChange {
                    median_last_finalized,
                    change,
                })
            }
            3 => Ok(GrandpaConsensusLogRef::OnDisabled(decode_u64(rest)?)),
            4 => Ok(GrandpaConsensusLogRef::Pause(decode_u64(rest)?)),
            5 => Ok(GrandpaConsensusLogRef::Resume(decode_u64(rest)?)),
            _ => Err(Error::BadGrandpaConsensusRefType),
        }
    }

    pub fn scale_encoding(&self) -> impl Iterator<Item = impl AsRef<[u8]> + Clone + 'a> + Clone + 'a {
        let mut out = alloc::vec::Vec::new();
        match *self {
            GrandpaConsensusLogRef::ScheduledChange(ref change) => {
                out.push(1);
                encode_scheduled_change(&mut out, change);
            }
            GrandpaConsensusLogRef::ForcedChange {
                median_last_finalized,
                ref change,
            } => {
                out.push(2);
                out.extend_from_slice(&median_last_finalized.to_le_bytes());
                encode_scheduled_change(&mut out, change);
            }
            GrandpaConsensusLogRef::OnDisabled(n) => {
                out.push(3);
                out.extend_from_slice(&n.to_le_bytes());
            }
            GrandpaConsensusLogRef::Pause(n) => {
                out.push(4);
                out.extend_from_slice(&n.to_le_bytes());
            }
            GrandpaConsensusLogRef::Resume(n) => {
                out.push(5);
                out.extend_from_slice(&n.to_le_bytes());
            }
        }
        iter::once(out)
    }
}

fn decode_u64(rest: &[u8]) -> Result<u64, Error> {
    if rest.len() != 8 {
        return Err(Error::BadGrandpaConsensusRefType);
    }
    Ok(u64::from_le_bytes(TryFrom::try_from(rest).unwrap()))
}

fn decode_scheduled_change(rest: &[u8]) -> Result<GrandpaScheduledChangeRef<'_>, Error> {
    if rest.len() < 4 {
        return Err(Error::BadGrandpaConsensusRefType);
    }
    let next_authorities_len = u32::from_le_bytes(TryFrom::try_from(&rest[0..4]).unwrap()) as usize;
    let authorities_bytes = next_authorities_len
        .checked_mul(40)
        .ok_or(Error::BadGrandpaConsensusRefType)?;
    if rest.len() != 4 + authorities_bytes + 8 {
        return Err(Error::BadGrandpaConsensusRefType);
    }
    let next_authorities = &rest[4..4 + authorities_bytes];
    let delay = u64::from_le_bytes(TryFrom::try_from(&rest[4 + authorities_bytes..]).unwrap());
    Ok(GrandpaScheduledChangeRef {
        next_authorities,
        next_authorities_len,
        delay,
    })
}

fn encode_scheduled_change(out: &mut alloc::vec::Vec<u8>, change: &GrandpaScheduledChangeRef<'_>) {
    out.extend_from_slice(&(change.next_authorities_len as u32).to_le_bytes());
    out.extend_from_slice(change.next_authorities);
    out.extend_from_slice(&change.delay.to_le_bytes());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pause_round_trips() {
        let mut bytes = alloc::vec![4u8];
        bytes.extend_from_slice(&10u64.to_le_bytes());
        assert_eq!(
            GrandpaConsensusLogRef::from_slice(&bytes).unwrap(),
            GrandpaConsensusLogRef::Pause(10)
        );
    }

    #[test]
    fn scheduled_change_with_no_authorities_round_trips() {
        let mut bytes = alloc::vec![1u8];
        bytes.extend_from_slice(&0u32.to_le_bytes());
        bytes.extend_from_slice(&5u64.to_le_bytes());
        let decoded = GrandpaConsensusLogRef::from_slice(&bytes).unwrap();
        match decoded {
            GrandpaConsensusLogRef::ScheduledChange(change) => {
                assert_eq!(change.next_authorities_len, 0);
                assert_eq!(change.delay, 5);
            }
            _ => panic!("wrong variant"),
        }
    }
}
