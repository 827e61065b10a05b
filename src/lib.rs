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

//! Core trie, block-production/import and synchronization state machines for a
//! Polkadot-compatible host.
//!
//! This crate does not itself perform networking, WASM execution, or cryptography; it models
//! those as the [`crypto::Hasher`]/[`crypto::Signer`], [`executor::RuntimeEngine`] and
//! [`network::StreamTransport`] capability sets and consumes them.

#![cfg_attr(not(feature = "std"), no_std)]

extern crate alloc;

pub mod block;
pub mod block_tree;
pub mod changes_trie;
pub mod config;
pub mod crypto;
pub mod executor;
pub mod header;
pub mod import;
pub mod kv;
pub mod network;
pub mod nibble;
pub mod overlay;
pub mod production;
pub mod proto;
pub mod sync;
pub mod trie;
