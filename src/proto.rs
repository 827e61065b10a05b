//! Generated protobuf types for the sync/state/light-client wire schema (`proto/api.v1.proto`),
//! compiled at build time by `build.rs` exactly as substrate's `sc-network-sync` includes its
//! generated `schema.rs` rather than hand-maintaining the `prost::Message` impls.
//!
//! Nothing outside [`crate::network`] and [`crate::sync`] should need to name these types
//! directly; they exist to be converted to/from this crate's own request/response structs at the
//! wire boundary.

#![allow(clippy::derive_partial_eq_without_eq)]

include!(concat!(env!("OUT_DIR"), "/api.v1.rs"));
