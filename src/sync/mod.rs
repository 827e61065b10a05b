//! The synchronization state machines: header-first block sync ([`blocks`]), cursor-driven warp
//! state sync ([`state`]) and the light-client remote-call/remote-read protocol ([`light`]).
//!
//! Grounded on the "Coroutine control flow" rule: each flow is an explicit `enum ...State`
//! advanced by a single `on_event`-shaped function rather than a chain of nested callbacks, the
//! same restructuring kagome's `StateSyncRequestFlow` callback chain is generalized into by
//! [`state::StateSyncFlow`].

pub mod blocks;
pub mod light;
pub mod state;
