//! # Adapters Layer (Hexagonal Architecture)
//!
//! Implements outbound port traits backed by local state.

mod denom_store;

pub use denom_store::InMemoryDenomTraceStore;
