//! # Domain Module
//!
//! Core domain types for the IBC gateway.

pub mod backfill;
pub mod entities;
pub mod errors;
pub mod invariants;
pub mod mithril;
pub mod redeemer;
pub mod value_objects;

pub use backfill::*;
pub use entities::*;
pub use errors::*;
pub use invariants::*;
pub use mithril::*;
pub use redeemer::*;
pub use value_objects::*;
