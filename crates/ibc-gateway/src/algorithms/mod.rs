//! # Algorithms Module
//!
//! Pure algorithms for the IBC gateway: denom hashing, packet commitments,
//! continued fractions, the ICS-23 state tree and backfill derivation.

pub mod backfill;
pub mod commitment;
pub mod denom;
pub mod fraction;
pub mod state_tree;

pub use backfill::{
    derive_candidates_for_tx, group_by_token_name, CandidateDerivation, TokenResolution,
    VoucherTraceCandidate,
};
pub use commitment::{commit_acknowledgement, commit_packet, success_ack_commitment};
pub use denom::{
    build_voucher_token_name, denom_prefix, has_voucher_prefix, ibc_denom_hash, is_hex_encoded,
    normalize_packet_denom, packet_denom_to_unit, resolve_escrow_denom_token, split_denom_trace,
};
pub use fraction::{double_to_fraction, FRACTION_TOLERANCE};
pub use state_tree::{ExistenceProof, Ics23MerkleTree, InnerOp, EMPTY_ROOT};
