//! # Domain Errors
//!
//! Error types for the IBC gateway core.
//!
//! Every error maps onto one of four classes (see [`ErrorKind`]) so a
//! transport layer can translate it into a status code without matching
//! every variant.

use super::backfill::BackfillReport;
use thiserror::Error;

/// 32-byte hash (SHA-256 or SHA3-256 output).
pub type Hash = [u8; 32];

/// Coarse error classes surfaced to callers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Missing UTXO or registry row.
    NotFound,
    /// Malformed, ambiguous or already-encoded input.
    InvalidArgument,
    /// Conflicting persisted state or unexpected store failure.
    Internal,
    /// Bounded-retry exhaustion or missing certification artifact.
    ConvergenceFailure,
}

/// Gateway error types.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Required on-chain state or registry row is missing.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Caller-supplied input is malformed or cannot be resolved.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Internal invariant violation.
    #[error("Internal error: {0}")]
    Internal(String),

    /// Snapshot, proof and HostState could not be aligned within the attempt cap.
    #[error("Failed to converge Mithril snapshot/proof/HostState alignment after {attempts} attempts")]
    ConvergenceFailure {
        /// Attempts made before giving up.
        attempts: u32,
    },

    /// A stake-distribution certificate has no matching aggregator artifact.
    #[error("Mithril stake distribution artifact missing for certificate {certificate_hash}")]
    MissingStakeDistribution {
        /// Hash of the certificate whose artifact is missing.
        certificate_hash: String,
    },

    /// Certificate chain does not terminate at a stake-distribution anchor.
    #[error("Broken certificate chain at {certificate_hash}: {reason}")]
    BrokenCertificateChain {
        /// Certificate where the walk stopped.
        certificate_hash: String,
        /// Why the walk stopped.
        reason: String,
    },

    /// Channel is not in the Open state.
    #[error("Channel {channel_id} not in Open state (state: {state})")]
    ChannelNotOpen {
        /// Channel identifier.
        channel_id: String,
        /// Observed state.
        state: String,
    },

    /// Receipt already recorded for this sequence.
    #[error("PacketReceivedException: packet with sequence {sequence} has already been received")]
    PacketAlreadyReceived {
        /// Packet sequence.
        sequence: u64,
    },

    /// No commitment exists for this sequence.
    #[error("Packet with sequence {sequence} does not exist in the packet commitment map")]
    CommitmentNotFound {
        /// Packet sequence.
        sequence: u64,
    },

    /// Proof height is not among the client's consensus-state heights.
    #[error("Invalid proof height: {0}")]
    InvalidProofHeight(u64),

    /// On-chain HostState root differs from the expected root.
    #[error("State root mismatch: expected {expected}, on-chain {actual}")]
    RootMismatch {
        /// Root computed locally.
        expected: String,
        /// Root read from the ledger.
        actual: String,
    },

    /// State tree has not been rebuilt from chain yet.
    #[error("IBC state tree is not initialized")]
    TreeNotReady,

    /// Persistent store failure.
    #[error("Store error: {0}")]
    Store(String),

    /// Indexer or aggregator failure.
    #[error("Upstream error: {0}")]
    Upstream(String),

    /// Backfill finished with tokens that did not resolve cleanly.
    #[error(
        "Denom trace backfill incomplete: {} unresolved, {} ambiguous, {} conflicts, {} errors",
        report.unresolved,
        report.ambiguous,
        report.conflicts,
        report.errors
    )]
    BackfillIncomplete {
        /// Full run report.
        report: Box<BackfillReport>,
    },
}

impl GatewayError {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound(_) | Self::CommitmentNotFound { .. } => ErrorKind::NotFound,
            Self::InvalidArgument(_)
            | Self::ChannelNotOpen { .. }
            | Self::PacketAlreadyReceived { .. }
            | Self::InvalidProofHeight(_) => ErrorKind::InvalidArgument,
            Self::Internal(_)
            | Self::RootMismatch { .. }
            | Self::TreeNotReady
            | Self::Store(_)
            | Self::Upstream(_)
            | Self::BackfillIncomplete { .. } => ErrorKind::Internal,
            Self::ConvergenceFailure { .. }
            | Self::MissingStakeDistribution { .. }
            | Self::BrokenCertificateChain { .. } => ErrorKind::ConvergenceFailure,
        }
    }

    /// Shorthand for `InvalidArgument`.
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    /// Shorthand for `NotFound`.
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }
}
