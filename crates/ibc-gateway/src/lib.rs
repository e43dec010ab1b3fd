//! # IBC Gateway Core
//!
//! Gateway between IBC (ICS-20 fungible token transfers) and a UTXO ledger
//! whose IBC state lives in script outputs and whose light client is
//! backed by Mithril certificates.
//!
//! **Architecture:** Hexagonal (DDD + Ports/Adapters)
//!
//! ## Purpose
//!
//! - Resolve caller denoms (`ibc/<hash>`, canonical paths, native units)
//!   and keep a durable registry of voucher denom traces
//! - Build send, receive, acknowledge and timeout transactions with the
//!   right asset movement (escrow, unescrow, mint, burn)
//! - Assemble light-client headers from a consistent Mithril snapshot,
//!   transaction proof and HostState
//! - Keep the local IBC state tree in lock-step with confirmed HostState
//!   roots
//!
//! ## Safety Rules
//!
//! | Rule | Enforced by |
//! |------|-------------|
//! | Unknown `ibc/<hash>` never guessed | `DenomResolver` |
//! | Escrow only spends the sender's exact unit | `PacketLifecycleCoordinator` |
//! | Vouchers never re-prefixed on refund | `PacketLifecycleCoordinator` |
//! | Headers only from matching snapshot/proof/HostState | `MithrilChainConverger` |
//! | No builds before the tree matches chain | `StateTreeCommitCoordinator` |
//!
//! ## Module Structure
//!
//! ```text
//! ibc-gateway/
//! ├── domain/          # Channel datums, packets, denom traces, Mithril types, errors
//! ├── algorithms/      # Denom hashing, commitments, ICS-23 tree, backfill derivation
//! ├── application/     # Resolver, packet coordinator, converger, tree coordinator, service
//! ├── ports/           # IbcGatewayApi, ChainIndexer, MithrilAggregator, LedgerTxBuilder
//! └── adapters/        # In-memory denom trace store
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod adapters;
pub mod algorithms;
pub mod application;
pub mod config;
pub mod domain;
pub mod ports;
pub mod telemetry;

// Re-exports
pub use adapters::InMemoryDenomTraceStore;
pub use algorithms::{
    build_voucher_token_name, commit_acknowledgement, commit_packet, double_to_fraction,
    ibc_denom_hash, normalize_packet_denom, split_denom_trace, success_ack_commitment,
    Ics23MerkleTree,
};
pub use application::{
    BackfillOutcome, BackfillReconciler, BackfillReport, DenomRegistry, DenomResolver,
    GatewayService, MithrilChainConverger, PacketLifecycleCoordinator,
    StateTreeCommitCoordinator,
};
pub use config::{DeploymentConfig, GatewayConfig, MithrilConfig, TelemetryConfig};
pub use domain::{
    DenomTrace, ErrorKind, GatewayError, Height, IbcEvent, MithrilHeader, NewClientState,
    NewDenomTrace, Packet, Pagination,
};
pub use ports::{
    AcknowledgePacketRequest, AssetMovement, ChainIndexer, DenomTracePage, DenomTraceStore,
    GatewayMetrics, IbcGatewayApi, LedgerTxBuilder, MithrilAggregator, NoopMetrics,
    PacketBuildResult, RecvPacketRequest, SendPacketRequest, TimeoutPacketRequest,
};
pub use telemetry::init_tracing;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
