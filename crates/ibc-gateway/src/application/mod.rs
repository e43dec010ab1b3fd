//! # Application Module
//!
//! Application services orchestrating the domain and outbound ports.

pub mod backfill;
pub mod denom_resolver;
pub mod mithril_converger;
pub mod packet_coordinator;
pub mod service;
pub mod state_tree;

pub use backfill::{BackfillOutcome, BackfillReconciler, BackfillReport};
pub use denom_resolver::{DenomRegistry, DenomResolver};
pub use mithril_converger::{Convergence, MithrilChainConverger};
pub use packet_coordinator::PacketLifecycleCoordinator;
pub use service::GatewayService;
pub use state_tree::{
    packet_state_mutations, CommitFn, PendingStateTreeUpdate, StateTreeCommitCoordinator,
    TreeMutation,
};
