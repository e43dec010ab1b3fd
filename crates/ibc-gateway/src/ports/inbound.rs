//! # Inbound Ports
//!
//! API trait defining what the gateway core exposes to transports.

use super::outbound::AssetMovement;
use crate::domain::{
    DenomTrace, GatewayError, Height, IbcEvent, MithrilHeader, NewClientState, Packet, Pagination,
    UnsignedTx,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Outbound ICS-20 transfer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendPacketRequest {
    /// Source port.
    pub source_port: String,
    /// Source channel.
    pub source_channel: String,
    /// Denom as supplied: canonical path, native unit or `ibc/<hash>`.
    pub token_denom: String,
    /// Amount as a decimal string.
    pub token_amount: String,
    /// Sender address on this chain.
    pub sender: String,
    /// Receiver on the counterparty.
    pub receiver: String,
    /// Memo.
    pub memo: String,
    /// Timeout height.
    pub timeout_height: Height,
    /// Timeout timestamp, nanoseconds.
    pub timeout_timestamp: u64,
}

/// Inbound packet relay.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecvPacketRequest {
    /// Packet as committed by the counterparty.
    pub packet: Packet,
    /// Height of the commitment proof.
    pub proof_height: Height,
    /// Relayer address.
    pub signer: String,
}

/// Acknowledgement relay.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AcknowledgePacketRequest {
    /// Original outbound packet.
    pub packet: Packet,
    /// Acknowledgement bytes, hex.
    pub acknowledgement: String,
    /// Height of the acknowledgement proof.
    pub proof_height: Height,
    /// Relayer address.
    pub signer: String,
}

/// Timeout relay.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeoutPacketRequest {
    /// Original outbound packet.
    pub packet: Packet,
    /// Proven next receive sequence on the counterparty.
    pub next_sequence_recv: u64,
    /// Height of the non-receipt proof.
    pub proof_height: Height,
    /// Relayer address.
    pub signer: String,
}

/// Result of a packet build.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PacketBuildResult {
    /// Unsigned transaction from the ledger builder.
    pub unsigned_tx: UnsignedTx,
    /// Resolved asset movement.
    pub movement: AssetMovement,
    /// Packet as built (send) or as relayed.
    pub packet: Packet,
    /// HostState root expected once the transaction confirms.
    pub expected_new_root: String,
}

/// Page of denom traces.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DenomTracePage {
    /// Rows on this page.
    pub traces: Vec<DenomTrace>,
    /// Total rows.
    pub total: usize,
}

/// IBC gateway API - inbound port.
#[async_trait]
pub trait IbcGatewayApi: Send + Sync {
    /// Resolve any denom form to its canonical path.
    async fn resolve_denom(&self, denom: &str) -> Result<String, GatewayError>;

    /// Build an outbound transfer.
    async fn build_send_packet(
        &self,
        request: SendPacketRequest,
    ) -> Result<PacketBuildResult, GatewayError>;

    /// Build an inbound packet receipt.
    async fn build_recv_packet(
        &self,
        request: RecvPacketRequest,
    ) -> Result<PacketBuildResult, GatewayError>;

    /// Build an acknowledgement.
    async fn build_acknowledge_packet(
        &self,
        request: AcknowledgePacketRequest,
    ) -> Result<PacketBuildResult, GatewayError>;

    /// Build a timeout.
    async fn build_timeout_packet(
        &self,
        request: TimeoutPacketRequest,
    ) -> Result<PacketBuildResult, GatewayError>;

    /// Light-client header for `height`.
    async fn query_header(&self, height: u64) -> Result<MithrilHeader, GatewayError>;

    /// Client bootstrap at exactly `height`.
    async fn query_new_client(&self, height: u64) -> Result<NewClientState, GatewayError>;

    /// Denom trace by voucher token name or `ibc/<hash>`.
    async fn query_denom_trace(&self, hash: &str) -> Result<DenomTrace, GatewayError>;

    /// Page of denom traces.
    async fn query_denom_traces(&self, page: Pagination) -> Result<DenomTracePage, GatewayError>;

    /// Apply a confirmed transaction and return its events.
    async fn confirm_transaction(&self, tx_id: &str) -> Result<Vec<IbcEvent>, GatewayError>;
}
