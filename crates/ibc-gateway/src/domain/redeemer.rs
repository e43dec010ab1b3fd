//! # Redeemers
//!
//! Exact schemas of the on-chain redeemers the gateway reads back from
//! history. Decoding is strict: unknown variants and unknown fields are
//! rejected, never guessed at.

use super::entities::Packet;
use super::errors::GatewayError;
use super::value_objects::Height;
use serde::{Deserialize, Serialize};

/// Redeemer purpose as reported by the indexer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RedeemerPurpose {
    /// Spending a script output.
    Spend,
    /// Minting or burning under a policy.
    Mint,
    /// Anything the backfill does not read.
    Other,
}

/// Raw redeemer attached to a historical transaction.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedeemerRecord {
    /// Purpose.
    pub purpose: RedeemerPurpose,
    /// Decoded redeemer data as JSON.
    pub data: String,
}

/// Historical transaction that minted under the voucher policy.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoucherMintTx {
    /// Transaction hash.
    pub tx_hash: String,
    /// Redeemers attached to the transaction.
    pub redeemers: Vec<RedeemerRecord>,
    /// Voucher token names (asset name hex) minted by the transaction.
    pub minted_token_names: Vec<String>,
}

/// `RecvPacket` spend arguments.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RecvPacketArgs {
    /// Packet.
    pub packet: Packet,
    /// Proof height.
    pub proof_height: Height,
}

/// `AcknowledgePacket` spend arguments.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AcknowledgePacketArgs {
    /// Packet.
    pub packet: Packet,
    /// Acknowledgement, hex.
    pub acknowledgement: String,
    /// Proof height.
    pub proof_height: Height,
}

/// `TimeoutPacket` spend arguments.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TimeoutPacketArgs {
    /// Packet.
    pub packet: Packet,
    /// Proven next receive sequence on the counterparty.
    pub next_sequence_recv: u64,
    /// Proof height.
    pub proof_height: Height,
}

/// `SendPacket` spend arguments.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SendPacketArgs {
    /// Packet.
    pub packet: Packet,
}

/// Channel spend redeemer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SpendChannelRedeemer {
    /// Inbound packet.
    RecvPacket(RecvPacketArgs),
    /// Acknowledgement of an outbound packet.
    AcknowledgePacket(AcknowledgePacketArgs),
    /// Timeout of an outbound packet.
    TimeoutPacket(TimeoutPacketArgs),
    /// Outbound packet.
    SendPacket(SendPacketArgs),
}

impl SpendChannelRedeemer {
    /// The packet this redeemer carries.
    pub fn packet(&self) -> &Packet {
        match self {
            Self::RecvPacket(a) => &a.packet,
            Self::AcknowledgePacket(a) => &a.packet,
            Self::TimeoutPacket(a) => &a.packet,
            Self::SendPacket(a) => &a.packet,
        }
    }
}

/// Endpoints of a voucher mint on recv.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MintVoucherArgs {
    /// Packet source port.
    pub packet_source_port: String,
    /// Packet source channel.
    pub packet_source_channel: String,
    /// Packet destination port.
    pub packet_dest_port: String,
    /// Packet destination channel.
    pub packet_dest_channel: String,
}

/// Source endpoint of a voucher burn or refund.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SourceEndpointArgs {
    /// Packet source port.
    pub packet_source_port: String,
    /// Packet source channel.
    pub packet_source_channel: String,
}

/// Voucher minting policy redeemer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum MintVoucherRedeemer {
    /// Mint on recv.
    MintVoucher(MintVoucherArgs),
    /// Burn on send.
    BurnVoucher(SourceEndpointArgs),
    /// Re-mint on ack error or timeout.
    RefundVoucher(SourceEndpointArgs),
}

/// Strictly decode a channel spend redeemer.
pub fn decode_spend_channel_redeemer(data: &str) -> Result<SpendChannelRedeemer, GatewayError> {
    serde_json::from_str(data)
        .map_err(|e| GatewayError::invalid(format!("not a channel spend redeemer: {}", e)))
}

/// Strictly decode a voucher minting redeemer.
pub fn decode_mint_voucher_redeemer(data: &str) -> Result<MintVoucherRedeemer, GatewayError> {
    serde_json::from_str(data)
        .map_err(|e| GatewayError::invalid(format!("not a voucher mint redeemer: {}", e)))
}
