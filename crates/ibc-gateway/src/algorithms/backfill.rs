//! # Denom Trace Backfill Derivation
//!
//! Derives `(voucher token name, full denom path)` candidates from the
//! redeemers of historical voucher mints, and groups them per token name.
//! Only exact redeemer schemas are read; anything that does not decode is
//! not ICS-20 activity and contributes nothing.

use super::denom::{build_voucher_token_name, denom_prefix};
use crate::domain::{
    decode_mint_voucher_redeemer, decode_spend_channel_redeemer, FungibleTokenPacketData,
    MintVoucherRedeemer, Packet, RedeemerPurpose, RedeemerRecord, SpendChannelRedeemer,
    VoucherMintTx,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// How a candidate path was derived.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum CandidateDerivation {
    /// Voucher minted on recv.
    RecvMint,
    /// Voucher re-minted on an error acknowledgement.
    AckRefund,
    /// Voucher re-minted on timeout.
    TimeoutRefund,
}

impl fmt::Display for CandidateDerivation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::RecvMint => "recv_mint",
            Self::AckRefund => "ack_refund",
            Self::TimeoutRefund => "timeout_refund",
        })
    }
}

/// A candidate trace for one voucher token name.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct VoucherTraceCandidate {
    /// SHA3-256 voucher token name.
    pub voucher_token_name: String,
    /// Full denom path that hashes to it.
    pub full_denom_path: String,
    /// Derivation rule used.
    pub derivation: CandidateDerivation,
}

/// Per-token grouping result.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TokenResolution {
    /// Exactly one path.
    Resolved(String),
    /// No candidate path.
    Unresolved,
    /// More than one distinct path.
    Ambiguous(Vec<String>),
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum PacketKind {
    Recv,
    Ack,
    Timeout,
}

struct PacketContext<'a> {
    kind: PacketKind,
    packet: &'a Packet,
    denom: String,
}

/// Candidates derivable from one transaction's redeemers.
pub fn derive_candidates_for_tx(redeemers: &[RedeemerRecord]) -> Vec<VoucherTraceCandidate> {
    let mut spends = Vec::new();
    let mut mints = Vec::new();
    for record in redeemers {
        match record.purpose {
            RedeemerPurpose::Spend => {
                if let Ok(decoded) = decode_spend_channel_redeemer(&record.data) {
                    spends.push(decoded);
                }
            }
            RedeemerPurpose::Mint => {
                if let Ok(decoded) = decode_mint_voucher_redeemer(&record.data) {
                    mints.push(decoded);
                }
            }
            RedeemerPurpose::Other => {}
        }
    }

    let contexts: Vec<PacketContext<'_>> = spends.iter().filter_map(packet_context).collect();

    let mut out = BTreeSet::new();
    for mint in &mints {
        match mint {
            MintVoucherRedeemer::MintVoucher(args) => {
                for ctx in contexts.iter().filter(|c| {
                    c.kind == PacketKind::Recv
                        && c.packet.source_port == args.packet_source_port
                        && c.packet.source_channel == args.packet_source_channel
                        && c.packet.destination_port == args.packet_dest_port
                        && c.packet.destination_channel == args.packet_dest_channel
                }) {
                    let path = format!(
                        "{}{}",
                        denom_prefix(&ctx.packet.destination_port, &ctx.packet.destination_channel),
                        ctx.denom
                    );
                    push_candidate(&mut out, path, CandidateDerivation::RecvMint);
                }
            }
            MintVoucherRedeemer::RefundVoucher(args) => {
                for ctx in contexts.iter().filter(|c| {
                    c.kind != PacketKind::Recv
                        && c.packet.source_port == args.packet_source_port
                        && c.packet.source_channel == args.packet_source_channel
                }) {
                    // Refunds re-mint the original denom without any extra hop prefix.
                    let derivation = if ctx.kind == PacketKind::Ack {
                        CandidateDerivation::AckRefund
                    } else {
                        CandidateDerivation::TimeoutRefund
                    };
                    push_candidate(&mut out, ctx.denom.clone(), derivation);
                }
            }
            MintVoucherRedeemer::BurnVoucher(_) => {}
        }
    }
    out.into_iter().collect()
}

fn packet_context(redeemer: &SpendChannelRedeemer) -> Option<PacketContext<'_>> {
    let kind = match redeemer {
        SpendChannelRedeemer::RecvPacket(_) => PacketKind::Recv,
        SpendChannelRedeemer::AcknowledgePacket(_) => PacketKind::Ack,
        SpendChannelRedeemer::TimeoutPacket(_) => PacketKind::Timeout,
        SpendChannelRedeemer::SendPacket(_) => return None,
    };
    let packet = redeemer.packet();
    let data = FungibleTokenPacketData::from_hex(&packet.data).ok()?;
    Some(PacketContext {
        kind,
        packet,
        denom: data.denom,
    })
}

fn push_candidate(
    out: &mut BTreeSet<VoucherTraceCandidate>,
    full_denom_path: String,
    derivation: CandidateDerivation,
) {
    if let Ok(voucher_token_name) = build_voucher_token_name(&full_denom_path) {
        out.insert(VoucherTraceCandidate {
            voucher_token_name,
            full_denom_path,
            derivation,
        });
    }
}

/// Group candidates of all transactions per minted token name.
///
/// A token name resolves only if exactly one distinct path was derived for
/// it across every transaction that minted it.
pub fn group_by_token_name(txs: &[VoucherMintTx]) -> BTreeMap<String, TokenResolution> {
    let mut paths: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
    for tx in txs {
        let candidates = derive_candidates_for_tx(&tx.redeemers);
        for name in &tx.minted_token_names {
            let name = name.to_lowercase();
            let entry = paths.entry(name.clone()).or_default();
            entry.extend(
                candidates
                    .iter()
                    .filter(|c| c.voucher_token_name == name)
                    .map(|c| c.full_denom_path.clone()),
            );
        }
    }

    paths
        .into_iter()
        .map(|(name, set)| {
            let mut iter = set.into_iter();
            let resolution = match (iter.next(), iter.next()) {
                (None, _) => TokenResolution::Unresolved,
                (Some(path), None) => TokenResolution::Resolved(path),
                (Some(first), Some(second)) => {
                    TokenResolution::Ambiguous([first, second].into_iter().chain(iter).collect())
                }
            };
            (name, resolution)
        })
        .collect()
}
