//! # Denom Resolution
//!
//! Pure functions translating between ICS-20 denom strings and ledger
//! units. Two hashes of the same canonical string live here and must never
//! be swapped:
//!
//! - [`ibc_denom_hash`]: SHA-256, the `ibc/<hash>` alias.
//! - [`build_voucher_token_name`]: SHA3-256, the voucher asset name.

use crate::domain::{DenomForm, GatewayError, Utxo, LOVELACE};
use sha2::{Digest, Sha256};
use sha3::Sha3_256;

/// Whether `s` is already hex-encoded bytes (non-empty, even length).
pub fn is_hex_encoded(s: &str) -> bool {
    !s.is_empty() && s.len() % 2 == 0 && s.bytes().all(|b| b.is_ascii_hexdigit())
}

/// Lowercase hex SHA-256 of the hex-encoded full denom.
///
/// `path` may be empty, in which case only `base_denom` is hashed.
pub fn ibc_denom_hash(path: &str, base_denom: &str) -> String {
    let full = if path.is_empty() {
        base_denom.to_string()
    } else {
        format!("{}/{}", path, base_denom)
    };
    let digest = Sha256::digest(hex::encode(full.as_bytes()).as_bytes());
    hex::encode(digest)
}

/// Voucher asset name: SHA3-256 of the hex-encoded canonical denom.
///
/// The denom is hashed as given. A multi-hop path is never re-prefixed.
pub fn build_voucher_token_name(denom: &str) -> Result<String, GatewayError> {
    if let DenomForm::IbcAlias(hash) = DenomForm::classify(denom) {
        return Err(GatewayError::invalid(format!(
            "cannot build voucher name from unresolved alias ibc/{}",
            hash
        )));
    }
    if is_hex_encoded(denom) {
        return Err(GatewayError::invalid(format!(
            "denom {} is already hex-encoded",
            denom
        )));
    }
    let digest = Sha3_256::digest(hex::encode(denom.as_bytes()).as_bytes());
    Ok(hex::encode(digest))
}

/// Encode a denom for the packet payload.
///
/// Canonical paths pass through; aliases and hex are rejected; plain text
/// is hex-encoded exactly once.
pub fn normalize_packet_denom(denom: &str) -> Result<String, GatewayError> {
    match DenomForm::classify(denom) {
        DenomForm::Canonical(path) => Ok(path.to_string()),
        DenomForm::IbcAlias(hash) => Err(GatewayError::invalid(format!(
            "alias ibc/{} must be resolved before building packet data",
            hash
        ))),
        DenomForm::Native(text) if is_hex_encoded(text) => Err(GatewayError::invalid(format!(
            "denom {} is already hex-encoded",
            text
        ))),
        DenomForm::Native(text) => Ok(hex::encode(text.as_bytes())),
    }
}

/// Ledger unit carried by a packet denom once any prefix is stripped.
///
/// `lovelace` travels hex-encoded; native units are already policy+name hex.
pub fn packet_denom_to_unit(denom: &str) -> String {
    if denom == hex::encode(LOVELACE.as_bytes()) {
        LOVELACE.to_string()
    } else {
        denom.to_string()
    }
}

/// `port/channel/`
pub fn denom_prefix(port_id: &str, channel_id: &str) -> String {
    format!("{}/{}/", port_id, channel_id)
}

/// Whether `denom` was minted as a voucher over `port/channel`.
pub fn has_voucher_prefix(denom: &str, port_id: &str, channel_id: &str) -> bool {
    denom.starts_with(&denom_prefix(port_id, channel_id))
}

/// Split a full denom into `(path, base_denom)`.
///
/// Leading `port/channel-N` pairs form the path; the rest, which may itself
/// contain slashes, is the base denom.
pub fn split_denom_trace(full: &str) -> Result<(String, String), GatewayError> {
    let segments: Vec<&str> = full.split('/').collect();
    let mut hops = 0;
    while hops + 1 < segments.len() && is_channel_segment(segments[hops + 1]) {
        hops += 2;
    }
    let path = segments[..hops].join("/");
    let base = segments[hops..].join("/");
    if base.is_empty() || segments[hops..].iter().any(|s| s.is_empty()) {
        return Err(GatewayError::invalid(format!(
            "denom {} has no base denomination",
            full
        )));
    }
    Ok((path, base))
}

fn is_channel_segment(segment: &str) -> bool {
    segment
        .strip_prefix("channel-")
        .map(|n| !n.is_empty() && n.bytes().all(|b| b.is_ascii_digit()))
        .unwrap_or(false)
}

/// Find the exact native unit to escrow in the sender's wallet.
///
/// Only a unit equal to `resolved_denom` matches; a hashed voucher name is
/// never substituted.
pub fn resolve_escrow_denom_token(
    input_denom: &str,
    resolved_denom: &str,
    wallet_utxos: &[Utxo],
) -> Result<String, GatewayError> {
    let unit = packet_denom_to_unit(resolved_denom);
    if wallet_utxos.iter().any(|u| u.quantity_of(&unit) > 0) {
        return Ok(unit);
    }
    Err(GatewayError::invalid(format!(
        "denom {} (resolved {}) not found in sender wallet",
        input_denom, resolved_denom
    )))
}
