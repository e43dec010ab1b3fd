//! # Domain Invariants
//!
//! Business rules checked before any packet operation is assembled.

use super::entities::{ChannelDatum, SequenceMap};
use super::errors::GatewayError;
use super::value_objects::{ChannelState, CHANNEL_ID_PREFIX};

/// Invariant: channel identifiers look like `channel-<n>`.
pub fn invariant_channel_id_format(channel_id: &str) -> Result<(), GatewayError> {
    let valid = channel_id
        .strip_prefix(CHANNEL_ID_PREFIX)
        .and_then(|rest| rest.strip_prefix('-'))
        .map(|n| !n.is_empty() && n.bytes().all(|b| b.is_ascii_digit()))
        .unwrap_or(false);
    if !valid {
        return Err(GatewayError::invalid(format!(
            "invalid channel identifier {}: expected channel-<n>",
            channel_id
        )));
    }
    Ok(())
}

/// Invariant: packets only move on the configured transfer port.
pub fn invariant_transfer_port(port_id: &str, expected: &str) -> Result<(), GatewayError> {
    if port_id != expected {
        return Err(GatewayError::invalid(format!(
            "invalid port {}: expected {}",
            port_id, expected
        )));
    }
    Ok(())
}

/// Invariant: the channel is Open.
pub fn invariant_channel_open(datum: &ChannelDatum) -> Result<(), GatewayError> {
    if datum.channel.state != ChannelState::Open {
        return Err(GatewayError::ChannelNotOpen {
            channel_id: datum.channel_id.clone(),
            state: datum.channel.state.to_string(),
        });
    }
    Ok(())
}

/// Invariant: a required string argument is non-empty.
pub fn invariant_non_empty(field: &str, value: &str) -> Result<(), GatewayError> {
    if value.trim().is_empty() {
        return Err(GatewayError::invalid(format!("{} must not be empty", field)));
    }
    Ok(())
}

/// Invariant: commitment and acknowledgement maps keep ascending keys.
///
/// Receipts are newest-first and are not checked here.
pub fn invariant_sequence_order<V: Clone>(map: &SequenceMap<V>) -> bool {
    map.is_ascending()
}
