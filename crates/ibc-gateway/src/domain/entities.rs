//! # Domain Entities
//!
//! Denom traces, ledger-anchored IBC objects and packets.

use super::errors::GatewayError;
use super::value_objects::{ChannelOrder, ChannelState, Height, IbcObjectKind};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// =============================================================================
// Denom traces
// =============================================================================

/// Persisted mapping from a voucher token name to its ICS-20 trace.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DenomTrace {
    /// SHA3-256 voucher token name (primary key).
    pub hash: String,
    /// Port/channel hops, e.g. `transfer/channel-7`. Empty for a native denom.
    pub path: String,
    /// Base denomination on the origin chain.
    pub base_denom: String,
    /// Minting policy of the voucher.
    pub voucher_policy_id: String,
    /// ICS-20 `ibc/<hash>` hash, lowercase hex.
    pub ibc_denom_hash: String,
    /// When the voucher was first seen.
    pub first_seen: DateTime<Utc>,
    /// Confirming transaction, filled once after confirmation.
    pub tx_hash: Option<String>,
}

impl DenomTrace {
    /// Full denom path, `path/base_denom` or just `base_denom`.
    pub fn full_denom(&self) -> String {
        if self.path.is_empty() {
            self.base_denom.clone()
        } else {
            format!("{}/{}", self.path, self.base_denom)
        }
    }
}

/// Input to `save_denom_trace`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewDenomTrace {
    /// SHA3-256 voucher token name.
    pub hash: String,
    /// Port/channel hops.
    pub path: String,
    /// Base denomination.
    pub base_denom: String,
    /// Minting policy of the voucher.
    pub voucher_policy_id: String,
    /// Optional precomputed ICS-20 hash; validated against the formula.
    pub ibc_denom_hash: Option<String>,
    /// Optional confirming transaction.
    pub tx_hash: Option<String>,
}

// =============================================================================
// Sequence-keyed maps
// =============================================================================

/// Sequence-keyed map stored as an ordered list of entries.
///
/// All mutators return a new map and leave `self` untouched.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SequenceMap<V> {
    entries: Vec<(u64, V)>,
}

impl<V> Default for SequenceMap<V> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
        }
    }
}

impl<V: Clone> SequenceMap<V> {
    /// Empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from entries in the given order.
    pub fn from_entries(entries: impl IntoIterator<Item = (u64, V)>) -> Self {
        Self {
            entries: entries.into_iter().collect(),
        }
    }

    /// Value at `sequence`.
    pub fn get(&self, sequence: u64) -> Option<&V> {
        self.entries
            .iter()
            .find(|(k, _)| *k == sequence)
            .map(|(_, v)| v)
    }

    /// Whether `sequence` is present.
    pub fn contains(&self, sequence: u64) -> bool {
        self.entries.iter().any(|(k, _)| *k == sequence)
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the map is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Keys in stored order.
    pub fn keys(&self) -> impl Iterator<Item = u64> + '_ {
        self.entries.iter().map(|(k, _)| *k)
    }

    /// Entries in stored order.
    pub fn iter(&self) -> impl Iterator<Item = (u64, &V)> + '_ {
        self.entries.iter().map(|(k, v)| (*k, v))
    }

    /// New map with `(sequence, value)` inserted in ascending key position.
    pub fn inserted(&self, sequence: u64, value: V) -> Self {
        let mut entries: Vec<(u64, V)> = self
            .entries
            .iter()
            .filter(|(k, _)| *k != sequence)
            .cloned()
            .collect();
        entries.push((sequence, value));
        entries.sort_by_key(|(k, _)| *k);
        Self { entries }
    }

    /// New map with `(sequence, value)` placed first (newest-first log).
    pub fn prepended(&self, sequence: u64, value: V) -> Self {
        let mut entries = Vec::with_capacity(self.entries.len() + 1);
        entries.push((sequence, value));
        entries.extend(self.entries.iter().filter(|(k, _)| *k != sequence).cloned());
        Self { entries }
    }

    /// New map without `sequence`.
    pub fn removed(&self, sequence: u64) -> Self {
        Self {
            entries: self
                .entries
                .iter()
                .filter(|(k, _)| *k != sequence)
                .cloned()
                .collect(),
        }
    }

    /// Whether keys are strictly ascending.
    pub fn is_ascending(&self) -> bool {
        self.entries.windows(2).all(|w| w[0].0 < w[1].0)
    }
}

// =============================================================================
// Ledger objects
// =============================================================================

/// Reference to a transaction output.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UtxoRef {
    /// Producing transaction.
    pub tx_hash: String,
    /// Output index.
    pub output_index: u32,
}

/// Unspent output with its assets (unit -> quantity).
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Utxo {
    /// Output reference.
    pub reference: UtxoRef,
    /// Holding address.
    pub address: String,
    /// Assets keyed by unit (`lovelace` or policy id + asset name hex).
    pub assets: BTreeMap<String, u128>,
}

impl Utxo {
    /// Quantity of `unit` held by this output.
    pub fn quantity_of(&self, unit: &str) -> u128 {
        self.assets.get(unit).copied().unwrap_or(0)
    }
}

/// Counterparty channel end.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Counterparty {
    /// Counterparty port.
    pub port_id: String,
    /// Counterparty channel.
    pub channel_id: String,
}

/// Channel end as recorded on chain.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelEnd {
    /// Handshake state.
    pub state: ChannelState,
    /// Packet ordering.
    pub ordering: ChannelOrder,
    /// Counterparty end.
    pub counterparty: Counterparty,
    /// Connection hops (first hop is used).
    pub connection_hops: Vec<String>,
    /// Application version.
    pub version: String,
}

/// Packet bookkeeping carried in the channel datum.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelPacketState {
    /// Next sequence to assign on send.
    pub next_sequence_send: u64,
    /// Next sequence expected on ordered recv.
    pub next_sequence_recv: u64,
    /// Next sequence expected on ordered ack.
    pub next_sequence_ack: u64,
    /// Commitments of in-flight outbound packets (hex).
    pub packet_commitment: SequenceMap<String>,
    /// Receipts of inbound packets, newest first.
    pub packet_receipt: SequenceMap<String>,
    /// Acknowledgement commitments written on recv (hex).
    pub packet_acknowledgement: SequenceMap<String>,
}

impl Default for ChannelPacketState {
    fn default() -> Self {
        Self {
            next_sequence_send: 1,
            next_sequence_recv: 1,
            next_sequence_ack: 1,
            packet_commitment: SequenceMap::new(),
            packet_receipt: SequenceMap::new(),
            packet_acknowledgement: SequenceMap::new(),
        }
    }
}

/// Decoded channel datum.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelDatum {
    /// Local port.
    pub port_id: String,
    /// Local channel.
    pub channel_id: String,
    /// Channel end.
    pub channel: ChannelEnd,
    /// Packet bookkeeping.
    pub state: ChannelPacketState,
}

/// Decoded connection datum.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionDatum {
    /// Connection identifier.
    pub connection_id: String,
    /// Client the connection is bound to.
    pub client_id: String,
    /// Delay period in nanoseconds.
    pub delay_period: u64,
}

/// Decoded client datum.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientDatum {
    /// Client identifier.
    pub client_id: String,
    /// Latest verified height.
    pub latest_height: Height,
    /// Heights with a stored consensus state.
    pub consensus_heights: Vec<Height>,
}

impl ClientDatum {
    /// Whether a consensus state exists at `revision_height`.
    pub fn has_consensus_at(&self, revision_height: u64) -> bool {
        self.consensus_heights
            .iter()
            .any(|h| h.revision_height == revision_height)
    }
}

/// Decoded HostState datum.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostStateDatum {
    /// Datum version, bumped on every state change.
    pub version: u64,
    /// Root of the IBC state tree, lowercase hex.
    pub ibc_state_root: String,
}

/// A state UTXO with its decoded datum.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateUtxo<D> {
    /// The output.
    pub utxo: Utxo,
    /// Its datum.
    pub datum: D,
}

/// IBC object scanned from chain during tree rebuild.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum IbcStateObject {
    /// Client state.
    Client {
        /// Client identifier.
        client_id: String,
        /// Committed client-state bytes.
        encoded_client_state: Vec<u8>,
    },
    /// Connection end.
    Connection {
        /// Connection identifier.
        connection_id: String,
        /// Committed connection-end bytes.
        encoded_connection: Vec<u8>,
    },
    /// Channel end plus its packet bookkeeping.
    Channel {
        /// Decoded datum.
        datum: ChannelDatum,
        /// Committed channel-end bytes.
        encoded_channel_end: Vec<u8>,
    },
}

impl IbcStateObject {
    /// Object kind.
    pub fn kind(&self) -> IbcObjectKind {
        match self {
            Self::Client { .. } => IbcObjectKind::Client,
            Self::Connection { .. } => IbcObjectKind::Connection,
            Self::Channel { .. } => IbcObjectKind::Channel,
        }
    }
}

// =============================================================================
// Packets
// =============================================================================

/// IBC packet.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Packet {
    /// Sequence number.
    pub sequence: u64,
    /// Sending port.
    pub source_port: String,
    /// Sending channel.
    pub source_channel: String,
    /// Receiving port.
    pub destination_port: String,
    /// Receiving channel.
    pub destination_channel: String,
    /// Opaque payload, hex.
    pub data: String,
    /// Timeout height (zero disables).
    pub timeout_height: Height,
    /// Timeout timestamp in nanoseconds (zero disables).
    pub timeout_timestamp: u64,
}

/// ICS-20 fungible token packet data.
///
/// Fields are declared in sorted order so serialization is canonical.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FungibleTokenPacketData {
    /// Amount as a decimal string.
    pub amount: String,
    /// Denom as carried on the wire.
    pub denom: String,
    /// Free-form memo.
    pub memo: String,
    /// Receiver on the destination chain.
    pub receiver: String,
    /// Sender on the source chain.
    pub sender: String,
}

impl FungibleTokenPacketData {
    /// Strictly decode a hex payload. Every field must be present.
    pub fn from_hex(data_hex: &str) -> Result<Self, GatewayError> {
        let bytes = hex::decode(data_hex)
            .map_err(|e| GatewayError::invalid(format!("packet data is not hex: {}", e)))?;
        let parsed: Self = serde_json::from_slice(&bytes).map_err(|e| {
            GatewayError::invalid(format!("packet data is not ICS-20 JSON: {}", e))
        })?;
        if parsed.denom.is_empty() {
            return Err(GatewayError::invalid("ICS-20 denom is empty"));
        }
        parsed.amount_value()?;
        Ok(parsed)
    }

    /// Canonical JSON bytes, hex-encoded.
    pub fn to_hex(&self) -> Result<String, GatewayError> {
        let json = serde_json::to_vec(self)
            .map_err(|e| GatewayError::Internal(format!("encode packet data: {}", e)))?;
        Ok(hex::encode(json))
    }

    /// Parsed positive amount.
    pub fn amount_value(&self) -> Result<u128, GatewayError> {
        match self.amount.parse::<u128>() {
            Ok(0) => Err(GatewayError::invalid("ICS-20 amount must be positive")),
            Ok(v) => Ok(v),
            Err(_) => Err(GatewayError::invalid(format!(
                "ICS-20 amount is not an integer: {}",
                self.amount
            ))),
        }
    }
}

/// Acknowledgement returned by the receiving chain.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Acknowledgement {
    /// Success payload.
    Result(String),
    /// Error string; triggers a refund.
    Error(String),
}

impl Acknowledgement {
    /// Success payload written by the transfer module (`0x01`, base64).
    pub const SUCCESS_RESULT: &'static str = "AQ==";

    /// The standard success acknowledgement.
    pub fn success() -> Self {
        Self::Result(Self::SUCCESS_RESULT.to_string())
    }

    /// Decode hex-encoded acknowledgement JSON.
    pub fn from_hex(ack_hex: &str) -> Result<Self, GatewayError> {
        let bytes = hex::decode(ack_hex)
            .map_err(|e| GatewayError::invalid(format!("acknowledgement is not hex: {}", e)))?;
        let value: serde_json::Value = serde_json::from_slice(&bytes)
            .map_err(|e| GatewayError::invalid(format!("acknowledgement is not JSON: {}", e)))?;
        let obj = value
            .as_object()
            .ok_or_else(|| GatewayError::invalid("acknowledgement is not a JSON object"))?;

        if let Some(result) = obj.get("result") {
            return Ok(Self::Result(json_text(result)));
        }
        if let Some(err) = obj.get("error").or_else(|| obj.get("err")) {
            return Ok(Self::Error(json_text(err)));
        }
        Err(GatewayError::invalid(
            "Acknowledgement Response invalid: unknown result",
        ))
    }

    /// Canonical JSON bytes.
    pub fn to_json_bytes(&self) -> Vec<u8> {
        let value = match self {
            Self::Result(r) => serde_json::json!({ "result": r }),
            Self::Error(e) => serde_json::json!({ "error": e }),
        };
        value.to_string().into_bytes()
    }

    /// Whether this is an error acknowledgement.
    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error(_))
    }
}

fn json_text(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Synthesized IBC event attribute.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventAttribute {
    /// Attribute key.
    pub key: String,
    /// Attribute value.
    pub value: String,
}

/// Synthesized IBC event returned after submission.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IbcEvent {
    /// Event type, e.g. `send_packet`.
    pub event_type: String,
    /// Attributes in emission order.
    pub attributes: Vec<EventAttribute>,
}

impl IbcEvent {
    /// Build an event from key/value pairs.
    pub fn new(event_type: impl Into<String>, attrs: &[(&str, String)]) -> Self {
        Self {
            event_type: event_type.into(),
            attributes: attrs
                .iter()
                .map(|(k, v)| EventAttribute {
                    key: (*k).to_string(),
                    value: v.clone(),
                })
                .collect(),
        }
    }
}

/// Unsigned transaction produced by the ledger builder.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnsignedTx {
    /// Transaction id (body hash), lowercase hex.
    pub tx_id: String,
    /// Serialized transaction, hex.
    pub cbor_hex: String,
}
