//! # Domain Value Objects
//!
//! Immutable value types shared by the gateway components.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Prefix of the ICS-20 hashed denom alias.
pub const IBC_DENOM_PREFIX: &str = "ibc/";

/// Native ada unit.
pub const LOVELACE: &str = "lovelace";

/// Prefix every channel identifier carries.
pub const CHANNEL_ID_PREFIX: &str = "channel";

/// Channel state machine.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChannelState {
    /// Not yet created.
    #[default]
    Uninitialized,
    /// Handshake started locally.
    Init,
    /// Handshake started by the counterparty.
    TryOpen,
    /// Packets may flow.
    Open,
    /// Closed, no further packets.
    Close,
}

impl ChannelState {
    /// Check if transition is valid.
    pub fn can_transition_to(&self, next: ChannelState) -> bool {
        match (self, next) {
            (Self::Uninitialized, Self::Init) => true,
            (Self::Uninitialized, Self::TryOpen) => true,
            (Self::Init, Self::Open) => true,
            (Self::TryOpen, Self::Open) => true,
            (Self::Open, Self::Close) => true,
            _ => false,
        }
    }

    /// Check if terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Close)
    }
}

impl fmt::Display for ChannelState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Channel packet ordering.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChannelOrder {
    /// Packets may be received in any order.
    #[default]
    Unordered,
    /// Packets must be received in sequence order.
    Ordered,
}

/// IBC height.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Height {
    /// Revision (fork) number.
    pub revision_number: u64,
    /// Height within the revision.
    pub revision_height: u64,
}

impl Height {
    /// Create a new height.
    pub fn new(revision_number: u64, revision_height: u64) -> Self {
        Self {
            revision_number,
            revision_height,
        }
    }
}

impl fmt::Display for Height {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.revision_number, self.revision_height)
    }
}

/// Surface form of a denom string.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DenomForm<'a> {
    /// Slash-delimited ICS-20 path, e.g. `transfer/channel-0/stake`.
    Canonical(&'a str),
    /// `ibc/<HASH>` alias; carries the hash part as given.
    IbcAlias(&'a str),
    /// Anything else: a native unit or plain text denom.
    Native(&'a str),
}

impl<'a> DenomForm<'a> {
    /// Classify a denom string.
    pub fn classify(denom: &'a str) -> Self {
        if let Some(hash) = denom.strip_prefix(IBC_DENOM_PREFIX) {
            if !hash.is_empty() && !hash.contains('/') {
                return Self::IbcAlias(hash);
            }
        }
        if denom.contains('/') {
            Self::Canonical(denom)
        } else {
            Self::Native(denom)
        }
    }
}

/// Offset/limit pagination for registry listings.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    /// Rows to skip.
    pub offset: usize,
    /// Maximum rows to return.
    pub limit: usize,
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            offset: 0,
            limit: 100,
        }
    }
}

/// Payment credential type of a ledger address.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum CredentialKind {
    /// Verification-key credential.
    Key,
    /// Script credential.
    Script,
}

/// Packet lifecycle step.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PacketOperation {
    /// Outbound transfer.
    Send,
    /// Inbound transfer.
    Recv,
    /// Acknowledgement of an outbound transfer.
    Acknowledge,
    /// Timeout of an outbound transfer.
    Timeout,
}

impl fmt::Display for PacketOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Send => "send_packet",
            Self::Recv => "recv_packet",
            Self::Acknowledge => "acknowledge_packet",
            Self::Timeout => "timeout_packet",
        };
        f.write_str(name)
    }
}

/// Kind of IBC object held in a state UTXO.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IbcObjectKind {
    /// Light client.
    Client,
    /// Connection end.
    Connection,
    /// Channel end.
    Channel,
}
