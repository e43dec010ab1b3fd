//! # Mithril Types
//!
//! Aggregator artifacts as served over the wire, and the normalized
//! header/client structures the gateway hands to counterparty light clients.

use super::value_objects::Height;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// =============================================================================
// Aggregator artifacts
// =============================================================================

/// Cardano transactions set snapshot.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MithrilSnapshot {
    /// Highest block covered.
    pub block_number: u64,
    /// Certificate that signed the snapshot.
    pub certificate_hash: String,
    /// Snapshot hash.
    pub hash: String,
    /// Epoch of the snapshot.
    pub epoch: u64,
    /// RFC 3339 creation time.
    pub created_at: String,
    /// Merkle root of the certified transaction set.
    pub merkle_root: String,
}

/// Transactions inclusion proof.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionsProof {
    /// Highest block covered by the proof.
    pub latest_block_number: u64,
    /// Certificate the proof is anchored on.
    pub certificate_hash: String,
    /// Transactions proven.
    #[serde(default)]
    pub certified_transactions: Vec<String>,
    /// Transactions the aggregator could not prove.
    #[serde(default)]
    pub non_certified_transactions: Vec<String>,
}

/// Mithril stake distribution artifact.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StakeDistributionArtifact {
    /// Epoch of the distribution.
    pub epoch: u64,
    /// Artifact hash.
    pub hash: String,
    /// Certificate that signed it.
    pub certificate_hash: String,
    /// RFC 3339 creation time.
    pub created_at: String,
}

/// Immutable-files beacon.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardanoDbBeacon {
    /// Network name.
    pub network: String,
    /// Epoch.
    pub epoch: u64,
    /// Last immutable file number.
    pub immutable_file_number: u64,
}

/// What a certificate signs.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SignedEntityType {
    /// Stake distribution of an epoch. Anchors a certificate chain.
    MithrilStakeDistribution(u64),
    /// Cardano transactions up to `(epoch, block_number)`.
    CardanoTransactions(u64, u64),
    /// Full immutable files snapshot.
    CardanoImmutableFilesFull(CardanoDbBeacon),
    /// Cardano stake distribution of an epoch.
    CardanoStakeDistribution(u64),
}

impl SignedEntityType {
    /// Whether this certificate anchors a chain.
    pub fn is_stake_distribution_anchor(&self) -> bool {
        matches!(self, Self::MithrilStakeDistribution(_))
    }
}

/// Signer with its stake.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignerWithStake {
    /// Pool id.
    pub party_id: String,
    /// Stake in lovelace.
    pub stake: u64,
}

/// Protocol parameters as served by the aggregator.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RawProtocolParameters {
    /// Quorum parameter.
    pub k: u64,
    /// Lottery size.
    pub m: u64,
    /// Lottery win probability, a float on the wire.
    pub phi_f: f64,
}

/// Certificate metadata as served by the aggregator.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RawCertificateMetadata {
    /// Network name.
    pub network: String,
    /// Protocol version.
    pub version: String,
    /// Protocol parameters.
    pub parameters: RawProtocolParameters,
    /// RFC 3339 time the signing round started.
    pub initiated_at: String,
    /// RFC 3339 time the certificate was sealed.
    pub sealed_at: String,
    /// Signers.
    #[serde(default)]
    pub signers: Vec<SignerWithStake>,
}

/// Protocol message as served by the aggregator.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawProtocolMessage {
    /// Message parts keyed by part name.
    #[serde(default)]
    pub message_parts: BTreeMap<String, String>,
}

/// Certificate as served by `/certificate/{hash}`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AggregatorCertificate {
    /// Certificate hash.
    pub hash: String,
    /// Previous certificate in the chain. Empty or absent at genesis.
    #[serde(default)]
    pub previous_hash: Option<String>,
    /// Epoch.
    pub epoch: u64,
    /// Signed entity.
    pub signed_entity_type: SignedEntityType,
    /// Metadata.
    pub metadata: RawCertificateMetadata,
    /// Protocol message.
    #[serde(default)]
    pub protocol_message: RawProtocolMessage,
    /// Signed message.
    #[serde(default)]
    pub signed_message: String,
    /// Aggregate verification key.
    #[serde(default)]
    pub aggregate_verification_key: String,
    /// Multi-signature, empty for genesis.
    #[serde(default)]
    pub multi_signature: String,
    /// Genesis signature, empty unless genesis.
    #[serde(default)]
    pub genesis_signature: String,
}

impl AggregatorCertificate {
    /// Previous hash, treating an empty string as absent.
    pub fn previous(&self) -> Option<&str> {
        self.previous_hash.as_deref().filter(|h| !h.is_empty())
    }
}

// =============================================================================
// Normalized (wire) structures
// =============================================================================

/// Exact rational number.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fraction {
    /// Numerator.
    pub numerator: u64,
    /// Denominator, never zero.
    pub denominator: u64,
}

/// Protocol parameters with `phi_f` as an exact fraction.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtocolParameters {
    /// Quorum parameter.
    pub k: u64,
    /// Lottery size.
    pub m: u64,
    /// Lottery win probability.
    pub phi_f: Fraction,
}

/// Known protocol message part keys.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProtocolMessagePartKey {
    /// Snapshot digest.
    SnapshotDigest,
    /// Transactions Merkle root.
    CardanoTransactionsMerkleRoot,
    /// Next AVK.
    NextAggregateVerificationKey,
    /// Latest immutable file number.
    LatestImmutableFileNumber,
    /// Next protocol parameters.
    NextProtocolParameters,
    /// Current epoch.
    CurrentEpoch,
    /// Anything else.
    Unrecognized,
}

impl ProtocolMessagePartKey {
    /// Map an aggregator part name.
    pub fn from_part_name(name: &str) -> Self {
        match name {
            "snapshot_digest" => Self::SnapshotDigest,
            "cardano_transactions_merkle_root" => Self::CardanoTransactionsMerkleRoot,
            "next_aggregate_verification_key" => Self::NextAggregateVerificationKey,
            "latest_immutable_file_number" => Self::LatestImmutableFileNumber,
            "next_protocol_parameters" => Self::NextProtocolParameters,
            "current_epoch" => Self::CurrentEpoch,
            _ => Self::Unrecognized,
        }
    }
}

/// Normalized message part.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessagePart {
    /// Part key.
    pub key: ProtocolMessagePartKey,
    /// Part value.
    pub value: String,
}

/// Normalized certificate metadata.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CertificateMetadata {
    /// Network name.
    pub network: String,
    /// Protocol version.
    pub protocol_version: String,
    /// Exact protocol parameters.
    pub protocol_parameters: ProtocolParameters,
    /// Signing round start.
    pub initiated_at: String,
    /// Seal time.
    pub sealed_at: String,
    /// Signers.
    pub signers: Vec<SignerWithStake>,
}

/// Normalized certificate.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MithrilCertificate {
    /// Certificate hash.
    pub hash: String,
    /// Previous certificate hash, empty at genesis.
    pub previous_hash: String,
    /// Epoch.
    pub epoch: u64,
    /// Signed entity.
    pub signed_entity_type: SignedEntityType,
    /// Metadata.
    pub metadata: CertificateMetadata,
    /// Protocol message parts.
    pub protocol_message: Vec<MessagePart>,
    /// Signed message.
    pub signed_message: String,
    /// Aggregate verification key.
    pub aggregate_verification_key: String,
    /// Multi-signature.
    pub multi_signature: String,
    /// Genesis signature.
    pub genesis_signature: String,
}

/// Normalized stake distribution.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MithrilStakeDistribution {
    /// Epoch.
    pub epoch: u64,
    /// Artifact hash.
    pub hash: String,
    /// Signing certificate.
    pub certificate_hash: String,
    /// Signers and stakes.
    pub signers_with_stake: Vec<SignerWithStake>,
    /// Creation time, nanoseconds since the Unix epoch.
    pub created_at: u64,
    /// Exact protocol parameters.
    pub protocol_parameters: ProtocolParameters,
}

/// HostState output at a given block.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostStateRef {
    /// Transaction that produced the output.
    pub tx_hash: String,
    /// Block containing that transaction.
    pub block_no: u64,
    /// Output index.
    pub output_index: u32,
}

/// Block reference from the indexer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockRef {
    /// Block hash.
    pub hash: String,
    /// Block number.
    pub height: u64,
    /// Slot.
    pub slot: u64,
}

/// Light-client header anchoring a height to a stake-distribution certificate.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MithrilHeader {
    /// HostState output the header proves.
    pub host_state: HostStateRef,
    /// Block containing the HostState transaction.
    pub block: BlockRef,
    /// Transaction snapshot covering that block.
    pub transaction_snapshot: MithrilSnapshot,
    /// Certificate of the snapshot.
    pub transaction_snapshot_certificate: MithrilCertificate,
    /// Inclusion proof of the HostState transaction.
    pub proof: TransactionsProof,
    /// Anchoring stake distribution.
    pub stake_distribution: MithrilStakeDistribution,
    /// Certificate of the anchoring stake distribution.
    pub stake_distribution_certificate: MithrilCertificate,
    /// Previous stake-distribution certificate, absent only at genesis.
    pub previous_stake_distribution_certificate: Option<MithrilCertificate>,
}

/// Mithril client state for a new counterparty client.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MithrilClientState {
    /// Chain id.
    pub chain_id: String,
    /// Height the client starts from.
    pub latest_height: Height,
    /// Epoch at that height.
    pub current_epoch: u64,
    /// Trusting period in seconds.
    pub trusting_period_secs: u64,
    /// Protocol parameters.
    pub protocol_parameters: ProtocolParameters,
    /// Upgrade path.
    pub upgrade_path: Vec<String>,
}

/// Mithril consensus state for a new counterparty client.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MithrilConsensusState {
    /// Snapshot time, nanoseconds since the Unix epoch.
    pub timestamp: u64,
    /// First certificate of the latest epoch.
    pub first_cert_hash_latest_epoch: String,
    /// Certificate of the latest transaction snapshot.
    pub latest_cert_hash_tx_snapshot: String,
}

/// Client bootstrap material at an exact height.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewClientState {
    /// Client state.
    pub client_state: MithrilClientState,
    /// Consensus state.
    pub consensus_state: MithrilConsensusState,
}
