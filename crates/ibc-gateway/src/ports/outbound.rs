//! # Outbound Ports
//!
//! Traits for external dependencies: the chain indexer, the Mithril
//! aggregator, the ledger transaction builder, the denom-trace store and
//! metrics.

use crate::domain::{
    AggregatorCertificate, BlockRef, ChannelDatum, ClientDatum, ConnectionDatum, CredentialKind,
    DenomTrace, GatewayError, HostStateDatum, HostStateRef, IbcStateObject, MithrilSnapshot,
    Packet, PacketOperation, Pagination, StakeDistributionArtifact, StateUtxo, TransactionsProof,
    UnsignedTx, Utxo, UtxoRef, VoucherMintTx,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Chain indexer - outbound port.
#[async_trait]
pub trait ChainIndexer: Send + Sync {
    /// Channel state UTXO for `port/channel`.
    async fn find_channel(
        &self,
        port_id: &str,
        channel_id: &str,
    ) -> Result<Option<StateUtxo<ChannelDatum>>, GatewayError>;

    /// Connection state UTXO.
    async fn find_connection(
        &self,
        connection_id: &str,
    ) -> Result<Option<StateUtxo<ConnectionDatum>>, GatewayError>;

    /// Client state UTXO.
    async fn find_client(
        &self,
        client_id: &str,
    ) -> Result<Option<StateUtxo<ClientDatum>>, GatewayError>;

    /// UTXO holding `unit` (e.g. the transfer module custody token).
    async fn find_utxo_by_unit(&self, unit: &str) -> Result<Option<Utxo>, GatewayError>;

    /// All UTXOs at `address`.
    async fn find_utxos_at(&self, address: &str) -> Result<Vec<Utxo>, GatewayError>;

    /// Current HostState UTXO.
    async fn find_host_state(&self) -> Result<Option<StateUtxo<HostStateDatum>>, GatewayError>;

    /// HostState output created at or before `height`.
    async fn host_state_at_or_before(
        &self,
        height: u64,
    ) -> Result<Option<HostStateRef>, GatewayError>;

    /// Block at `height`.
    async fn find_block_by_height(&self, height: u64) -> Result<Option<BlockRef>, GatewayError>;

    /// Height of the latest indexed block.
    async fn latest_block_height(&self) -> Result<u64, GatewayError>;

    /// Every client, connection and channel state UTXO.
    async fn list_ibc_state_objects(&self) -> Result<Vec<IbcStateObject>, GatewayError>;

    /// Every transaction that minted under `policy_id`.
    async fn list_voucher_mint_transactions(
        &self,
        policy_id: &str,
    ) -> Result<Vec<VoucherMintTx>, GatewayError>;
}

/// Mithril aggregator - outbound port.
#[async_trait]
pub trait MithrilAggregator: Send + Sync {
    /// Recent Cardano transactions snapshots.
    async fn transaction_snapshots(&self) -> Result<Vec<MithrilSnapshot>, GatewayError>;

    /// Inclusion proof for `tx_hashes`.
    async fn transactions_proof(
        &self,
        tx_hashes: &[String],
    ) -> Result<TransactionsProof, GatewayError>;

    /// Certificate by hash.
    async fn certificate(&self, hash: &str) -> Result<AggregatorCertificate, GatewayError>;

    /// Recent Mithril stake distribution artifacts.
    async fn stake_distributions(&self) -> Result<Vec<StakeDistributionArtifact>, GatewayError>;
}

/// How assets move in a packet transaction.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum AssetMovement {
    /// Lock a native unit in the transfer module.
    Escrow {
        /// Native unit.
        unit: String,
        /// Amount.
        amount: u128,
        /// Sender address.
        sender: String,
    },
    /// Burn a voucher held by the sender.
    Burn {
        /// `policy id + voucher token name`.
        voucher_unit: String,
        /// Amount.
        amount: u128,
        /// Sender address.
        sender: String,
    },
    /// Release a native unit from the transfer module.
    Unescrow {
        /// Native unit.
        unit: String,
        /// Amount.
        amount: u128,
        /// Receiver address.
        receiver: String,
        /// Custody output spent.
        custody: UtxoRef,
    },
    /// Mint a voucher to the receiver.
    Mint {
        /// Voucher minting policy.
        voucher_policy_id: String,
        /// SHA3-256 voucher token name.
        voucher_token_name: String,
        /// Amount.
        amount: u128,
        /// Receiver address.
        receiver: String,
    },
    /// No asset moves (success acknowledgement).
    None,
}

/// Fully resolved parameters handed to the ledger builder.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PacketTxParams {
    /// Lifecycle step.
    pub operation: PacketOperation,
    /// Channel output spent.
    pub channel_utxo: UtxoRef,
    /// Channel datum after the step.
    pub updated_channel: ChannelDatum,
    /// Packet.
    pub packet: Packet,
    /// Asset movement.
    pub movement: AssetMovement,
    /// Expected HostState root after the step, lowercase hex.
    pub expected_new_root: String,
    /// Address whose UTXOs pay for the transaction, when not the signer's.
    pub wallet_override: Option<String>,
    /// Signer address.
    pub signer: String,
}

/// Ledger transaction builder - outbound port.
#[async_trait]
pub trait LedgerTxBuilder: Send + Sync {
    /// Assemble an unsigned packet transaction.
    async fn build_packet_tx(&self, params: &PacketTxParams) -> Result<UnsignedTx, GatewayError>;

    /// Payment credential type of `address`.
    fn payment_credential_kind(&self, address: &str) -> Result<CredentialKind, GatewayError>;

    /// Enterprise address for a raw payment credential hash.
    fn credential_to_address(&self, credential: &str) -> Result<String, GatewayError>;
}

/// Result of an insert against the primary key.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum InsertOutcome {
    /// Row written.
    Inserted(DenomTrace),
    /// A row with that hash already existed and is returned unchanged.
    Existing(DenomTrace),
}

/// Denom trace store - outbound port.
#[async_trait]
pub trait DenomTraceStore: Send + Sync {
    /// Insert unless the primary key exists.
    async fn insert(&self, trace: DenomTrace) -> Result<InsertOutcome, GatewayError>;

    /// Row by voucher token name.
    async fn find_by_hash(&self, hash: &str) -> Result<Option<DenomTrace>, GatewayError>;

    /// Rows whose `ibc_denom_hash` equals `ibc_hash` (lowercase).
    async fn find_by_ibc_denom_hash(&self, ibc_hash: &str)
        -> Result<Vec<DenomTrace>, GatewayError>;

    /// Rows with the given base denom.
    async fn find_by_base_denom(&self, base_denom: &str) -> Result<Vec<DenomTrace>, GatewayError>;

    /// Page of rows, newest `first_seen` first.
    async fn list(&self, page: Pagination) -> Result<Vec<DenomTrace>, GatewayError>;

    /// Total rows.
    async fn count(&self) -> Result<usize, GatewayError>;

    /// Fill `tx_hash` on the given rows where it is still empty.
    async fn set_tx_hash(&self, hashes: &[String], tx_hash: &str) -> Result<usize, GatewayError>;
}

/// Metrics sink - outbound port.
pub trait GatewayMetrics: Send + Sync {
    /// A packet build finished.
    fn record_packet_operation(&self, operation: PacketOperation, success: bool);

    /// A header convergence finished after `attempts`.
    fn record_convergence_attempts(&self, attempts: u32, converged: bool);

    /// A backfill batch finished.
    fn record_backfill(&self, resolved: usize, failed: usize);
}

/// Metrics sink that drops everything.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopMetrics;

impl GatewayMetrics for NoopMetrics {
    fn record_packet_operation(&self, _operation: PacketOperation, _success: bool) {}
    fn record_convergence_attempts(&self, _attempts: u32, _converged: bool) {}
    fn record_backfill(&self, _resolved: usize, _failed: usize) {}
}

// =============================================================================
// Mock Implementations for Testing
// =============================================================================

/// Mock chain indexer for testing.
#[derive(Default)]
pub struct MockChainIndexer {
    /// Channels keyed by `port/channel`.
    pub channels: Mutex<HashMap<String, StateUtxo<ChannelDatum>>>,
    /// Connections keyed by id.
    pub connections: Mutex<HashMap<String, StateUtxo<ConnectionDatum>>>,
    /// Clients keyed by id.
    pub clients: Mutex<HashMap<String, StateUtxo<ClientDatum>>>,
    /// UTXOs by address.
    pub utxos_by_address: Mutex<HashMap<String, Vec<Utxo>>>,
    /// UTXOs searchable by unit.
    pub unit_utxos: Mutex<Vec<Utxo>>,
    /// HostState.
    pub host_state: Mutex<Option<StateUtxo<HostStateDatum>>>,
    /// HostState history, any order.
    pub host_state_history: Mutex<Vec<HostStateRef>>,
    /// Blocks by height.
    pub blocks: Mutex<HashMap<u64, BlockRef>>,
    /// Latest indexed block height.
    pub tip_height: Mutex<u64>,
    /// State objects returned on rebuild.
    pub state_objects: Mutex<Vec<IbcStateObject>>,
    /// Voucher mint history.
    pub mint_txs: Mutex<Vec<VoucherMintTx>>,
    /// Fail every call?
    pub should_fail: bool,
    /// Call log.
    pub calls: Mutex<Vec<String>>,
}

impl MockChainIndexer {
    /// Add a channel.
    pub fn put_channel(&self, channel: StateUtxo<ChannelDatum>) {
        let key = format!("{}/{}", channel.datum.port_id, channel.datum.channel_id);
        self.channels.lock().insert(key, channel);
    }

    /// Whether `method` was called.
    pub fn was_called(&self, method: &str) -> bool {
        self.calls.lock().iter().any(|c| c == method)
    }

    fn record(&self, method: &str) -> Result<(), GatewayError> {
        self.calls.lock().push(method.to_string());
        if self.should_fail {
            return Err(GatewayError::Upstream("Mock indexer failure".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl ChainIndexer for MockChainIndexer {
    async fn find_channel(
        &self,
        port_id: &str,
        channel_id: &str,
    ) -> Result<Option<StateUtxo<ChannelDatum>>, GatewayError> {
        self.record("find_channel")?;
        Ok(self
            .channels
            .lock()
            .get(&format!("{}/{}", port_id, channel_id))
            .cloned())
    }

    async fn find_connection(
        &self,
        connection_id: &str,
    ) -> Result<Option<StateUtxo<ConnectionDatum>>, GatewayError> {
        self.record("find_connection")?;
        Ok(self.connections.lock().get(connection_id).cloned())
    }

    async fn find_client(
        &self,
        client_id: &str,
    ) -> Result<Option<StateUtxo<ClientDatum>>, GatewayError> {
        self.record("find_client")?;
        Ok(self.clients.lock().get(client_id).cloned())
    }

    async fn find_utxo_by_unit(&self, unit: &str) -> Result<Option<Utxo>, GatewayError> {
        self.record("find_utxo_by_unit")?;
        Ok(self
            .unit_utxos
            .lock()
            .iter()
            .find(|u| u.quantity_of(unit) > 0)
            .cloned())
    }

    async fn find_utxos_at(&self, address: &str) -> Result<Vec<Utxo>, GatewayError> {
        self.record("find_utxos_at")?;
        Ok(self
            .utxos_by_address
            .lock()
            .get(address)
            .cloned()
            .unwrap_or_default())
    }

    async fn find_host_state(&self) -> Result<Option<StateUtxo<HostStateDatum>>, GatewayError> {
        self.record("find_host_state")?;
        Ok(self.host_state.lock().clone())
    }

    async fn host_state_at_or_before(
        &self,
        height: u64,
    ) -> Result<Option<HostStateRef>, GatewayError> {
        self.record("host_state_at_or_before")?;
        Ok(self
            .host_state_history
            .lock()
            .iter()
            .filter(|h| h.block_no <= height)
            .max_by_key(|h| h.block_no)
            .cloned())
    }

    async fn find_block_by_height(&self, height: u64) -> Result<Option<BlockRef>, GatewayError> {
        self.record("find_block_by_height")?;
        Ok(self.blocks.lock().get(&height).cloned())
    }

    async fn latest_block_height(&self) -> Result<u64, GatewayError> {
        self.record("latest_block_height")?;
        Ok(*self.tip_height.lock())
    }

    async fn list_ibc_state_objects(&self) -> Result<Vec<IbcStateObject>, GatewayError> {
        self.record("list_ibc_state_objects")?;
        Ok(self.state_objects.lock().clone())
    }

    async fn list_voucher_mint_transactions(
        &self,
        _policy_id: &str,
    ) -> Result<Vec<VoucherMintTx>, GatewayError> {
        self.record("list_voucher_mint_transactions")?;
        Ok(self.mint_txs.lock().clone())
    }
}

/// Mock Mithril aggregator for testing.
#[derive(Default)]
pub struct MockMithrilAggregator {
    /// Snapshots.
    pub snapshots: Mutex<Vec<MithrilSnapshot>>,
    /// Proofs keyed by the first requested tx hash.
    pub proofs: Mutex<HashMap<String, TransactionsProof>>,
    /// Certificates keyed by hash.
    pub certificates: Mutex<HashMap<String, AggregatorCertificate>>,
    /// Stake distribution artifacts.
    pub stake_distributions: Mutex<Vec<StakeDistributionArtifact>>,
    /// Call log, `method:arg`.
    pub calls: Mutex<Vec<String>>,
}

impl MockMithrilAggregator {
    /// Number of calls to `method`.
    pub fn call_count(&self, method: &str) -> usize {
        let prefix = format!("{}:", method);
        self.calls
            .lock()
            .iter()
            .filter(|c| c.starts_with(&prefix))
            .count()
    }
}

#[async_trait]
impl MithrilAggregator for MockMithrilAggregator {
    async fn transaction_snapshots(&self) -> Result<Vec<MithrilSnapshot>, GatewayError> {
        self.calls.lock().push("transaction_snapshots:".to_string());
        Ok(self.snapshots.lock().clone())
    }

    async fn transactions_proof(
        &self,
        tx_hashes: &[String],
    ) -> Result<TransactionsProof, GatewayError> {
        let key = tx_hashes.first().cloned().unwrap_or_default();
        self.calls.lock().push(format!("transactions_proof:{}", key));
        self.proofs
            .lock()
            .get(&key)
            .cloned()
            .ok_or_else(|| GatewayError::Upstream(format!("no proof for {}", key)))
    }

    async fn certificate(&self, hash: &str) -> Result<AggregatorCertificate, GatewayError> {
        self.calls.lock().push(format!("certificate:{}", hash));
        self.certificates
            .lock()
            .get(hash)
            .cloned()
            .ok_or_else(|| GatewayError::Upstream(format!("certificate {} not found", hash)))
    }

    async fn stake_distributions(&self) -> Result<Vec<StakeDistributionArtifact>, GatewayError> {
        self.calls.lock().push("stake_distributions:".to_string());
        Ok(self.stake_distributions.lock().clone())
    }
}

/// Mock ledger builder for testing.
#[derive(Default)]
pub struct MockLedgerTxBuilder {
    /// Parameters of every build, in order.
    pub built: Mutex<Vec<PacketTxParams>>,
    /// Addresses treated as script addresses.
    pub script_addresses: Mutex<Vec<String>>,
    /// Fail builds?
    pub should_fail: bool,
}

#[async_trait]
impl LedgerTxBuilder for MockLedgerTxBuilder {
    async fn build_packet_tx(&self, params: &PacketTxParams) -> Result<UnsignedTx, GatewayError> {
        if self.should_fail {
            return Err(GatewayError::Upstream("Mock builder failure".to_string()));
        }
        let mut built = self.built.lock();
        built.push(params.clone());
        let tx_id = format!("{:064x}", built.len());
        Ok(UnsignedTx {
            cbor_hex: format!("84a0{}", &tx_id[56..]),
            tx_id,
        })
    }

    fn payment_credential_kind(&self, address: &str) -> Result<CredentialKind, GatewayError> {
        if address.is_empty() {
            return Err(GatewayError::invalid("empty address"));
        }
        if self.script_addresses.lock().iter().any(|a| a == address) {
            Ok(CredentialKind::Script)
        } else {
            Ok(CredentialKind::Key)
        }
    }

    fn credential_to_address(&self, credential: &str) -> Result<String, GatewayError> {
        Ok(format!("addr_test1{}", credential))
    }
}

/// Mock metrics that counts calls.
#[derive(Default)]
pub struct MockMetrics {
    /// Packet operations recorded.
    pub packet_operations: Mutex<Vec<(PacketOperation, bool)>>,
    /// Convergence attempts recorded.
    pub convergence: Mutex<Vec<(u32, bool)>>,
    /// Backfill batches recorded as `(resolved, failed)`.
    pub backfills: Mutex<Vec<(usize, usize)>>,
}

impl GatewayMetrics for MockMetrics {
    fn record_packet_operation(&self, operation: PacketOperation, success: bool) {
        self.packet_operations.lock().push((operation, success));
    }

    fn record_convergence_attempts(&self, attempts: u32, converged: bool) {
        self.convergence.lock().push((attempts, converged));
    }

    fn record_backfill(&self, resolved: usize, failed: usize) {
        self.backfills.lock().push((resolved, failed));
    }
}
