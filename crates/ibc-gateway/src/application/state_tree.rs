//! # State Tree Commit Coordinator
//!
//! Owns the in-memory ICS-23 tree and the map of pending updates. The tree
//! only advances when a confirmed transaction's pending update is taken and
//! committed; builds stage their mutations on a copy.

use crate::algorithms::state_tree::{
    channel_key, client_state_key, connection_key, packet_ack_key, packet_commitment_key,
    packet_receipt_key, RECEIPT_VALUE,
};
use crate::algorithms::Ics23MerkleTree;
use crate::domain::{ChannelDatum, GatewayError, IbcEvent, IbcStateObject};
use crate::ports::outbound::ChainIndexer;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// One change to the state tree.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TreeMutation {
    /// Insert or overwrite a key.
    Set(String, Vec<u8>),
    /// Remove a key.
    Delete(String),
}

impl TreeMutation {
    fn apply(&self, tree: &mut Ics23MerkleTree) {
        match self {
            Self::Set(key, value) => tree.set(key.clone(), value.clone()),
            Self::Delete(key) => {
                tree.delete(key);
            }
        }
    }
}

/// Deferred tree commit, run once after confirmation.
pub type CommitFn = Box<dyn FnOnce() + Send>;

/// A tree update waiting for its transaction to confirm.
pub struct PendingStateTreeUpdate {
    /// HostState root the transaction writes, lowercase hex.
    pub expected_new_root: String,
    /// Applies the staged mutations to the live tree.
    pub commit: CommitFn,
    /// Denom traces created by the build, stamped with the tx hash later.
    pub denom_trace_hashes: Vec<String>,
    /// Events to report once confirmed.
    pub events: Vec<IbcEvent>,
}

impl fmt::Debug for PendingStateTreeUpdate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingStateTreeUpdate")
            .field("expected_new_root", &self.expected_new_root)
            .field("denom_trace_hashes", &self.denom_trace_hashes)
            .field("events", &self.events.len())
            .finish_non_exhaustive()
    }
}

/// Keeps the state tree in lock-step with confirmed HostState roots.
pub struct StateTreeCommitCoordinator {
    tree: Arc<RwLock<Ics23MerkleTree>>,
    pending: Mutex<HashMap<String, PendingStateTreeUpdate>>,
    ready: AtomicBool,
}

impl StateTreeCommitCoordinator {
    /// Coordinator over an empty, not-ready tree.
    pub fn new() -> Self {
        Self {
            tree: Arc::new(RwLock::new(Ics23MerkleTree::new())),
            pending: Mutex::new(HashMap::new()),
            ready: AtomicBool::new(false),
        }
    }

    /// Whether the startup rebuild completed.
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    /// Fail with `TreeNotReady` before the startup rebuild.
    pub fn ensure_ready(&self) -> Result<(), GatewayError> {
        if self.is_ready() {
            Ok(())
        } else {
            Err(GatewayError::TreeNotReady)
        }
    }

    /// Current root, lowercase hex.
    pub fn root_hex(&self) -> String {
        self.tree.read().root_hex()
    }

    /// Value under `key` in the live tree.
    pub fn get(&self, key: &str) -> Option<Vec<u8>> {
        self.tree.read().get(key).map(<[u8]>::to_vec)
    }

    /// Root the tree would have after `mutations`, without touching it.
    pub fn stage(&self, mutations: &[TreeMutation]) -> String {
        let mut staged = self.tree.read().clone();
        for m in mutations {
            m.apply(&mut staged);
        }
        staged.root_hex()
    }

    /// Closure applying `mutations` to the live tree.
    pub fn commit_fn(&self, mutations: Vec<TreeMutation>) -> CommitFn {
        let tree = Arc::clone(&self.tree);
        Box::new(move || {
            let mut tree = tree.write();
            for m in &mutations {
                m.apply(&mut tree);
            }
        })
    }

    /// Store a pending update keyed by the lowercase `tx_id`.
    pub fn register(
        &self,
        tx_id: &str,
        update: PendingStateTreeUpdate,
    ) -> Result<(), GatewayError> {
        let key = tx_id.to_lowercase();
        let mut pending = self.pending.lock();
        if pending.contains_key(&key) {
            return Err(GatewayError::Internal(format!(
                "pending state tree update already registered for {}",
                key
            )));
        }
        debug!(
            tx_id = %key,
            root = %update.expected_new_root,
            "[ibc-gateway] registered pending state tree update"
        );
        pending.insert(key, update);
        Ok(())
    }

    /// Remove and return the pending update for `tx_id`.
    pub fn take(&self, tx_id: &str) -> Option<PendingStateTreeUpdate> {
        self.pending.lock().remove(&tx_id.to_lowercase())
    }

    /// Number of pending updates.
    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }

    /// Rebuild the tree from every client, connection and channel UTXO.
    ///
    /// The result must match the HostState datum root; otherwise the old
    /// tree is kept and the coordinator stays not-ready.
    pub async fn rebuild(&self, indexer: &dyn ChainIndexer) -> Result<String, GatewayError> {
        let objects = indexer.list_ibc_state_objects().await?;
        info!(
            objects = objects.len(),
            "[ibc-gateway] rebuilding IBC state tree from chain"
        );

        let mut tree = Ics23MerkleTree::new();
        for object in &objects {
            match object {
                IbcStateObject::Client {
                    client_id,
                    encoded_client_state,
                } => tree.set(client_state_key(client_id), encoded_client_state.clone()),
                IbcStateObject::Connection {
                    connection_id,
                    encoded_connection,
                } => tree.set(connection_key(connection_id), encoded_connection.clone()),
                IbcStateObject::Channel {
                    datum,
                    encoded_channel_end,
                } => {
                    tree.set(
                        channel_key(&datum.port_id, &datum.channel_id),
                        encoded_channel_end.clone(),
                    );
                    for m in packet_state_mutations(datum)? {
                        m.apply(&mut tree);
                    }
                }
            }
        }

        let host_state = indexer
            .find_host_state()
            .await?
            .ok_or_else(|| GatewayError::not_found("HostState UTxO not found"))?;
        let on_chain = host_state.datum.ibc_state_root.to_lowercase();
        let rebuilt = tree.root_hex();
        if rebuilt != on_chain {
            warn!(
                rebuilt = %rebuilt,
                on_chain = %on_chain,
                "[ibc-gateway] rebuilt state tree does not match HostState"
            );
            return Err(GatewayError::RootMismatch {
                expected: rebuilt,
                actual: on_chain,
            });
        }

        *self.tree.write() = tree;
        self.ready.store(true, Ordering::Release);
        info!(root = %rebuilt, "[ibc-gateway] IBC state tree ready");
        Ok(rebuilt)
    }
}

impl Default for StateTreeCommitCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

/// Tree entries for a channel's commitments, receipts and acknowledgements.
pub fn packet_state_mutations(datum: &ChannelDatum) -> Result<Vec<TreeMutation>, GatewayError> {
    let (port, channel) = (&datum.port_id, &datum.channel_id);
    let mut out = Vec::new();
    for (seq, commitment) in datum.state.packet_commitment.iter() {
        out.push(TreeMutation::Set(
            packet_commitment_key(port, channel, seq),
            decode_stored_hex(commitment)?,
        ));
    }
    for (seq, _) in datum.state.packet_receipt.iter() {
        out.push(TreeMutation::Set(
            packet_receipt_key(port, channel, seq),
            RECEIPT_VALUE.to_vec(),
        ));
    }
    for (seq, ack) in datum.state.packet_acknowledgement.iter() {
        out.push(TreeMutation::Set(
            packet_ack_key(port, channel, seq),
            decode_stored_hex(ack)?,
        ));
    }
    Ok(out)
}

fn decode_stored_hex(value: &str) -> Result<Vec<u8>, GatewayError> {
    hex::decode(value)
        .map_err(|e| GatewayError::Internal(format!("channel datum holds non-hex value: {}", e)))
}
