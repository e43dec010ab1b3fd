//! # Gateway Service
//!
//! Composition root for the gateway core. Owns the denom registry, the
//! packet coordinator, the Mithril converger and the state-tree
//! coordinator, and exposes them through [`IbcGatewayApi`].
//!
//! The service is not usable until [`GatewayService::start`] has rebuilt
//! the state tree and matched it against the on-chain HostState root.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{info, warn};

use super::backfill::{BackfillReconciler, BackfillReport};
use super::denom_resolver::{DenomRegistry, DenomResolver};
use super::mithril_converger::MithrilChainConverger;
use super::packet_coordinator::PacketLifecycleCoordinator;
use super::state_tree::StateTreeCommitCoordinator;
use crate::config::GatewayConfig;
use crate::domain::{
    DenomTrace, GatewayError, IbcEvent, MithrilHeader, NewClientState, Pagination,
};
use crate::ports::inbound::{
    AcknowledgePacketRequest, DenomTracePage, IbcGatewayApi, PacketBuildResult,
    RecvPacketRequest, SendPacketRequest, TimeoutPacketRequest,
};
use crate::ports::outbound::{
    ChainIndexer, DenomTraceStore, GatewayMetrics, LedgerTxBuilder, MithrilAggregator,
};

/// IBC gateway service.
pub struct GatewayService {
    /// Configuration.
    config: Arc<GatewayConfig>,
    /// Chain indexer.
    indexer: Arc<dyn ChainIndexer>,
    /// Denom resolution over the registry.
    resolver: Arc<DenomResolver>,
    /// Packet lifecycle.
    packets: PacketLifecycleCoordinator,
    /// Light-client headers.
    converger: MithrilChainConverger,
    /// State tree and pending updates.
    tree: Arc<StateTreeCommitCoordinator>,
    /// Denom trace backfill.
    backfill: BackfillReconciler,
}

impl GatewayService {
    /// Wire a service over its outbound ports.
    pub fn new(
        config: GatewayConfig,
        indexer: Arc<dyn ChainIndexer>,
        aggregator: Arc<dyn MithrilAggregator>,
        builder: Arc<dyn LedgerTxBuilder>,
        store: Arc<dyn DenomTraceStore>,
        metrics: Arc<dyn GatewayMetrics>,
    ) -> Self {
        let config = Arc::new(config);
        let registry = Arc::new(DenomRegistry::new(store, config.denom_trace_page_limit));
        let resolver = Arc::new(DenomResolver::new(Arc::clone(&registry)));
        let tree = Arc::new(StateTreeCommitCoordinator::new());

        let packets = PacketLifecycleCoordinator::new(
            Arc::clone(&config),
            Arc::clone(&indexer),
            builder,
            Arc::clone(&resolver),
            Arc::clone(&tree),
            Arc::clone(&metrics),
        );
        let converger = MithrilChainConverger::new(
            Arc::clone(&config),
            Arc::clone(&indexer),
            aggregator,
            Arc::clone(&metrics),
        );
        let backfill =
            BackfillReconciler::new(Arc::clone(&config), Arc::clone(&indexer), registry, metrics);

        Self {
            config,
            indexer,
            resolver,
            packets,
            converger,
            tree,
            backfill,
        }
    }

    /// Configuration in use.
    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// Rebuild the state tree from chain. Must succeed before any build or
    /// confirmation is served; returns the verified root.
    pub async fn start(&self) -> Result<String, GatewayError> {
        self.config.validate()?;
        info!(
            chain_id = %self.config.chain_id,
            port_id = %self.config.port_id,
            "[ibc-gateway] starting gateway service"
        );
        self.tree.rebuild(self.indexer.as_ref()).await
    }

    /// Whether [`Self::start`] completed.
    pub fn is_ready(&self) -> bool {
        self.tree.is_ready()
    }

    /// State tree coordinator.
    pub fn state_tree(&self) -> &Arc<StateTreeCommitCoordinator> {
        &self.tree
    }

    /// Denom registry.
    pub fn registry(&self) -> &Arc<DenomRegistry> {
        self.resolver.registry()
    }

    /// Apply the pending tree update of a confirmed transaction.
    ///
    /// The HostState root on chain must equal the root computed at build
    /// time. On any failure before the commit the update is put back so a
    /// lagging indexer can be retried.
    pub async fn apply_confirmed(&self, tx_id: &str) -> Result<Vec<IbcEvent>, GatewayError> {
        self.tree.ensure_ready()?;
        let update = self.tree.take(tx_id).ok_or_else(|| {
            GatewayError::not_found(format!("no pending state tree update for {}", tx_id))
        })?;

        let host_state = match self.indexer.find_host_state().await {
            Ok(Some(host_state)) => host_state,
            Ok(None) => {
                self.tree.register(tx_id, update)?;
                return Err(GatewayError::not_found("HostState UTxO not found"));
            }
            Err(e) => {
                self.tree.register(tx_id, update)?;
                return Err(e);
            }
        };

        let on_chain = host_state.datum.ibc_state_root.to_lowercase();
        if on_chain != update.expected_new_root {
            warn!(
                tx_id = %tx_id,
                expected = %update.expected_new_root,
                on_chain = %on_chain,
                "[ibc-gateway] confirmed HostState root differs from build"
            );
            let expected = update.expected_new_root.clone();
            self.tree.register(tx_id, update)?;
            return Err(GatewayError::RootMismatch {
                expected,
                actual: on_chain,
            });
        }

        (update.commit)();
        self.resolver
            .registry()
            .set_tx_hash_for_traces(&update.denom_trace_hashes, &tx_id.to_lowercase())
            .await?;
        info!(
            tx_id = %tx_id,
            root = %on_chain,
            events = update.events.len(),
            "[ibc-gateway] state tree update applied"
        );
        Ok(update.events)
    }

    /// Reconcile denom traces with historical voucher mints.
    ///
    /// A run with any unresolved token returns
    /// [`GatewayError::BackfillIncomplete`]; its report gives the exit code.
    pub async fn run_backfill(&self) -> Result<BackfillReport, GatewayError> {
        self.backfill.run().await
    }
}

#[async_trait]
impl IbcGatewayApi for GatewayService {
    async fn resolve_denom(&self, denom: &str) -> Result<String, GatewayError> {
        self.resolver.resolve_for_send(denom).await
    }

    async fn build_send_packet(
        &self,
        request: SendPacketRequest,
    ) -> Result<PacketBuildResult, GatewayError> {
        self.packets.send_packet(request).await
    }

    async fn build_recv_packet(
        &self,
        request: RecvPacketRequest,
    ) -> Result<PacketBuildResult, GatewayError> {
        self.packets.recv_packet(request).await
    }

    async fn build_acknowledge_packet(
        &self,
        request: AcknowledgePacketRequest,
    ) -> Result<PacketBuildResult, GatewayError> {
        self.packets.acknowledge_packet(request).await
    }

    async fn build_timeout_packet(
        &self,
        request: TimeoutPacketRequest,
    ) -> Result<PacketBuildResult, GatewayError> {
        self.packets.timeout_packet(request).await
    }

    async fn query_header(&self, height: u64) -> Result<MithrilHeader, GatewayError> {
        self.converger.query_header(height).await
    }

    async fn query_new_client(&self, height: u64) -> Result<NewClientState, GatewayError> {
        self.converger.query_new_client(height).await
    }

    async fn query_denom_trace(&self, hash: &str) -> Result<DenomTrace, GatewayError> {
        self.resolver.query_denom_trace(hash).await
    }

    async fn query_denom_traces(&self, page: Pagination) -> Result<DenomTracePage, GatewayError> {
        let registry = self.resolver.registry();
        let traces = registry.find_all(page).await?;
        let total = registry.count().await?;
        Ok(DenomTracePage { traces, total })
    }

    async fn confirm_transaction(&self, tx_id: &str) -> Result<Vec<IbcEvent>, GatewayError> {
        self.apply_confirmed(tx_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::InMemoryDenomTraceStore;
    use crate::algorithms::Ics23MerkleTree;
    use crate::domain::{
        ChannelDatum, ChannelEnd, ChannelOrder, ChannelState, Counterparty, Height,
        HostStateDatum, StateUtxo, Utxo, UtxoRef, VoucherMintTx, LOVELACE,
    };
    use crate::ports::outbound::{
        MockChainIndexer, MockLedgerTxBuilder, MockMithrilAggregator, NoopMetrics,
    };
    use std::collections::BTreeMap;

    fn host_state(root: String) -> StateUtxo<HostStateDatum> {
        StateUtxo {
            utxo: Utxo::default(),
            datum: HostStateDatum {
                version: 1,
                ibc_state_root: root,
            },
        }
    }

    fn indexer() -> Arc<MockChainIndexer> {
        let indexer = Arc::new(MockChainIndexer::default());
        indexer.put_channel(StateUtxo {
            utxo: Utxo::default(),
            datum: ChannelDatum {
                port_id: "transfer".into(),
                channel_id: "channel-0".into(),
                channel: ChannelEnd {
                    state: ChannelState::Open,
                    ordering: ChannelOrder::Unordered,
                    counterparty: Counterparty {
                        port_id: "transfer".into(),
                        channel_id: "channel-4".into(),
                    },
                    connection_hops: vec!["connection-0".into()],
                    version: "ics20-1".into(),
                },
                state: Default::default(),
            },
        });
        indexer.utxos_by_address.lock().insert(
            "addr_test1alice".into(),
            vec![Utxo {
                reference: UtxoRef {
                    tx_hash: "w".into(),
                    output_index: 0,
                },
                address: "addr_test1alice".into(),
                assets: BTreeMap::from([(LOVELACE.to_string(), 5_000)]),
            }],
        );
        *indexer.host_state.lock() = Some(host_state(Ics23MerkleTree::new().root_hex()));
        indexer
    }

    fn service(indexer: Arc<MockChainIndexer>) -> GatewayService {
        GatewayService::new(
            GatewayConfig::for_testing(),
            indexer,
            Arc::new(MockMithrilAggregator::default()),
            Arc::new(MockLedgerTxBuilder::default()),
            Arc::new(InMemoryDenomTraceStore::new()),
            Arc::new(NoopMetrics),
        )
    }

    fn send() -> SendPacketRequest {
        SendPacketRequest {
            source_port: "transfer".into(),
            source_channel: "channel-0".into(),
            token_denom: "lovelace".into(),
            token_amount: "250".into(),
            sender: "addr_test1alice".into(),
            receiver: "cosmos1bob".into(),
            memo: String::new(),
            timeout_height: Height::new(1, 900),
            timeout_timestamp: 0,
        }
    }

    #[tokio::test]
    async fn test_builds_refused_before_start() {
        let service = service(indexer());
        assert!(!service.is_ready());
        assert!(matches!(
            service.build_send_packet(send()).await,
            Err(GatewayError::TreeNotReady)
        ));
        assert!(matches!(
            service.confirm_transaction("ab").await,
            Err(GatewayError::TreeNotReady)
        ));
    }

    #[tokio::test]
    async fn test_confirm_applies_update_and_returns_events() {
        let indexer = indexer();
        let service = service(Arc::clone(&indexer));
        let initial = service.start().await.unwrap();

        let built = service.build_send_packet(send()).await.unwrap();
        assert_ne!(built.expected_new_root, initial);
        assert_eq!(service.state_tree().root_hex(), initial);

        *indexer.host_state.lock() = Some(host_state(built.expected_new_root.to_uppercase()));
        let events = service
            .confirm_transaction(&built.unsigned_tx.tx_id.to_uppercase())
            .await
            .unwrap();
        assert_eq!(events[0].event_type, "send_packet");
        assert_eq!(service.state_tree().root_hex(), built.expected_new_root);
        assert_eq!(service.state_tree().pending_count(), 0);

        assert!(matches!(
            service.confirm_transaction(&built.unsigned_tx.tx_id).await,
            Err(GatewayError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_confirm_root_mismatch_keeps_update() {
        let indexer = indexer();
        let service = service(Arc::clone(&indexer));
        let initial = service.start().await.unwrap();
        let built = service.build_send_packet(send()).await.unwrap();

        let err = service
            .confirm_transaction(&built.unsigned_tx.tx_id)
            .await
            .unwrap_err();
        match err {
            GatewayError::RootMismatch { expected, actual } => {
                assert_eq!(expected, built.expected_new_root);
                assert_eq!(actual, initial);
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(service.state_tree().root_hex(), initial);
        assert_eq!(service.state_tree().pending_count(), 1);
    }

    #[tokio::test]
    async fn test_backfill_with_unresolved_mint_fails_run() {
        let indexer = indexer();
        *indexer.mint_txs.lock() = vec![VoucherMintTx {
            tx_hash: "m1".into(),
            redeemers: vec![],
            minted_token_names: vec!["ab".repeat(32)],
        }];
        let service = service(indexer);
        match service.run_backfill().await {
            Err(GatewayError::BackfillIncomplete { report }) => {
                assert_eq!(report.transactions_scanned, 1);
                assert_eq!(report.unresolved, 1);
                assert_eq!(report.exit_code(), 1);
            }
            other => panic!("unexpected result: {other:?}"),
        }

        let err = service.run_backfill().await.unwrap_err();
        assert_eq!(err.kind(), crate::domain::ErrorKind::Internal);
    }

    #[tokio::test]
    async fn test_backfill_without_mints_succeeds() {
        let service = service(indexer());
        let report = service.run_backfill().await.unwrap();
        assert_eq!(report.exit_code(), 0);
        assert!(report.outcomes.is_empty());
    }

    #[tokio::test]
    async fn test_query_denom_traces_reports_total() {
        let service = service(indexer());
        let page = service
            .query_denom_traces(Pagination {
                offset: 0,
                limit: 10,
            })
            .await
            .unwrap();
        assert!(page.traces.is_empty());
        assert_eq!(page.total, 0);
    }
}
