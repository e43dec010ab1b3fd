//! # Denom Trace Backfill
//!
//! Rebuilds missing denom traces from historical voucher mints. The batch
//! is all-or-nothing in its verdict: any unresolved, ambiguous, conflicting
//! or failed token makes the run fail.

use super::denom_resolver::DenomRegistry;
use crate::algorithms::{group_by_token_name, split_denom_trace, TokenResolution};
use crate::config::GatewayConfig;
use crate::domain::{GatewayError, NewDenomTrace};
use crate::ports::outbound::{ChainIndexer, GatewayMetrics};
use std::sync::Arc;
use tracing::{error, info, warn};

pub use crate::domain::{BackfillOutcome, BackfillReport};

/// Reconciles the denom-trace table with on-chain voucher mints.
pub struct BackfillReconciler {
    config: Arc<GatewayConfig>,
    indexer: Arc<dyn ChainIndexer>,
    registry: Arc<DenomRegistry>,
    metrics: Arc<dyn GatewayMetrics>,
}

impl BackfillReconciler {
    /// Create a reconciler.
    pub fn new(
        config: Arc<GatewayConfig>,
        indexer: Arc<dyn ChainIndexer>,
        registry: Arc<DenomRegistry>,
        metrics: Arc<dyn GatewayMetrics>,
    ) -> Self {
        Self {
            config,
            indexer,
            registry,
            metrics,
        }
    }

    /// Scan every voucher mint and fill in missing traces.
    ///
    /// An indexer failure aborts the scan. Per-token problems do not stop
    /// the scan, but any of them fails the run with
    /// [`GatewayError::BackfillIncomplete`], which carries the full report.
    pub async fn run(&self) -> Result<BackfillReport, GatewayError> {
        let policy = &self.config.deployment.mint_voucher_policy_id;
        let txs = self.indexer.list_voucher_mint_transactions(policy).await?;
        let mut report = BackfillReport::new(txs.len());
        info!(
            run_id = %report.run_id,
            transactions = txs.len(),
            "[ibc-gateway] denom trace backfill started"
        );

        for (token, resolution) in group_by_token_name(&txs) {
            let outcome = match resolution {
                TokenResolution::Resolved(full) => self.reconcile(&token, full).await,
                TokenResolution::Unresolved => {
                    warn!(token = %token, "[ibc-gateway] backfill: no candidate path");
                    BackfillOutcome::Unresolved
                }
                TokenResolution::Ambiguous(paths) => {
                    warn!(token = %token, candidates = paths.len(), "[ibc-gateway] backfill: ambiguous");
                    BackfillOutcome::Ambiguous(paths)
                }
            };
            report.record(token, outcome);
        }

        self.metrics
            .record_backfill(report.resolved, report.failed());
        if !report.succeeded() {
            error!(
                run_id = %report.run_id,
                resolved = report.resolved,
                unresolved = report.unresolved,
                ambiguous = report.ambiguous,
                conflicts = report.conflicts,
                errors = report.errors,
                "[ibc-gateway] denom trace backfill failed"
            );
            return Err(GatewayError::BackfillIncomplete {
                report: Box::new(report),
            });
        }
        info!(
            run_id = %report.run_id,
            resolved = report.resolved,
            "[ibc-gateway] denom trace backfill complete"
        );
        Ok(report)
    }

    async fn reconcile(&self, token: &str, full: String) -> BackfillOutcome {
        match self.registry.find_by_hash(token).await {
            Ok(Some(row)) => {
                let persisted = row.full_denom();
                return if persisted == full {
                    BackfillOutcome::AlreadyPresent
                } else {
                    error!(token = %token, persisted = %persisted, derived = %full, "[ibc-gateway] backfill conflict");
                    BackfillOutcome::Conflict {
                        persisted,
                        derived: full,
                    }
                };
            }
            Ok(None) => {}
            Err(e) => return BackfillOutcome::Error(e.to_string()),
        }

        let (path, base_denom) = match split_denom_trace(&full) {
            Ok(parts) => parts,
            Err(e) => return BackfillOutcome::Error(e.to_string()),
        };
        let trace = NewDenomTrace {
            hash: token.to_string(),
            path,
            base_denom,
            voucher_policy_id: self.config.deployment.mint_voucher_policy_id.clone(),
            ibc_denom_hash: None,
            tx_hash: None,
        };
        match self.registry.save_denom_trace(trace).await {
            Ok(row) if row.full_denom() == full => BackfillOutcome::Inserted { full_denom: full },
            Ok(row) => BackfillOutcome::Conflict {
                persisted: row.full_denom(),
                derived: full,
            },
            Err(e) => BackfillOutcome::Error(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::InMemoryDenomTraceStore;
    use crate::algorithms::build_voucher_token_name;
    use crate::domain::{
        FungibleTokenPacketData, Height, MintVoucherArgs, MintVoucherRedeemer, Packet,
        RecvPacketArgs, RedeemerPurpose, RedeemerRecord, SpendChannelRedeemer, VoucherMintTx,
    };
    use crate::ports::outbound::{MockChainIndexer, MockMetrics};

    fn recv_mint_tx(tx_hash: &str, dst_ch: &str, denom: &str) -> VoucherMintTx {
        let data = FungibleTokenPacketData {
            amount: "1".into(),
            denom: denom.into(),
            memo: String::new(),
            receiver: "addr_test1r".into(),
            sender: "cosmos1s".into(),
        };
        let packet = Packet {
            sequence: 1,
            source_port: "transfer".into(),
            source_channel: "channel-7".into(),
            destination_port: "transfer".into(),
            destination_channel: dst_ch.into(),
            data: data.to_hex().unwrap(),
            timeout_height: Height::new(0, 50),
            timeout_timestamp: 0,
        };
        let spend = SpendChannelRedeemer::RecvPacket(RecvPacketArgs {
            packet: packet.clone(),
            proof_height: Height::new(0, 10),
        });
        let mint = MintVoucherRedeemer::MintVoucher(MintVoucherArgs {
            packet_source_port: packet.source_port.clone(),
            packet_source_channel: packet.source_channel.clone(),
            packet_dest_port: packet.destination_port.clone(),
            packet_dest_channel: packet.destination_channel.clone(),
        });
        let full = format!("transfer/{}/{}", dst_ch, denom);
        VoucherMintTx {
            tx_hash: tx_hash.into(),
            redeemers: vec![
                RedeemerRecord {
                    purpose: RedeemerPurpose::Spend,
                    data: serde_json::to_string(&spend).unwrap(),
                },
                RedeemerRecord {
                    purpose: RedeemerPurpose::Mint,
                    data: serde_json::to_string(&mint).unwrap(),
                },
            ],
            minted_token_names: vec![build_voucher_token_name(&full).unwrap()],
        }
    }

    fn setup(
        txs: Vec<VoucherMintTx>,
    ) -> (BackfillReconciler, Arc<DenomRegistry>, Arc<MockMetrics>) {
        let indexer = Arc::new(MockChainIndexer::default());
        *indexer.mint_txs.lock() = txs;
        let registry = Arc::new(DenomRegistry::new(
            Arc::new(InMemoryDenomTraceStore::new()),
            100,
        ));
        let metrics = Arc::new(MockMetrics::default());
        let reconciler = BackfillReconciler::new(
            Arc::new(GatewayConfig::for_testing()),
            indexer,
            Arc::clone(&registry),
            metrics.clone(),
        );
        (reconciler, registry, metrics)
    }

    fn incomplete(result: Result<BackfillReport, GatewayError>) -> BackfillReport {
        match result {
            Err(GatewayError::BackfillIncomplete { report }) => *report,
            other => panic!("expected an incomplete backfill, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_backfill_inserts_resolved_tokens() {
        let (reconciler, registry, metrics) = setup(vec![
            recv_mint_tx("t1", "channel-0", "uatom"),
            recv_mint_tx("t2", "channel-0", "uatom"),
            recv_mint_tx("t3", "channel-1", "factory/osmo1abc/tok"),
        ]);
        let report = reconciler.run().await.unwrap();
        assert_eq!(report.transactions_scanned, 3);
        assert_eq!(report.resolved, 2);
        assert_eq!(report.exit_code(), 0);
        assert_eq!(registry.count().await.unwrap(), 2);

        let name = build_voucher_token_name("transfer/channel-1/factory/osmo1abc/tok").unwrap();
        let row = registry.find_by_hash(&name).await.unwrap().unwrap();
        assert_eq!(row.path, "transfer/channel-1");
        assert_eq!(row.base_denom, "factory/osmo1abc/tok");
        assert_eq!(metrics.backfills.lock()[0], (2, 0));
    }

    #[tokio::test]
    async fn test_backfill_rerun_is_already_present() {
        let (reconciler, _, _) = setup(vec![recv_mint_tx("t1", "channel-0", "uatom")]);
        reconciler.run().await.unwrap();
        let report = reconciler.run().await.unwrap();
        assert!(report
            .outcomes
            .values()
            .all(|o| *o == BackfillOutcome::AlreadyPresent));
        assert!(report.succeeded());
    }

    #[tokio::test]
    async fn test_backfill_unresolved_fails_batch() {
        let mut tx = recv_mint_tx("t1", "channel-0", "uatom");
        tx.minted_token_names = vec!["ff".repeat(32)];
        let (reconciler, registry, metrics) = setup(vec![tx]);
        let report = incomplete(reconciler.run().await);
        assert_eq!(report.unresolved, 1);
        assert_eq!(report.exit_code(), 1);
        assert_eq!(registry.count().await.unwrap(), 0);
        assert_eq!(metrics.backfills.lock()[0], (0, 1));
    }

    #[tokio::test]
    async fn test_backfill_conflict_with_persisted_row() {
        let tx = recv_mint_tx("t1", "channel-0", "uatom");
        let token = tx.minted_token_names[0].clone();
        let (reconciler, registry, _) = setup(vec![tx]);
        registry
            .save_denom_trace(NewDenomTrace {
                hash: token.clone(),
                path: "transfer/channel-5".into(),
                base_denom: "uatom".into(),
                voucher_policy_id: "p".into(),
                ibc_denom_hash: None,
                tx_hash: None,
            })
            .await
            .unwrap();

        let report = incomplete(reconciler.run().await);
        assert_eq!(report.conflicts, 1);
        assert_eq!(report.exit_code(), 1);
        assert!(matches!(
            report.outcomes.get(&token),
            Some(BackfillOutcome::Conflict { .. })
        ));
    }

    #[tokio::test]
    async fn test_backfill_indexer_failure_aborts() {
        let indexer = Arc::new(MockChainIndexer {
            should_fail: true,
            ..Default::default()
        });
        let reconciler = BackfillReconciler::new(
            Arc::new(GatewayConfig::for_testing()),
            indexer,
            Arc::new(DenomRegistry::new(
                Arc::new(InMemoryDenomTraceStore::new()),
                100,
            )),
            Arc::new(MockMetrics::default()),
        );
        let err = reconciler.run().await.unwrap_err();
        assert!(matches!(err, GatewayError::Upstream(_)));
    }

    #[tokio::test]
    async fn test_backfill_partial_failure_keeps_resolved_rows() {
        let mut bad = recv_mint_tx("t2", "channel-1", "uosmo");
        bad.minted_token_names = vec!["ee".repeat(32)];
        let (reconciler, registry, metrics) =
            setup(vec![recv_mint_tx("t1", "channel-0", "uatom"), bad]);
        let err = reconciler.run().await.unwrap_err();
        assert_eq!(err.kind(), crate::domain::ErrorKind::Internal);

        let report = incomplete(Err(err));
        assert_eq!(report.resolved, 1);
        assert_eq!(report.failed(), 1);
        assert_eq!(report.exit_code(), 1);
        assert_eq!(registry.count().await.unwrap(), 1);
        assert_eq!(metrics.backfills.lock()[0], (1, 1));
    }
}
