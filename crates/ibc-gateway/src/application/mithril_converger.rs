//! # Mithril Chain Converger
//!
//! Aligns a HostState UTXO, a transactions snapshot and its inclusion proof,
//! then walks the certificate chain back to a stake-distribution anchor.
//! Every miss is an error; nothing falls back to "latest".

use crate::algorithms::double_to_fraction;
use crate::config::GatewayConfig;
use crate::domain::{
    AggregatorCertificate, CertificateMetadata, GatewayError, Height, HostStateRef, MessagePart,
    MithrilCertificate, MithrilClientState, MithrilConsensusState, MithrilHeader,
    MithrilSnapshot, MithrilStakeDistribution, NewClientState, ProtocolMessagePartKey,
    ProtocolParameters, RawProtocolParameters, StakeDistributionArtifact, TransactionsProof,
};
use crate::ports::outbound::{ChainIndexer, GatewayMetrics, MithrilAggregator};
use chrono::DateTime;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Snapshot, proof and HostState that agree with each other.
#[derive(Clone, Debug, PartialEq)]
pub struct Convergence {
    /// HostState output covered by the proof.
    pub host_state: HostStateRef,
    /// Snapshot the proof was served from.
    pub snapshot: MithrilSnapshot,
    /// Inclusion proof.
    pub proof: TransactionsProof,
    /// Attempts used.
    pub attempts: u32,
}

/// Builds Mithril headers and client bootstrap states.
pub struct MithrilChainConverger {
    config: Arc<GatewayConfig>,
    indexer: Arc<dyn ChainIndexer>,
    aggregator: Arc<dyn MithrilAggregator>,
    metrics: Arc<dyn GatewayMetrics>,
}

impl MithrilChainConverger {
    /// Create a converger.
    pub fn new(
        config: Arc<GatewayConfig>,
        indexer: Arc<dyn ChainIndexer>,
        aggregator: Arc<dyn MithrilAggregator>,
        metrics: Arc<dyn GatewayMetrics>,
    ) -> Self {
        Self {
            config,
            indexer,
            aggregator,
            metrics,
        }
    }

    /// Header for `height`.
    pub async fn query_header(&self, height: u64) -> Result<MithrilHeader, GatewayError> {
        let converged = self.converge(height).await?;

        let snapshot_cert = self
            .aggregator
            .certificate(&converged.proof.certificate_hash)
            .await?;
        let chain = self.walk_to_anchor(snapshot_cert).await?;
        let (first, anchor) = match (chain.first(), chain.last()) {
            (Some(first), Some(anchor)) => (first, anchor),
            _ => {
                return Err(GatewayError::Internal(
                    "empty certificate chain".to_string(),
                ))
            }
        };

        let artifacts = self.aggregator.stake_distributions().await?;
        let anchor_artifact = find_artifact(&artifacts, &anchor.hash)?;

        let previous_stake_distribution_certificate = match anchor.previous() {
            Some(previous) => {
                // The artifact must exist before the certificate is trusted.
                find_artifact(&artifacts, previous)?;
                let cert = self.aggregator.certificate(previous).await?;
                Some(normalize_certificate(&cert)?)
            }
            None => None,
        };

        let block_no = converged.host_state.block_no;
        let block = self
            .indexer
            .find_block_by_height(block_no)
            .await?
            .ok_or_else(|| GatewayError::not_found(format!("block {} not found", block_no)))?;

        info!(
            height,
            block = block_no,
            anchor = %anchor.hash,
            attempts = converged.attempts,
            "[ibc-gateway] Mithril header built"
        );

        Ok(MithrilHeader {
            host_state: converged.host_state,
            block,
            transaction_snapshot_certificate: normalize_certificate(first)?,
            transaction_snapshot: converged.snapshot,
            proof: converged.proof,
            stake_distribution: normalize_stake_distribution(anchor_artifact, anchor)?,
            stake_distribution_certificate: normalize_certificate(anchor)?,
            previous_stake_distribution_certificate,
        })
    }

    /// Client bootstrap at exactly `height`.
    pub async fn query_new_client(&self, height: u64) -> Result<NewClientState, GatewayError> {
        let snapshot = self
            .aggregator
            .transaction_snapshots()
            .await?
            .into_iter()
            .find(|s| s.block_number == height)
            .ok_or_else(|| GatewayError::not_found(format!("height {} not found", height)))?;

        let cert = self.aggregator.certificate(&snapshot.certificate_hash).await?;
        let chain = self.walk_to_anchor(cert).await?;
        let anchor = chain
            .last()
            .ok_or_else(|| GatewayError::Internal("empty certificate chain".to_string()))?;

        info!(
            height,
            epoch = snapshot.epoch,
            anchor = %anchor.hash,
            "[ibc-gateway] new Mithril client state"
        );

        Ok(NewClientState {
            client_state: MithrilClientState {
                chain_id: self.config.chain_id.clone(),
                latest_height: Height::new(0, height),
                current_epoch: snapshot.epoch,
                trusting_period_secs: self.config.mithril.trusting_period_secs,
                protocol_parameters: normalize_parameters(&anchor.metadata.parameters)?,
                upgrade_path: vec![],
            },
            consensus_state: MithrilConsensusState {
                timestamp: rfc3339_to_nanos(&snapshot.created_at)?,
                first_cert_hash_latest_epoch: anchor.hash.clone(),
                latest_cert_hash_tx_snapshot: snapshot.certificate_hash,
            },
        })
    }

    /// Align HostState, snapshot and proof for `height`.
    ///
    /// Each attempt either converges or moves to another HostState
    /// candidate. Running out of attempts or candidates is a
    /// `ConvergenceFailure`.
    pub async fn converge(&self, height: u64) -> Result<Convergence, GatewayError> {
        let mut candidate = self
            .indexer
            .host_state_at_or_before(height)
            .await?
            .ok_or_else(|| {
                GatewayError::not_found(format!("no HostState at or before height {}", height))
            })?;

        let max_attempts = self.config.mithril.max_convergence_attempts;
        let mut attempts = 0;
        while attempts < max_attempts {
            attempts += 1;
            debug!(
                height,
                attempt = attempts,
                candidate = candidate.block_no,
                "[ibc-gateway] Mithril convergence attempt"
            );

            let snapshots = self.aggregator.transaction_snapshots().await?;
            if !snapshots
                .iter()
                .any(|s| s.block_number >= candidate.block_no)
            {
                match self.older_candidate(candidate.block_no).await? {
                    Some(older) => {
                        candidate = older;
                        continue;
                    }
                    None => break,
                }
            }

            let proof = self
                .aggregator
                .transactions_proof(std::slice::from_ref(&candidate.tx_hash))
                .await?;
            if proof.latest_block_number < candidate.block_no {
                match self
                    .indexer
                    .host_state_at_or_before(proof.latest_block_number)
                    .await?
                {
                    Some(older) => {
                        candidate = older;
                        continue;
                    }
                    None => break,
                }
            }
            if !proof.certified_transactions.contains(&candidate.tx_hash) {
                warn!(
                    tx_hash = %candidate.tx_hash,
                    certificate = %proof.certificate_hash,
                    "[ibc-gateway] proof does not certify HostState transaction"
                );
                match self.older_candidate(candidate.block_no).await? {
                    Some(older) => {
                        candidate = older;
                        continue;
                    }
                    None => break,
                }
            }

            match self
                .indexer
                .host_state_at_or_before(proof.latest_block_number)
                .await?
            {
                Some(aligned) if aligned.tx_hash == candidate.tx_hash => {
                    // Snapshot, proof and HostState must share one certificate.
                    let signed = snapshots.into_iter().find(|s| {
                        s.certificate_hash == proof.certificate_hash
                            && s.block_number >= candidate.block_no
                    });
                    let Some(snapshot) = signed else {
                        debug!(
                            certificate = %proof.certificate_hash,
                            "[ibc-gateway] no snapshot signed by proof certificate"
                        );
                        match self.older_candidate(candidate.block_no).await? {
                            Some(older) => {
                                candidate = older;
                                continue;
                            }
                            None => break,
                        }
                    };
                    self.metrics.record_convergence_attempts(attempts, true);
                    return Ok(Convergence {
                        host_state: candidate,
                        snapshot,
                        proof,
                        attempts,
                    });
                }
                Some(aligned) => candidate = aligned,
                None => break,
            }
        }

        warn!(height, attempts, "[ibc-gateway] Mithril convergence failed");
        self.metrics.record_convergence_attempts(attempts, false);
        Err(GatewayError::ConvergenceFailure { attempts })
    }

    async fn older_candidate(&self, block_no: u64) -> Result<Option<HostStateRef>, GatewayError> {
        match block_no.checked_sub(1) {
            Some(b) => self.indexer.host_state_at_or_before(b).await,
            None => Ok(None),
        }
    }

    /// Follow `previous_hash` from `start` to the first stake-distribution
    /// certificate. Returns every certificate visited, `start` first.
    async fn walk_to_anchor(
        &self,
        start: AggregatorCertificate,
    ) -> Result<Vec<AggregatorCertificate>, GatewayError> {
        let max_hops = self.config.mithril.max_certificate_chain_hops;
        let mut seen = HashSet::new();
        let mut chain = Vec::new();
        let mut current = start;

        loop {
            if !seen.insert(current.hash.clone()) {
                return Err(GatewayError::BrokenCertificateChain {
                    certificate_hash: current.hash,
                    reason: "certificate chain loops".to_string(),
                });
            }
            if current.signed_entity_type.is_stake_distribution_anchor() {
                debug!(anchor = %current.hash, hops = chain.len(), "[ibc-gateway] anchor reached");
                chain.push(current);
                return Ok(chain);
            }
            if chain.len() >= max_hops {
                return Err(GatewayError::BrokenCertificateChain {
                    certificate_hash: current.hash,
                    reason: format!("no stake distribution anchor within {} hops", max_hops),
                });
            }
            let previous = match current.previous() {
                Some(p) => p.to_string(),
                None => {
                    return Err(GatewayError::BrokenCertificateChain {
                        certificate_hash: current.hash,
                        reason: "reached genesis without a stake distribution certificate"
                            .to_string(),
                    })
                }
            };
            chain.push(current);
            current = self.aggregator.certificate(&previous).await?;
        }
    }
}

fn find_artifact<'a>(
    artifacts: &'a [StakeDistributionArtifact],
    certificate_hash: &str,
) -> Result<&'a StakeDistributionArtifact, GatewayError> {
    artifacts
        .iter()
        .find(|a| a.certificate_hash == certificate_hash)
        .ok_or_else(|| GatewayError::MissingStakeDistribution {
            certificate_hash: certificate_hash.to_string(),
        })
}

/// RFC 3339 timestamp to nanoseconds since the Unix epoch.
pub fn rfc3339_to_nanos(value: &str) -> Result<u64, GatewayError> {
    let parsed = DateTime::parse_from_rfc3339(value)
        .map_err(|e| GatewayError::Upstream(format!("invalid timestamp {}: {}", value, e)))?;
    parsed
        .timestamp_nanos_opt()
        .and_then(|n| u64::try_from(n).ok())
        .ok_or_else(|| GatewayError::Upstream(format!("timestamp {} out of range", value)))
}

/// Protocol parameters with `phi_f` as an exact fraction.
pub fn normalize_parameters(raw: &RawProtocolParameters) -> Result<ProtocolParameters, GatewayError> {
    Ok(ProtocolParameters {
        k: raw.k,
        m: raw.m,
        phi_f: double_to_fraction(raw.phi_f)?,
    })
}

/// Aggregator certificate in wire form.
pub fn normalize_certificate(
    cert: &AggregatorCertificate,
) -> Result<MithrilCertificate, GatewayError> {
    let protocol_message = cert
        .protocol_message
        .message_parts
        .iter()
        .map(|(name, value)| MessagePart {
            key: ProtocolMessagePartKey::from_part_name(name),
            value: value.clone(),
        })
        .collect();

    Ok(MithrilCertificate {
        hash: cert.hash.clone(),
        previous_hash: cert.previous().unwrap_or_default().to_string(),
        epoch: cert.epoch,
        signed_entity_type: cert.signed_entity_type.clone(),
        metadata: CertificateMetadata {
            network: cert.metadata.network.clone(),
            protocol_version: cert.metadata.version.clone(),
            protocol_parameters: normalize_parameters(&cert.metadata.parameters)?,
            initiated_at: cert.metadata.initiated_at.clone(),
            sealed_at: cert.metadata.sealed_at.clone(),
            signers: cert.metadata.signers.clone(),
        },
        protocol_message,
        signed_message: cert.signed_message.clone(),
        aggregate_verification_key: cert.aggregate_verification_key.clone(),
        multi_signature: cert.multi_signature.clone(),
        genesis_signature: cert.genesis_signature.clone(),
    })
}

/// Stake distribution artifact joined with its certificate.
pub fn normalize_stake_distribution(
    artifact: &StakeDistributionArtifact,
    cert: &AggregatorCertificate,
) -> Result<MithrilStakeDistribution, GatewayError> {
    Ok(MithrilStakeDistribution {
        epoch: artifact.epoch,
        hash: artifact.hash.clone(),
        certificate_hash: artifact.certificate_hash.clone(),
        signers_with_stake: cert.metadata.signers.clone(),
        created_at: rfc3339_to_nanos(&artifact.created_at)?,
        protocol_parameters: normalize_parameters(&cert.metadata.parameters)?,
    })
}
