//! # Packet Lifecycle Coordinator
//!
//! Send, receive, acknowledge and timeout over a channel datum. Every step
//! validates against indexed chain state, picks one asset movement, hands
//! fully resolved parameters to the ledger builder and registers the tree
//! update that the transaction will confirm.

use super::denom_resolver::DenomResolver;
use super::state_tree::{PendingStateTreeUpdate, StateTreeCommitCoordinator, TreeMutation};
use crate::algorithms::state_tree::{
    packet_ack_key, packet_commitment_key, packet_receipt_key, RECEIPT_VALUE,
};
use crate::algorithms::{
    build_voucher_token_name, commit_packet, denom_prefix, has_voucher_prefix,
    normalize_packet_denom, packet_denom_to_unit, resolve_escrow_denom_token,
    success_ack_commitment, split_denom_trace,
};
use crate::config::GatewayConfig;
use crate::domain::{
    invariant_channel_id_format, invariant_channel_open, invariant_non_empty,
    invariant_transfer_port, Acknowledgement, ChannelDatum, ChannelOrder, CredentialKind,
    EventAttribute, FungibleTokenPacketData, GatewayError, Height, IbcEvent, NewDenomTrace, Packet,
    PacketOperation, StateUtxo, LOVELACE,
};
use crate::ports::inbound::{
    AcknowledgePacketRequest, PacketBuildResult, RecvPacketRequest, SendPacketRequest,
    TimeoutPacketRequest,
};
use crate::ports::outbound::{
    AssetMovement, ChainIndexer, GatewayMetrics, LedgerTxBuilder, PacketTxParams,
};
use chrono::Utc;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

/// A validated step, ready for the ledger builder.
struct PacketDraft {
    operation: PacketOperation,
    channel: StateUtxo<ChannelDatum>,
    updated: ChannelDatum,
    packet: Packet,
    movement: AssetMovement,
    wallet_override: Option<String>,
    signer: String,
    mutations: Vec<TreeMutation>,
    denom_trace_hashes: Vec<String>,
    events: Vec<IbcEvent>,
}

/// Packet lifecycle state machine.
pub struct PacketLifecycleCoordinator {
    config: Arc<GatewayConfig>,
    indexer: Arc<dyn ChainIndexer>,
    builder: Arc<dyn LedgerTxBuilder>,
    resolver: Arc<DenomResolver>,
    tree: Arc<StateTreeCommitCoordinator>,
    metrics: Arc<dyn GatewayMetrics>,
}

impl PacketLifecycleCoordinator {
    /// Create a coordinator.
    pub fn new(
        config: Arc<GatewayConfig>,
        indexer: Arc<dyn ChainIndexer>,
        builder: Arc<dyn LedgerTxBuilder>,
        resolver: Arc<DenomResolver>,
        tree: Arc<StateTreeCommitCoordinator>,
        metrics: Arc<dyn GatewayMetrics>,
    ) -> Self {
        Self {
            config,
            indexer,
            builder,
            resolver,
            tree,
            metrics,
        }
    }

    /// Build an outbound transfer: escrow a native unit or burn a voucher.
    pub async fn send_packet(
        &self,
        request: SendPacketRequest,
    ) -> Result<PacketBuildResult, GatewayError> {
        self.observed(PacketOperation::Send, self.draft_send(request))
            .await
    }

    /// Build an inbound transfer: unescrow a native unit or mint a voucher.
    pub async fn recv_packet(
        &self,
        request: RecvPacketRequest,
    ) -> Result<PacketBuildResult, GatewayError> {
        self.observed(PacketOperation::Recv, self.draft_recv(request))
            .await
    }

    /// Build an acknowledgement; an error acknowledgement refunds the sender.
    pub async fn acknowledge_packet(
        &self,
        request: AcknowledgePacketRequest,
    ) -> Result<PacketBuildResult, GatewayError> {
        self.observed(PacketOperation::Acknowledge, self.draft_ack(request))
            .await
    }

    /// Build a timeout; always refunds the sender.
    pub async fn timeout_packet(
        &self,
        request: TimeoutPacketRequest,
    ) -> Result<PacketBuildResult, GatewayError> {
        self.observed(PacketOperation::Timeout, self.draft_timeout(request))
            .await
    }

    async fn observed(
        &self,
        operation: PacketOperation,
        draft: impl Future<Output = Result<PacketDraft, GatewayError>>,
    ) -> Result<PacketBuildResult, GatewayError> {
        let span = info_span!("packet_build", op = %operation, correlation_id = %Uuid::new_v4());
        let result = async {
            let draft = draft.await?;
            self.finalize(draft).await
        }
        .instrument(span)
        .await;
        if let Err(e) = &result {
            warn!(op = %operation, error = %e, "[ibc-gateway] packet build failed");
        }
        self.metrics
            .record_packet_operation(operation, result.is_ok());
        result
    }

    // =========================================================================
    // SendPacket
    // =========================================================================

    async fn draft_send(&self, req: SendPacketRequest) -> Result<PacketDraft, GatewayError> {
        invariant_transfer_port(&req.source_port, &self.config.port_id)?;
        invariant_channel_id_format(&req.source_channel)?;
        invariant_non_empty("sender", &req.sender)?;
        invariant_non_empty("receiver", &req.receiver)?;
        invariant_non_empty("token_denom", &req.token_denom)?;
        self.tree.ensure_ready()?;

        let amount = parse_amount(&req.token_amount)?;
        let channel = self
            .load_open_channel(&req.source_port, &req.source_channel)
            .await?;

        let canonical = self.resolver.resolve_for_send(&req.token_denom).await?;
        info!(
            channel_id = %req.source_channel,
            denom = %req.token_denom,
            resolved = %canonical,
            "[ibc-gateway] send packet"
        );

        let (movement, packet_denom) =
            if has_voucher_prefix(&canonical, &req.source_port, &req.source_channel) {
                let movement = self.burn_movement(&canonical, amount, &req.sender).await?;
                (movement, canonical)
            } else {
                self.escrow_movement(&req.token_denom, &canonical, amount, &req.sender)
                    .await?
            };

        let data = FungibleTokenPacketData {
            amount: amount.to_string(),
            denom: packet_denom,
            memo: req.memo.clone(),
            receiver: req.receiver.clone(),
            sender: req.sender.clone(),
        };

        let datum = &channel.datum;
        let sequence = datum.state.next_sequence_send;
        let packet = Packet {
            sequence,
            source_port: req.source_port.clone(),
            source_channel: req.source_channel.clone(),
            destination_port: datum.channel.counterparty.port_id.clone(),
            destination_channel: datum.channel.counterparty.channel_id.clone(),
            data: data.to_hex()?,
            timeout_height: req.timeout_height,
            timeout_timestamp: req.timeout_timestamp,
        };
        let commitment = commit_packet(&packet)?;

        let mut updated = datum.clone();
        updated.state.next_sequence_send = sequence + 1;
        updated.state.packet_commitment = datum
            .state
            .packet_commitment
            .inserted(sequence, hex::encode(commitment));

        let mutations = vec![TreeMutation::Set(
            packet_commitment_key(&packet.source_port, &packet.source_channel, sequence),
            commitment.to_vec(),
        )];
        let events = vec![packet_event("send_packet", &packet, datum)];

        Ok(PacketDraft {
            operation: PacketOperation::Send,
            channel,
            updated,
            packet,
            movement,
            wallet_override: Some(req.sender.clone()),
            signer: req.sender,
            mutations,
            denom_trace_hashes: vec![],
            events,
        })
    }

    async fn burn_movement(
        &self,
        canonical: &str,
        amount: u128,
        sender: &str,
    ) -> Result<AssetMovement, GatewayError> {
        let voucher_name = build_voucher_token_name(canonical)?;
        if self
            .resolver
            .registry()
            .find_by_hash(&voucher_name)
            .await?
            .is_none()
        {
            return Err(GatewayError::not_found(format!(
                "no denom trace for voucher {} ({})",
                voucher_name, canonical
            )));
        }
        let voucher_unit = format!(
            "{}{}",
            self.config.deployment.mint_voucher_policy_id, voucher_name
        );
        let wallet = self.indexer.find_utxos_at(sender).await?;
        let held: u128 = wallet.iter().map(|u| u.quantity_of(&voucher_unit)).sum();
        if held < amount {
            return Err(GatewayError::invalid(format!(
                "sender holds {} of voucher {}, needs {}",
                held, voucher_unit, amount
            )));
        }
        info!(voucher = %voucher_unit, "[ibc-gateway] strategy: burn voucher");
        Ok(AssetMovement::Burn {
            voucher_unit,
            amount,
            sender: sender.to_string(),
        })
    }

    /// Voucher unit for a traced denom, which must be in the registry.
    async fn registered_voucher_unit(&self, canonical: &str) -> Result<String, GatewayError> {
        let voucher_name = build_voucher_token_name(canonical)?;
        if self
            .resolver
            .registry()
            .find_by_hash(&voucher_name)
            .await?
            .is_none()
        {
            return Err(GatewayError::invalid(format!(
                "denom {} is neither a native unit nor a registered voucher",
                canonical
            )));
        }
        Ok(format!(
            "{}{}",
            self.config.deployment.mint_voucher_policy_id, voucher_name
        ))
    }

    async fn escrow_movement(
        &self,
        input_denom: &str,
        canonical: &str,
        amount: u128,
        sender: &str,
    ) -> Result<(AssetMovement, String), GatewayError> {
        // A traced path that did not come in over this channel is a voucher
        // travelling onward; it is escrowed under its voucher unit.
        let voucher_unit = if canonical.contains('/') {
            Some(self.registered_voucher_unit(canonical).await?)
        } else {
            None
        };
        let wallet = self.indexer.find_utxos_at(sender).await?;
        if wallet.is_empty() {
            return Err(GatewayError::not_found(format!(
                "no UTxOs at sender {}",
                sender
            )));
        }
        let (unit, packet_denom) = match voucher_unit {
            Some(unit) => {
                if !wallet.iter().any(|u| u.quantity_of(&unit) > 0) {
                    return Err(GatewayError::invalid(format!(
                        "voucher {} ({}) not found in sender wallet",
                        unit, canonical
                    )));
                }
                info!(unit = %unit, denom = %canonical, "[ibc-gateway] strategy: escrow voucher");
                (unit, canonical.to_string())
            }
            None => {
                let unit = resolve_escrow_denom_token(input_denom, canonical, &wallet)?;
                let packet_denom = if unit == LOVELACE {
                    normalize_packet_denom(LOVELACE)?
                } else {
                    unit.clone()
                };
                info!(unit = %unit, "[ibc-gateway] strategy: escrow native unit");
                (unit, packet_denom)
            }
        };
        Ok((
            AssetMovement::Escrow {
                unit,
                amount,
                sender: sender.to_string(),
            },
            packet_denom,
        ))
    }

    // =========================================================================
    // RecvPacket
    // =========================================================================

    async fn draft_recv(&self, req: RecvPacketRequest) -> Result<PacketDraft, GatewayError> {
        let packet = req.packet;
        invariant_channel_id_format(&packet.destination_channel)?;
        invariant_transfer_port(&packet.destination_port, &self.config.port_id)?;
        invariant_non_empty("signer", &req.signer)?;
        self.tree.ensure_ready()?;

        let channel = self
            .load_open_channel(&packet.destination_port, &packet.destination_channel)
            .await?;
        let datum = &channel.datum;
        let ordered = datum.channel.ordering == ChannelOrder::Ordered;
        if ordered && packet.sequence != datum.state.next_sequence_recv {
            return Err(GatewayError::invalid(format!(
                "packet sequence {} != next receive sequence {}",
                packet.sequence, datum.state.next_sequence_recv
            )));
        }
        self.verify_proof_height(datum, req.proof_height).await?;
        if datum.state.packet_receipt.contains(packet.sequence) {
            return Err(GatewayError::PacketAlreadyReceived {
                sequence: packet.sequence,
            });
        }

        self.verify_not_timed_out(&packet).await?;

        // Nothing below may run on a payload that is not strict ICS-20.
        let data = FungibleTokenPacketData::from_hex(&packet.data)?;
        let amount = data.amount_value()?;
        info!(
            channel_id = %packet.destination_channel,
            sequence = packet.sequence,
            denom = %data.denom,
            "[ibc-gateway] recv packet"
        );

        let mut denom_trace_hashes = Vec::new();
        let movement =
            if has_voucher_prefix(&data.denom, &packet.source_port, &packet.source_channel) {
                let prefix = denom_prefix(&packet.source_port, &packet.source_channel);
                let rest = &data.denom[prefix.len()..];
                let receiver = self.resolve_receiver(&data.receiver)?;
                self.unescrow_movement(rest, amount, receiver).await?
            } else {
                let full = format!(
                    "{}{}",
                    denom_prefix(&packet.destination_port, &packet.destination_channel),
                    data.denom
                );
                let receiver = self.resolve_receiver(&data.receiver)?;
                if self.builder.payment_credential_kind(&receiver)? == CredentialKind::Script {
                    return Err(GatewayError::invalid(format!(
                        "voucher receiver {} is a script address",
                        receiver
                    )));
                }
                let (movement, hash) = self.mint_movement(&full, amount, receiver).await?;
                denom_trace_hashes.push(hash);
                movement
            };

        let ack_commitment = success_ack_commitment();
        let mut updated = datum.clone();
        updated.state.packet_receipt = datum
            .state
            .packet_receipt
            .prepended(packet.sequence, hex::encode(RECEIPT_VALUE));
        updated.state.packet_acknowledgement = datum
            .state
            .packet_acknowledgement
            .inserted(packet.sequence, hex::encode(ack_commitment));
        if ordered {
            updated.state.next_sequence_recv += 1;
        }

        let (port, ch, seq) = (
            &packet.destination_port,
            &packet.destination_channel,
            packet.sequence,
        );
        let mutations = vec![
            TreeMutation::Set(packet_receipt_key(port, ch, seq), RECEIPT_VALUE.to_vec()),
            TreeMutation::Set(packet_ack_key(port, ch, seq), ack_commitment.to_vec()),
        ];

        let ack_hex = hex::encode(Acknowledgement::success().to_json_bytes());
        let mut write_ack = packet_event("write_acknowledgement", &packet, datum);
        write_ack.attributes.push(EventAttribute {
            key: "packet_ack_hex".to_string(),
            value: ack_hex,
        });
        let events = vec![packet_event("recv_packet", &packet, datum), write_ack];

        Ok(PacketDraft {
            operation: PacketOperation::Recv,
            channel,
            updated,
            packet,
            movement,
            wallet_override: None,
            signer: req.signer,
            mutations,
            denom_trace_hashes,
            events,
        })
    }

    // =========================================================================
    // AcknowledgePacket / TimeoutPacket
    // =========================================================================

    async fn draft_ack(&self, req: AcknowledgePacketRequest) -> Result<PacketDraft, GatewayError> {
        let packet = req.packet;
        let channel = self.load_source_channel(&packet, &req.signer).await?;
        let datum = &channel.datum;
        let ordered = datum.channel.ordering == ChannelOrder::Ordered;
        if ordered && packet.sequence != datum.state.next_sequence_ack {
            return Err(GatewayError::invalid(format!(
                "packet sequence {} != next acknowledge sequence {}",
                packet.sequence, datum.state.next_sequence_ack
            )));
        }
        self.verify_proof_height(datum, req.proof_height).await?;
        verify_commitment(datum, &packet)?;

        let ack = Acknowledgement::from_hex(&req.acknowledgement)?;
        info!(
            channel_id = %packet.source_channel,
            sequence = packet.sequence,
            error = ack.is_error(),
            "[ibc-gateway] acknowledge packet"
        );

        let mut denom_trace_hashes = Vec::new();
        let movement = if let Acknowledgement::Error(reason) = &ack {
            debug!(reason = %reason, "[ibc-gateway] error acknowledgement, refunding");
            let (movement, hash) = self.refund_movement(&packet).await?;
            denom_trace_hashes.extend(hash);
            movement
        } else {
            AssetMovement::None
        };

        let mut updated = datum.clone();
        updated.state.packet_commitment = datum.state.packet_commitment.removed(packet.sequence);
        if ordered {
            updated.state.next_sequence_ack += 1;
        }

        let mutations = vec![TreeMutation::Delete(packet_commitment_key(
            &packet.source_port,
            &packet.source_channel,
            packet.sequence,
        ))];
        let events = vec![packet_event("acknowledge_packet", &packet, datum)];

        Ok(PacketDraft {
            operation: PacketOperation::Acknowledge,
            channel,
            updated,
            packet,
            movement,
            wallet_override: None,
            signer: req.signer,
            mutations,
            denom_trace_hashes,
            events,
        })
    }

    async fn draft_timeout(&self, req: TimeoutPacketRequest) -> Result<PacketDraft, GatewayError> {
        let packet = req.packet;
        let channel = self.load_source_channel(&packet, &req.signer).await?;
        let datum = &channel.datum;
        self.verify_proof_height(datum, req.proof_height).await?;
        verify_commitment(datum, &packet)?;

        if datum.channel.ordering == ChannelOrder::Ordered
            && req.next_sequence_recv > packet.sequence
        {
            return Err(GatewayError::invalid(format!(
                "packet {} was already received (next_sequence_recv {})",
                packet.sequence, req.next_sequence_recv
            )));
        }
        info!(
            channel_id = %packet.source_channel,
            sequence = packet.sequence,
            "[ibc-gateway] timeout packet"
        );

        let (movement, hash) = self.refund_movement(&packet).await?;

        let mut updated = datum.clone();
        updated.state.packet_commitment = datum.state.packet_commitment.removed(packet.sequence);

        let mutations = vec![TreeMutation::Delete(packet_commitment_key(
            &packet.source_port,
            &packet.source_channel,
            packet.sequence,
        ))];
        let events = vec![packet_event("timeout_packet", &packet, datum)];

        Ok(PacketDraft {
            operation: PacketOperation::Timeout,
            channel,
            updated,
            packet,
            movement,
            wallet_override: None,
            signer: req.signer,
            mutations,
            denom_trace_hashes: hash.into_iter().collect(),
            events,
        })
    }

    /// Return the tokens of an outbound packet to its sender.
    ///
    /// A voucher we burned on send is minted again under the same name; the
    /// denom is hashed as carried, never re-prefixed. A native unit we
    /// escrowed is released from custody.
    async fn refund_movement(
        &self,
        packet: &Packet,
    ) -> Result<(AssetMovement, Option<String>), GatewayError> {
        let data = FungibleTokenPacketData::from_hex(&packet.data)?;
        let amount = data.amount_value()?;
        let sender = self.resolve_receiver(&data.sender)?;

        if has_voucher_prefix(&data.denom, &packet.source_port, &packet.source_channel) {
            let (movement, hash) = self.mint_movement(&data.denom, amount, sender).await?;
            Ok((movement, Some(hash)))
        } else {
            let movement = self.unescrow_movement(&data.denom, amount, sender).await?;
            Ok((movement, None))
        }
    }

    async fn mint_movement(
        &self,
        full_denom: &str,
        amount: u128,
        receiver: String,
    ) -> Result<(AssetMovement, String), GatewayError> {
        let voucher_token_name = build_voucher_token_name(full_denom)?;
        let (path, base_denom) = split_denom_trace(full_denom)?;
        let policy = self.config.deployment.mint_voucher_policy_id.clone();
        self.resolver
            .registry()
            .save_denom_trace(NewDenomTrace {
                hash: voucher_token_name.clone(),
                path,
                base_denom,
                voucher_policy_id: policy.clone(),
                ibc_denom_hash: None,
                tx_hash: None,
            })
            .await?;
        info!(
            denom = %full_denom,
            voucher = %voucher_token_name,
            "[ibc-gateway] strategy: mint voucher"
        );
        Ok((
            AssetMovement::Mint {
                voucher_policy_id: policy,
                voucher_token_name: voucher_token_name.clone(),
                amount,
                receiver,
            },
            voucher_token_name,
        ))
    }

    async fn unescrow_movement(
        &self,
        packet_denom: &str,
        amount: u128,
        receiver: String,
    ) -> Result<AssetMovement, GatewayError> {
        if packet_denom.contains('/') {
            return Err(GatewayError::invalid(format!(
                "escrowed denom {} is not a native unit",
                packet_denom
            )));
        }
        let unit = packet_denom_to_unit(packet_denom);
        let module_unit = &self.config.deployment.transfer_module_unit;
        let custody = self
            .indexer
            .find_utxo_by_unit(module_unit)
            .await?
            .ok_or_else(|| {
                GatewayError::not_found(format!("transfer module UTxO {} not found", module_unit))
            })?;
        let held = custody.quantity_of(&unit);
        if held < amount {
            return Err(GatewayError::invalid(format!(
                "transfer module holds {} of {}, cannot release {}",
                held, unit, amount
            )));
        }
        info!(unit = %unit, "[ibc-gateway] strategy: unescrow native unit");
        Ok(AssetMovement::Unescrow {
            unit,
            amount,
            receiver,
            custody: custody.reference,
        })
    }

    // =========================================================================
    // Shared checks
    // =========================================================================

    async fn load_open_channel(
        &self,
        port_id: &str,
        channel_id: &str,
    ) -> Result<StateUtxo<ChannelDatum>, GatewayError> {
        let channel = self
            .indexer
            .find_channel(port_id, channel_id)
            .await?
            .ok_or_else(|| {
                GatewayError::not_found(format!("channel {}/{} not found", port_id, channel_id))
            })?;
        invariant_channel_open(&channel.datum)?;
        Ok(channel)
    }

    async fn load_source_channel(
        &self,
        packet: &Packet,
        signer: &str,
    ) -> Result<StateUtxo<ChannelDatum>, GatewayError> {
        invariant_channel_id_format(&packet.source_channel)?;
        invariant_transfer_port(&packet.source_port, &self.config.port_id)?;
        invariant_non_empty("signer", signer)?;
        self.tree.ensure_ready()?;
        self.load_open_channel(&packet.source_port, &packet.source_channel)
            .await
    }

    /// A packet can only be received while the built transaction's validity
    /// window ends before its timeout.
    async fn verify_not_timed_out(&self, packet: &Packet) -> Result<(), GatewayError> {
        if packet.timeout_timestamp != 0 {
            let now = Utc::now()
                .timestamp_nanos_opt()
                .and_then(|n| u64::try_from(n).ok())
                .ok_or_else(|| GatewayError::Internal("system clock out of range".into()))?;
            let valid_to =
                now.saturating_add(self.config.tx_time_to_live_secs.saturating_mul(1_000_000_000));
            if valid_to >= packet.timeout_timestamp {
                return Err(GatewayError::invalid(format!(
                    "packet {} timeout timestamp {} elapses before validity end {}",
                    packet.sequence, packet.timeout_timestamp, valid_to
                )));
            }
        }
        if packet.timeout_height != Height::default() {
            let tip = Height::new(0, self.indexer.latest_block_height().await?);
            if tip >= packet.timeout_height {
                return Err(GatewayError::invalid(format!(
                    "packet {} timeout height {} reached at {}",
                    packet.sequence, packet.timeout_height, tip
                )));
            }
        }
        Ok(())
    }

    /// The proof height must be a consensus height of the channel's client.
    async fn verify_proof_height(
        &self,
        datum: &ChannelDatum,
        proof_height: Height,
    ) -> Result<(), GatewayError> {
        let connection_id = datum.channel.connection_hops.first().ok_or_else(|| {
            GatewayError::Internal(format!("channel {} has no connection hops", datum.channel_id))
        })?;
        let connection = self
            .indexer
            .find_connection(connection_id)
            .await?
            .ok_or_else(|| {
                GatewayError::not_found(format!("connection {} not found", connection_id))
            })?;
        let client_id = &connection.datum.client_id;
        let client = self
            .indexer
            .find_client(client_id)
            .await?
            .ok_or_else(|| GatewayError::not_found(format!("client {} not found", client_id)))?;
        if !client.datum.has_consensus_at(proof_height.revision_height) {
            return Err(GatewayError::InvalidProofHeight(
                proof_height.revision_height,
            ));
        }
        Ok(())
    }

    /// Bech32 addresses pass through; a bare credential becomes an address.
    fn resolve_receiver(&self, receiver: &str) -> Result<String, GatewayError> {
        invariant_non_empty("receiver", receiver)?;
        if receiver.starts_with("addr") {
            Ok(receiver.to_string())
        } else {
            self.builder.credential_to_address(receiver)
        }
    }

    async fn finalize(&self, draft: PacketDraft) -> Result<PacketBuildResult, GatewayError> {
        let expected_new_root = self.tree.stage(&draft.mutations);
        let params = PacketTxParams {
            operation: draft.operation,
            channel_utxo: draft.channel.utxo.reference.clone(),
            updated_channel: draft.updated,
            packet: draft.packet.clone(),
            movement: draft.movement.clone(),
            expected_new_root: expected_new_root.clone(),
            wallet_override: draft.wallet_override,
            signer: draft.signer,
        };
        let unsigned_tx = self.builder.build_packet_tx(&params).await?;

        self.tree.register(
            &unsigned_tx.tx_id,
            PendingStateTreeUpdate {
                expected_new_root: expected_new_root.clone(),
                commit: self.tree.commit_fn(draft.mutations),
                denom_trace_hashes: draft.denom_trace_hashes,
                events: draft.events,
            },
        )?;
        info!(
            tx_id = %unsigned_tx.tx_id,
            sequence = draft.packet.sequence,
            root = %expected_new_root,
            "[ibc-gateway] unsigned packet transaction built"
        );

        Ok(PacketBuildResult {
            unsigned_tx,
            movement: draft.movement,
            packet: draft.packet,
            expected_new_root,
        })
    }
}

fn parse_amount(raw: &str) -> Result<u128, GatewayError> {
    match raw.parse::<u128>() {
        Ok(0) => Err(GatewayError::invalid("token amount must be positive")),
        Ok(v) => Ok(v),
        Err(_) => Err(GatewayError::invalid(format!(
            "token amount is not an integer: {}",
            raw
        ))),
    }
}

fn verify_commitment(datum: &ChannelDatum, packet: &Packet) -> Result<(), GatewayError> {
    let stored = datum
        .state
        .packet_commitment
        .get(packet.sequence)
        .ok_or(GatewayError::CommitmentNotFound {
            sequence: packet.sequence,
        })?;
    let expected = hex::encode(commit_packet(packet)?);
    if !stored.eq_ignore_ascii_case(&expected) {
        return Err(GatewayError::invalid(format!(
            "packet {} does not match its stored commitment",
            packet.sequence
        )));
    }
    Ok(())
}

fn packet_event(event_type: &str, packet: &Packet, datum: &ChannelDatum) -> IbcEvent {
    let ordering = match datum.channel.ordering {
        ChannelOrder::Ordered => "ORDER_ORDERED",
        ChannelOrder::Unordered => "ORDER_UNORDERED",
    };
    IbcEvent::new(
        event_type,
        &[
            ("packet_data_hex", packet.data.clone()),
            ("packet_timeout_height", packet.timeout_height.to_string()),
            (
                "packet_timeout_timestamp",
                packet.timeout_timestamp.to_string(),
            ),
            ("packet_sequence", packet.sequence.to_string()),
            ("packet_src_port", packet.source_port.clone()),
            ("packet_src_channel", packet.source_channel.clone()),
            ("packet_dst_port", packet.destination_port.clone()),
            ("packet_dst_channel", packet.destination_channel.clone()),
            ("packet_channel_ordering", ordering.to_string()),
            (
                "packet_connection",
                datum
                    .channel
                    .connection_hops
                    .first()
                    .cloned()
                    .unwrap_or_default(),
            ),
        ],
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::InMemoryDenomTraceStore;
    use crate::application::denom_resolver::DenomRegistry;
    use crate::algorithms::{ibc_denom_hash, Ics23MerkleTree};
    use crate::domain::{
        ChannelEnd, ChannelState, ClientDatum, ConnectionDatum, Counterparty, HostStateDatum,
        SequenceMap, Utxo, UtxoRef,
    };
    use crate::ports::outbound::{MockChainIndexer, MockLedgerTxBuilder, MockMetrics};
    use std::collections::BTreeMap;

    struct Fixture {
        config: Arc<GatewayConfig>,
        indexer: Arc<MockChainIndexer>,
        builder: Arc<MockLedgerTxBuilder>,
        registry: Arc<DenomRegistry>,
        tree: Arc<StateTreeCommitCoordinator>,
        metrics: Arc<MockMetrics>,
        coordinator: PacketLifecycleCoordinator,
    }

    fn open_channel(ordering: ChannelOrder) -> StateUtxo<ChannelDatum> {
        StateUtxo {
            utxo: Utxo {
                reference: UtxoRef {
                    tx_hash: "chan".into(),
                    output_index: 0,
                },
                ..Default::default()
            },
            datum: ChannelDatum {
                port_id: "transfer".into(),
                channel_id: "channel-0".into(),
                channel: ChannelEnd {
                    state: ChannelState::Open,
                    ordering,
                    counterparty: Counterparty {
                        port_id: "transfer".into(),
                        channel_id: "channel-9".into(),
                    },
                    connection_hops: vec!["connection-0".into()],
                    version: "ics20-1".into(),
                },
                state: Default::default(),
            },
        }
    }

    async fn fixture_with(ordering: ChannelOrder, ready: bool) -> Fixture {
        let config = Arc::new(GatewayConfig::for_testing());
        let indexer = Arc::new(MockChainIndexer::default());
        indexer.put_channel(open_channel(ordering));
        indexer.connections.lock().insert(
            "connection-0".into(),
            StateUtxo {
                utxo: Utxo::default(),
                datum: ConnectionDatum {
                    connection_id: "connection-0".into(),
                    client_id: "07-mithril-0".into(),
                    delay_period: 0,
                },
            },
        );
        indexer.clients.lock().insert(
            "07-mithril-0".into(),
            StateUtxo {
                utxo: Utxo::default(),
                datum: ClientDatum {
                    client_id: "07-mithril-0".into(),
                    latest_height: Height::new(0, 100),
                    consensus_heights: vec![Height::new(0, 100)],
                },
            },
        );

        let builder = Arc::new(MockLedgerTxBuilder::default());
        let registry = Arc::new(DenomRegistry::new(
            Arc::new(InMemoryDenomTraceStore::new()),
            100,
        ));
        let resolver = Arc::new(DenomResolver::new(Arc::clone(&registry)));
        let tree = Arc::new(StateTreeCommitCoordinator::new());
        if ready {
            *indexer.host_state.lock() = Some(StateUtxo {
                utxo: Utxo::default(),
                datum: HostStateDatum {
                    version: 0,
                    ibc_state_root: Ics23MerkleTree::new().root_hex(),
                },
            });
            tree.rebuild(indexer.as_ref()).await.unwrap();
        }
        let metrics = Arc::new(MockMetrics::default());
        let coordinator = PacketLifecycleCoordinator::new(
            Arc::clone(&config),
            indexer.clone(),
            builder.clone(),
            resolver,
            Arc::clone(&tree),
            metrics.clone(),
        );
        Fixture {
            config,
            indexer,
            builder,
            registry,
            tree,
            metrics,
            coordinator,
        }
    }

    async fn fixture() -> Fixture {
        fixture_with(ChannelOrder::Unordered, true).await
    }

    fn wallet(address: &str, unit: &str, qty: u128) -> Utxo {
        Utxo {
            reference: UtxoRef {
                tx_hash: "w".into(),
                output_index: 1,
            },
            address: address.into(),
            assets: BTreeMap::from([(unit.to_string(), qty)]),
        }
    }

    fn send_request(denom: &str) -> SendPacketRequest {
        SendPacketRequest {
            source_port: "transfer".into(),
            source_channel: "channel-0".into(),
            token_denom: denom.into(),
            token_amount: "100".into(),
            sender: "addr_test1sender".into(),
            receiver: "cosmos1receiver".into(),
            memo: String::new(),
            timeout_height: Height::new(0, 500),
            timeout_timestamp: 0,
        }
    }

    fn inbound_packet(denom: &str, receiver: &str) -> Packet {
        let data = FungibleTokenPacketData {
            amount: "10".into(),
            denom: denom.into(),
            memo: String::new(),
            receiver: receiver.into(),
            sender: "cosmos1sender".into(),
        };
        Packet {
            sequence: 1,
            source_port: "transfer".into(),
            source_channel: "channel-9".into(),
            destination_port: "transfer".into(),
            destination_channel: "channel-0".into(),
            data: data.to_hex().unwrap(),
            timeout_height: Height::new(0, 500),
            timeout_timestamp: 0,
        }
    }

    fn recv_request(packet: Packet) -> RecvPacketRequest {
        RecvPacketRequest {
            packet,
            proof_height: Height::new(0, 100),
            signer: "addr_test1relayer".into(),
        }
    }

    /// Outbound packet with its commitment stored on channel-0.
    fn committed_outbound(f: &Fixture, denom: &str) -> Packet {
        let data = FungibleTokenPacketData {
            amount: "5".into(),
            denom: denom.into(),
            memo: String::new(),
            receiver: "cosmos1receiver".into(),
            sender: "addr_test1sender".into(),
        };
        let packet = Packet {
            sequence: 3,
            source_port: "transfer".into(),
            source_channel: "channel-0".into(),
            destination_port: "transfer".into(),
            destination_channel: "channel-9".into(),
            data: data.to_hex().unwrap(),
            timeout_height: Height::new(0, 500),
            timeout_timestamp: 0,
        };
        let mut channel = open_channel(ChannelOrder::Unordered);
        channel.datum.state.packet_commitment = SequenceMap::from_entries([(
            3,
            hex::encode(commit_packet(&packet).unwrap()),
        )]);
        f.indexer.put_channel(channel);
        packet
    }

    fn error_ack_hex() -> String {
        hex::encode(Acknowledgement::Error("boom".into()).to_json_bytes())
    }

    #[tokio::test]
    async fn test_send_lovelace_escrows_from_sender_wallet() {
        let f = fixture().await;
        f.indexer.utxos_by_address.lock().insert(
            "addr_test1sender".into(),
            vec![wallet("addr_test1sender", LOVELACE, 1_000)],
        );

        let result = f.coordinator.send_packet(send_request("lovelace")).await.unwrap();
        assert_eq!(
            result.movement,
            AssetMovement::Escrow {
                unit: LOVELACE.into(),
                amount: 100,
                sender: "addr_test1sender".into(),
            }
        );
        let data = FungibleTokenPacketData::from_hex(&result.packet.data).unwrap();
        assert_eq!(data.denom, hex::encode("lovelace"));
        assert_eq!(result.packet.sequence, 1);
        assert_eq!(result.packet.destination_channel, "channel-9");

        let built = f.builder.built.lock();
        assert_eq!(built[0].wallet_override.as_deref(), Some("addr_test1sender"));
        assert_eq!(built[0].updated_channel.state.next_sequence_send, 2);
        assert!(built[0].updated_channel.state.packet_commitment.contains(1));
        assert_eq!(f.tree.pending_count(), 1);
        assert_eq!(f.metrics.packet_operations.lock()[0], (PacketOperation::Send, true));
    }

    #[tokio::test]
    async fn test_send_escrow_ignores_voucher_lookalike() {
        let f = fixture().await;
        let voucher = format!(
            "{}{}",
            f.config.deployment.mint_voucher_policy_id,
            build_voucher_token_name("stake").unwrap()
        );
        f.indexer.utxos_by_address.lock().insert(
            "addr_test1sender".into(),
            vec![wallet("addr_test1sender", &voucher, 1_000)],
        );
        let err = f
            .coordinator
            .send_packet(send_request("stake"))
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::InvalidArgument(_)));
        assert!(f.builder.built.lock().is_empty());
        assert_eq!(f.metrics.packet_operations.lock()[0], (PacketOperation::Send, false));
    }

    #[tokio::test]
    async fn test_send_with_empty_wallet_fails() {
        let f = fixture().await;
        let err = f
            .coordinator
            .send_packet(send_request("lovelace"))
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_send_voucher_burns() {
        let f = fixture().await;
        let canonical = "transfer/channel-0/uatom";
        let name = build_voucher_token_name(canonical).unwrap();
        f.registry
            .save_denom_trace(NewDenomTrace {
                hash: name.clone(),
                path: "transfer/channel-0".into(),
                base_denom: "uatom".into(),
                voucher_policy_id: f.config.deployment.mint_voucher_policy_id.clone(),
                ibc_denom_hash: None,
                tx_hash: None,
            })
            .await
            .unwrap();
        let unit = format!("{}{}", f.config.deployment.mint_voucher_policy_id, name);
        f.indexer.utxos_by_address.lock().insert(
            "addr_test1sender".into(),
            vec![wallet("addr_test1sender", &unit, 500)],
        );

        let alias = format!(
            "ibc/{}",
            ibc_denom_hash("transfer/channel-0", "uatom")
        );
        let result = f.coordinator.send_packet(send_request(&alias)).await.unwrap();
        assert!(matches!(result.movement, AssetMovement::Burn { .. }));
        let data = FungibleTokenPacketData::from_hex(&result.packet.data).unwrap();
        assert_eq!(data.denom, canonical);
    }

    async fn save_trace(f: &Fixture, path: &str, base: &str) -> String {
        let name = build_voucher_token_name(&format!("{}/{}", path, base)).unwrap();
        f.registry
            .save_denom_trace(NewDenomTrace {
                hash: name.clone(),
                path: path.into(),
                base_denom: base.into(),
                voucher_policy_id: f.config.deployment.mint_voucher_policy_id.clone(),
                ibc_denom_hash: None,
                tx_hash: None,
            })
            .await
            .unwrap();
        format!("{}{}", f.config.deployment.mint_voucher_policy_id, name)
    }

    #[tokio::test]
    async fn test_send_voucher_from_other_channel_escrows_voucher_unit() {
        let f = fixture().await;
        let unit = save_trace(&f, "transfer/channel-1", "uatom").await;
        f.indexer.utxos_by_address.lock().insert(
            "addr_test1sender".into(),
            vec![wallet("addr_test1sender", &unit, 500)],
        );

        let alias = format!("ibc/{}", ibc_denom_hash("transfer/channel-1", "uatom"));
        let result = f.coordinator.send_packet(send_request(&alias)).await.unwrap();
        assert_eq!(
            result.movement,
            AssetMovement::Escrow {
                unit,
                amount: 100,
                sender: "addr_test1sender".into(),
            }
        );
        let data = FungibleTokenPacketData::from_hex(&result.packet.data).unwrap();
        assert_eq!(data.denom, "transfer/channel-1/uatom");
        assert_eq!(
            f.builder.built.lock()[0].wallet_override.as_deref(),
            Some("addr_test1sender")
        );
    }

    #[tokio::test]
    async fn test_send_voucher_from_other_channel_requires_holding() {
        let f = fixture().await;
        save_trace(&f, "transfer/channel-1", "uatom").await;
        f.indexer.utxos_by_address.lock().insert(
            "addr_test1sender".into(),
            vec![wallet("addr_test1sender", LOVELACE, 1_000)],
        );
        let err = f
            .coordinator
            .send_packet(send_request("transfer/channel-1/uatom"))
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::InvalidArgument(_)));
        assert!(f.builder.built.lock().is_empty());
    }

    #[tokio::test]
    async fn test_send_unregistered_path_is_invalid() {
        let f = fixture().await;
        f.indexer.utxos_by_address.lock().insert(
            "addr_test1sender".into(),
            vec![wallet("addr_test1sender", LOVELACE, 1_000)],
        );
        let err = f
            .coordinator
            .send_packet(send_request("transfer/channel-1/uatom"))
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::InvalidArgument(_)));
        assert!(!f.indexer.was_called("find_utxos_at"));
    }

    #[tokio::test]
    async fn test_send_unknown_alias_is_invalid() {
        let f = fixture().await;
        let err = f
            .coordinator
            .send_packet(send_request(&format!("ibc/{}", "ab".repeat(32))))
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn test_send_on_closed_channel_rejected() {
        let f = fixture().await;
        let mut channel = open_channel(ChannelOrder::Unordered);
        channel.datum.channel.state = ChannelState::Close;
        f.indexer.put_channel(channel);
        let err = f
            .coordinator
            .send_packet(send_request("lovelace"))
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::ChannelNotOpen { .. }));
    }

    #[tokio::test]
    async fn test_builds_refused_before_rebuild() {
        let f = fixture_with(ChannelOrder::Unordered, false).await;
        let err = f
            .coordinator
            .send_packet(send_request("lovelace"))
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::TreeNotReady));
    }

    #[tokio::test]
    async fn test_recv_mints_voucher_and_saves_trace() {
        let f = fixture().await;
        let result = f
            .coordinator
            .recv_packet(recv_request(inbound_packet("uatom", "addr_test1receiver")))
            .await
            .unwrap();

        let expected = build_voucher_token_name("transfer/channel-0/uatom").unwrap();
        match &result.movement {
            AssetMovement::Mint {
                voucher_token_name,
                amount,
                receiver,
                ..
            } => {
                assert_eq!(voucher_token_name, &expected);
                assert_eq!(*amount, 10);
                assert_eq!(receiver, "addr_test1receiver");
            }
            other => panic!("unexpected movement {:?}", other),
        }
        let trace = f.registry.find_by_hash(&expected).await.unwrap().unwrap();
        assert_eq!(trace.full_denom(), "transfer/channel-0/uatom");

        let built = f.builder.built.lock();
        let state = &built[0].updated_channel.state;
        assert!(state.packet_receipt.contains(1));
        assert_eq!(
            state.packet_acknowledgement.get(1).map(String::as_str),
            Some(hex::encode(success_ack_commitment()).as_str())
        );
    }

    #[tokio::test]
    async fn test_recv_maps_bare_credential_to_address() {
        let f = fixture().await;
        let result = f
            .coordinator
            .recv_packet(recv_request(inbound_packet("uatom", "abcdef")))
            .await
            .unwrap();
        match result.movement {
            AssetMovement::Mint { receiver, .. } => assert_eq!(receiver, "addr_test1abcdef"),
            other => panic!("unexpected movement {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_recv_rejects_script_receiver() {
        let f = fixture().await;
        f.builder
            .script_addresses
            .lock()
            .push("addr_test1script".into());
        let err = f
            .coordinator
            .recv_packet(recv_request(inbound_packet("uatom", "addr_test1script")))
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn test_recv_unescrows_returning_native_unit() {
        let f = fixture().await;
        let module_unit = f.config.deployment.transfer_module_unit.clone();
        let mut custody = wallet("addr_test1module", &module_unit, 1);
        custody.assets.insert(LOVELACE.into(), 1_000);
        f.indexer.unit_utxos.lock().push(custody.clone());

        let denom = format!("transfer/channel-9/{}", hex::encode("lovelace"));
        let result = f
            .coordinator
            .recv_packet(recv_request(inbound_packet(&denom, "addr_test1receiver")))
            .await
            .unwrap();
        assert_eq!(
            result.movement,
            AssetMovement::Unescrow {
                unit: LOVELACE.into(),
                amount: 10,
                receiver: "addr_test1receiver".into(),
                custody: custody.reference,
            }
        );
    }

    #[tokio::test]
    async fn test_recv_malformed_payload_rejected_before_asset_lookup() {
        let f = fixture().await;
        let mut packet = inbound_packet("uatom", "addr_test1receiver");
        packet.data = hex::encode(r#"{"denom":"uatom","amount":"1"}"#);
        let err = f
            .coordinator
            .recv_packet(recv_request(packet))
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::InvalidArgument(_)));
        assert!(!f.indexer.was_called("find_utxo_by_unit"));
        assert!(f.builder.built.lock().is_empty());
        assert_eq!(f.registry.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_recv_duplicate_receipt_rejected() {
        let f = fixture().await;
        let mut channel = open_channel(ChannelOrder::Unordered);
        channel.datum.state.packet_receipt = SequenceMap::from_entries([(1, "01".to_string())]);
        f.indexer.put_channel(channel);
        let err = f
            .coordinator
            .recv_packet(recv_request(inbound_packet("uatom", "addr_test1r")))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            GatewayError::PacketAlreadyReceived { sequence: 1 }
        ));
    }

    #[tokio::test]
    async fn test_recv_unknown_proof_height_rejected() {
        let f = fixture().await;
        let mut req = recv_request(inbound_packet("uatom", "addr_test1r"));
        req.proof_height = Height::new(0, 999);
        let err = f.coordinator.recv_packet(req).await.unwrap_err();
        assert!(matches!(err, GatewayError::InvalidProofHeight(999)));
    }

    #[tokio::test]
    async fn test_recv_ordered_requires_next_sequence() {
        let f = fixture_with(ChannelOrder::Ordered, true).await;
        let mut packet = inbound_packet("uatom", "addr_test1r");
        packet.sequence = 2;
        let err = f
            .coordinator
            .recv_packet(recv_request(packet))
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::InvalidArgument(_)));

        let ok = f
            .coordinator
            .recv_packet(recv_request(inbound_packet("uatom", "addr_test1r")))
            .await;
        assert!(ok.is_ok());
        assert_eq!(
            f.builder.built.lock()[0]
                .updated_channel
                .state
                .next_sequence_recv,
            2
        );
    }

    #[tokio::test]
    async fn test_recv_elapsed_timeout_timestamp_rejected() {
        let f = fixture().await;
        let mut packet = inbound_packet("uatom", "addr_test1r");
        packet.timeout_timestamp = 1;
        let err = f
            .coordinator
            .recv_packet(recv_request(packet))
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::InvalidArgument(_)));
        assert!(f.builder.built.lock().is_empty());
        assert_eq!(f.registry.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_recv_timeout_inside_validity_window_rejected() {
        let f = fixture().await;
        let now = u64::try_from(Utc::now().timestamp_nanos_opt().unwrap()).unwrap();
        let mut packet = inbound_packet("uatom", "addr_test1r");
        // Still in the future, but before the built transaction expires.
        packet.timeout_timestamp = now + (f.config.tx_time_to_live_secs / 2) * 1_000_000_000;
        let err = f
            .coordinator
            .recv_packet(recv_request(packet))
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::InvalidArgument(_)));

        let mut packet = inbound_packet("uatom", "addr_test1r");
        packet.timeout_timestamp = now + 3_600 * 1_000_000_000;
        assert!(f.coordinator.recv_packet(recv_request(packet)).await.is_ok());
    }

    #[tokio::test]
    async fn test_recv_reached_timeout_height_rejected() {
        let f = fixture().await;
        *f.indexer.tip_height.lock() = 500;
        let err = f
            .coordinator
            .recv_packet(recv_request(inbound_packet("uatom", "addr_test1r")))
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::InvalidArgument(_)));
        assert!(f.builder.built.lock().is_empty());

        *f.indexer.tip_height.lock() = 499;
        assert!(f
            .coordinator
            .recv_packet(recv_request(inbound_packet("uatom", "addr_test1r")))
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_recv_without_timeout_height_skips_tip_lookup() {
        let f = fixture().await;
        let mut packet = inbound_packet("uatom", "addr_test1r");
        packet.timeout_height = Height::default();
        packet.timeout_timestamp = u64::MAX;
        assert!(f.coordinator.recv_packet(recv_request(packet)).await.is_ok());
        assert!(!f.indexer.was_called("latest_block_height"));
    }

    #[tokio::test]
    async fn test_ack_error_refund_mints_without_extra_prefix() {
        let f = fixture().await;
        let denom = "transfer/channel-0/transfer/channel-1/stake";
        let packet = committed_outbound(&f, denom);
        let result = f
            .coordinator
            .acknowledge_packet(AcknowledgePacketRequest {
                packet,
                acknowledgement: error_ack_hex(),
                proof_height: Height::new(0, 100),
                signer: "addr_test1relayer".into(),
            })
            .await
            .unwrap();

        let prefixed = build_voucher_token_name(&format!("transfer/channel-0/{}", denom)).unwrap();
        match result.movement {
            AssetMovement::Mint {
                voucher_token_name,
                receiver,
                ..
            } => {
                assert_eq!(voucher_token_name, build_voucher_token_name(denom).unwrap());
                assert_ne!(voucher_token_name, prefixed);
                assert_eq!(receiver, "addr_test1sender");
            }
            other => panic!("unexpected movement {:?}", other),
        }
        assert!(!f.builder.built.lock()[0]
            .updated_channel
            .state
            .packet_commitment
            .contains(3));
    }

    #[tokio::test]
    async fn test_ack_success_moves_nothing() {
        let f = fixture().await;
        let packet = committed_outbound(&f, "lovelace");
        let result = f
            .coordinator
            .acknowledge_packet(AcknowledgePacketRequest {
                packet,
                acknowledgement: hex::encode(Acknowledgement::success().to_json_bytes()),
                proof_height: Height::new(0, 100),
                signer: "addr_test1relayer".into(),
            })
            .await
            .unwrap();
        assert_eq!(result.movement, AssetMovement::None);
    }

    #[tokio::test]
    async fn test_ack_without_commitment_rejected() {
        let f = fixture().await;
        let mut packet = committed_outbound(&f, "lovelace");
        packet.sequence = 42;
        let err = f
            .coordinator
            .acknowledge_packet(AcknowledgePacketRequest {
                packet,
                acknowledgement: error_ack_hex(),
                proof_height: Height::new(0, 100),
                signer: "addr_test1relayer".into(),
            })
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            GatewayError::CommitmentNotFound { sequence: 42 }
        ));
        assert_eq!(err.kind(), crate::domain::ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_ack_ordered_requires_next_ack_sequence() {
        let f = fixture_with(ChannelOrder::Ordered, true).await;
        let packet = committed_outbound(&f, "lovelace");
        let mut channel = open_channel(ChannelOrder::Ordered);
        channel.datum.state.packet_commitment = SequenceMap::from_entries([(
            3,
            hex::encode(commit_packet(&packet).unwrap()),
        )]);
        channel.datum.state.next_sequence_ack = 2;
        f.indexer.put_channel(channel.clone());
        let ack = || AcknowledgePacketRequest {
            packet: packet.clone(),
            acknowledgement: hex::encode(Acknowledgement::success().to_json_bytes()),
            proof_height: Height::new(0, 100),
            signer: "addr_test1relayer".into(),
        };
        let err = f.coordinator.acknowledge_packet(ack()).await.unwrap_err();
        assert!(matches!(err, GatewayError::InvalidArgument(_)));
        assert!(f.builder.built.lock().is_empty());

        channel.datum.state.next_sequence_ack = 3;
        f.indexer.put_channel(channel);
        f.coordinator.acknowledge_packet(ack()).await.unwrap();
        assert_eq!(
            f.builder.built.lock()[0]
                .updated_channel
                .state
                .next_sequence_ack,
            4
        );
    }

    #[tokio::test]
    async fn test_timeout_refund_unescrows_native() {
        let f = fixture().await;
        let module_unit = f.config.deployment.transfer_module_unit.clone();
        let mut custody = wallet("addr_test1module", &module_unit, 1);
        custody.assets.insert(LOVELACE.into(), 50);
        f.indexer.unit_utxos.lock().push(custody);

        let packet = committed_outbound(&f, &hex::encode("lovelace"));
        let result = f
            .coordinator
            .timeout_packet(TimeoutPacketRequest {
                packet,
                next_sequence_recv: 1,
                proof_height: Height::new(0, 100),
                signer: "addr_test1relayer".into(),
            })
            .await
            .unwrap();
        match result.movement {
            AssetMovement::Unescrow {
                unit,
                amount,
                receiver,
                ..
            } => {
                assert_eq!(unit, LOVELACE);
                assert_eq!(amount, 5);
                assert_eq!(receiver, "addr_test1sender");
            }
            other => panic!("unexpected movement {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_timeout_refund_mint_matches_ack_refund_rule() {
        let f = fixture().await;
        let denom = "transfer/channel-0/uosmo";
        let packet = committed_outbound(&f, denom);
        let result = f
            .coordinator
            .timeout_packet(TimeoutPacketRequest {
                packet,
                next_sequence_recv: 1,
                proof_height: Height::new(0, 100),
                signer: "addr_test1relayer".into(),
            })
            .await
            .unwrap();
        match result.movement {
            AssetMovement::Mint {
                voucher_token_name,
                ..
            } => assert_eq!(voucher_token_name, build_voucher_token_name(denom).unwrap()),
            other => panic!("unexpected movement {:?}", other),
        }
    }
}
