//! # Denom Registry and Resolver
//!
//! `DenomRegistry` wraps the persistent `denom_traces` table.
//! `DenomResolver` turns caller-supplied denoms into canonical paths using
//! that registry and never guesses on a miss.

use crate::algorithms::ibc_denom_hash;
use crate::config::MAX_DENOM_TRACE_PAGE_LIMIT;
use crate::domain::{
    DenomForm, DenomTrace, GatewayError, NewDenomTrace, Pagination, IBC_DENOM_PREFIX,
};
use crate::ports::outbound::{DenomTraceStore, InsertOutcome};
use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, info};

/// Registry of voucher denom traces.
pub struct DenomRegistry {
    store: Arc<dyn DenomTraceStore>,
    default_page_limit: usize,
}

impl DenomRegistry {
    /// Registry over `store`.
    pub fn new(store: Arc<dyn DenomTraceStore>, default_page_limit: usize) -> Self {
        Self {
            store,
            default_page_limit,
        }
    }

    /// Persist a trace, or return the existing row unchanged.
    ///
    /// The lookup is a fast path; the store's primary key decides races.
    pub async fn save_denom_trace(&self, trace: NewDenomTrace) -> Result<DenomTrace, GatewayError> {
        if let Some(existing) = self.store.find_by_hash(&trace.hash).await? {
            debug!(hash = %trace.hash, "[ibc-gateway] denom trace already known");
            return Ok(existing);
        }

        let computed = ibc_denom_hash(&trace.path, &trace.base_denom);
        if let Some(supplied) = &trace.ibc_denom_hash {
            if !supplied.eq_ignore_ascii_case(&computed) {
                return Err(GatewayError::Internal(format!(
                    "conflicting ibc denom hash for {}: supplied {}, computed {}",
                    trace.hash, supplied, computed
                )));
            }
        }

        let row = DenomTrace {
            hash: trace.hash,
            path: trace.path,
            base_denom: trace.base_denom,
            voucher_policy_id: trace.voucher_policy_id,
            ibc_denom_hash: computed,
            first_seen: Utc::now(),
            tx_hash: trace.tx_hash.filter(|h| !h.is_empty()),
        };
        match self.store.insert(row).await? {
            InsertOutcome::Inserted(row) => {
                info!(
                    hash = %row.hash,
                    denom = %row.full_denom(),
                    "[ibc-gateway] saved denom trace"
                );
                Ok(row)
            }
            InsertOutcome::Existing(row) => Ok(row),
        }
    }

    /// Row by voucher token name.
    pub async fn find_by_hash(&self, hash: &str) -> Result<Option<DenomTrace>, GatewayError> {
        self.store.find_by_hash(hash).await
    }

    /// Row for an ICS-20 hash, case-insensitive.
    ///
    /// On a collision the most recently first-seen row wins.
    pub async fn find_by_ibc_denom_hash(
        &self,
        ibc_hash: &str,
    ) -> Result<Option<DenomTrace>, GatewayError> {
        let rows = self
            .store
            .find_by_ibc_denom_hash(&ibc_hash.to_lowercase())
            .await?;
        Ok(rows.into_iter().max_by_key(|r| r.first_seen))
    }

    /// Rows with `base_denom`.
    pub async fn find_by_base_denom(
        &self,
        base_denom: &str,
    ) -> Result<Vec<DenomTrace>, GatewayError> {
        self.store.find_by_base_denom(base_denom).await
    }

    /// Page of rows, newest first. The limit is clamped to the hard maximum
    /// and a zero limit means the configured default.
    pub async fn find_all(&self, page: Pagination) -> Result<Vec<DenomTrace>, GatewayError> {
        let limit = match page.limit {
            0 => self.default_page_limit,
            n => n.min(MAX_DENOM_TRACE_PAGE_LIMIT),
        };
        self.store
            .list(Pagination {
                offset: page.offset,
                limit,
            })
            .await
    }

    /// Total rows.
    pub async fn count(&self) -> Result<usize, GatewayError> {
        self.store.count().await
    }

    /// Stamp `tx_hash` on rows that do not have one yet.
    pub async fn set_tx_hash_for_traces(
        &self,
        hashes: &[String],
        tx_hash: &str,
    ) -> Result<usize, GatewayError> {
        if hashes.is_empty() {
            return Ok(0);
        }
        let updated = self.store.set_tx_hash(hashes, tx_hash).await?;
        debug!(tx_id = %tx_hash, updated, "[ibc-gateway] denom trace tx hash set");
        Ok(updated)
    }
}

/// Resolves caller-facing denoms to canonical paths.
pub struct DenomResolver {
    registry: Arc<DenomRegistry>,
}

impl DenomResolver {
    /// Resolver over `registry`.
    pub fn new(registry: Arc<DenomRegistry>) -> Self {
        Self { registry }
    }

    /// Underlying registry.
    pub fn registry(&self) -> &Arc<DenomRegistry> {
        &self.registry
    }

    /// Resolve an `ibc/<hash>` alias; other forms pass through unchanged.
    pub async fn resolve_for_send(&self, denom: &str) -> Result<String, GatewayError> {
        self.resolve_alias(denom).await
    }

    /// Same rule as [`Self::resolve_for_send`], used before a burn.
    pub async fn resolve_for_burn(&self, denom: &str) -> Result<String, GatewayError> {
        self.resolve_alias(denom).await
    }

    /// Trace by voucher token name or `ibc/<hash>`.
    pub async fn query_denom_trace(&self, hash: &str) -> Result<DenomTrace, GatewayError> {
        let found = match hash.strip_prefix(IBC_DENOM_PREFIX) {
            Some(ibc_hash) => self.registry.find_by_ibc_denom_hash(ibc_hash).await?,
            None => match self.registry.find_by_hash(&hash.to_lowercase()).await? {
                Some(row) => Some(row),
                None => self.registry.find_by_ibc_denom_hash(hash).await?,
            },
        };
        found.ok_or_else(|| GatewayError::not_found(format!("denom trace {} not found", hash)))
    }

    async fn resolve_alias(&self, denom: &str) -> Result<String, GatewayError> {
        match DenomForm::classify(denom) {
            DenomForm::IbcAlias(hash) => {
                let trace = self
                    .registry
                    .find_by_ibc_denom_hash(hash)
                    .await?
                    .ok_or_else(|| {
                        GatewayError::invalid(format!(
                            "unknown denom alias {}; no denom trace recorded",
                            denom
                        ))
                    })?;
                Ok(trace.full_denom())
            }
            _ => Ok(denom.to_string()),
        }
    }
}
