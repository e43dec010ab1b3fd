//! Denom Trace Store Adapter
//!
//! Implements `DenomTraceStore` in memory. The write lock plays the role of
//! the table's primary-key constraint: the existence check and the insert
//! happen under one guard.

use crate::domain::{DenomTrace, GatewayError, Pagination};
use crate::ports::outbound::{DenomTraceStore, InsertOutcome};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use tracing::debug;

/// In-memory `denom_traces` table.
pub struct InMemoryDenomTraceStore {
    /// Rows keyed by voucher token name.
    rows: RwLock<HashMap<String, DenomTrace>>,
}

impl InMemoryDenomTraceStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self {
            rows: RwLock::new(HashMap::new()),
        }
    }

    fn sorted_newest_first(rows: impl Iterator<Item = DenomTrace>) -> Vec<DenomTrace> {
        let mut out: Vec<DenomTrace> = rows.collect();
        out.sort_by(|a, b| {
            b.first_seen
                .cmp(&a.first_seen)
                .then_with(|| a.hash.cmp(&b.hash))
        });
        out
    }
}

impl Default for InMemoryDenomTraceStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DenomTraceStore for InMemoryDenomTraceStore {
    async fn insert(&self, trace: DenomTrace) -> Result<InsertOutcome, GatewayError> {
        let mut rows = self.rows.write();
        if let Some(existing) = rows.get(&trace.hash) {
            debug!("[ibc-gateway] denom trace {} already stored", trace.hash);
            return Ok(InsertOutcome::Existing(existing.clone()));
        }
        rows.insert(trace.hash.clone(), trace.clone());
        Ok(InsertOutcome::Inserted(trace))
    }

    async fn find_by_hash(&self, hash: &str) -> Result<Option<DenomTrace>, GatewayError> {
        Ok(self.rows.read().get(hash).cloned())
    }

    async fn find_by_ibc_denom_hash(
        &self,
        ibc_hash: &str,
    ) -> Result<Vec<DenomTrace>, GatewayError> {
        let rows = self.rows.read();
        Ok(Self::sorted_newest_first(
            rows.values()
                .filter(|t| t.ibc_denom_hash.eq_ignore_ascii_case(ibc_hash))
                .cloned(),
        ))
    }

    async fn find_by_base_denom(&self, base_denom: &str) -> Result<Vec<DenomTrace>, GatewayError> {
        let rows = self.rows.read();
        Ok(Self::sorted_newest_first(
            rows.values().filter(|t| t.base_denom == base_denom).cloned(),
        ))
    }

    async fn list(&self, page: Pagination) -> Result<Vec<DenomTrace>, GatewayError> {
        let rows = self.rows.read();
        Ok(Self::sorted_newest_first(rows.values().cloned())
            .into_iter()
            .skip(page.offset)
            .take(page.limit)
            .collect())
    }

    async fn count(&self) -> Result<usize, GatewayError> {
        Ok(self.rows.read().len())
    }

    async fn set_tx_hash(&self, hashes: &[String], tx_hash: &str) -> Result<usize, GatewayError> {
        let mut rows = self.rows.write();
        let mut updated = 0;
        for hash in hashes {
            if let Some(row) = rows.get_mut(hash) {
                if row.tx_hash.as_deref().map_or(true, str::is_empty) {
                    row.tx_hash = Some(tx_hash.to_string());
                    updated += 1;
                }
            }
        }
        Ok(updated)
    }
}
