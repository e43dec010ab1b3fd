//! # Backfill Report
//!
//! Outcome of a denom-trace backfill run, per voucher token name.

use serde::Serialize;
use std::collections::BTreeMap;
use uuid::Uuid;

/// What happened to one voucher token name.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub enum BackfillOutcome {
    /// New row written.
    Inserted {
        /// Canonical path.
        full_denom: String,
    },
    /// Row already present with the same path.
    AlreadyPresent,
    /// No candidate path.
    Unresolved,
    /// Several candidate paths.
    Ambiguous(Vec<String>),
    /// Persisted path disagrees with the derived one.
    Conflict {
        /// Path in the store.
        persisted: String,
        /// Path derived from chain.
        derived: String,
    },
    /// Split or store failure.
    Error(String),
}

/// Summary of one backfill run.
#[derive(Clone, Debug, Serialize)]
pub struct BackfillReport {
    /// Run identifier for log correlation.
    pub run_id: Uuid,
    /// Mint transactions scanned.
    pub transactions_scanned: usize,
    /// Tokens inserted or already present.
    pub resolved: usize,
    /// Tokens with no candidate.
    pub unresolved: usize,
    /// Tokens with several candidates.
    pub ambiguous: usize,
    /// Tokens whose stored path disagrees.
    pub conflicts: usize,
    /// Tokens that failed to split or save.
    pub errors: usize,
    /// Per-token outcome.
    pub outcomes: BTreeMap<String, BackfillOutcome>,
}

impl BackfillReport {
    pub(crate) fn new(transactions_scanned: usize) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            transactions_scanned,
            resolved: 0,
            unresolved: 0,
            ambiguous: 0,
            conflicts: 0,
            errors: 0,
            outcomes: BTreeMap::new(),
        }
    }

    pub(crate) fn record(&mut self, token: String, outcome: BackfillOutcome) {
        match &outcome {
            BackfillOutcome::Inserted { .. } | BackfillOutcome::AlreadyPresent => {
                self.resolved += 1
            }
            BackfillOutcome::Unresolved => self.unresolved += 1,
            BackfillOutcome::Ambiguous(_) => self.ambiguous += 1,
            BackfillOutcome::Conflict { .. } => self.conflicts += 1,
            BackfillOutcome::Error(_) => self.errors += 1,
        }
        self.outcomes.insert(token, outcome);
    }

    /// Tokens that did not resolve cleanly.
    pub fn failed(&self) -> usize {
        self.unresolved + self.ambiguous + self.conflicts + self.errors
    }

    /// Whether every token resolved.
    pub fn succeeded(&self) -> bool {
        self.failed() == 0
    }

    /// Process exit status: 0 on success, 1 otherwise.
    pub fn exit_code(&self) -> i32 {
        if self.succeeded() {
            0
        } else {
            1
        }
    }
}
