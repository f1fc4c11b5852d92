// Copyright 2025
// Licensed under the Elastic License v2.0

//! Per-pass report: one outcome per configured source.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};

use crate::core::SyncError;
use crate::pipeline::Stage;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SourceOutcome {
    /// The source completed every stage. `offset == previous_offset` when nothing was new.
    Synced {
        previous_offset: u64,
        offset: u64,
        extracted: u64,
        inserted: u64,
    },
    /// The source stopped at `stage`; its checkpoint is unchanged.
    Failed { stage: Stage, error: SyncError },
    /// The source's worker died before reporting. Counted as a failure.
    Panicked { reason: String },
    /// The source was not attempted this pass.
    Skipped { reason: String },
}

impl SourceOutcome {
    pub fn skipped(reason: impl Into<String>) -> Self {
        SourceOutcome::Skipped {
            reason: reason.into(),
        }
    }

    pub fn panicked(reason: impl Into<String>) -> Self {
        SourceOutcome::Panicked {
            reason: reason.into(),
        }
    }

    pub fn is_synced(&self) -> bool {
        matches!(self, SourceOutcome::Synced { .. })
    }

    pub fn is_failed(&self) -> bool {
        matches!(
            self,
            SourceOutcome::Failed { .. } | SourceOutcome::Panicked { .. }
        )
    }

    /// Checkpoint after the pass, when the source synced.
    pub fn offset(&self) -> Option<u64> {
        match self {
            SourceOutcome::Synced { offset, .. } => Some(*offset),
            _ => None,
        }
    }

    pub fn inserted(&self) -> u64 {
        match self {
            SourceOutcome::Synced { inserted, .. } => *inserted,
            _ => 0,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PassReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub outcomes: BTreeMap<String, SourceOutcome>,
}

impl PassReport {
    pub fn new(started_at: DateTime<Utc>) -> Self {
        Self {
            started_at,
            finished_at: started_at,
            outcomes: BTreeMap::new(),
        }
    }

    pub fn record(&mut self, source_id: impl Into<String>, outcome: SourceOutcome) {
        self.outcomes.insert(source_id.into(), outcome);
    }

    pub fn finish(mut self) -> Self {
        self.finished_at = Utc::now();
        self
    }

    pub fn outcome(&self, source_id: &str) -> Option<&SourceOutcome> {
        self.outcomes.get(source_id)
    }

    pub fn synced(&self) -> usize {
        self.outcomes.values().filter(|o| o.is_synced()).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.values().filter(|o| o.is_failed()).count()
    }

    pub fn skipped(&self) -> usize {
        self.outcomes.len() - self.synced() - self.failed()
    }

    pub fn rows_inserted(&self) -> u64 {
        self.outcomes.values().map(SourceOutcome::inserted).sum()
    }

    pub fn log_summary(&self) {
        let elapsed_ms = (self.finished_at - self.started_at).num_milliseconds();
        if self.failed() == 0 && self.skipped() == 0 {
            info!(
                "Pass finished in {}ms: {} sources synced, {} rows inserted",
                elapsed_ms,
                self.synced(),
                self.rows_inserted()
            );
        } else {
            warn!(
                "Pass finished in {}ms: {} synced, {} failed, {} skipped, {} rows inserted",
                elapsed_ms,
                self.synced(),
                self.failed(),
                self.skipped(),
                self.rows_inserted()
            );
        }
    }
}
