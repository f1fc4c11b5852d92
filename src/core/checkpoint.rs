// Copyright 2025
// Licensed under the Elastic License v2.0

use serde::Serialize;
use std::fmt;

/// Per-source progress marker: how many source rows have already been extracted.
///
/// The offset is a row count, not a row id. It is only meaningful while the
/// source table stays append-only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Checkpoint {
    pub source_id: String,
    pub offset: u64,
}

impl Checkpoint {
    pub fn new(source_id: impl Into<String>, offset: u64) -> Self {
        Self {
            source_id: source_id.into(),
            offset,
        }
    }

    /// Checkpoint after `extracted` more rows were durably loaded.
    ///
    /// Advances by rows extracted, not rows inserted: conflict-skipped rows
    /// still consumed a position in the source.
    pub fn advanced_by(&self, extracted: u64) -> Self {
        Self {
            source_id: self.source_id.clone(),
            offset: self.offset.saturating_add(extracted),
        }
    }

    /// Returns true if this checkpoint is ahead of the other one
    pub fn is_ahead_of(&self, other: &Checkpoint) -> bool {
        self.offset > other.offset
    }
}

impl fmt::Display for Checkpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.source_id, self.offset)
    }
}

/// Offsets are `BIGINT` in every database this crate talks to.
pub fn offset_to_db(offset: u64) -> Result<i64, String> {
    i64::try_from(offset).map_err(|_| format!("offset {} does not fit in BIGINT", offset))
}

pub fn offset_from_db(value: i64) -> Result<u64, String> {
    u64::try_from(value).map_err(|_| format!("negative offset {} in store", value))
}
