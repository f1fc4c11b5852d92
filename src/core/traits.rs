// Copyright 2025
// Licensed under the Elastic License v2.0

use async_trait::async_trait;

use crate::core::error::SyncResult;
use crate::core::record::{CanonicalRecord, RawRecord, SourceDescriptor};

/// Durable mapping from source id to its checkpoint offset.
#[async_trait]
pub trait OffsetStore: Send + Sync {
    /// Returns the name of the store implementation
    fn name(&self) -> &'static str;

    /// Stored offset for a source, `None` if the source was never checkpointed.
    async fn load(&self, source_id: &str) -> SyncResult<Option<u64>>;

    /// Persists a new offset. Must be visible to later `get` calls and survive restarts.
    async fn set(&self, source_id: &str, offset: u64) -> SyncResult<()>;

    /// Offset for a source, 0 on its first run.
    async fn get(&self, source_id: &str) -> SyncResult<u64> {
        Ok(self.load(source_id).await?.unwrap_or(0))
    }
}

/// Reads rows past a checkpoint from one source database.
#[async_trait]
pub trait Extractor: Send + Sync {
    /// Returns the name of the extractor implementation
    fn name(&self) -> &'static str;

    /// All rows at position `since_offset` and beyond, in natural insertion order.
    ///
    /// Never retries; failures surface as `SourceUnavailable`.
    async fn extract(
        &self,
        descriptor: &SourceDescriptor,
        since_offset: u64,
    ) -> SyncResult<Vec<RawRecord>>;
}

/// Writes normalized records into the consolidated table.
#[async_trait]
pub trait LoadSink: Send + Sync {
    /// Returns the name of the sink implementation
    fn name(&self) -> &'static str;

    /// Idempotently creates (or validates) the consolidated table.
    async fn ensure_schema(&self) -> SyncResult<()>;

    /// Writes one source batch atomically and returns the number of rows newly inserted.
    ///
    /// Keys that already exist are skipped, not updated.
    async fn load(&self, source_id: &str, records: &[CanonicalRecord]) -> SyncResult<u64>;

    /// Number of consolidated rows carrying the given country code.
    async fn count_rows(&self, country_code: &str) -> SyncResult<u64>;
}
