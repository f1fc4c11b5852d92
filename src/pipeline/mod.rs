// Copyright 2025
// Licensed under the Elastic License v2.0

//! Per-source sync pipeline.
//!
//! One run moves a single source through
//!
//! ```text
//! Idle -> ReadingCheckpoint -> Extracting -> Normalizing -> Loading -> Advancing -> Idle
//!              |                   |                          |           |
//!              +-------------------+----------> Failed <------+-----------+
//! ```
//!
//! Data is handed from stage to stage in memory. The checkpoint is written
//! only after the load committed, and only when rows were extracted.

pub mod normalize;

use std::fmt;
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, error, info};

use crate::core::{
    Checkpoint, Extractor, LoadSink, OffsetStore, SourceDescriptor, SyncError, SyncResult,
};
use crate::engine::SourceOutcome;
use self::normalize::normalize_at;

/// Position of a source within one pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Idle,
    ReadingCheckpoint,
    Extracting,
    Normalizing,
    Loading,
    Advancing,
    Failed,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Idle => "idle",
            Stage::ReadingCheckpoint => "reading_checkpoint",
            Stage::Extracting => "extracting",
            Stage::Normalizing => "normalizing",
            Stage::Loading => "loading",
            Stage::Advancing => "advancing",
            Stage::Failed => "failed",
        };
        f.write_str(name)
    }
}

#[derive(Clone)]
pub struct Pipeline {
    offsets: Arc<dyn OffsetStore>,
    extractor: Arc<dyn Extractor>,
    sink: Arc<dyn LoadSink>,
    seed_offsets: bool,
}

impl Pipeline {
    pub fn new(
        offsets: Arc<dyn OffsetStore>,
        extractor: Arc<dyn Extractor>,
        sink: Arc<dyn LoadSink>,
    ) -> Self {
        Self {
            offsets,
            extractor,
            sink,
            seed_offsets: false,
        }
    }

    /// Seed missing checkpoints from the rows already consolidated for the source.
    pub fn with_offset_seeding(mut self, enabled: bool) -> Self {
        self.seed_offsets = enabled;
        self
    }

    /// Runs one source through every stage. Never panics on I/O failure;
    /// errors come back as `SourceOutcome::Failed`.
    pub async fn run(&self, descriptor: &SourceDescriptor) -> SourceOutcome {
        let source_id = descriptor.source_id.as_str();

        enter(source_id, Stage::ReadingCheckpoint);
        let previous = match self.read_checkpoint(descriptor).await {
            Ok(offset) => Checkpoint::new(source_id, offset),
            Err(e) => return fail(source_id, Stage::ReadingCheckpoint, e),
        };

        enter(source_id, Stage::Extracting);
        let raw = match self.extractor.extract(descriptor, previous.offset).await {
            Ok(raw) => raw,
            Err(e) => return fail(source_id, Stage::Extracting, e),
        };

        let extracted = raw.len() as u64;
        if extracted == 0 {
            debug!("[{}] no new rows past {}", source_id, previous);
            enter(source_id, Stage::Idle);
            return SourceOutcome::Synced {
                previous_offset: previous.offset,
                offset: previous.offset,
                extracted: 0,
                inserted: 0,
            };
        }

        enter(source_id, Stage::Normalizing);
        let ingested_at = Utc::now().naive_utc();
        let records: Vec<_> = raw
            .into_iter()
            .map(|row| normalize_at(row, ingested_at))
            .collect();

        enter(source_id, Stage::Loading);
        let inserted = match self.sink.load(source_id, &records).await {
            Ok(inserted) => inserted,
            Err(e) => return fail(source_id, Stage::Loading, e),
        };

        enter(source_id, Stage::Advancing);
        let next = previous.advanced_by(extracted);
        if let Err(e) = self.offsets.set(source_id, next.offset).await {
            // Rows are committed; the next pass re-extracts them and the load skips them.
            return fail(source_id, Stage::Advancing, e);
        }

        enter(source_id, Stage::Idle);
        info!(
            "[{}] synced {} rows ({} new), checkpoint {} -> {}",
            source_id, extracted, inserted, previous.offset, next.offset
        );
        SourceOutcome::Synced {
            previous_offset: previous.offset,
            offset: next.offset,
            extracted,
            inserted,
        }
    }

    async fn read_checkpoint(&self, descriptor: &SourceDescriptor) -> SyncResult<u64> {
        let source_id = descriptor.source_id.as_str();
        match self.offsets.load(source_id).await? {
            Some(offset) => Ok(offset),
            None if self.seed_offsets => self.seed_checkpoint(descriptor).await,
            None => Ok(0),
        }
    }

    async fn seed_checkpoint(&self, descriptor: &SourceDescriptor) -> SyncResult<u64> {
        let source_id = descriptor.source_id.as_str();
        let country_code = descriptor.country_code();

        let count = self.sink.count_rows(&country_code).await.map_err(|e| {
            SyncError::store_unavailable(source_id, format!("seeding from consolidated rows: {}", e))
        })?;

        if count > 0 {
            self.offsets.set(source_id, count).await?;
            info!(
                "[{}] seeded checkpoint at {} from existing {} rows",
                source_id, count, country_code
            );
        }
        Ok(count)
    }
}

fn enter(source_id: &str, stage: Stage) {
    debug!("[{}] -> {}", source_id, stage);
}

fn fail(source_id: &str, stage: Stage, error: SyncError) -> SourceOutcome {
    error!("[{}] failed while {}: {}", source_id, stage, error);
    debug!("[{}] -> {}", source_id, Stage::Failed);
    SourceOutcome::Failed { stage, error }
}

#[cfg(test)]
pub(crate) mod testing {
    //! In-memory stand-ins for the three collaborators.

    use std::collections::{BTreeMap, HashMap, HashSet};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    use async_trait::async_trait;

    use crate::core::{
        CanonicalRecord, Extractor, LoadSink, OffsetStore, RawRecord, SourceDescriptor, SyncError,
        SyncResult,
    };

    #[derive(Default)]
    pub struct MemoryOffsets {
        pub offsets: Mutex<HashMap<String, u64>>,
        pub fail_reads: Mutex<HashSet<String>>,
        pub fail_writes: Mutex<HashSet<String>>,
        pub writes: AtomicUsize,
    }

    impl MemoryOffsets {
        pub fn offset(&self, source_id: &str) -> Option<u64> {
            self.offsets.lock().unwrap().get(source_id).copied()
        }
    }

    #[async_trait]
    impl OffsetStore for MemoryOffsets {
        fn name(&self) -> &'static str {
            "memory"
        }

        async fn load(&self, source_id: &str) -> SyncResult<Option<u64>> {
            if self.fail_reads.lock().unwrap().contains(source_id) {
                return Err(SyncError::store_unavailable(source_id, "connection refused"));
            }
            Ok(self.offset(source_id))
        }

        async fn set(&self, source_id: &str, offset: u64) -> SyncResult<()> {
            if self.fail_writes.lock().unwrap().contains(source_id) {
                return Err(SyncError::store_unavailable(source_id, "connection reset"));
            }
            self.writes.fetch_add(1, Ordering::SeqCst);
            let mut offsets = self.offsets.lock().unwrap();
            let entry = offsets.entry(source_id.to_string()).or_insert(0);
            *entry = (*entry).max(offset);
            Ok(())
        }
    }

    /// Append-only source tables keyed by source id.
    #[derive(Default)]
    pub struct MemorySources {
        pub rows: Mutex<HashMap<String, Vec<RawRecord>>>,
        pub unavailable: Mutex<HashSet<String>>,
        pub panic_on: Mutex<HashSet<String>>,
        pub delay: Mutex<Option<Duration>>,
        pub calls: AtomicUsize,
    }

    impl MemorySources {
        pub fn append(&self, source_id: &str, ids: std::ops::Range<i32>) {
            let mut rows = self.rows.lock().unwrap();
            let table = rows.entry(source_id.to_string()).or_default();
            for id in ids {
                table.push(raw(source_id, id));
            }
        }
    }

    pub fn raw(source_id: &str, id: i32) -> RawRecord {
        RawRecord {
            id,
            country_code: source_id.to_uppercase(),
            escs: Some("0.5".to_string()),
            tmins: Some("NA".to_string()),
            belong: None,
            durecec: Some("3".to_string()),
        }
    }

    #[async_trait]
    impl Extractor for MemorySources {
        fn name(&self) -> &'static str {
            "memory"
        }

        async fn extract(
            &self,
            descriptor: &SourceDescriptor,
            since_offset: u64,
        ) -> SyncResult<Vec<RawRecord>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let delay = *self.delay.lock().unwrap();
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            let source_id = descriptor.source_id.as_str();
            if self.panic_on.lock().unwrap().contains(source_id) {
                panic!("extractor bug for {}", source_id);
            }
            if self.unavailable.lock().unwrap().contains(source_id) {
                return Err(SyncError::source_unavailable(source_id, "connection refused"));
            }
            let rows = self.rows.lock().unwrap();
            Ok(rows
                .get(source_id)
                .map(|table| table.iter().skip(since_offset as usize).cloned().collect())
                .unwrap_or_default())
        }
    }

    /// Consolidated table with primary key (id, cnt).
    #[derive(Default)]
    pub struct MemorySink {
        pub rows: Mutex<BTreeMap<(i32, String), CanonicalRecord>>,
        pub schema_error: Mutex<Option<String>>,
        pub fail_loads: Mutex<HashSet<String>>,
        pub load_calls: AtomicUsize,
        pub schema_calls: AtomicUsize,
    }

    impl MemorySink {
        pub fn count(&self, country_code: &str) -> usize {
            self.rows
                .lock()
                .unwrap()
                .keys()
                .filter(|(_, cnt)| cnt == country_code)
                .count()
        }
    }

    #[async_trait]
    impl LoadSink for MemorySink {
        fn name(&self) -> &'static str {
            "memory"
        }

        async fn ensure_schema(&self) -> SyncResult<()> {
            self.schema_calls.fetch_add(1, Ordering::SeqCst);
            match self.schema_error.lock().unwrap().clone() {
                Some(error) => Err(SyncError::schema(error)),
                None => Ok(()),
            }
        }

        async fn load(&self, source_id: &str, records: &[CanonicalRecord]) -> SyncResult<u64> {
            self.load_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_loads.lock().unwrap().contains(source_id) {
                return Err(SyncError::load_failed(source_id, "deadlock detected"));
            }
            let mut rows = self.rows.lock().unwrap();
            let mut inserted = 0;
            for record in records {
                let key = (record.id, record.country_code.clone());
                if !rows.contains_key(&key) {
                    rows.insert(key, record.clone());
                    inserted += 1;
                }
            }
            Ok(inserted)
        }

        async fn count_rows(&self, country_code: &str) -> SyncResult<u64> {
            Ok(self.count(country_code) as u64)
        }
    }
}
