// Copyright 2025
// Licensed under the Elastic License v2.0

//! Sync engine: one coordinated pass over every configured source.
//!
//! A pass ensures the consolidated schema, then runs each source's pipeline
//! on a bounded worker pool. Source failures are recorded in the report and
//! never reach other sources; only a schema failure aborts the pass.

mod report;
mod scheduler;
mod state;

pub use report::{PassReport, SourceOutcome};
pub use scheduler::Scheduler;
pub use state::{PassGuard, SharedState};

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::Utc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::connectors::pool::create_pool;
use crate::connectors::sinks::create_sink;
use crate::connectors::sources::create_extractor;
use crate::core::{Extractor, LoadSink, OffsetStore, SourceDescriptor, SyncResult};
use crate::pipeline::Pipeline;
use crate::state_store::PostgresOffsetStore;

const DEFAULT_MAX_CONCURRENT_SOURCES: usize = 4;
const DEFAULT_PASS_BUDGET: Duration = Duration::from_secs(25);

/// Owns the source list and the collaborators of a pass. Cheap to clone.
#[derive(Clone)]
pub struct SyncEngine {
    sources: Arc<[SourceDescriptor]>,
    pipeline: Pipeline,
    sink: Arc<dyn LoadSink>,
    max_concurrent_sources: usize,
    pass_budget: Duration,
    shared_state: Arc<SharedState>,
}

impl SyncEngine {
    pub fn new(
        sources: Vec<SourceDescriptor>,
        offsets: Arc<dyn OffsetStore>,
        extractor: Arc<dyn Extractor>,
        sink: Arc<dyn LoadSink>,
    ) -> Self {
        Self {
            sources: sources.into(),
            pipeline: Pipeline::new(offsets, extractor, Arc::clone(&sink)),
            sink,
            max_concurrent_sources: DEFAULT_MAX_CONCURRENT_SOURCES,
            pass_budget: DEFAULT_PASS_BUDGET,
            shared_state: SharedState::new(),
        }
    }

    pub fn with_max_concurrent_sources(mut self, workers: usize) -> Self {
        self.max_concurrent_sources = workers.max(1);
        self
    }

    pub fn with_pass_budget(mut self, budget: Duration) -> Self {
        self.pass_budget = budget;
        self
    }

    pub fn with_offset_seeding(mut self, enabled: bool) -> Self {
        self.pipeline = self.pipeline.with_offset_seeding(enabled);
        self
    }

    /// Wires the PostgreSQL collaborators.
    ///
    /// Pools connect lazily, so this succeeds while databases are still down.
    /// The offset store shares the sink's pool.
    pub fn from_config(config: &Config) -> Result<Self> {
        let sink_pool = create_pool(&config.sink.url, config.sink.pool_size)?;
        let offsets = Arc::new(PostgresOffsetStore::new(
            sink_pool.clone(),
            config.sink.offset_table.clone(),
            config.io_timeout,
        ));
        let sink = create_sink(config, sink_pool)?;
        let extractor = create_extractor(config)?;

        info!(
            "Engine ready: offsets={}, extractor={}, sink={}",
            offsets.name(),
            extractor.name(),
            sink.name()
        );

        Ok(Self::new(config.source.sources.clone(), offsets, extractor, sink)
            .with_max_concurrent_sources(config.max_concurrent_sources)
            .with_pass_budget(config.pass_budget)
            .with_offset_seeding(config.seed_offsets))
    }

    pub fn shared_state(&self) -> Arc<SharedState> {
        Arc::clone(&self.shared_state)
    }

    pub fn sources(&self) -> &[SourceDescriptor] {
        &self.sources
    }

    /// Runs one pass now.
    ///
    /// Returns `Ok(None)` without doing anything when a pass is already running.
    /// The only error is `SchemaError`.
    pub async fn run_once(&self) -> SyncResult<Option<PassReport>> {
        match self.shared_state.try_begin_pass() {
            Some(guard) => self.execute_pass(guard).await.map(Some),
            None => {
                warn!("A pass is already running, not starting another");
                Ok(None)
            }
        }
    }

    /// Runs passes every `interval` until shutdown is requested.
    pub async fn run_forever(&self, interval: Duration) {
        Scheduler::new(self.clone(), interval).run().await
    }

    /// Executes a pass while holding the pass slot.
    pub(crate) async fn execute_pass(&self, _guard: PassGuard) -> SyncResult<PassReport> {
        let started_at = Utc::now();
        let deadline = Instant::now() + self.pass_budget;
        info!("Pass starting: {} sources", self.sources.len());

        if let Err(e) = self.sink.ensure_schema().await {
            error!("Pass aborted: {}", e);
            self.shared_state.record_aborted();
            return Err(e);
        }

        let mut report = PassReport::new(started_at);
        let semaphore = Arc::new(Semaphore::new(self.max_concurrent_sources));
        let mut join_set = JoinSet::new();

        for descriptor in self.sources.iter().cloned() {
            let semaphore = Arc::clone(&semaphore);
            let pipeline = self.pipeline.clone();

            join_set.spawn(async move {
                let outcome = match semaphore.acquire_owned().await {
                    Ok(_permit) if Instant::now() >= deadline => {
                        warn!("[{}] skipped: pass budget exhausted", descriptor.source_id);
                        SourceOutcome::skipped("pass budget exhausted")
                    }
                    Ok(_permit) => pipeline.run(&descriptor).await,
                    Err(_) => SourceOutcome::skipped("worker pool closed"),
                };
                (descriptor.source_id, outcome)
            });
        }

        while let Some(result) = join_set.join_next().await {
            match result {
                Ok((source_id, outcome)) => report.record(source_id, outcome),
                Err(e) => error!("Source task panicked: {}", e),
            }
        }

        for descriptor in self.sources.iter() {
            if report.outcome(&descriptor.source_id).is_none() {
                report.record(
                    descriptor.source_id.clone(),
                    SourceOutcome::panicked("worker task panicked"),
                );
            }
        }

        let report = report.finish();
        report.log_summary();
        self.shared_state.record_report(report.clone()).await;
        Ok(report)
    }
}
