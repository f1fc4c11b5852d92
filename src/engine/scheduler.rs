// Copyright 2025
// Licensed under the Elastic License v2.0

//! Fixed-period pass scheduler.
//!
//! A tick that fires while a pass is still running is dropped and counted
//! as a missed tick. Ticks are never queued.

use std::time::Duration;

use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use super::SyncEngine;

pub struct Scheduler {
    engine: SyncEngine,
    interval: Duration,
}

impl Scheduler {
    pub fn new(engine: SyncEngine, interval: Duration) -> Self {
        Self { engine, interval }
    }

    /// Ticks until shutdown is requested, then waits for the running pass.
    pub async fn run(self) {
        let state = self.engine.shared_state();
        let mut shutdown = state.subscribe_shutdown();
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut passes = JoinSet::new();

        info!("Scheduler started: one pass every {:?}", self.interval);

        loop {
            if *shutdown.borrow() {
                info!("Shutdown requested, scheduler stopping");
                break;
            }

            tokio::select! {
                biased;

                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }

                Some(result) = passes.join_next(), if !passes.is_empty() => {
                    if let Err(e) = result {
                        error!("Pass task panicked: {}", e);
                    }
                }

                _ = ticker.tick() => {
                    match state.try_begin_pass() {
                        Some(guard) => {
                            let engine = self.engine.clone();
                            passes.spawn(async move {
                                // Errors are logged inside the pass
                                let _ = engine.execute_pass(guard).await;
                            });
                        }
                        None => {
                            let missed = state.record_missed_tick();
                            warn!("Previous pass still running, skipping tick ({} missed so far)", missed);
                        }
                    }
                }
            }
        }

        if !passes.is_empty() {
            info!("Waiting for the running pass to finish");
        }
        while let Some(result) = passes.join_next().await {
            if let Err(e) = result {
                error!("Pass task panicked: {}", e);
            }
        }
        debug!("Scheduler stopped");
    }
}
