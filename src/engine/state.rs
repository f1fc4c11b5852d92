// Copyright 2025
// Licensed under the Elastic License v2.0

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{watch, RwLock};

use super::report::PassReport;

/// State shared between the scheduler, running passes and the shutdown handler.
pub struct SharedState {
    pass_running: AtomicBool,
    passes_completed: AtomicU64,
    passes_aborted: AtomicU64,
    missed_ticks: AtomicU64,
    rows_inserted: AtomicU64,
    last_report: RwLock<Option<PassReport>>,
    shutdown_tx: watch::Sender<bool>,
}

/// Marks a pass as running until dropped, on every exit path.
pub struct PassGuard {
    state: Arc<SharedState>,
}

impl Drop for PassGuard {
    fn drop(&mut self) {
        self.state.pass_running.store(false, Ordering::Release);
    }
}

impl SharedState {
    pub fn new() -> Arc<Self> {
        let (shutdown_tx, _) = watch::channel(false);
        Arc::new(Self {
            pass_running: AtomicBool::new(false),
            passes_completed: AtomicU64::new(0),
            passes_aborted: AtomicU64::new(0),
            missed_ticks: AtomicU64::new(0),
            rows_inserted: AtomicU64::new(0),
            last_report: RwLock::new(None),
            shutdown_tx,
        })
    }

    /// Claims the single pass slot; `None` while another pass holds it.
    pub fn try_begin_pass(self: &Arc<Self>) -> Option<PassGuard> {
        self.pass_running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| PassGuard {
                state: Arc::clone(self),
            })
    }

    pub fn is_pass_running(&self) -> bool {
        self.pass_running.load(Ordering::Acquire)
    }

    pub fn record_missed_tick(&self) -> u64 {
        self.missed_ticks.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn missed_ticks(&self) -> u64 {
        self.missed_ticks.load(Ordering::Relaxed)
    }

    pub fn passes_completed(&self) -> u64 {
        self.passes_completed.load(Ordering::Relaxed)
    }

    pub fn passes_aborted(&self) -> u64 {
        self.passes_aborted.load(Ordering::Relaxed)
    }

    pub fn rows_inserted(&self) -> u64 {
        self.rows_inserted.load(Ordering::Relaxed)
    }

    pub async fn record_report(&self, report: PassReport) {
        self.passes_completed.fetch_add(1, Ordering::Relaxed);
        self.rows_inserted
            .fetch_add(report.rows_inserted(), Ordering::Relaxed);
        *self.last_report.write().await = Some(report);
    }

    pub fn record_aborted(&self) {
        self.passes_aborted.fetch_add(1, Ordering::Relaxed);
    }

    pub async fn last_report(&self) -> Option<PassReport> {
        self.last_report.read().await.clone()
    }

    pub fn request_shutdown(&self) {
        self.shutdown_tx.send_replace(true);
    }

    pub fn shutdown_requested(&self) -> bool {
        *self.shutdown_tx.borrow()
    }

    pub fn subscribe_shutdown(&self) -> watch::Receiver<bool> {
        self.shutdown_tx.subscribe()
    }
}
