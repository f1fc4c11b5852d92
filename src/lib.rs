// Copyright 2025
// Licensed under the Elastic License v2.0

//! pisa-sync: periodic, checkpointed consolidation of per-country survey
//! databases into one analytical table.
//!
//! ```text
//! Scheduler --tick--> SyncEngine --per source--> Pipeline
//!                                                   |
//!     OffsetStore.get -> Extractor.extract -> normalize -> LoadSink.load -> OffsetStore.set
//! ```

#![warn(clippy::all)]

pub mod config;
pub mod connectors;
pub mod core;
pub mod engine;
pub mod pipeline;
pub mod state_store;
pub mod utils;

pub use crate::config::Config;
pub use crate::engine::{PassReport, SourceOutcome, SyncEngine};
