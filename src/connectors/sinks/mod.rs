// Copyright 2025
// Licensed under the Elastic License v2.0

//! # Sink Connectors
//!
//! Sink connector implementations that write normalized records to the
//! analytical database. Each sink implements the `LoadSink` trait from
//! `crate::core::traits`.
//!
//! ## Available Sinks
//!
//! - **PostgreSQL**: consolidated table with conflict-skipping inserts
//!
//! ## Usage
//!
//! ```rust,ignore
//! let pool = create_pool(&config.sink.url, config.sink.pool_size)?;
//! let sink = create_sink(&config, pool)?;
//! sink.ensure_schema().await?;
//! sink.load("alb", &records).await?;
//! ```

pub mod postgres;

use std::sync::Arc;

use anyhow::Result;
use deadpool_postgres::Pool;

use crate::config::Config;
use crate::core::LoadSink;
use self::postgres::PostgresLoadSink;

/// Creates the sink for the configured analytical database.
///
/// The pool is passed in so the offset store can share it.
pub fn create_sink(config: &Config, pool: Pool) -> Result<Arc<dyn LoadSink>> {
    let sink = PostgresLoadSink::new(pool, config.sink.table.clone(), config.io_timeout);
    Ok(Arc::new(sink))
}
