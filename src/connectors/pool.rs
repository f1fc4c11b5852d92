// Copyright 2025
// Licensed under the Elastic License v2.0

//! Connection pools.
//!
//! One pool per database. Connections are checked out for the duration of a
//! single extract or load and go back to the pool when the guard drops,
//! whichever way the call ends.

use anyhow::{Context, Result};
use deadpool_postgres::{Manager, ManagerConfig, Pool, RecyclingMethod};
use tokio_postgres::NoTls;

/// Build a lazily connecting pool for a PostgreSQL URL.
///
/// No connection is opened here; the first checkout connects.
pub fn create_pool(url: &str, max_size: usize) -> Result<Pool> {
    let pg_config: tokio_postgres::Config = url
        .parse()
        .context("failed to parse PostgreSQL connection URL")?;

    let manager = Manager::from_config(
        pg_config,
        NoTls,
        ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        },
    );

    Pool::builder(manager)
        .max_size(max_size)
        .build()
        .context("failed to build connection pool")
}
