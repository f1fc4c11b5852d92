// Copyright 2025
// Licensed under the Elastic License v2.0

//! # PostgreSQL Load Sink
//!
//! Writes normalized survey records into the consolidated table of the
//! analytical database.
//!
//! ## Write semantics
//!
//! - One transaction per source batch: all new rows commit or none do
//! - `INSERT ... ON CONFLICT (id, cnt) DO NOTHING`: a key that already exists
//!   is skipped, never updated
//! - The returned count is rows newly inserted, so a replayed batch reports 0
//!
//! ```text
//! [CanonicalRecord] --> BEGIN --> INSERT .. ON CONFLICT DO NOTHING (xN) --> COMMIT
//!                                           |
//!                                     any error: ROLLBACK, LoadFailed
//! ```

mod setup;

use std::time::Duration;

use async_trait::async_trait;
use deadpool_postgres::Pool;
use tracing::{debug, info};

use crate::connectors::bounded;
use crate::core::checkpoint::offset_from_db;
use crate::core::{CanonicalRecord, LoadSink, SyncError, SyncResult};
use crate::utils::quote_ident;

pub use setup::{SinkSetup, EXPECTED_COLUMNS};

/// Consolidated-table sink on a pooled analytical database connection
pub struct PostgresLoadSink {
    pool: Pool,
    table: String,
    insert_sql: String,
    count_sql: String,
    io_timeout: Duration,
}

impl PostgresLoadSink {
    pub fn new(pool: Pool, table: impl Into<String>, io_timeout: Duration) -> Self {
        let table = table.into();
        info!("PostgresLoadSink initialized: table {}", table);
        Self {
            pool,
            insert_sql: build_insert_sql(&table),
            count_sql: build_count_sql(&table),
            table,
            io_timeout,
        }
    }

    pub fn table(&self) -> &str {
        &self.table
    }
}

/// Decimal measures are bound as `float8` and cast to `NUMERIC(15, 4)` on assignment.
pub fn build_insert_sql(table: &str) -> String {
    format!(
        "INSERT INTO {} (id, cnt, escs, tmins, belong, durecec, time_submitted)
         VALUES ($1, $2, $3::float8, $4, $5::float8, $6, $7)
         ON CONFLICT (id, cnt) DO NOTHING",
        quote_ident(table)
    )
}

pub fn build_count_sql(table: &str) -> String {
    format!("SELECT COUNT(*) FROM {} WHERE cnt = $1", quote_ident(table))
}

#[async_trait]
impl LoadSink for PostgresLoadSink {
    fn name(&self) -> &'static str {
        "postgres"
    }

    async fn ensure_schema(&self) -> SyncResult<()> {
        let client = bounded(self.io_timeout, self.pool.get())
            .await
            .map_err(|e| SyncError::schema(format!("connect: {}", e)))?;
        SinkSetup::new(&client, &self.table, self.io_timeout).run().await
    }

    async fn load(&self, source_id: &str, records: &[CanonicalRecord]) -> SyncResult<u64> {
        if records.is_empty() {
            return Ok(0);
        }
        let failed = |stage: &str, e: String| SyncError::load_failed(source_id, format!("{}: {}", stage, e));

        let mut client = bounded(self.io_timeout, self.pool.get())
            .await
            .map_err(|e| failed("connect", e))?;

        // Dropping the transaction without commit rolls the whole batch back
        let transaction = bounded(self.io_timeout, client.transaction())
            .await
            .map_err(|e| failed("begin", e))?;

        let statement = bounded(self.io_timeout, transaction.prepare_cached(&self.insert_sql))
            .await
            .map_err(|e| failed("prepare", e))?;

        let mut inserted = 0u64;
        for record in records {
            inserted += bounded(
                self.io_timeout,
                transaction.execute(
                    &statement,
                    &[
                        &record.id,
                        &record.country_code,
                        &record.escs,
                        &record.tmins,
                        &record.belong,
                        &record.durecec,
                        &record.ingested_at,
                    ],
                ),
            )
            .await
            .map_err(|e| failed(&format!("insert id={} cnt={}", record.id, record.country_code), e))?;
        }

        bounded(self.io_timeout, transaction.commit())
            .await
            .map_err(|e| failed("commit", e))?;

        debug!(
            "Loaded batch from {}: {} records, {} inserted, {} already present",
            source_id,
            records.len(),
            inserted,
            records.len() as u64 - inserted
        );
        Ok(inserted)
    }

    async fn count_rows(&self, country_code: &str) -> SyncResult<u64> {
        let failed = |e: String| SyncError::load_failed(country_code, format!("count: {}", e));

        let client = bounded(self.io_timeout, self.pool.get()).await.map_err(failed)?;
        let row = bounded(self.io_timeout, client.query_one(self.count_sql.as_str(), &[&country_code]))
            .await
            .map_err(failed)?;
        let count: i64 = row.get(0);
        offset_from_db(count).map_err(failed)
    }
}
