// Copyright 2025
// Licensed under the Elastic License v2.0

//! PostgreSQL source extractor
//!
//! Reads survey rows from each per-country database with a count-based
//! cursor:
//!
//! ```text
//! SELECT id, cnt, escs, tmins, belong, durecec
//! FROM responses ORDER BY id OFFSET <checkpoint>
//! ```
//!
//! Measure columns are cast to `::text` so the normalizer sees sentinel
//! strings (`NA`) exactly as the source stores them.

mod config;

use std::collections::HashMap;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use deadpool_postgres::Pool;
use tokio_postgres::types::ToSql;
use tokio_postgres::Row;
use tracing::{debug, info};

use crate::connectors::bounded;
use crate::connectors::pool::create_pool;
use crate::core::checkpoint::offset_to_db;
use crate::core::{Extractor, RawRecord, SourceDescriptor, SyncError, SyncResult};
use crate::utils::quote_ident;

pub use config::{validate_postgres_url, ExtractSettings};

/// Extractor over a set of PostgreSQL sources, one connection pool per source
pub struct PostgresExtractor {
    pools: HashMap<String, Pool>,
    select_sql: String,
    max_rows: Option<u64>,
    io_timeout: Duration,
}

impl PostgresExtractor {
    /// Build pools for every source. No connection is opened yet.
    pub fn new(
        sources: &[SourceDescriptor],
        settings: ExtractSettings,
        pool_size: usize,
        io_timeout: Duration,
    ) -> Result<Self> {
        let mut pools = HashMap::with_capacity(sources.len());
        for source in sources {
            let pool = create_pool(&source.connection_url, pool_size)
                .with_context(|| format!("source '{}'", source.source_id))?;
            pools.insert(source.source_id.clone(), pool);
        }

        info!(
            "PostgresExtractor initialized: {} sources, table {}",
            pools.len(),
            settings.table
        );

        Ok(Self {
            pools,
            select_sql: build_select_sql(&settings),
            max_rows: settings.max_rows,
            io_timeout,
        })
    }

    fn unavailable(source_id: &str, error: impl Into<String>) -> SyncError {
        SyncError::source_unavailable(source_id, error)
    }
}

/// Build the delta query.
///
/// `$1` is the fallback country code, `$2` the offset and `$3` the optional limit.
pub fn build_select_sql(settings: &ExtractSettings) -> String {
    let mut sql = format!(
        "SELECT id::int4, \
         COALESCE(NULLIF(TRIM(cnt::text), ''), $1::text), \
         escs::text, tmins::text, belong::text, durecec::text \
         FROM {table} ORDER BY {order} OFFSET $2::bigint",
        table = quote_ident(&settings.table),
        order = quote_ident(&settings.order_by),
    );
    if settings.max_rows.is_some() {
        sql.push_str(" LIMIT $3::bigint");
    }
    sql
}

fn raw_from_row(row: &Row) -> Result<RawRecord, tokio_postgres::Error> {
    Ok(RawRecord {
        id: row.try_get(0)?,
        country_code: row.try_get(1)?,
        escs: row.try_get(2)?,
        tmins: row.try_get(3)?,
        belong: row.try_get(4)?,
        durecec: row.try_get(5)?,
    })
}

#[async_trait]
impl Extractor for PostgresExtractor {
    fn name(&self) -> &'static str {
        "postgres"
    }

    async fn extract(
        &self,
        descriptor: &SourceDescriptor,
        since_offset: u64,
    ) -> SyncResult<Vec<RawRecord>> {
        let source_id = descriptor.source_id.as_str();
        let pool = self
            .pools
            .get(source_id)
            .ok_or_else(|| Self::unavailable(source_id, "no connection pool configured"))?;

        let offset = offset_to_db(since_offset).map_err(|e| Self::unavailable(source_id, e))?;
        let limit = self
            .max_rows
            .map(offset_to_db)
            .transpose()
            .map_err(|e| Self::unavailable(source_id, e))?;
        let country_code = descriptor.country_code();

        // Checked out for this extract only; returned to the pool on drop
        let client = bounded(self.io_timeout, pool.get())
            .await
            .map_err(|e| Self::unavailable(source_id, format!("connect: {}", e)))?;

        let statement = bounded(self.io_timeout, client.prepare_cached(&self.select_sql))
            .await
            .map_err(|e| Self::unavailable(source_id, format!("prepare: {}", e)))?;

        let mut params: Vec<&(dyn ToSql + Sync)> = vec![&country_code, &offset];
        if let Some(limit) = limit.as_ref() {
            params.push(limit);
        }

        let rows = bounded(self.io_timeout, client.query(&statement, &params))
            .await
            .map_err(|e| Self::unavailable(source_id, format!("query: {}", e)))?;

        let records = rows
            .iter()
            .map(raw_from_row)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| Self::unavailable(source_id, format!("decode: {}", e)))?;

        debug!(
            "Extracted {} rows from {} past offset {}",
            records.len(),
            source_id,
            since_offset
        );
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_select_sql_uses_offset_cursor() {
        let sql = build_select_sql(&ExtractSettings::new("responses", "id"));
        assert!(sql.contains("FROM \"responses\""));
        assert!(sql.contains("ORDER BY \"id\" OFFSET $2::bigint"));
        assert!(sql.contains("escs::text"));
        assert!(!sql.contains("LIMIT"));
    }

    #[test]
    fn test_select_sql_with_limit() {
        let settings = ExtractSettings::new("survey.responses", "submitted_at").with_max_rows(Some(100));
        let sql = build_select_sql(&settings);
        assert!(sql.contains("FROM \"survey\".\"responses\""));
        assert!(sql.contains("ORDER BY \"submitted_at\""));
        assert!(sql.ends_with("LIMIT $3::bigint"));
    }

    #[tokio::test]
    async fn test_unknown_source_is_unavailable() {
        let extractor = PostgresExtractor::new(
            &[SourceDescriptor::new("alb", "postgres://etl@unreachable.invalid/seta_alb")],
            ExtractSettings::new("responses", "id"),
            1,
            Duration::from_secs(1),
        )
        .unwrap();

        let missing = SourceDescriptor::new("zzz", "postgres://etl@unreachable.invalid/seta_zzz");
        let err = extractor.extract(&missing, 0).await.unwrap_err();
        assert!(matches!(err, SyncError::SourceUnavailable { ref source_id, .. } if source_id == "zzz"));
    }

    #[tokio::test]
    #[ignore = "needs TEST_DATABASE_URL"]
    async fn test_live_extract_past_offset() {
        use crate::connectors::pool::testing;

        let Some(pool) = testing::live_pool() else { return };
        let Some(url) = testing::database_url() else { return };
        testing::execute(
            &pool,
            "DROP TABLE IF EXISTS responses_it;
             CREATE TABLE responses_it (
                 id INT, cnt TEXT, escs TEXT, tmins TEXT, belong TEXT, durecec TEXT
             );
             INSERT INTO responses_it VALUES
                 (2, '',    'NA',   '270',  NULL,   '3'),
                 (1, 'ALB', '0.5',  'NA',   '0.25', '4'),
                 (3, NULL,  '-1.2', '12.0', NULL,   NULL)",
        )
        .await;

        let alb = SourceDescriptor::new("alb", url);
        let extractor = PostgresExtractor::new(
            &[alb.clone()],
            ExtractSettings::new("responses_it", "id"),
            1,
            Duration::from_secs(10),
        )
        .unwrap();

        let rows = extractor.extract(&alb, 0).await.unwrap();
        assert_eq!(rows.iter().map(|r| r.id).collect::<Vec<_>>(), vec![1, 2, 3]);
        assert_eq!(rows[0].escs.as_deref(), Some("0.5"));
        assert_eq!(rows[0].tmins.as_deref(), Some("NA"));
        assert_eq!(rows[0].belong.as_deref(), Some("0.25"));
        assert_eq!(rows[1].country_code, "ALB");

        let rows = extractor.extract(&alb, 2).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].id, 3);
        assert_eq!(rows[0].country_code, "ALB");
        assert_eq!(rows[0].durecec, None);

        assert!(extractor.extract(&alb, 3).await.unwrap().is_empty());

        let capped = PostgresExtractor::new(
            &[alb.clone()],
            ExtractSettings::new("responses_it", "id").with_max_rows(Some(1)),
            1,
            Duration::from_secs(10),
        )
        .unwrap();
        let rows = capped.extract(&alb, 1).await.unwrap();
        assert_eq!(rows.iter().map(|r| r.id).collect::<Vec<_>>(), vec![2]);
    }
}
