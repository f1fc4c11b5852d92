// Copyright 2025
// Licensed under the Elastic License v2.0

//! Persistent per-source checkpoints in the analytical database.
//!
//! Offsets live in `pisa_sync_offsets` (name configurable) next to the
//! consolidated table, so a restart resumes every source where it stopped.
//! The table is created on first use.
//!
//! Writes never move an offset backwards: the upsert keeps the greater of
//! the stored and the new value.

use std::time::Duration;

use async_trait::async_trait;
use deadpool_postgres::{Object, Pool};
use tokio::sync::OnceCell;
use tracing::{debug, info};

use crate::connectors::bounded;
use crate::core::checkpoint::{offset_from_db, offset_to_db};
use crate::core::{OffsetStore, SyncError, SyncResult};
use crate::utils::quote_ident;

pub struct PostgresOffsetStore {
    pool: Pool,
    table: String,
    io_timeout: Duration,
    initialized: OnceCell<()>,
}

impl PostgresOffsetStore {
    pub fn new(pool: Pool, table: impl Into<String>, io_timeout: Duration) -> Self {
        Self {
            pool,
            table: table.into(),
            io_timeout,
            initialized: OnceCell::new(),
        }
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// Checks out a connection, creating the offsets table on the first call.
    async fn client(&self, source_id: &str) -> SyncResult<Object> {
        let unavailable = |e: String| SyncError::store_unavailable(source_id, e);

        let client = bounded(self.io_timeout, self.pool.get())
            .await
            .map_err(|e| unavailable(format!("connect: {}", e)))?;

        let conn = &client;
        self.initialized
            .get_or_try_init(|| async move {
                bounded(
                    self.io_timeout,
                    conn.batch_execute(&create_offsets_table_sql(&self.table)),
                )
                .await
                .map_err(|e| unavailable(format!("create {}: {}", self.table, e)))?;
                info!("Offset table {} ready", self.table);
                Ok::<(), SyncError>(())
            })
            .await?;

        Ok(client)
    }
}

pub fn create_offsets_table_sql(table: &str) -> String {
    format!(
        "CREATE TABLE IF NOT EXISTS {} (
            source_id   TEXT        PRIMARY KEY,
            row_offset  BIGINT      NOT NULL CHECK (row_offset >= 0),
            updated_at  TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )",
        quote_ident(table)
    )
}

pub fn load_offset_sql(table: &str) -> String {
    format!(
        "SELECT row_offset FROM {} WHERE source_id = $1",
        quote_ident(table)
    )
}

/// Upsert that keeps the stored offset when it is already ahead.
pub fn set_offset_sql(table: &str) -> String {
    let table = quote_ident(table);
    format!(
        "INSERT INTO {table} (source_id, row_offset, updated_at)
         VALUES ($1, $2, NOW())
         ON CONFLICT (source_id) DO UPDATE
         SET row_offset = GREATEST({table}.row_offset, EXCLUDED.row_offset),
             updated_at = NOW()",
        table = table
    )
}

#[async_trait]
impl OffsetStore for PostgresOffsetStore {
    fn name(&self) -> &'static str {
        "postgres"
    }

    async fn load(&self, source_id: &str) -> SyncResult<Option<u64>> {
        let unavailable = |e: String| SyncError::store_unavailable(source_id, e);

        let client = self.client(source_id).await?;
        let row = bounded(
            self.io_timeout,
            client.query_opt(load_offset_sql(&self.table).as_str(), &[&source_id]),
        )
        .await
        .map_err(|e| unavailable(format!("read: {}", e)))?;

        match row {
            Some(row) => {
                let value: i64 = row.get(0);
                let offset = offset_from_db(value).map_err(unavailable)?;
                Ok(Some(offset))
            }
            None => Ok(None),
        }
    }

    async fn set(&self, source_id: &str, offset: u64) -> SyncResult<()> {
        let unavailable = |e: String| SyncError::store_unavailable(source_id, e);

        let value = offset_to_db(offset).map_err(unavailable)?;
        let client = self.client(source_id).await?;
        bounded(
            self.io_timeout,
            client.execute(set_offset_sql(&self.table).as_str(), &[&source_id, &value]),
        )
        .await
        .map_err(|e| unavailable(format!("write: {}", e)))?;

        debug!("Checkpoint for {} set to {}", source_id, offset);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connectors::pool::create_pool;

    #[test]
    fn test_create_table_sql() {
        let sql = create_offsets_table_sql("pisa_sync_offsets");
        assert!(sql.starts_with("CREATE TABLE IF NOT EXISTS \"pisa_sync_offsets\""));
        assert!(sql.contains("source_id   TEXT        PRIMARY KEY"));
        assert!(sql.contains("CHECK (row_offset >= 0)"));
    }

    #[test]
    fn test_set_sql_never_moves_backwards() {
        let sql = set_offset_sql("analytics.offsets");
        assert!(sql.starts_with("INSERT INTO \"analytics\".\"offsets\""));
        assert!(sql.contains("ON CONFLICT (source_id) DO UPDATE"));
        assert!(sql.contains("GREATEST(\"analytics\".\"offsets\".row_offset, EXCLUDED.row_offset)"));
    }

    #[test]
    fn test_load_sql() {
        assert_eq!(
            load_offset_sql("pisa_sync_offsets"),
            "SELECT row_offset FROM \"pisa_sync_offsets\" WHERE source_id = $1"
        );
    }

    #[tokio::test]
    async fn test_unreachable_store_is_store_unavailable() {
        let pool = create_pool("postgres://etl@127.0.0.1:1/analytical_db", 1).unwrap();
        let store = PostgresOffsetStore::new(pool, "pisa_sync_offsets", Duration::from_secs(2));

        let err = store.get("alb").await.unwrap_err();
        assert!(
            matches!(err, SyncError::StoreUnavailable { ref source_id, .. } if source_id == "alb"),
            "got {:?}",
            err
        );
    }

    #[tokio::test]
    #[ignore = "needs TEST_DATABASE_URL"]
    async fn test_live_offsets_only_move_forward_and_survive_restart() {
        let Some(pool) = crate::connectors::pool::testing::live_pool() else { return };
        crate::connectors::pool::testing::execute(&pool, "DROP TABLE IF EXISTS pisa_sync_offsets_it").await;

        let store = PostgresOffsetStore::new(pool.clone(), "pisa_sync_offsets_it", Duration::from_secs(10));
        assert_eq!(store.load("alb").await.unwrap(), None);
        assert_eq!(store.get("alb").await.unwrap(), 0);

        store.set("alb", 3).await.unwrap();
        store.set("alb", 1).await.unwrap();
        assert_eq!(store.get("alb").await.unwrap(), 3);

        store.set("alb", 5).await.unwrap();
        store.set("arg", 2).await.unwrap();

        // A new store instance reads what the previous one wrote
        let restarted = PostgresOffsetStore::new(pool, "pisa_sync_offsets_it", Duration::from_secs(10));
        assert_eq!(restarted.load("alb").await.unwrap(), Some(5));
        assert_eq!(restarted.load("arg").await.unwrap(), Some(2));
        assert_eq!(restarted.load("aus").await.unwrap(), None);
    }
}
