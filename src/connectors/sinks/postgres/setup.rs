// Copyright 2025
// Licensed under the Elastic License v2.0

//! Consolidated table setup
//!
//! - Creates the table if it does not exist
//! - Verifies column names and types against the downstream contract
//! - Verifies the `(id, cnt)` primary key that conflict handling relies on
//!
//! Safe to run on every pass: nothing here alters an existing table.

use std::collections::HashMap;
use std::time::Duration;

use tokio_postgres::Client;
use tracing::debug;

use crate::connectors::bounded;
use crate::core::{SyncError, SyncResult};
use crate::utils::{quote_ident, split_qualified};

/// Column layout of the consolidated table, as reported by `information_schema`.
pub const EXPECTED_COLUMNS: &[(&str, &str)] = &[
    ("id", "integer"),
    ("cnt", "text"),
    ("escs", "numeric"),
    ("tmins", "integer"),
    ("belong", "numeric"),
    ("durecec", "integer"),
    ("time_submitted", "timestamp without time zone"),
];

/// Live column layout. `$1` is the schema, NULL for an unqualified table,
/// which resolves like `CREATE TABLE` did: through the `search_path`.
pub const COLUMNS_SQL: &str = "SELECT column_name::text, data_type::text
     FROM information_schema.columns
     WHERE table_schema = COALESCE($1::text, current_schema()) AND table_name = $2::text";

/// Primary key columns, sorted by name.
pub const PRIMARY_KEY: &[&str] = &["cnt", "id"];

pub fn create_table_sql(table: &str) -> String {
    format!(
        "CREATE TABLE IF NOT EXISTS {} (
            id             INT,
            cnt            TEXT,
            escs           NUMERIC(15, 4),
            tmins          INT,
            belong         NUMERIC(15, 4),
            durecec        INT,
            time_submitted TIMESTAMP,
            PRIMARY KEY (id, cnt)
        )",
        quote_ident(table)
    )
}

/// Compare the live column layout with [`EXPECTED_COLUMNS`].
///
/// Extra columns are tolerated; missing or retyped ones are not.
pub fn check_columns(found: &HashMap<String, String>) -> Result<(), String> {
    let mut problems = Vec::new();
    for (name, expected) in EXPECTED_COLUMNS {
        match found.get(*name) {
            None => problems.push(format!("missing column {}", name)),
            Some(actual) if actual != expected => problems.push(format!(
                "column {} is {}, expected {}",
                name, actual, expected
            )),
            Some(_) => {}
        }
    }
    if problems.is_empty() {
        Ok(())
    } else {
        Err(problems.join("; "))
    }
}

pub fn check_primary_key(found: &[String]) -> Result<(), String> {
    let mut sorted: Vec<&str> = found.iter().map(String::as_str).collect();
    sorted.sort_unstable();
    if sorted == PRIMARY_KEY {
        Ok(())
    } else {
        Err(format!(
            "primary key is ({}), expected (id, cnt)",
            sorted.join(", ")
        ))
    }
}

/// Schema setup for the consolidated table
pub struct SinkSetup<'a> {
    client: &'a Client,
    table: &'a str,
    io_timeout: Duration,
}

impl<'a> SinkSetup<'a> {
    pub fn new(client: &'a Client, table: &'a str, io_timeout: Duration) -> Self {
        Self {
            client,
            table,
            io_timeout,
        }
    }

    /// Execute complete setup
    pub async fn run(&self) -> SyncResult<()> {
        self.ensure_table().await?;
        self.verify_columns().await?;
        self.verify_primary_key().await?;
        debug!("[OK] Consolidated table {} verified", self.table);
        Ok(())
    }

    async fn ensure_table(&self) -> SyncResult<()> {
        bounded(
            self.io_timeout,
            self.client.batch_execute(&create_table_sql(self.table)),
        )
        .await
        .map_err(|e| SyncError::schema(format!("failed to create {}: {}", self.table, e)))
    }

    async fn verify_columns(&self) -> SyncResult<()> {
        let (schema, table) = split_qualified(self.table);
        let rows = bounded(
            self.io_timeout,
            self.client.query(COLUMNS_SQL, &[&schema, &table]),
        )
        .await
        .map_err(|e| SyncError::schema(format!("failed to inspect {}: {}", self.table, e)))?;

        let found: HashMap<String, String> = rows
            .iter()
            .map(|r| (r.get::<_, String>(0), r.get::<_, String>(1)))
            .collect();

        check_columns(&found)
            .map_err(|e| SyncError::schema(format!("table {} has an unexpected layout: {}", self.table, e)))
    }

    async fn verify_primary_key(&self) -> SyncResult<()> {
        let rows = bounded(
            self.io_timeout,
            self.client.query(
                "SELECT a.attname::text
                 FROM pg_index i
                 JOIN pg_attribute a ON a.attrelid = i.indrelid AND a.attnum = ANY(i.indkey)
                 WHERE i.indrelid = $1::text::regclass AND i.indisprimary",
                &[&quote_ident(self.table)],
            ),
        )
        .await
        .map_err(|e| SyncError::schema(format!("failed to inspect key of {}: {}", self.table, e)))?;

        let found: Vec<String> = rows.iter().map(|r| r.get(0)).collect();
        check_primary_key(&found).map_err(|e| SyncError::schema(format!("table {}: {}", self.table, e)))?;

        debug!("  [OK] Table {} has primary key (id, cnt)", self.table);
        Ok(())
    }
}
