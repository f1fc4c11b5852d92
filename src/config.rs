// Copyright 2025
// Licensed under the Elastic License v2.0

use anyhow::{bail, Context, Result};
use std::collections::HashSet;
use std::env;
use std::str::FromStr;
use std::time::Duration;
use tracing::warn;

use crate::connectors::sources::postgres::validate_postgres_url;
use crate::core::SourceDescriptor;
use crate::utils::{validate_source_id, validate_sql_identifier};

/// Placeholder substituted with the source id in `SOURCE_URL_TEMPLATE`
pub const SOURCE_PLACEHOLDER: &str = "{source}";

// =============================================================================
// Source Configuration
// =============================================================================

/// Configuration shared by every source database
#[derive(Debug, Clone)]
pub struct SourceConfig {
    pub sources: Vec<SourceDescriptor>,
    /// Table read on every source
    pub table: String,
    /// Column that defines the natural insertion order of source rows
    pub order_by: String,
    /// Optional cap on rows extracted per source per pass
    pub max_rows_per_pass: Option<u64>,
    pub pool_size: usize,
}

// =============================================================================
// Sink Configuration
// =============================================================================

/// Analytical database configuration
#[derive(Debug, Clone)]
pub struct SinkConfig {
    pub url: String,
    /// Consolidated table
    pub table: String,
    /// Checkpoint table, stored next to the consolidated table
    pub offset_table: String,
    pub pool_size: usize,
}

// =============================================================================
// Main Configuration
// =============================================================================

/// Central configuration for pisa-sync loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub source: SourceConfig,
    pub sink: SinkConfig,

    // Scheduling
    pub interval: Duration,
    pub io_timeout: Duration,
    pub pass_budget: Duration,
    pub max_concurrent_sources: usize,

    /// Seed unknown checkpoints from the consolidated table
    pub seed_offsets: bool,
    /// Run a single pass and exit
    pub run_once: bool,
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Read environment variable with fallback to legacy name, logging deprecation warning
fn env_with_fallback(new_name: &str, legacy_name: &str) -> Option<String> {
    if let Ok(value) = env::var(new_name) {
        return Some(value);
    }

    if let Ok(value) = env::var(legacy_name) {
        warn!(
            "Environment variable '{}' is deprecated, use '{}' instead",
            legacy_name, new_name
        );
        return Some(value);
    }

    None
}

/// Read required environment variable with fallback
fn required_env_with_fallback(new_name: &str, legacy_name: &str) -> Result<String> {
    env_with_fallback(new_name, legacy_name)
        .with_context(|| format!("{} (or legacy {}) must be set", new_name, legacy_name))
}

/// Read an optional string variable with a default
fn env_or(name: &str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| default.to_string())
}

/// Parse an optional variable, falling back to the default on absence or parse failure
fn parsed_env<T: FromStr>(name: &str, default: T) -> T {
    match env::var(name) {
        Ok(raw) => match raw.trim().parse() {
            Ok(value) => value,
            Err(_) => {
                warn!("Ignoring invalid value '{}' for {}", raw, name);
                default
            }
        },
        Err(_) => default,
    }
}

fn bool_env(name: &str) -> bool {
    matches!(
        env::var(name).unwrap_or_default().trim().to_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

/// Split a comma separated list, trimming entries and dropping empty ones
fn parse_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Resolve the connection URL of one source.
///
/// `SOURCE_URL_<ID>` wins over `SOURCE_URL_TEMPLATE`.
fn resolve_source_url(source_id: &str, template: Option<&str>) -> Result<String> {
    let explicit = format!("SOURCE_URL_{}", source_id.to_uppercase());
    if let Ok(url) = env::var(&explicit) {
        return Ok(url);
    }
    match template {
        Some(t) if t.contains(SOURCE_PLACEHOLDER) => Ok(t.replace(SOURCE_PLACEHOLDER, source_id)),
        Some(_) => bail!(
            "SOURCE_URL_TEMPLATE must contain the {} placeholder",
            SOURCE_PLACEHOLDER
        ),
        None => bail!(
            "No connection URL for source '{}': set {} or SOURCE_URL_TEMPLATE",
            source_id,
            explicit
        ),
    }
}

// =============================================================================
// Config Implementation
// =============================================================================

impl Config {
    /// Load configuration from environment variables
    ///
    /// # Variables
    /// - SINK_URL (legacy DATABASE_URL), SINK_TABLE, OFFSET_TABLE
    /// - SOURCES, SOURCE_URL_<ID>, SOURCE_URL_TEMPLATE, SOURCE_TABLE, SOURCE_ORDER_BY
    /// - SYNC_INTERVAL_SECS, SYNC_IO_TIMEOUT_SECS, SYNC_PASS_BUDGET_SECS,
    ///   SYNC_MAX_CONCURRENT_SOURCES, SYNC_POOL_SIZE, SYNC_MAX_ROWS_PER_PASS,
    ///   SYNC_SEED_OFFSETS, SYNC_RUN_ONCE
    pub fn from_env() -> Result<Self> {
        let pool_size: usize = parsed_env("SYNC_POOL_SIZE", 2);

        // Sink configuration
        let sink = SinkConfig {
            url: required_env_with_fallback("SINK_URL", "DATABASE_URL")?,
            table: env_or("SINK_TABLE", "pisa"),
            offset_table: env_or("OFFSET_TABLE", "pisa_sync_offsets"),
            pool_size,
        };

        // Source configuration
        let source_ids = parse_list(&env::var("SOURCES").context("SOURCES must be set")?);
        let template = env::var("SOURCE_URL_TEMPLATE").ok();

        let mut sources = Vec::with_capacity(source_ids.len());
        for source_id in source_ids {
            let url = resolve_source_url(&source_id, template.as_deref())?;
            sources.push(SourceDescriptor::new(source_id, url));
        }

        let max_rows_per_pass = match env::var("SYNC_MAX_ROWS_PER_PASS") {
            Ok(raw) => Some(
                raw.trim()
                    .parse::<u64>()
                    .with_context(|| format!("invalid SYNC_MAX_ROWS_PER_PASS '{}'", raw))?,
            ),
            Err(_) => None,
        };

        let source = SourceConfig {
            sources,
            table: env_or("SOURCE_TABLE", "responses"),
            order_by: env_or("SOURCE_ORDER_BY", "id"),
            max_rows_per_pass,
            pool_size,
        };

        let config = Self {
            source,
            sink,
            interval: Duration::from_secs(parsed_env("SYNC_INTERVAL_SECS", 30)),
            io_timeout: Duration::from_secs(parsed_env("SYNC_IO_TIMEOUT_SECS", 10)),
            pass_budget: Duration::from_secs(parsed_env("SYNC_PASS_BUDGET_SECS", 25)),
            max_concurrent_sources: parsed_env("SYNC_MAX_CONCURRENT_SOURCES", 4),
            seed_offsets: bool_env("SYNC_SEED_OFFSETS"),
            run_once: bool_env("SYNC_RUN_ONCE"),
        };

        config.validate()?;
        Ok(config)
    }

    /// Reject configurations the engine cannot run safely
    pub fn validate(&self) -> Result<()> {
        if self.source.sources.is_empty() {
            bail!("At least one source must be configured in SOURCES");
        }

        let mut seen = HashSet::new();
        for source in &self.source.sources {
            validate_source_id(&source.source_id)?;
            if !seen.insert(source.source_id.as_str()) {
                bail!("Duplicate source id '{}'", source.source_id);
            }
            validate_postgres_url(&source.connection_url)
                .with_context(|| format!("invalid URL for source '{}'", source.source_id))?;
        }

        validate_postgres_url(&self.sink.url).context("invalid SINK_URL")?;
        validate_sql_identifier(&self.source.table)?;
        validate_sql_identifier(&self.source.order_by)?;
        validate_sql_identifier(&self.sink.table)?;
        validate_sql_identifier(&self.sink.offset_table)?;

        if self.interval.is_zero() {
            bail!("SYNC_INTERVAL_SECS must be greater than zero");
        }
        if self.io_timeout.is_zero() {
            bail!("SYNC_IO_TIMEOUT_SECS must be greater than zero");
        }
        if self.pass_budget.is_zero() {
            bail!("SYNC_PASS_BUDGET_SECS must be greater than zero");
        }
        if self.max_concurrent_sources == 0 {
            bail!("SYNC_MAX_CONCURRENT_SOURCES must be greater than zero");
        }
        if self.sink.pool_size == 0 {
            bail!("SYNC_POOL_SIZE must be greater than zero");
        }
        if self.pass_budget > self.interval {
            warn!(
                "Pass budget ({:?}) exceeds the interval ({:?}); overlapping ticks will be skipped",
                self.pass_budget, self.interval
            );
        }
        Ok(())
    }

    /// Print banner with configuration
    pub fn print_banner(&self) {
        println!("Starting pisa-sync...");
        println!(
            "Sink: {} (table: {}, offsets: {})",
            SourceDescriptor::new("sink", self.sink.url.clone()).redacted_url(),
            self.sink.table,
            self.sink.offset_table
        );
        println!(
            "Sources: {} (table: {}, order by: {})",
            self.source.sources.len(),
            self.source.table,
            self.source.order_by
        );
        for source in &self.source.sources {
            println!("  - {}: {}", source.source_id, source.redacted_url());
        }
        println!(
            "Interval: {:?}, budget: {:?}, io timeout: {:?}, workers: {}",
            self.interval, self.pass_budget, self.io_timeout, self.max_concurrent_sources
        );
    }
}

// =============================================================================
// Tests
// =============================================================================
