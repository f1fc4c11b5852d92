// Copyright 2025
// Licensed under the Elastic License v2.0

//! Source connectors
//!
//! Each source implements the `Extractor` trait from `crate::core::traits`.

pub mod postgres;

use std::sync::Arc;

use anyhow::Result;

use crate::config::Config;
use crate::core::Extractor;

pub use postgres::{ExtractSettings, PostgresExtractor};

/// Factory function to create the extractor for every configured source
///
/// # Example
/// ```ignore
/// let extractor = create_extractor(&config)?;
/// let rows = extractor.extract(&config.source.sources[0], 0).await?;
/// ```
pub fn create_extractor(config: &Config) -> Result<Arc<dyn Extractor>> {
    let settings = ExtractSettings::new(config.source.table.clone(), config.source.order_by.clone())
        .with_max_rows(config.source.max_rows_per_pass);

    let extractor = PostgresExtractor::new(
        &config.source.sources,
        settings,
        config.source.pool_size,
        config.io_timeout,
    )?;

    Ok(Arc::new(extractor))
}
