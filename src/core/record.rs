// Copyright 2025
// Licensed under the Elastic License v2.0

use chrono::NaiveDateTime;
use serde::Serialize;
use std::fmt;

/// One configured source database.
///
/// Built once from configuration at startup and never mutated afterwards.
#[derive(Clone, PartialEq, Eq)]
pub struct SourceDescriptor {
    /// Unique source identifier, e.g. a 3-letter country code (`alb`)
    pub source_id: String,
    /// PostgreSQL connection URL, may carry credentials
    pub connection_url: String,
}

impl SourceDescriptor {
    pub fn new(source_id: impl Into<String>, connection_url: impl Into<String>) -> Self {
        Self {
            source_id: source_id.into(),
            connection_url: connection_url.into(),
        }
    }

    /// Country code stored in the consolidated table for this source (`ALB`).
    pub fn country_code(&self) -> String {
        self.source_id.to_uppercase()
    }

    /// Connection URL with the password masked, safe for logs.
    pub fn redacted_url(&self) -> String {
        match url::Url::parse(&self.connection_url) {
            Ok(mut parsed) => {
                if parsed.password().is_some() {
                    let _ = parsed.set_password(Some("***"));
                }
                parsed.to_string()
            }
            Err(_) => "<unparseable url>".to_string(),
        }
    }
}

impl fmt::Debug for SourceDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceDescriptor")
            .field("source_id", &self.source_id)
            .field("connection_url", &self.redacted_url())
            .finish()
    }
}

/// A source row as extracted, before normalization.
///
/// Measure columns are read as text so sentinel strings such as `NA`
/// survive extraction and can be coerced in one place.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRecord {
    pub id: i32,
    pub country_code: String,
    pub escs: Option<String>,
    pub tmins: Option<String>,
    pub belong: Option<String>,
    pub durecec: Option<String>,
}

/// A normalized record ready for the consolidated table.
///
/// `None` is the absent-value marker for every measure column.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CanonicalRecord {
    pub id: i32,
    pub country_code: String,
    pub escs: Option<f64>,
    pub tmins: Option<i32>,
    pub belong: Option<f64>,
    pub durecec: Option<i32>,
    pub ingested_at: NaiveDateTime,
}

impl CanonicalRecord {
    /// Composite key of the consolidated table.
    pub fn key(&self) -> (i32, &str) {
        (self.id, &self.country_code)
    }
}
