// Copyright 2025
// Licensed under the Elastic License v2.0

//! Database connectors for pisa-sync
//!
//! # Sources
//! - `postgres` - per-country survey databases, read with an offset cursor
//!
//! # Sinks
//! - `postgres` - the analytical database holding the consolidated table
//!
//! Every call that leaves the process goes through [`bounded`], so a single
//! unreachable database cannot stall a pass.

pub mod pool;
pub mod sinks;
pub mod sources;

use std::future::Future;
use std::time::Duration;

use deadpool_postgres::PoolError;

/// Extract a detailed error message from a tokio_postgres error.
///
/// `tokio_postgres::Error`'s Display only prints the error kind (e.g. "db error")
/// without the server message, so pull severity, message, detail and hint out of it.
pub fn pg_error_message(e: &tokio_postgres::Error) -> String {
    if let Some(db_err) = e.as_db_error() {
        let mut msg = format!("{}: {}", db_err.severity(), db_err.message());
        if let Some(detail) = db_err.detail() {
            msg.push_str(&format!(" DETAIL: {}", detail));
        }
        if let Some(hint) = db_err.hint() {
            msg.push_str(&format!(" HINT: {}", hint));
        }
        msg
    } else {
        with_causes(e)
    }
}

/// Display of `e` followed by every `source()` below it.
///
/// Connection failures surface as "error connecting to server" with the
/// io error (refused, DNS, TLS) only in the source chain. A cause whose text
/// the message already contains is not repeated.
pub fn with_causes(e: &dyn std::error::Error) -> String {
    let mut msg = e.to_string();
    let mut cause = e.source();
    while let Some(c) = cause {
        let text = c.to_string();
        if !text.is_empty() && !msg.contains(&text) {
            msg.push_str(": ");
            msg.push_str(&text);
        }
        cause = c.source();
    }
    msg
}

/// Renders driver and pool errors into a cause string.
pub trait DescribeError {
    fn describe(&self) -> String;
}

impl DescribeError for tokio_postgres::Error {
    fn describe(&self) -> String {
        pg_error_message(self)
    }
}

impl DescribeError for PoolError {
    fn describe(&self) -> String {
        match self {
            PoolError::Backend(e) => pg_error_message(e),
            other => with_causes(other),
        }
    }
}

/// Runs one database call under a timeout.
///
/// Both a driver error and an elapsed timeout come back as a cause string;
/// callers wrap it into the error class of their component.
pub async fn bounded<T, E, F>(after: Duration, fut: F) -> Result<T, String>
where
    F: Future<Output = Result<T, E>>,
    E: DescribeError,
{
    match tokio::time::timeout(after, fut).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(e.describe()),
        Err(_) => Err(format!("timed out after {:?}", after)),
    }
}
