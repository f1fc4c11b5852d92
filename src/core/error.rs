// Copyright 2025
// Licensed under the Elastic License v2.0

use serde::Serialize;
use thiserror::Error;

/// Error taxonomy of a sync pass.
///
/// Every variant except `SchemaError` is scoped to a single source and is
/// caught at the engine boundary. `SchemaError` aborts the whole pass.
#[derive(Debug, Clone, Error, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SyncError {
    /// The offset store could not be read or written
    #[error("Offset store unavailable for source '{source_id}': {error}")]
    StoreUnavailable { source_id: String, error: String },

    /// The source database could not be reached or the extract query failed
    #[error("Source '{source_id}' unavailable: {error}")]
    SourceUnavailable { source_id: String, error: String },

    /// Writing to the consolidated table failed and the batch was rolled back
    #[error("Load failed for source '{source_id}': {error}")]
    LoadFailed { source_id: String, error: String },

    /// The consolidated table could not be created or does not have the expected shape
    #[error("Schema error: {error}")]
    SchemaError { error: String },
}

impl SyncError {
    pub fn store_unavailable(source_id: impl Into<String>, error: impl Into<String>) -> Self {
        Self::StoreUnavailable {
            source_id: source_id.into(),
            error: error.into(),
        }
    }

    pub fn source_unavailable(source_id: impl Into<String>, error: impl Into<String>) -> Self {
        Self::SourceUnavailable {
            source_id: source_id.into(),
            error: error.into(),
        }
    }

    pub fn load_failed(source_id: impl Into<String>, error: impl Into<String>) -> Self {
        Self::LoadFailed {
            source_id: source_id.into(),
            error: error.into(),
        }
    }

    pub fn schema(error: impl Into<String>) -> Self {
        Self::SchemaError {
            error: error.into(),
        }
    }

    /// Only schema failures may abort an entire pass.
    pub fn is_fatal_for_pass(&self) -> bool {
        matches!(self, SyncError::SchemaError { .. })
    }

    /// Source the error is attributed to, if any.
    pub fn source_id(&self) -> Option<&str> {
        match self {
            SyncError::StoreUnavailable { source_id, .. }
            | SyncError::SourceUnavailable { source_id, .. }
            | SyncError::LoadFailed { source_id, .. } => Some(source_id),
            SyncError::SchemaError { .. } => None,
        }
    }
}

pub type SyncResult<T> = Result<T, SyncError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages_carry_source_and_cause() {
        let err = SyncError::source_unavailable("arg", "connection refused");
        let msg = err.to_string();
        assert!(msg.contains("arg"));
        assert!(msg.contains("connection refused"));
        assert_eq!(err.source_id(), Some("arg"));

        let err = SyncError::schema("permission denied for schema public");
        assert!(err.to_string().starts_with("Schema error"));
        assert_eq!(err.source_id(), None);
    }

    #[test]
    fn test_only_schema_errors_abort_the_pass() {
        assert!(SyncError::schema("x").is_fatal_for_pass());
        assert!(!SyncError::store_unavailable("alb", "x").is_fatal_for_pass());
        assert!(!SyncError::source_unavailable("alb", "x").is_fatal_for_pass());
        assert!(!SyncError::load_failed("alb", "x").is_fatal_for_pass());
    }

    #[test]
    fn test_serializes_with_kind_tag() {
        let err = SyncError::load_failed("alb", "deadlock detected");
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["kind"], "load_failed");
        assert_eq!(json["source_id"], "alb");
        assert_eq!(json["error"], "deadlock detected");
    }
}
