// Copyright 2025
// Licensed under the Elastic License v2.0

//! SQL identifier helpers.
//!
//! Table and column names come from configuration and end up interpolated
//! into SQL text, so they are validated at startup and quoted at use.

use anyhow::{anyhow, Result};

/// PostgreSQL truncates identifiers longer than this.
const MAX_IDENTIFIER_LEN: usize = 63;

/// Validates a configured SQL identifier, optionally schema-qualified.
///
/// Each dot-separated part must start with a letter or underscore and
/// contain only ASCII letters, digits and underscores.
///
/// ```
/// use pisa_sync::utils::validate_sql_identifier;
///
/// assert!(validate_sql_identifier("responses").is_ok());
/// assert!(validate_sql_identifier("analytics.pisa").is_ok());
/// assert!(validate_sql_identifier("pisa; DROP TABLE pisa").is_err());
/// ```
pub fn validate_sql_identifier(name: &str) -> Result<&str> {
    if name.is_empty() {
        return Err(anyhow!("SQL identifier cannot be empty"));
    }

    let parts: Vec<&str> = name.split('.').collect();
    if parts.len() > 2 {
        return Err(anyhow!(
            "Invalid SQL identifier '{}': at most one schema qualifier is allowed",
            name
        ));
    }

    for part in parts {
        if part.is_empty() {
            return Err(anyhow!("Invalid SQL identifier '{}': empty name part", name));
        }
        if part.len() > MAX_IDENTIFIER_LEN {
            return Err(anyhow!(
                "Invalid SQL identifier '{}': '{}' exceeds {} characters",
                name,
                part,
                MAX_IDENTIFIER_LEN
            ));
        }
        let mut chars = part.chars();
        let starts_ok = chars
            .next()
            .map(|c| c.is_ascii_alphabetic() || c == '_')
            .unwrap_or(false);
        if !starts_ok || !chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(anyhow!(
                "Invalid SQL identifier '{}': only ASCII letters, digits and underscores are allowed",
                name
            ));
        }
    }

    Ok(name)
}

/// Validates a source identifier: lowercase letters, digits and underscores.
pub fn validate_source_id(source_id: &str) -> Result<&str> {
    if source_id.is_empty() {
        return Err(anyhow!("Source id cannot be empty"));
    }
    if !source_id
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
    {
        return Err(anyhow!(
            "Invalid source id '{}': use lowercase letters, digits and underscores",
            source_id
        ));
    }
    Ok(source_id)
}

/// Quotes a SQL identifier, splitting schema-qualified names
/// (`analytics.pisa` becomes `"analytics"."pisa"`).
pub fn quote_ident(name: &str) -> String {
    name.split('.')
        .map(|part| format!("\"{}\"", part.replace('"', "\"\"")))
        .collect::<Vec<_>>()
        .join(".")
}

/// Splits `schema.table` into its parts.
///
/// An unqualified name has no schema: it resolves through the session
/// `search_path`, so callers must use `current_schema()` rather than guess.
pub fn split_qualified(name: &str) -> (Option<&str>, &str) {
    match name.split_once('.') {
        Some((schema, table)) => (Some(schema), table),
        None => (None, name),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_identifiers() {
        assert!(validate_sql_identifier("pisa").is_ok());
        assert!(validate_sql_identifier("responses").is_ok());
        assert!(validate_sql_identifier("pisa_sync_offsets").is_ok());
        assert!(validate_sql_identifier("_staging").is_ok());
        assert!(validate_sql_identifier("analytics.pisa").is_ok());
        assert!(validate_sql_identifier("Responses2024").is_ok());
    }

    #[test]
    fn test_invalid_identifiers() {
        assert!(validate_sql_identifier("").is_err());
        assert!(validate_sql_identifier("pisa;").is_err());
        assert!(validate_sql_identifier("pisa--").is_err());
        assert!(validate_sql_identifier("pisa/**/").is_err());
        assert!(validate_sql_identifier("pi'sa").is_err());
        assert!(validate_sql_identifier("my table").is_err());
        assert!(validate_sql_identifier("1pisa").is_err());
        assert!(validate_sql_identifier("a.b.c").is_err());
        assert!(validate_sql_identifier(".pisa").is_err());
        assert!(validate_sql_identifier("pisa.").is_err());
        assert!(validate_sql_identifier(&"p".repeat(64)).is_err());
    }

    #[test]
    fn test_error_messages() {
        let err = validate_sql_identifier("").unwrap_err().to_string();
        assert!(err.contains("cannot be empty"));

        let err = validate_sql_identifier("pisa; DROP").unwrap_err().to_string();
        assert!(err.contains("Invalid SQL identifier"));
    }

    #[test]
    fn test_source_ids() {
        assert!(validate_source_id("alb").is_ok());
        assert!(validate_source_id("seta_2").is_ok());
        assert!(validate_source_id("ALB").is_err());
        assert!(validate_source_id("a-b").is_err());
        assert!(validate_source_id("").is_err());
    }

    #[test]
    fn test_quote_ident() {
        assert_eq!(quote_ident("pisa"), "\"pisa\"");
        assert_eq!(quote_ident("analytics.pisa"), "\"analytics\".\"pisa\"");
        assert_eq!(quote_ident("we\"ird"), "\"we\"\"ird\"");
    }

    #[test]
    fn test_split_qualified() {
        assert_eq!(split_qualified("pisa"), (None, "pisa"));
        assert_eq!(split_qualified("analytics.pisa"), (Some("analytics"), "pisa"));
    }
}
