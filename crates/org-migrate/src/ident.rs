//! Identifier validation for SQL injection prevention.
//!
//! Table and column names flow out of archive entries and into dynamically
//! assembled INSERT/UPDATE statements. Identifiers cannot be parameterized,
//! so every name is checked against a strict charset before any SQL is
//! built from it. Candlepin schema objects only ever use `[A-Za-z0-9_]`,
//! which lets us reject rather than quote.

use crate::error::{MigrateError, Result};

fn is_valid(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Validate a table name.
pub fn validate_table(table: &str) -> Result<()> {
    if !is_valid(table) {
        return Err(MigrateError::InvalidIdentifier(format!(
            "table {:?} uses invalid characters",
            table
        )));
    }
    Ok(())
}

/// Validate a table name and every column name destined for a statement.
pub fn validate_columns(table: &str, columns: &[String]) -> Result<()> {
    validate_table(table)?;

    for column in columns {
        if !is_valid(column) {
            return Err(MigrateError::InvalidIdentifier(format!(
                "column {}.{:?} uses invalid characters",
                table, column
            )));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accepts_schema_names() {
        assert!(validate_table("cp_owner").is_ok());
        assert!(validate_table("cp2_owner_products").is_ok());
        assert!(validate_columns(
            "cp_consumer_type",
            &["id".into(), "label".into(), "manifest".into()]
        )
        .is_ok());
    }

    #[test]
    fn test_rejects_statement_injection() {
        assert!(validate_table("cp_owner; DROP TABLE x").is_err());
        assert!(validate_table("cp_owner--").is_err());
    }

    #[test]
    fn test_rejects_bad_column() {
        let err = validate_columns("cp_pool", &["id".into(), "a b".into()]).unwrap_err();
        assert!(matches!(err, MigrateError::InvalidIdentifier(_)));
    }

    #[test]
    fn test_rejects_empty_names() {
        assert!(validate_table("").is_err());
        assert!(validate_columns("cp_pool", &["".into()]).is_err());
    }

    #[test]
    fn test_rejects_quoting_tricks() {
        assert!(validate_table("cp_owner\"").is_err());
        assert!(validate_table("cp`owner").is_err());
        assert!(validate_table("cp_owner\0").is_err());
    }
}
