//! Row store capability: the minimal database surface the migration needs.
//!
//! Queries are written once with `?` placeholders; each driver adapts them
//! to its own parameter style. The whole run uses a single connection and
//! is fully sequential, so drivers hold exactly one connection and expose
//! plain `begin`/`commit`/`rollback` statements on it.

pub mod mysql;
pub mod postgres;

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::{Backend, DbConfig};
use crate::error::Result;
use crate::value::DbValue;

pub use mysql::MySqlStore;
pub use postgres::PgStore;

/// Result of a query: resolvable column names plus positional rows.
///
/// Column names are available even when the result is empty; exported
/// archive entries need them to describe the table.
#[derive(Debug, Clone, Default)]
pub struct RowSet {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<DbValue>>,
}

impl RowSet {
    /// Index of a named column, case-insensitive.
    #[must_use]
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns
            .iter()
            .position(|c| c.eq_ignore_ascii_case(name))
    }
}

/// Minimal database capability consumed by the migration engine.
#[async_trait]
pub trait RowStore: Send + Sync {
    /// Execute a parameterized query and buffer the full result.
    async fn query(&self, sql: &str, params: &[DbValue]) -> Result<RowSet>;

    /// Execute a parameterized statement, returning the affected-row count.
    async fn execute(&self, sql: &str, params: &[DbValue]) -> Result<u64>;

    /// Open a transaction on the connection.
    async fn begin(&self) -> Result<()>;

    /// Commit the open transaction.
    async fn commit(&self) -> Result<()>;

    /// Roll back the open transaction.
    async fn rollback(&self) -> Result<()>;

    /// Backend name for logging.
    fn backend(&self) -> &'static str;
}

/// Connect to the configured backend.
pub async fn connect(config: &DbConfig) -> Result<Arc<dyn RowStore>> {
    match config.backend {
        Backend::Postgresql => Ok(Arc::new(PgStore::connect(config).await?)),
        Backend::Mysql | Backend::Mariadb => Ok(Arc::new(MySqlStore::connect(config).await?)),
    }
}

/// Build a `?, ?, ...` placeholder block for an IN-list of `n` values.
#[must_use]
pub fn bind_markers(n: usize) -> String {
    let mut out = String::with_capacity(n * 3);
    for i in 0..n {
        if i > 0 {
            out.push_str(", ");
        }
        out.push('?');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bind_markers() {
        assert_eq!(bind_markers(0), "");
        assert_eq!(bind_markers(1), "?");
        assert_eq!(bind_markers(3), "?, ?, ?");
    }

    #[test]
    fn test_column_index_case_insensitive() {
        let rs = RowSet {
            columns: vec!["ID".into(), "account".into()],
            rows: vec![],
        };
        assert_eq!(rs.column_index("id"), Some(0));
        assert_eq!(rs.column_index("ACCOUNT"), Some(1));
        assert_eq!(rs.column_index("missing"), None);
    }
}
