//! Entity managers: the per-entity-group unit of export/import.
//!
//! Each manager owns the queries and archive entries for one logical group
//! of related tables and declares which other managers must be imported
//! first. Export writes archive entries only; import inserts archive rows,
//! one transaction per entry.

mod activation_key;
mod consumer;
mod content;
mod environment;
mod owner;
mod pool;
mod product;
mod ueber_cert;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use crate::archive::{ArchiveReader, ArchiveWriter, TableDump};
use crate::error::Result;
use crate::loader;
use crate::store::{RowSet, RowStore};
use crate::value::DbValue;

pub use activation_key::ActivationKeyManager;
pub use consumer::ConsumerManager;
pub use content::ContentManager;
pub use environment::EnvironmentManager;
pub use owner::OwnerManager;
pub use pool::PoolManager;
pub use product::ProductManager;
pub use ueber_cert::UeberCertManager;

/// The manager registry. One variant per entity group; the dependency
/// graph is declared over these types, not over instances.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ManagerKind {
    Owner,
    Content,
    Product,
    Environment,
    Consumer,
    Pool,
    UeberCert,
    ActivationKey,
}

impl ManagerKind {
    /// Every manager, in the flat order exports run in.
    pub const ALL: [ManagerKind; 8] = [
        ManagerKind::Owner,
        ManagerKind::Product,
        ManagerKind::Content,
        ManagerKind::Environment,
        ManagerKind::Consumer,
        ManagerKind::Pool,
        ManagerKind::UeberCert,
        ManagerKind::ActivationKey,
    ];

    /// Instantiate the manager for this kind.
    #[must_use]
    pub fn manager(&self) -> Box<dyn EntityManager> {
        match self {
            ManagerKind::Owner => Box::new(OwnerManager),
            ManagerKind::Content => Box::new(ContentManager),
            ManagerKind::Product => Box::new(ProductManager),
            ManagerKind::Environment => Box::new(EnvironmentManager),
            ManagerKind::Consumer => Box::new(ConsumerManager),
            ManagerKind::Pool => Box::new(PoolManager),
            ManagerKind::UeberCert => Box::new(UeberCertManager),
            ManagerKind::ActivationKey => Box::new(ActivationKeyManager),
        }
    }

    /// Managers that must be imported before this one.
    #[must_use]
    pub fn depends_on(&self) -> &'static [ManagerKind] {
        self.manager().depends_on()
    }
}

impl fmt::Display for ManagerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ManagerKind::Owner => "owner",
            ManagerKind::Content => "content",
            ManagerKind::Product => "product",
            ManagerKind::Environment => "environment",
            ManagerKind::Consumer => "consumer",
            ManagerKind::Pool => "pool",
            ManagerKind::UeberCert => "ueber_cert",
            ManagerKind::ActivationKey => "activation_key",
        };
        f.write_str(name)
    }
}

/// Shared state handed to every manager operation.
pub struct MigrationContext {
    /// Resolved organization id; scopes every query.
    pub org_id: String,

    /// The single database connection for the run.
    pub store: Arc<dyn RowStore>,
}

impl MigrationContext {
    /// The organization id as a bind parameter.
    #[must_use]
    pub fn org_param(&self) -> DbValue {
        DbValue::Text(self.org_id.clone())
    }
}

/// One export/import unit.
#[async_trait]
pub trait EntityManager: Send + Sync {
    /// This manager's registry entry.
    fn kind(&self) -> ManagerKind;

    /// Static dependency declaration; no side effects.
    fn depends_on(&self) -> &'static [ManagerKind];

    /// Run the organization-scoped queries and write archive entries.
    /// Returns the number of rows exported. Mutates the archive only.
    async fn export(&self, ctx: &MigrationContext, archive: &mut ArchiveWriter) -> Result<u64>;

    /// Read this manager's archive entries and insert their rows.
    /// Returns the number of rows imported.
    async fn import(&self, ctx: &MigrationContext, archive: &mut ArchiveReader) -> Result<u64>;
}

/// Convert a query result into an archive dump for `table`.
pub(crate) fn rowset_to_dump(table: &str, rowset: RowSet) -> TableDump {
    TableDump {
        table: table.to_string(),
        columns: rowset.columns,
        rows: rowset
            .rows
            .iter()
            .map(|row| row.iter().map(DbValue::to_json).collect())
            .collect(),
    }
}

/// Run one organization-scoped query and write its result as one entry.
pub(crate) async fn export_query(
    ctx: &MigrationContext,
    archive: &mut ArchiveWriter,
    entry: &str,
    table: &str,
    sql: &str,
    params: &[DbValue],
) -> Result<u64> {
    let rowset = ctx.store.query(sql, params).await?;
    let dump = rowset_to_dump(table, rowset);
    let count = dump.rows.len() as u64;
    archive.write_entry(entry, &dump)?;
    Ok(count)
}

/// Import one required archive entry inside its own transaction.
pub(crate) async fn import_entry(
    ctx: &MigrationContext,
    archive: &mut ArchiveReader,
    entry: &str,
    decode: &[&str],
) -> Result<u64> {
    let dump = archive.read_entry(entry)?;
    import_dump(ctx, &dump, decode).await
}

/// Insert an already-read dump's rows; empty dumps are a successful no-op.
pub(crate) async fn import_dump(
    ctx: &MigrationContext,
    dump: &TableDump,
    decode: &[&str],
) -> Result<u64> {
    if dump.rows.is_empty() {
        return Ok(0);
    }
    loader::bulk_insert(&*ctx.store, &dump.table, &dump.columns, &dump.rows, decode).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_covers_all_kinds() {
        for kind in ManagerKind::ALL {
            assert_eq!(kind.manager().kind(), kind);
        }
    }

    #[test]
    fn test_dependencies_are_registered_kinds() {
        for kind in ManagerKind::ALL {
            for dep in kind.depends_on() {
                assert!(ManagerKind::ALL.contains(dep));
                assert_ne!(*dep, kind, "{} depends on itself", kind);
            }
        }
    }

    #[test]
    fn test_display_names() {
        assert_eq!(ManagerKind::UeberCert.to_string(), "ueber_cert");
        assert_eq!(ManagerKind::ActivationKey.to_string(), "activation_key");
    }
}
