//! # org-migrate
//!
//! Per-organization data migration library for Candlepin databases.
//!
//! This library exports one organization's subscription data to a
//! portable zip archive and imports such archives into another database,
//! with support for:
//!
//! - **Entity managers** covering owners, products, content,
//!   environments, consumers, pools, and activation keys
//! - **Dependency-ordered import** so foreign keys are satisfied
//! - **Recursive pool/entitlement traversal** replayed level by level
//! - **PostgreSQL and MySQL/MariaDB** backends over one interface
//!
//! ## Example
//!
//! ```rust,no_run
//! use org_migrate::{ArchiveWriter, Config, Migrator};
//!
//! #[tokio::main]
//! async fn main() -> org_migrate::Result<()> {
//!     let config = Config::load("config.yaml")?;
//!     let store = org_migrate::store::connect(&config.database).await?;
//!     let org_id = org_migrate::resolve_org(&*store, "acme").await?;
//!
//!     let mut archive = ArchiveWriter::create(&config.archive)?;
//!     let mut migrator = Migrator::new(store, "acme", org_id);
//!     let summary = migrator.run_export(&mut archive).await?;
//!     archive.finish()?;
//!     println!("Exported {} rows", summary.total_rows);
//!     Ok(())
//! }
//! ```

pub mod archive;
pub mod config;
pub mod error;
pub mod ident;
pub mod loader;
pub mod manager;
pub mod orchestrator;
pub mod resolver;
pub mod store;
pub mod value;

// Re-exports for convenient access
pub use archive::{ArchiveReader, ArchiveWriter, TableDump};
pub use config::{Backend, Config, DbConfig};
pub use error::{MigrateError, Result};
pub use manager::{EntityManager, ManagerKind, MigrationContext};
pub use orchestrator::{resolve_org, MigrationSummary, Migrator, TaskSummary};
pub use store::{RowSet, RowStore};
pub use value::DbValue;
