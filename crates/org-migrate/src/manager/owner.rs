//! The organization record itself. Root of the dependency graph.

use async_trait::async_trait;

use crate::archive::{ArchiveReader, ArchiveWriter};
use crate::error::Result;

use super::{export_query, import_entry, EntityManager, ManagerKind, MigrationContext};

pub struct OwnerManager;

#[async_trait]
impl EntityManager for OwnerManager {
    fn kind(&self) -> ManagerKind {
        ManagerKind::Owner
    }

    fn depends_on(&self) -> &'static [ManagerKind] {
        &[]
    }

    async fn export(&self, ctx: &MigrationContext, archive: &mut ArchiveWriter) -> Result<u64> {
        export_query(
            ctx,
            archive,
            "cp_owner.json",
            "cp_owner",
            "SELECT * FROM cp_owner WHERE id = ?",
            &[ctx.org_param()],
        )
        .await
    }

    async fn import(&self, ctx: &MigrationContext, archive: &mut ArchiveReader) -> Result<u64> {
        import_entry(ctx, archive, "cp_owner.json", &[]).await
    }
}
