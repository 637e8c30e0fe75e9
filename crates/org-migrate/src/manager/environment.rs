//! Environments and their content mappings.

use async_trait::async_trait;

use crate::archive::{ArchiveReader, ArchiveWriter};
use crate::error::Result;

use super::{export_query, import_entry, EntityManager, ManagerKind, MigrationContext};

pub struct EnvironmentManager;

#[async_trait]
impl EntityManager for EnvironmentManager {
    fn kind(&self) -> ManagerKind {
        ManagerKind::Environment
    }

    fn depends_on(&self) -> &'static [ManagerKind] {
        &[ManagerKind::Owner, ManagerKind::Content]
    }

    async fn export(&self, ctx: &MigrationContext, archive: &mut ArchiveWriter) -> Result<u64> {
        let org = ctx.org_param();
        let mut rows = 0;

        rows += export_query(
            ctx,
            archive,
            "cp_environment.json",
            "cp_environment",
            "SELECT * FROM cp_environment WHERE owner_id = ?",
            &[org.clone()],
        )
        .await?;
        rows += export_query(
            ctx,
            archive,
            "cp2_environment_content.json",
            "cp2_environment_content",
            "SELECT ec.* FROM cp2_environment_content ec JOIN cp_environment e ON ec.environment_id = e.id WHERE e.owner_id = ?",
            &[org.clone()],
        )
        .await?;
        rows += export_query(
            ctx,
            archive,
            "cp_owner_env_content_access.json",
            "cp_owner_env_content_access",
            "SELECT eca.* FROM cp_owner_env_content_access eca JOIN cp_environment e ON eca.environment_id = e.id WHERE e.owner_id = ?",
            &[org],
        )
        .await?;

        Ok(rows)
    }

    async fn import(&self, ctx: &MigrationContext, archive: &mut ArchiveReader) -> Result<u64> {
        let mut rows = 0;
        rows += import_entry(ctx, archive, "cp_environment.json", &[]).await?;
        rows += import_entry(ctx, archive, "cp2_environment_content.json", &[]).await?;
        rows += import_entry(ctx, archive, "cp_owner_env_content_access.json", &[]).await?;
        Ok(rows)
    }
}
