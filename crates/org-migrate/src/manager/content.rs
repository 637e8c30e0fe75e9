//! Content definitions and their owner mappings.

use async_trait::async_trait;

use crate::archive::{ArchiveReader, ArchiveWriter};
use crate::error::Result;

use super::{export_query, import_entry, EntityManager, ManagerKind, MigrationContext};

pub struct ContentManager;

#[async_trait]
impl EntityManager for ContentManager {
    fn kind(&self) -> ManagerKind {
        ManagerKind::Content
    }

    fn depends_on(&self) -> &'static [ManagerKind] {
        &[ManagerKind::Owner]
    }

    async fn export(&self, ctx: &MigrationContext, archive: &mut ArchiveWriter) -> Result<u64> {
        let org = ctx.org_param();
        let mut rows = 0;

        rows += export_query(
            ctx,
            archive,
            "cp2_content.json",
            "cp2_content",
            "SELECT c.* FROM cp2_content c JOIN cp2_owner_content oc ON oc.content_uuid = c.uuid WHERE oc.owner_id = ?",
            &[org.clone()],
        )
        .await?;
        rows += export_query(
            ctx,
            archive,
            "cp2_content_modified_products.json",
            "cp2_content_modified_products",
            "SELECT cmp.* FROM cp2_content_modified_products cmp JOIN cp2_owner_content oc ON oc.content_uuid = cmp.content_uuid WHERE oc.owner_id = ?",
            &[org.clone()],
        )
        .await?;
        rows += export_query(
            ctx,
            archive,
            "cp2_owner_content.json",
            "cp2_owner_content",
            "SELECT * FROM cp2_owner_content WHERE owner_id = ?",
            &[org],
        )
        .await?;

        Ok(rows)
    }

    async fn import(&self, ctx: &MigrationContext, archive: &mut ArchiveReader) -> Result<u64> {
        let mut rows = 0;
        rows += import_entry(ctx, archive, "cp2_content.json", &[]).await?;
        rows += import_entry(ctx, archive, "cp2_owner_content.json", &[]).await?;
        rows += import_entry(ctx, archive, "cp2_content_modified_products.json", &[]).await?;
        Ok(rows)
    }
}
