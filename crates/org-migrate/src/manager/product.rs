//! Products, their attributes, certificates, and owner mappings.

use async_trait::async_trait;

use crate::archive::{ArchiveReader, ArchiveWriter};
use crate::error::Result;

use super::{export_query, import_entry, EntityManager, ManagerKind, MigrationContext};

pub struct ProductManager;

#[async_trait]
impl EntityManager for ProductManager {
    fn kind(&self) -> ManagerKind {
        ManagerKind::Product
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
            "cp2_products.json",
            "cp2_products",
            "SELECT p.* FROM cp2_products p JOIN cp2_owner_products op ON op.product_uuid = p.uuid WHERE op.owner_id = ?",
            &[org.clone()],
        )
        .await?;
        rows += export_query(
            ctx,
            archive,
            "cp2_product_attributes.json",
            "cp2_product_attributes",
            "SELECT pa.* FROM cp2_product_attributes pa JOIN cp2_owner_products op ON op.product_uuid = pa.product_uuid WHERE op.owner_id = ?",
            &[org.clone()],
        )
        .await?;
        rows += export_query(
            ctx,
            archive,
            "cp2_product_certificates.json",
            "cp2_product_certificates",
            "SELECT pc.* FROM cp2_product_certificates pc JOIN cp2_owner_products op ON op.product_uuid = pc.product_uuid WHERE op.owner_id = ?",
            &[org.clone()],
        )
        .await?;
        rows += export_query(
            ctx,
            archive,
            "cp2_product_content.json",
            "cp2_product_content",
            "SELECT pc.* FROM cp2_product_content pc JOIN cp2_owner_products op ON op.product_uuid = pc.product_uuid WHERE op.owner_id = ?",
            &[org.clone()],
        )
        .await?;
        rows += export_query(
            ctx,
            archive,
            "cp2_owner_products.json",
            "cp2_owner_products",
            "SELECT * FROM cp2_owner_products WHERE owner_id = ?",
            &[org],
        )
        .await?;

        Ok(rows)
    }

    async fn import(&self, ctx: &MigrationContext, archive: &mut ArchiveReader) -> Result<u64> {
        let mut rows = 0;
        rows += import_entry(ctx, archive, "cp2_products.json", &[]).await?;
        rows += import_entry(ctx, archive, "cp2_product_attributes.json", &[]).await?;
        rows += import_entry(
            ctx,
            archive,
            "cp2_product_certificates.json",
            &["cert", "privatekey"],
        )
        .await?;
        rows += import_entry(ctx, archive, "cp2_product_content.json", &[]).await?;
        rows += import_entry(ctx, archive, "cp2_owner_products.json", &[]).await?;
        Ok(rows)
    }
}
