//! Activation keys and their pool/product links.

use async_trait::async_trait;

use crate::archive::{ArchiveReader, ArchiveWriter};
use crate::error::Result;

use super::{export_query, import_entry, EntityManager, ManagerKind, MigrationContext};

pub struct ActivationKeyManager;

#[async_trait]
impl EntityManager for ActivationKeyManager {
    fn kind(&self) -> ManagerKind {
        ManagerKind::ActivationKey
    }

    fn depends_on(&self) -> &'static [ManagerKind] {
        &[ManagerKind::Owner, ManagerKind::Product, ManagerKind::Pool]
    }

    async fn export(&self, ctx: &MigrationContext, archive: &mut ArchiveWriter) -> Result<u64> {
        let org = ctx.org_param();
        let mut rows = 0;

        rows += export_query(
            ctx,
            archive,
            "cp_activation_key.json",
            "cp_activation_key",
            "SELECT * FROM cp_activation_key WHERE owner_id = ?",
            &[org.clone()],
        )
        .await?;
        rows += export_query(
            ctx,
            archive,
            "cp_activationkey_pool.json",
            "cp_activationkey_pool",
            "SELECT akp.* FROM cp_activationkey_pool akp JOIN cp_activation_key ak ON ak.id = akp.key_id WHERE ak.owner_id = ?",
            &[org.clone()],
        )
        .await?;
        rows += export_query(
            ctx,
            archive,
            "cp2_activation_key_products.json",
            "cp2_activation_key_products",
            "SELECT akp.* FROM cp2_activation_key_products akp JOIN cp2_owner_products op ON op.product_uuid = akp.product_uuid WHERE op.owner_id = ?",
            &[org],
        )
        .await?;

        Ok(rows)
    }

    async fn import(&self, ctx: &MigrationContext, archive: &mut ArchiveReader) -> Result<u64> {
        let mut rows = 0;
        rows += import_entry(ctx, archive, "cp_activation_key.json", &[]).await?;
        rows += import_entry(ctx, archive, "cp_activationkey_pool.json", &[]).await?;
        rows += import_entry(ctx, archive, "cp2_activation_key_products.json", &[]).await?;
        Ok(rows)
    }
}
