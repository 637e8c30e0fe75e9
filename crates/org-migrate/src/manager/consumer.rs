//! Consumers: identity/content-access certificates, facts, guests,
//! installed products, and the shared consumer-type reference table.

use async_trait::async_trait;
use tracing::debug;

use crate::archive::{ArchiveReader, ArchiveWriter};
use crate::error::Result;
use crate::loader;

use super::{export_query, import_entry, EntityManager, ManagerKind, MigrationContext};

pub struct ConsumerManager;

#[async_trait]
impl EntityManager for ConsumerManager {
    fn kind(&self) -> ManagerKind {
        ManagerKind::Consumer
    }

    fn depends_on(&self) -> &'static [ManagerKind] {
        &[
            ManagerKind::Owner,
            ManagerKind::Content,
            ManagerKind::Environment,
        ]
    }

    async fn export(&self, ctx: &MigrationContext, archive: &mut ArchiveWriter) -> Result<u64> {
        let org = ctx.org_param();
        let mut rows = 0;

        // Consumer certificates. Serials are stored separately per
        // certificate family, so each family gets its own entry.
        rows += export_query(
            ctx,
            archive,
            "cp_cert_serial-cac.json",
            "cp_cert_serial",
            "SELECT cs.* FROM cp_cert_serial cs JOIN cp_cont_access_cert cac ON cac.serial_id = cs.id JOIN cp_consumer c ON c.cont_acc_cert_id = cac.id WHERE c.owner_id = ?",
            &[org.clone()],
        )
        .await?;
        rows += export_query(
            ctx,
            archive,
            "cp_cont_access_cert.json",
            "cp_cont_access_cert",
            "SELECT cac.* FROM cp_cont_access_cert cac JOIN cp_consumer c ON c.cont_acc_cert_id = cac.id WHERE c.owner_id = ?",
            &[org.clone()],
        )
        .await?;

        rows += export_query(
            ctx,
            archive,
            "cp_cert_serial-ic.json",
            "cp_cert_serial",
            "SELECT cs.* FROM cp_cert_serial cs JOIN cp_id_cert ic ON ic.serial_id = cs.id JOIN cp_consumer c ON c.consumer_idcert_id = ic.id WHERE c.owner_id = ?",
            &[org.clone()],
        )
        .await?;
        rows += export_query(
            ctx,
            archive,
            "cp_id_cert-local.json",
            "cp_id_cert",
            "SELECT ic.* FROM cp_id_cert ic JOIN cp_consumer c ON c.consumer_idcert_id = ic.id WHERE c.owner_id = ?",
            &[org.clone()],
        )
        .await?;

        rows += export_query(
            ctx,
            archive,
            "cp_cert_serial-uc.json",
            "cp_cert_serial",
            "SELECT cs.* FROM cp_cert_serial cs JOIN cp_id_cert ic ON ic.serial_id = cs.id JOIN cp_upstream_consumer uc ON uc.consumer_idcert_id = ic.id WHERE uc.owner_id = ?",
            &[org.clone()],
        )
        .await?;
        rows += export_query(
            ctx,
            archive,
            "cp_id_cert-upstream.json",
            "cp_id_cert",
            "SELECT ic.* FROM cp_id_cert ic JOIN cp_upstream_consumer uc ON uc.consumer_idcert_id = ic.id WHERE uc.owner_id = ?",
            &[org.clone()],
        )
        .await?;

        rows += export_query(
            ctx,
            archive,
            "cp_key_pair.json",
            "cp_key_pair",
            "SELECT ckp.* FROM cp_key_pair ckp JOIN cp_consumer c ON c.keypair_id = ckp.id WHERE c.owner_id = ?",
            &[org.clone()],
        )
        .await?;

        // Consumer types are shared across organizations; the full table
        // is exported and reconciled by label on import.
        rows += export_query(
            ctx,
            archive,
            "cp_consumer_type.json",
            "cp_consumer_type",
            "SELECT * FROM cp_consumer_type",
            &[],
        )
        .await?;

        rows += export_query(
            ctx,
            archive,
            "cp_consumer.json",
            "cp_consumer",
            "SELECT * FROM cp_consumer WHERE owner_id = ?",
            &[org.clone()],
        )
        .await?;
        rows += export_query(
            ctx,
            archive,
            "cp_consumer_capability.json",
            "cp_consumer_capability",
            "SELECT cc.* FROM cp_consumer_capability cc JOIN cp_consumer c ON c.id = cc.consumer_id WHERE c.owner_id = ?",
            &[org.clone()],
        )
        .await?;
        rows += export_query(
            ctx,
            archive,
            "cp_consumer_content_tags.json",
            "cp_consumer_content_tags",
            "SELECT cct.* FROM cp_consumer_content_tags cct JOIN cp_consumer c ON c.id = cct.consumer_id WHERE c.owner_id = ?",
            &[org.clone()],
        )
        .await?;
        rows += export_query(
            ctx,
            archive,
            "cp_consumer_facts.json",
            "cp_consumer_facts",
            "SELECT cf.* FROM cp_consumer_facts cf JOIN cp_consumer c ON c.id = cf.cp_consumer_id WHERE c.owner_id = ?",
            &[org.clone()],
        )
        .await?;
        rows += export_query(
            ctx,
            archive,
            "cp_consumer_guests.json",
            "cp_consumer_guests",
            "SELECT cg.* FROM cp_consumer_guests cg JOIN cp_consumer c ON c.id = cg.consumer_id WHERE c.owner_id = ?",
            &[org.clone()],
        )
        .await?;
        rows += export_query(
            ctx,
            archive,
            "cp_consumer_guests_attributes.json",
            "cp_consumer_guests_attributes",
            "SELECT cga.* FROM cp_consumer_guests_attributes cga JOIN cp_consumer_guests cg ON cg.guest_id = cga.cp_consumer_guest_id JOIN cp_consumer c ON c.id = cg.consumer_id WHERE c.owner_id = ?",
            &[org.clone()],
        )
        .await?;
        rows += export_query(
            ctx,
            archive,
            "cp_consumer_hypervisor.json",
            "cp_consumer_hypervisor",
            "SELECT ch.* FROM cp_consumer_hypervisor ch JOIN cp_consumer c ON c.id = ch.consumer_id WHERE c.owner_id = ?",
            &[org.clone()],
        )
        .await?;
        rows += export_query(
            ctx,
            archive,
            "cp_installed_products.json",
            "cp_installed_products",
            "SELECT ip.* FROM cp_installed_products ip JOIN cp_consumer c ON c.id = ip.consumer_id WHERE c.owner_id = ?",
            &[org.clone()],
        )
        .await?;
        rows += export_query(
            ctx,
            archive,
            "cp_content_override.json",
            "cp_content_override",
            "SELECT co.* FROM cp_content_override co JOIN cp_consumer c ON c.id = co.consumer_id WHERE c.owner_id = ?",
            &[org.clone()],
        )
        .await?;
        rows += export_query(
            ctx,
            archive,
            "cp_sp_add_on.json",
            "cp_sp_add_on",
            "SELECT spa.* FROM cp_sp_add_on spa JOIN cp_consumer c ON c.id = spa.consumer_id WHERE c.owner_id = ?",
            &[org.clone()],
        )
        .await?;

        rows += export_query(
            ctx,
            archive,
            "cp_upstream_consumer.json",
            "cp_upstream_consumer",
            "SELECT * FROM cp_upstream_consumer WHERE owner_id = ?",
            &[org.clone()],
        )
        .await?;
        rows += export_query(
            ctx,
            archive,
            "cp_deleted_consumers.json",
            "cp_deleted_consumers",
            "SELECT * FROM cp_deleted_consumers WHERE owner_id = ?",
            &[org],
        )
        .await?;

        Ok(rows)
    }

    async fn import(&self, ctx: &MigrationContext, archive: &mut ArchiveReader) -> Result<u64> {
        let mut rows = 0;

        // Consumer types may already exist on the target: upsert by label
        // instead of blindly inserting.
        let types = archive.read_entry("cp_consumer_type.json")?;
        if !types.rows.is_empty() {
            let stats =
                loader::upsert_by_label(&*ctx.store, &types.table, &types.columns, &types.rows)
                    .await?;
            debug!(
                inserted = stats.inserted,
                updated = stats.updated,
                "reconciled consumer types"
            );
            rows += stats.inserted + stats.updated;
        }

        rows += import_entry(ctx, archive, "cp_cert_serial-cac.json", &[]).await?;
        rows += import_entry(
            ctx,
            archive,
            "cp_cont_access_cert.json",
            &["cert", "privatekey"],
        )
        .await?;
        rows += import_entry(ctx, archive, "cp_cert_serial-ic.json", &[]).await?;
        rows += import_entry(ctx, archive, "cp_id_cert-local.json", &["cert", "privatekey"])
            .await?;
        rows += import_entry(ctx, archive, "cp_cert_serial-uc.json", &[]).await?;
        rows += import_entry(
            ctx,
            archive,
            "cp_id_cert-upstream.json",
            &["cert", "privatekey"],
        )
        .await?;
        rows += import_entry(ctx, archive, "cp_key_pair.json", &["publickey", "privatekey"])
            .await?;

        rows += import_entry(ctx, archive, "cp_consumer.json", &[]).await?;
        rows += import_entry(ctx, archive, "cp_consumer_capability.json", &[]).await?;
        rows += import_entry(ctx, archive, "cp_consumer_content_tags.json", &[]).await?;
        rows += import_entry(ctx, archive, "cp_consumer_facts.json", &[]).await?;
        rows += import_entry(ctx, archive, "cp_consumer_guests.json", &[]).await?;
        rows += import_entry(ctx, archive, "cp_consumer_guests_attributes.json", &[]).await?;
        rows += import_entry(ctx, archive, "cp_consumer_hypervisor.json", &[]).await?;
        rows += import_entry(ctx, archive, "cp_installed_products.json", &[]).await?;
        rows += import_entry(ctx, archive, "cp_content_override.json", &[]).await?;
        rows += import_entry(ctx, archive, "cp_sp_add_on.json", &[]).await?;

        rows += import_entry(ctx, archive, "cp_upstream_consumer.json", &[]).await?;
        rows += import_entry(ctx, archive, "cp_deleted_consumers.json", &[]).await?;

        Ok(rows)
    }
}
