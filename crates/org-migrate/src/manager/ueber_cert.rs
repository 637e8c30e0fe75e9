//! Ueber (org-wide debug) certificate and its serial.

use async_trait::async_trait;

use crate::archive::{ArchiveReader, ArchiveWriter};
use crate::error::Result;

use super::{export_query, import_entry, EntityManager, ManagerKind, MigrationContext};

pub struct UeberCertManager;

#[async_trait]
impl EntityManager for UeberCertManager {
    fn kind(&self) -> ManagerKind {
        ManagerKind::UeberCert
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
            "cp_cert_serial-ueber.json",
            "cp_cert_serial",
            "SELECT cs.* FROM cp_cert_serial cs JOIN cp_ueber_cert uc ON uc.serial_id = cs.id WHERE uc.owner_id = ?",
            &[org.clone()],
        )
        .await?;
        rows += export_query(
            ctx,
            archive,
            "cp_ueber_cert.json",
            "cp_ueber_cert",
            "SELECT * FROM cp_ueber_cert WHERE owner_id = ?",
            &[org],
        )
        .await?;

        Ok(rows)
    }

    async fn import(&self, ctx: &MigrationContext, archive: &mut ArchiveReader) -> Result<u64> {
        // Cert tables that reference their parent object are imported by
        // those managers.
        let mut rows = 0;
        rows += import_entry(ctx, archive, "cp_cert_serial-ueber.json", &[]).await?;
        rows += import_entry(ctx, archive, "cp_ueber_cert.json", &["cert", "privatekey"]).await?;
        Ok(rows)
    }
}
