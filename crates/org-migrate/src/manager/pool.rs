//! Pools, entitlements, and the certificate/CDN/branding tables hanging
//! off them.
//!
//! Pools and entitlements reference each other: a pool may originate from
//! a source entitlement, and an entitlement always belongs to a pool.
//! Export walks that graph breadth-first from the base pools (those with
//! no source entitlement) and writes one archive entry per depth, so
//! import can replay the levels in an order that satisfies the foreign
//! keys.

use async_trait::async_trait;
use tracing::debug;

use crate::archive::{ArchiveReader, ArchiveWriter};
use crate::error::{MigrateError, Result};
use crate::store::{bind_markers, RowSet, RowStore};
use crate::value::DbValue;

use super::{
    export_query, import_dump, import_entry, rowset_to_dump, EntityManager, ManagerKind,
    MigrationContext,
};

/// Upper bound on bind parameters per statement; id lists longer than
/// this are split into multiple queries.
const PARAM_LIMIT: usize = 10_000;

pub struct PoolManager;

#[async_trait]
impl EntityManager for PoolManager {
    fn kind(&self) -> ManagerKind {
        ManagerKind::Pool
    }

    fn depends_on(&self) -> &'static [ManagerKind] {
        &[
            ManagerKind::Owner,
            ManagerKind::Product,
            ManagerKind::Consumer,
        ]
    }

    async fn export(&self, ctx: &MigrationContext, archive: &mut ArchiveWriter) -> Result<u64> {
        let org = ctx.org_param();
        let mut rows = 0;

        // CDN
        rows += export_query(
            ctx,
            archive,
            "cp_cert_serial-cdn.json",
            "cp_cert_serial",
            "SELECT cs.* FROM cp_cert_serial cs JOIN cp_cdn_certificate cc ON cc.serial_id = cs.id JOIN cp_cdn c ON c.certificate_id = cc.id JOIN cp_pool p ON p.cdn_id = c.id WHERE p.owner_id = ?",
            &[org.clone()],
        )
        .await?;
        rows += export_query(
            ctx,
            archive,
            "cp_cdn_certificate.json",
            "cp_cdn_certificate",
            "SELECT cc.* FROM cp_cdn_certificate cc JOIN cp_cdn c ON c.certificate_id = cc.id JOIN cp_pool p ON p.cdn_id = c.id WHERE p.owner_id = ?",
            &[org.clone()],
        )
        .await?;
        rows += export_query(
            ctx,
            archive,
            "cp_cdn.json",
            "cp_cdn",
            "SELECT c.* FROM cp_cdn c JOIN cp_pool p ON p.cdn_id = c.id WHERE p.owner_id = ?",
            &[org.clone()],
        )
        .await?;

        // Branding
        rows += export_query(
            ctx,
            archive,
            "cp_branding.json",
            "cp_branding",
            "SELECT b.* FROM cp_branding b JOIN cp_pool_branding pb ON pb.branding_id = b.id JOIN cp_pool p ON pb.pool_id = p.id WHERE p.owner_id = ?",
            &[org.clone()],
        )
        .await?;

        // Pool certificates
        rows += export_query(
            ctx,
            archive,
            "cp_cert_serial-pool.json",
            "cp_cert_serial",
            "SELECT cs.* FROM cp_cert_serial cs JOIN cp_certificate c ON c.serial_id = cs.id JOIN cp_pool p ON p.certificate_id = c.id WHERE p.owner_id = ?",
            &[org.clone()],
        )
        .await?;
        rows += export_query(
            ctx,
            archive,
            "cp_certificate.json",
            "cp_certificate",
            "SELECT c.* FROM cp_certificate c JOIN cp_pool p ON p.certificate_id = c.id WHERE p.owner_id = ?",
            &[org.clone()],
        )
        .await?;

        rows += self.export_chain(ctx, archive).await?;

        // Everything below is keyed to the pool's owner directly, so once
        // the chain entries exist these can be blanket-exported.
        rows += export_query(
            ctx,
            archive,
            "cp_pool_attribute.json",
            "cp_pool_attribute",
            "SELECT pa.* FROM cp_pool_attribute pa JOIN cp_pool p ON p.id = pa.pool_id WHERE p.owner_id = ?",
            &[org.clone()],
        )
        .await?;
        rows += export_query(
            ctx,
            archive,
            "cp_pool_branding.json",
            "cp_pool_branding",
            "SELECT pb.* FROM cp_pool_branding pb JOIN cp_pool p ON p.id = pb.pool_id WHERE p.owner_id = ?",
            &[org.clone()],
        )
        .await?;
        rows += export_query(
            ctx,
            archive,
            "cp_pool_source_stack.json",
            "cp_pool_source_stack",
            "SELECT pss.* FROM cp_pool_source_stack pss JOIN cp_pool p ON p.id = pss.derivedpool_id WHERE p.owner_id = ?",
            &[org.clone()],
        )
        .await?;
        rows += export_query(
            ctx,
            archive,
            "cp2_pool_provided_products.json",
            "cp2_pool_provided_products",
            "SELECT ppp.* FROM cp2_pool_provided_products ppp JOIN cp_pool p ON p.id = ppp.pool_id WHERE p.owner_id = ?",
            &[org.clone()],
        )
        .await?;
        rows += export_query(
            ctx,
            archive,
            "cp2_pool_derprov_products.json",
            "cp2_pool_derprov_products",
            "SELECT pdpp.* FROM cp2_pool_derprov_products pdpp JOIN cp_pool p ON p.id = pdpp.pool_id WHERE p.owner_id = ?",
            &[org.clone()],
        )
        .await?;
        rows += export_query(
            ctx,
            archive,
            "cp2_pool_source_sub.json",
            "cp2_pool_source_sub",
            "SELECT pss.* FROM cp2_pool_source_sub pss JOIN cp_pool p ON p.id = pss.pool_id WHERE p.owner_id = ?",
            &[org.clone()],
        )
        .await?;
        rows += export_query(
            ctx,
            archive,
            "cp_product_pool_attribute.json",
            "cp_product_pool_attribute",
            "SELECT ppa.* FROM cp_product_pool_attribute ppa JOIN cp_pool p ON p.id = ppa.pool_id WHERE p.owner_id = ?",
            &[org.clone()],
        )
        .await?;

        // Entitlement certificates. Unlike the other certificate families
        // these reference the entitlement, so they import after the chain.
        rows += export_query(
            ctx,
            archive,
            "cp_cert_serial-ent.json",
            "cp_cert_serial",
            "SELECT cs.* FROM cp_cert_serial cs JOIN cp_ent_certificate ec ON ec.serial_id = cs.id JOIN cp_entitlement e ON e.id = ec.entitlement_id JOIN cp_pool p ON p.id = e.pool_id WHERE p.owner_id = ?",
            &[org.clone()],
        )
        .await?;
        rows += export_query(
            ctx,
            archive,
            "cp_ent_certificate.json",
            "cp_ent_certificate",
            "SELECT ec.* FROM cp_ent_certificate ec JOIN cp_entitlement e ON e.id = ec.entitlement_id JOIN cp_pool p ON p.id = e.pool_id WHERE p.owner_id = ?",
            &[org],
        )
        .await?;

        Ok(rows)
    }

    async fn import(&self, ctx: &MigrationContext, archive: &mut ArchiveReader) -> Result<u64> {
        let mut rows = 0;

        rows += import_entry(ctx, archive, "cp_cert_serial-cdn.json", &[]).await?;
        rows += import_entry(
            ctx,
            archive,
            "cp_cdn_certificate.json",
            &["cert", "privatekey"],
        )
        .await?;
        rows += import_entry(ctx, archive, "cp_cdn.json", &[]).await?;
        rows += import_entry(ctx, archive, "cp_branding.json", &[]).await?;
        rows += import_entry(ctx, archive, "cp_cert_serial-pool.json", &[]).await?;
        rows += import_entry(ctx, archive, "cp_certificate.json", &["cert", "privatekey"])
            .await?;

        rows += self.import_chain(ctx, archive).await?;

        rows += import_entry(ctx, archive, "cp_pool_attribute.json", &[]).await?;
        rows += import_entry(ctx, archive, "cp_pool_branding.json", &[]).await?;
        rows += import_entry(ctx, archive, "cp_pool_source_stack.json", &[]).await?;
        rows += import_entry(ctx, archive, "cp2_pool_provided_products.json", &[]).await?;
        rows += import_entry(ctx, archive, "cp2_pool_derprov_products.json", &[]).await?;
        rows += import_entry(ctx, archive, "cp2_pool_source_sub.json", &[]).await?;
        rows += import_entry(ctx, archive, "cp_product_pool_attribute.json", &[]).await?;

        rows += import_entry(ctx, archive, "cp_cert_serial-ent.json", &[]).await?;
        rows += import_entry(ctx, archive, "cp_ent_certificate.json", &["cert", "privatekey"])
            .await?;

        Ok(rows)
    }
}

impl PoolManager {
    /// Walk the pool/entitlement graph level by level.
    ///
    /// Level 0 is the base pools (no source entitlement) and its entry is
    /// always written, even when empty. Each following level fetches the
    /// entitlements of the previous level's pools, then the pools derived
    /// from those entitlements; a level with no rows ends the walk and is
    /// not written.
    async fn export_chain(
        &self,
        ctx: &MigrationContext,
        archive: &mut ArchiveWriter,
    ) -> Result<u64> {
        let mut rows = 0;

        let base = ctx
            .store
            .query(
                "SELECT p.* FROM cp_pool p WHERE owner_id = ? AND sourceentitlement_id IS NULL ORDER BY created ASC",
                &[ctx.org_param()],
            )
            .await?;
        let mut pids = collect_ids("cp_pool", &base)?;
        let dump = rowset_to_dump("cp_pool", base);
        rows += dump.rows.len() as u64;
        archive.write_entry("cp_pool-0.json", &dump)?;

        let mut depth = 0u32;
        loop {
            if pids.is_empty() {
                break;
            }

            let ents = fetch_chunked(
                &*ctx.store,
                "SELECT e.* FROM cp_entitlement e WHERE e.pool_id IN (",
                ") ORDER BY created ASC",
                &pids,
            )
            .await?;
            if ents.rows.is_empty() {
                break;
            }
            let eids = collect_ids("cp_entitlement", &ents)?;
            let dump = rowset_to_dump("cp_entitlement", ents);
            rows += dump.rows.len() as u64;
            archive.write_entry(&format!("cp_entitlement-{}.json", depth), &dump)?;

            let pools = fetch_chunked(
                &*ctx.store,
                "SELECT p.* FROM cp_pool p WHERE p.sourceentitlement_id IN (",
                ") ORDER BY created ASC",
                &eids,
            )
            .await?;
            if pools.rows.is_empty() {
                break;
            }
            depth += 1;
            pids = collect_ids("cp_pool", &pools)?;
            let dump = rowset_to_dump("cp_pool", pools);
            rows += dump.rows.len() as u64;
            archive.write_entry(&format!("cp_pool-{}.json", depth), &dump)?;

            debug!(depth, pools = pids.len(), "descending pool chain");
        }

        Ok(rows)
    }

    /// Replay the chain entries in depth order until one is absent.
    async fn import_chain(
        &self,
        ctx: &MigrationContext,
        archive: &mut ArchiveReader,
    ) -> Result<u64> {
        let mut rows = 0;
        let mut depth = 0u32;

        loop {
            match archive.try_read_entry(&format!("cp_pool-{}.json", depth))? {
                Some(dump) => rows += import_dump(ctx, &dump, &[]).await?,
                None => break,
            }
            match archive.try_read_entry(&format!("cp_entitlement-{}.json", depth))? {
                Some(dump) => rows += import_dump(ctx, &dump, &[]).await?,
                None => break,
            }
            depth += 1;
        }

        Ok(rows)
    }
}

/// Pull the `id` column out of a result set for the next level's IN list.
fn collect_ids(table: &str, rowset: &RowSet) -> Result<Vec<DbValue>> {
    let idx = rowset
        .column_index("id")
        .ok_or_else(|| MigrateError::malformed(table, "result lacks an id column"))?;
    Ok(rowset.rows.iter().map(|row| row[idx].clone()).collect())
}

/// Run an `IN`-list query, splitting `ids` into blocks of at most
/// [`PARAM_LIMIT`] parameters and concatenating the results.
async fn fetch_chunked(
    store: &dyn RowStore,
    prefix: &str,
    suffix: &str,
    ids: &[DbValue],
) -> Result<RowSet> {
    let mut columns = Vec::new();
    let mut rows = Vec::new();

    for block in ids.chunks(PARAM_LIMIT) {
        let sql = format!("{}{}{}", prefix, bind_markers(block.len()), suffix);
        let mut rowset = store.query(&sql, block).await?;
        columns = rowset.columns;
        rows.append(&mut rowset.rows);
    }

    Ok(RowSet { columns, rows })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    struct ChunkStore {
        calls: Mutex<Vec<(String, usize)>>,
        responses: Mutex<VecDeque<RowSet>>,
    }

    impl ChunkStore {
        fn new(responses: Vec<RowSet>) -> Self {
            ChunkStore {
                calls: Mutex::new(Vec::new()),
                responses: Mutex::new(responses.into()),
            }
        }
    }

    #[async_trait]
    impl RowStore for ChunkStore {
        async fn query(&self, sql: &str, params: &[DbValue]) -> Result<RowSet> {
            self.calls
                .lock()
                .unwrap()
                .push((sql.to_string(), params.len()));
            Ok(self
                .responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_default())
        }

        async fn execute(&self, _sql: &str, _params: &[DbValue]) -> Result<u64> {
            Ok(0)
        }

        async fn begin(&self) -> Result<()> {
            Ok(())
        }

        async fn commit(&self) -> Result<()> {
            Ok(())
        }

        async fn rollback(&self) -> Result<()> {
            Ok(())
        }

        fn backend(&self) -> &'static str {
            "test"
        }
    }

    fn id_row(id: &str) -> Vec<DbValue> {
        vec![DbValue::Text(id.to_string())]
    }

    #[tokio::test]
    async fn test_fetch_chunked_splits_large_id_lists() {
        let ids: Vec<DbValue> = (0..PARAM_LIMIT + 1)
            .map(|i| DbValue::Text(format!("p{}", i)))
            .collect();

        let store = ChunkStore::new(vec![
            RowSet {
                columns: vec!["id".to_string()],
                rows: vec![id_row("e1"), id_row("e2")],
            },
            RowSet {
                columns: vec!["id".to_string()],
                rows: vec![id_row("e3")],
            },
        ]);

        let rowset = fetch_chunked(
            &store,
            "SELECT e.* FROM cp_entitlement e WHERE e.pool_id IN (",
            ") ORDER BY created ASC",
            &ids,
        )
        .await
        .unwrap();

        let calls = store.calls.lock().unwrap();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].1, PARAM_LIMIT);
        assert_eq!(calls[1].1, 1);
        assert_eq!(calls[0].0.matches('?').count(), PARAM_LIMIT);
        assert_eq!(calls[1].0.matches('?').count(), 1);

        // Rows concatenate across chunks in query order.
        assert_eq!(rowset.columns, vec!["id".to_string()]);
        assert_eq!(
            rowset.rows,
            vec![id_row("e1"), id_row("e2"), id_row("e3")]
        );
    }

    #[tokio::test]
    async fn test_fetch_chunked_single_block() {
        let store = ChunkStore::new(vec![RowSet {
            columns: vec!["id".to_string()],
            rows: vec![id_row("e1")],
        }]);

        let rowset = fetch_chunked(
            &store,
            "SELECT p.* FROM cp_pool p WHERE p.sourceentitlement_id IN (",
            ") ORDER BY created ASC",
            &[DbValue::Text("e0".to_string())],
        )
        .await
        .unwrap();

        assert_eq!(store.calls.lock().unwrap().len(), 1);
        assert_eq!(rowset.rows, vec![id_row("e1")]);
    }

    #[test]
    fn test_collect_ids() {
        let rowset = RowSet {
            columns: vec!["id".to_string(), "owner_id".to_string()],
            rows: vec![
                vec![DbValue::Text("p1".into()), DbValue::Text("o1".into())],
                vec![DbValue::Text("p2".into()), DbValue::Text("o1".into())],
            ],
        };
        let ids = collect_ids("cp_pool", &rowset).unwrap();
        assert_eq!(
            ids,
            vec![DbValue::Text("p1".into()), DbValue::Text("p2".into())]
        );
    }

    #[test]
    fn test_collect_ids_requires_id_column() {
        let rowset = RowSet {
            columns: vec!["owner_id".to_string()],
            rows: vec![],
        };
        assert!(collect_ids("cp_pool", &rowset).is_err());
    }
}
