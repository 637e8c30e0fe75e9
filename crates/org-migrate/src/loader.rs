//! Bulk row loading: plain batch insert and the natural-key upsert used
//! for reference tables.
//!
//! Every batch is one transaction: a failed row rolls the whole batch back
//! and the error propagates; batches already committed by earlier entries
//! stay committed.

use serde_json::Value;
use tracing::debug;

use crate::error::{MigrateError, Result};
use crate::ident::validate_columns;
use crate::store::{bind_markers, RowStore};
use crate::value::DbValue;

/// Counts reported by [`upsert_by_label`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpsertStats {
    pub inserted: u64,
    pub updated: u64,
}

/// Insert `rows` into `table` with a single reused parameterized statement.
///
/// Columns named in `decode` hold base64 text in the archive and are
/// decoded to raw bytes before binding. Identifier validation runs before
/// any SQL is assembled.
pub async fn bulk_insert(
    store: &dyn RowStore,
    table: &str,
    columns: &[String],
    rows: &[Vec<Value>],
    decode: &[&str],
) -> Result<u64> {
    debug!(table, rows = rows.len(), "importing rows");

    validate_columns(table, columns)?;

    if rows.is_empty() {
        return Ok(0);
    }

    let insert_stmt = format!(
        "INSERT INTO {} ({}) VALUES ({})",
        table,
        columns.join(", "),
        bind_markers(columns.len())
    );

    let decode_idx = decode_indexes(table, columns, decode)?;

    store.begin().await?;
    match insert_rows(store, table, &insert_stmt, rows, &decode_idx).await {
        Ok(count) => {
            store.commit().await?;
            Ok(count)
        }
        Err(e) => {
            let _ = store.rollback().await;
            Err(e)
        }
    }
}

async fn insert_rows(
    store: &dyn RowStore,
    table: &str,
    insert_stmt: &str,
    rows: &[Vec<Value>],
    decode_idx: &[usize],
) -> Result<u64> {
    let mut count = 0;
    for row in rows {
        let params = row_params(table, row, decode_idx)?;
        count += store.execute(insert_stmt, &params).await?;
    }
    Ok(count)
}

/// Insert-or-update rows keyed by the business-unique `label` column.
///
/// No parameterized statement form performs an upsert portably across the
/// supported backends, so each row is looked up by label first: a hit
/// updates the existing row by primary key, a miss inserts. One
/// transaction for the whole batch.
pub async fn upsert_by_label(
    store: &dyn RowStore,
    table: &str,
    columns: &[String],
    rows: &[Vec<Value>],
) -> Result<UpsertStats> {
    debug!(table, rows = rows.len(), "upserting rows");

    validate_columns(table, columns)?;

    let label_idx = columns
        .iter()
        .position(|c| c == "label")
        .ok_or_else(|| MigrateError::MissingNaturalKey(table.to_string()))?;

    if rows.is_empty() {
        return Ok(UpsertStats::default());
    }

    let insert_stmt = format!(
        "INSERT INTO {} ({}) VALUES ({})",
        table,
        columns.join(", "),
        bind_markers(columns.len())
    );
    let update_stmt = format!(
        "UPDATE {} SET {} WHERE id = ?",
        table,
        columns
            .iter()
            .map(|c| format!("{} = ?", c))
            .collect::<Vec<_>>()
            .join(", ")
    );
    let select_stmt = format!("SELECT id FROM {} WHERE label = ?", table);

    store.begin().await?;
    match upsert_rows(
        store,
        table,
        &select_stmt,
        &insert_stmt,
        &update_stmt,
        rows,
        label_idx,
    )
    .await
    {
        Ok(stats) => {
            store.commit().await?;
            debug!(
                table,
                updated = stats.updated,
                inserted = stats.inserted,
                "upsert committed"
            );
            Ok(stats)
        }
        Err(e) => {
            let _ = store.rollback().await;
            Err(e)
        }
    }
}

#[allow(clippy::too_many_arguments)]
async fn upsert_rows(
    store: &dyn RowStore,
    table: &str,
    select_stmt: &str,
    insert_stmt: &str,
    update_stmt: &str,
    rows: &[Vec<Value>],
    label_idx: usize,
) -> Result<UpsertStats> {
    let mut stats = UpsertStats::default();

    for row in rows {
        let params = row_params(table, row, &[])?;
        let label = params[label_idx].clone();

        let existing = store.query(select_stmt, &[label]).await?;
        match existing.rows.first().and_then(|r| r.first()) {
            Some(id) => {
                let mut update_params = params;
                update_params.push(id.clone());
                stats.updated += store.execute(update_stmt, &update_params).await?;
            }
            None => {
                stats.inserted += store.execute(insert_stmt, &params).await?;
            }
        }
    }

    Ok(stats)
}

/// Resolve decode column names to indexes; unknown names are malformed.
fn decode_indexes(table: &str, columns: &[String], decode: &[&str]) -> Result<Vec<usize>> {
    decode
        .iter()
        .map(|name| {
            columns
                .iter()
                .position(|c| c == name)
                .ok_or_else(|| {
                    MigrateError::malformed(table, format!("missing binary column: {}", name))
                })
        })
        .collect()
}

/// Convert one archive row into bind parameters, decoding flagged columns.
fn row_params(table: &str, row: &[Value], decode_idx: &[usize]) -> Result<Vec<DbValue>> {
    let mut params: Vec<DbValue> = row.iter().map(DbValue::from_json).collect();

    for &idx in decode_idx {
        params[idx] = match &params[idx] {
            DbValue::Null => DbValue::Null,
            DbValue::Text(s) => DbValue::Bytes(DbValue::decode_base64(s)?),
            other => {
                return Err(MigrateError::malformed(
                    table,
                    format!("binary column holds non-text value: {:?}", other),
                ))
            }
        };
    }

    Ok(params)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decode_indexes() {
        let columns = vec!["id".to_string(), "cert".to_string(), "privatekey".to_string()];
        assert_eq!(
            decode_indexes("cp_id_cert", &columns, &["cert", "privatekey"]).unwrap(),
            vec![1, 2]
        );
        assert!(decode_indexes("cp_id_cert", &columns, &["publickey"]).is_err());
    }

    #[test]
    fn test_row_params_decodes_binary_columns() {
        let encoded = DbValue::encode_base64(b"-----BEGIN CERT-----");
        let row = vec![json!("c1"), json!(encoded)];
        let params = row_params("cp_certificate", &row, &[1]).unwrap();
        assert_eq!(params[0], DbValue::Text("c1".into()));
        assert_eq!(params[1], DbValue::Bytes(b"-----BEGIN CERT-----".to_vec()));
    }

    #[test]
    fn test_row_params_null_binary_passes_through() {
        let row = vec![json!("c1"), Value::Null];
        let params = row_params("cp_certificate", &row, &[1]).unwrap();
        assert_eq!(params[1], DbValue::Null);
    }

    #[test]
    fn test_row_params_rejects_non_text_binary() {
        let row = vec![json!("c1"), json!(42)];
        assert!(row_params("cp_certificate", &row, &[1]).is_err());
    }
}
