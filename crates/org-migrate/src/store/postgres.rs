//! PostgreSQL row store over a single `tokio-postgres` connection.

use bytes::BytesMut;
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use std::str::FromStr;
use tokio_postgres::types::{to_sql_checked, IsNull, ToSql, Type};
use tokio_postgres::{Client, Config as PgConfig, NoTls, Row};
use tracing::{error, info};

use async_trait::async_trait;

use crate::config::DbConfig;
use crate::error::Result;
use crate::store::{RowSet, RowStore};
use crate::value::{DbValue, DATE_FORMAT, TIMESTAMP_FORMAT, TIME_FORMAT};

/// Timestamp-with-offset text format used in archive entries.
const TIMESTAMPTZ_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f%:z";

/// PostgreSQL implementation of [`RowStore`].
pub struct PgStore {
    client: Client,
}

impl PgStore {
    /// Connect with the given settings. The connection driver runs on a
    /// background task; all statements go through the single client.
    pub async fn connect(config: &DbConfig) -> Result<Self> {
        let mut pg_config = PgConfig::new();
        pg_config.host(&config.host);
        pg_config.port(config.port());
        pg_config.dbname(&config.database);
        pg_config.user(&config.user);
        pg_config.password(&config.password);

        let (client, connection) = pg_config.connect(NoTls).await?;

        tokio::spawn(async move {
            if let Err(e) = connection.await {
                error!("PostgreSQL connection error: {}", e);
            }
        });

        info!(
            "Connected to PostgreSQL: {}:{}/{}",
            config.host,
            config.port(),
            config.database
        );

        Ok(Self { client })
    }
}

#[async_trait]
impl RowStore for PgStore {
    async fn query(&self, sql: &str, params: &[DbValue]) -> Result<RowSet> {
        let sql = rewrite_placeholders(sql);
        let stmt = self.client.prepare(&sql).await?;

        let columns: Vec<String> = stmt.columns().iter().map(|c| c.name().to_string()).collect();
        let types: Vec<Type> = stmt.columns().iter().map(|c| c.type_().clone()).collect();

        let args: Vec<&(dyn ToSql + Sync)> =
            params.iter().map(|p| p as &(dyn ToSql + Sync)).collect();
        let rows = self.client.query(&stmt, &args).await?;

        let rows = rows
            .iter()
            .map(|row| {
                types
                    .iter()
                    .enumerate()
                    .map(|(idx, ty)| pg_value(row, idx, ty))
                    .collect::<Result<Vec<DbValue>>>()
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(RowSet { columns, rows })
    }

    async fn execute(&self, sql: &str, params: &[DbValue]) -> Result<u64> {
        let sql = rewrite_placeholders(sql);
        let stmt = self.client.prepare(&sql).await?;
        let args: Vec<&(dyn ToSql + Sync)> =
            params.iter().map(|p| p as &(dyn ToSql + Sync)).collect();
        Ok(self.client.execute(&stmt, &args).await?)
    }

    async fn begin(&self) -> Result<()> {
        self.client.batch_execute("BEGIN").await?;
        Ok(())
    }

    async fn commit(&self) -> Result<()> {
        self.client.batch_execute("COMMIT").await?;
        Ok(())
    }

    async fn rollback(&self) -> Result<()> {
        self.client.batch_execute("ROLLBACK").await?;
        Ok(())
    }

    fn backend(&self) -> &'static str {
        "postgresql"
    }
}

/// Rewrite `?` placeholders to PostgreSQL's `$1..$n` style, leaving
/// quoted literals untouched.
fn rewrite_placeholders(sql: &str) -> String {
    let mut out = String::with_capacity(sql.len() + 8);
    let mut n = 0;
    let mut in_literal = false;

    for c in sql.chars() {
        match c {
            '\'' => {
                in_literal = !in_literal;
                out.push(c);
            }
            '?' if !in_literal => {
                n += 1;
                out.push('$');
                out.push_str(&n.to_string());
            }
            _ => out.push(c),
        }
    }

    out
}

/// Extract one column as a `DbValue` based on the statement's column type.
///
/// Temporal, numeric-decimal, uuid, and json values are carried as text in
/// the fixed archive formats; the `ToSql` impl below reverses this on
/// import. A value the driver cannot decode aborts the query; an archive
/// must never hold NULL where the source held data.
fn pg_value(row: &Row, idx: usize, ty: &Type) -> Result<DbValue> {
    let value = match *ty {
        Type::BOOL => row.try_get::<_, Option<bool>>(idx)?.map(DbValue::Bool),
        Type::INT2 => row
            .try_get::<_, Option<i16>>(idx)?
            .map(|v| DbValue::Int(v as i64)),
        Type::INT4 => row
            .try_get::<_, Option<i32>>(idx)?
            .map(|v| DbValue::Int(v as i64)),
        Type::INT8 => row.try_get::<_, Option<i64>>(idx)?.map(DbValue::Int),
        Type::FLOAT4 => row
            .try_get::<_, Option<f32>>(idx)?
            .map(|v| DbValue::Float(v as f64)),
        Type::FLOAT8 => row.try_get::<_, Option<f64>>(idx)?.map(DbValue::Float),
        Type::NUMERIC => row
            .try_get::<_, Option<Decimal>>(idx)?
            .map(|v| DbValue::Text(v.to_string())),
        Type::BYTEA => row.try_get::<_, Option<Vec<u8>>>(idx)?.map(DbValue::Bytes),
        Type::TIMESTAMP => row
            .try_get::<_, Option<NaiveDateTime>>(idx)?
            .map(|v| DbValue::Text(v.format(TIMESTAMP_FORMAT).to_string())),
        Type::TIMESTAMPTZ => row
            .try_get::<_, Option<DateTime<FixedOffset>>>(idx)?
            .map(|v| DbValue::Text(v.format(TIMESTAMPTZ_FORMAT).to_string())),
        Type::DATE => row
            .try_get::<_, Option<NaiveDate>>(idx)?
            .map(|v| DbValue::Text(v.format(DATE_FORMAT).to_string())),
        Type::TIME => row
            .try_get::<_, Option<NaiveTime>>(idx)?
            .map(|v| DbValue::Text(v.format(TIME_FORMAT).to_string())),
        Type::UUID => row
            .try_get::<_, Option<uuid::Uuid>>(idx)?
            .map(|v| DbValue::Text(v.to_string())),
        Type::JSON | Type::JSONB => row
            .try_get::<_, Option<serde_json::Value>>(idx)?
            .map(|v| DbValue::Text(v.to_string())),
        _ => row.try_get::<_, Option<String>>(idx)?.map(DbValue::Text),
    };

    Ok(value.unwrap_or(DbValue::Null))
}

type BoxError = Box<dyn std::error::Error + Sync + Send>;

fn mismatch(ty: &Type, value: &DbValue) -> BoxError {
    format!("cannot bind {:?} as {}", value, ty).into()
}

/// Bind a `DbValue` according to the prepared statement's parameter type.
///
/// Parameter types come from the destination columns, so archive text forms
/// are parsed back into the native type here.
impl ToSql for DbValue {
    fn to_sql(&self, ty: &Type, out: &mut BytesMut) -> std::result::Result<IsNull, BoxError> {
        if self.is_null() {
            return Ok(IsNull::Yes);
        }

        match *ty {
            Type::BOOL => {
                let v = match self {
                    DbValue::Bool(b) => *b,
                    DbValue::Int(i) => *i != 0,
                    DbValue::Text(s) => matches!(s.as_str(), "t" | "true" | "1"),
                    other => return Err(mismatch(ty, other)),
                };
                v.to_sql(ty, out)
            }
            Type::INT2 => int_param::<i16>(self, ty)?.to_sql(ty, out),
            Type::INT4 => int_param::<i32>(self, ty)?.to_sql(ty, out),
            Type::INT8 => int_param::<i64>(self, ty)?.to_sql(ty, out),
            Type::FLOAT4 => float_param(self, ty).map(|v| v as f32)?.to_sql(ty, out),
            Type::FLOAT8 => float_param(self, ty)?.to_sql(ty, out),
            Type::NUMERIC => {
                let v = match self {
                    DbValue::Int(i) => Decimal::from(*i),
                    DbValue::Float(f) => {
                        Decimal::from_f64(*f).ok_or_else(|| mismatch(ty, self))?
                    }
                    DbValue::Text(s) => Decimal::from_str(s)?,
                    other => return Err(mismatch(ty, other)),
                };
                v.to_sql(ty, out)
            }
            Type::BYTEA => match self {
                DbValue::Bytes(b) => b.as_slice().to_sql(ty, out),
                DbValue::Text(s) => s.as_bytes().to_sql(ty, out),
                other => Err(mismatch(ty, other)),
            },
            Type::TIMESTAMP => {
                let s = text_param(self, ty)?;
                let v = NaiveDateTime::parse_from_str(s, TIMESTAMP_FORMAT)
                    .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f"))?;
                v.to_sql(ty, out)
            }
            Type::TIMESTAMPTZ => {
                let s = text_param(self, ty)?;
                let v = DateTime::parse_from_str(s, TIMESTAMPTZ_FORMAT)
                    .or_else(|_| DateTime::parse_from_rfc3339(s))?;
                v.to_sql(ty, out)
            }
            Type::DATE => NaiveDate::parse_from_str(text_param(self, ty)?, DATE_FORMAT)?
                .to_sql(ty, out),
            Type::TIME => NaiveTime::parse_from_str(text_param(self, ty)?, TIME_FORMAT)?
                .to_sql(ty, out),
            Type::UUID => uuid::Uuid::parse_str(text_param(self, ty)?)?.to_sql(ty, out),
            Type::JSON | Type::JSONB => {
                let s = text_param(self, ty)?;
                let v: serde_json::Value = serde_json::from_str(s)
                    .unwrap_or_else(|_| serde_json::Value::String(s.to_string()));
                v.to_sql(ty, out)
            }
            _ => {
                // Text-ish targets (varchar, text, bpchar, domains).
                let s = match self {
                    DbValue::Text(s) => s.clone(),
                    DbValue::Int(i) => i.to_string(),
                    DbValue::Float(f) => f.to_string(),
                    DbValue::Bool(b) => b.to_string(),
                    other => return Err(mismatch(ty, other)),
                };
                s.to_sql(&Type::TEXT, out)
            }
        }
    }

    fn accepts(_ty: &Type) -> bool {
        true
    }

    to_sql_checked!();
}

fn int_param<T>(value: &DbValue, ty: &Type) -> std::result::Result<T, BoxError>
where
    T: TryFrom<i64> + FromStr,
    <T as TryFrom<i64>>::Error: std::error::Error + Sync + Send + 'static,
    <T as FromStr>::Err: std::error::Error + Sync + Send + 'static,
{
    match value {
        DbValue::Int(i) => Ok(T::try_from(*i)?),
        DbValue::Text(s) => Ok(s.parse::<T>()?),
        other => Err(mismatch(ty, other)),
    }
}

fn float_param(value: &DbValue, ty: &Type) -> std::result::Result<f64, BoxError> {
    match value {
        DbValue::Float(f) => Ok(*f),
        DbValue::Int(i) => Ok(*i as f64),
        DbValue::Text(s) => Ok(s.parse::<f64>()?),
        other => Err(mismatch(ty, other)),
    }
}

fn text_param<'a>(value: &'a DbValue, ty: &Type) -> std::result::Result<&'a str, BoxError> {
    match value {
        DbValue::Text(s) => Ok(s.as_str()),
        other => Err(mismatch(ty, other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rewrite_placeholders() {
        assert_eq!(
            rewrite_placeholders("SELECT id FROM cp_owner WHERE account = ?"),
            "SELECT id FROM cp_owner WHERE account = $1"
        );
        assert_eq!(
            rewrite_placeholders("INSERT INTO t (a, b) VALUES (?, ?)"),
            "INSERT INTO t (a, b) VALUES ($1, $2)"
        );
    }

    #[test]
    fn test_rewrite_skips_literals() {
        assert_eq!(
            rewrite_placeholders("SELECT '?' AS q, id FROM t WHERE id = ?"),
            "SELECT '?' AS q, id FROM t WHERE id = $1"
        );
    }

    #[test]
    fn test_rewrite_no_placeholders() {
        assert_eq!(
            rewrite_placeholders("SELECT * FROM cp_consumer_type"),
            "SELECT * FROM cp_consumer_type"
        );
    }
}
