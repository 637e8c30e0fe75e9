//! MySQL/MariaDB row store over a single `sqlx` connection.

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use sqlx::mysql::{MySqlConnectOptions, MySqlConnection, MySqlRow};
use sqlx::{Column, ConnectOptions, Executor, Row, TypeInfo, ValueRef};
use tokio::sync::Mutex;
use tracing::info;

use crate::config::DbConfig;
use crate::error::Result;
use crate::store::{RowSet, RowStore};
use crate::value::{DbValue, DATE_FORMAT, TIMESTAMP_FORMAT, TIME_FORMAT};

/// MySQL implementation of [`RowStore`].
///
/// The run is single-threaded, so one connection behind a mutex is all the
/// concurrency model this needs; the mutex only serializes the borrow.
pub struct MySqlStore {
    conn: Mutex<MySqlConnection>,
}

impl MySqlStore {
    /// Connect with the given settings.
    pub async fn connect(config: &DbConfig) -> Result<Self> {
        let options = MySqlConnectOptions::new()
            .host(&config.host)
            .port(config.port())
            .username(&config.user)
            .password(&config.password)
            .database(&config.database);

        let conn = options.connect().await?;

        info!(
            "Connected to {}: {}:{}/{}",
            config.backend,
            config.host,
            config.port(),
            config.database
        );

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

#[async_trait]
impl RowStore for MySqlStore {
    async fn query(&self, sql: &str, params: &[DbValue]) -> Result<RowSet> {
        let mut conn = self.conn.lock().await;

        let mut query = sqlx::query(sql);
        for param in params {
            query = bind_value(query, param);
        }

        let rows: Vec<MySqlRow> = query.fetch_all(&mut *conn).await?;

        // Empty results carry no column metadata; ask the server to
        // describe the statement instead.
        let columns: Vec<String> = match rows.first() {
            Some(row) => row.columns().iter().map(|c| c.name().to_string()).collect(),
            None => {
                let describe = conn.describe(sql).await?;
                describe
                    .columns()
                    .iter()
                    .map(|c| c.name().to_string())
                    .collect()
            }
        };

        let rows = rows.iter().map(row_to_values).collect();

        Ok(RowSet { columns, rows })
    }

    async fn execute(&self, sql: &str, params: &[DbValue]) -> Result<u64> {
        let mut conn = self.conn.lock().await;

        let mut query = sqlx::query(sql);
        for param in params {
            query = bind_value(query, param);
        }

        Ok(query.execute(&mut *conn).await?.rows_affected())
    }

    async fn begin(&self) -> Result<()> {
        let mut conn = self.conn.lock().await;
        conn.execute("START TRANSACTION").await?;
        Ok(())
    }

    async fn commit(&self) -> Result<()> {
        let mut conn = self.conn.lock().await;
        conn.execute("COMMIT").await?;
        Ok(())
    }

    async fn rollback(&self) -> Result<()> {
        let mut conn = self.conn.lock().await;
        conn.execute("ROLLBACK").await?;
        Ok(())
    }

    fn backend(&self) -> &'static str {
        "mysql"
    }
}

type MySqlQuery<'q> =
    sqlx::query::Query<'q, sqlx::MySql, sqlx::mysql::MySqlArguments>;

/// Bind one value. MySQL coerces text to temporal/decimal columns, so the
/// archive's text forms bind directly.
fn bind_value<'q>(query: MySqlQuery<'q>, value: &DbValue) -> MySqlQuery<'q> {
    match value {
        DbValue::Null => query.bind(None::<String>),
        DbValue::Bool(v) => query.bind(*v),
        DbValue::Int(v) => query.bind(*v),
        DbValue::Float(v) => query.bind(*v),
        DbValue::Text(v) => query.bind(v.clone()),
        DbValue::Bytes(v) => query.bind(v.clone()),
    }
}

/// Convert one result row, dispatching on the server-reported type name.
fn row_to_values(row: &MySqlRow) -> Vec<DbValue> {
    row.columns()
        .iter()
        .enumerate()
        .map(|(idx, col)| {
            let is_null = row.try_get_raw(idx).map(|r| r.is_null()).unwrap_or(true);
            if is_null {
                return DbValue::Null;
            }

            match col.type_info().name() {
                "BOOLEAN" => row
                    .try_get::<bool, _>(idx)
                    .map(DbValue::Bool)
                    .unwrap_or(DbValue::Null),
                "TINYINT" => row
                    .try_get::<i8, _>(idx)
                    .map(|v| DbValue::Int(v as i64))
                    .unwrap_or(DbValue::Null),
                "SMALLINT" => row
                    .try_get::<i16, _>(idx)
                    .map(|v| DbValue::Int(v as i64))
                    .unwrap_or(DbValue::Null),
                "MEDIUMINT" | "INT" => row
                    .try_get::<i32, _>(idx)
                    .map(|v| DbValue::Int(v as i64))
                    .unwrap_or(DbValue::Null),
                "BIGINT" => row
                    .try_get::<i64, _>(idx)
                    .map(DbValue::Int)
                    .unwrap_or(DbValue::Null),
                "TINYINT UNSIGNED" | "SMALLINT UNSIGNED" | "MEDIUMINT UNSIGNED"
                | "INT UNSIGNED" | "BIGINT UNSIGNED" => row
                    .try_get::<u64, _>(idx)
                    .map(|v| DbValue::Int(v as i64))
                    .unwrap_or(DbValue::Null),
                "FLOAT" => row
                    .try_get::<f32, _>(idx)
                    .map(|v| DbValue::Float(v as f64))
                    .unwrap_or(DbValue::Null),
                "DOUBLE" => row
                    .try_get::<f64, _>(idx)
                    .map(DbValue::Float)
                    .unwrap_or(DbValue::Null),
                "DECIMAL" => row
                    .try_get::<rust_decimal::Decimal, _>(idx)
                    .map(|v| DbValue::Text(v.to_string()))
                    .unwrap_or(DbValue::Null),
                "DATE" => row
                    .try_get::<NaiveDate, _>(idx)
                    .map(|v| DbValue::Text(v.format(DATE_FORMAT).to_string()))
                    .unwrap_or(DbValue::Null),
                "TIME" => row
                    .try_get::<NaiveTime, _>(idx)
                    .map(|v| DbValue::Text(v.format(TIME_FORMAT).to_string()))
                    .unwrap_or(DbValue::Null),
                "DATETIME" | "TIMESTAMP" => row
                    .try_get::<NaiveDateTime, _>(idx)
                    .map(|v| DbValue::Text(v.format(TIMESTAMP_FORMAT).to_string()))
                    .unwrap_or(DbValue::Null),
                "BINARY" | "VARBINARY" | "TINYBLOB" | "BLOB" | "MEDIUMBLOB" | "LONGBLOB" => row
                    .try_get::<Vec<u8>, _>(idx)
                    .map(DbValue::Bytes)
                    .unwrap_or(DbValue::Null),
                // CHAR/VARCHAR/TEXT/ENUM/SET and anything else: text, with a
                // bytes fallback for unexpected collations.
                _ => row
                    .try_get::<String, _>(idx)
                    .map(DbValue::Text)
                    .or_else(|_| row.try_get::<Vec<u8>, _>(idx).map(DbValue::Bytes))
                    .unwrap_or(DbValue::Null),
            }
        })
        .collect()
}
