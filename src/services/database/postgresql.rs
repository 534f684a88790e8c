// PostgreSQL adapter using connection pooling for optimal resource management
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use deadpool_postgres::Pool;
use regex::Regex;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde_json::{json, Value};
use std::error::Error;
use std::time::{Duration, Instant};
use tokio_postgres::types::{FromSql, Kind, ToSql, Type};
use tokio_postgres::Row;

use crate::api::middleware::AppError;
use crate::models::{Column, DbType, QueryResult};
use crate::services::database::adapter::DatabaseAdapter;

pub struct PostgreSQLAdapter {
    pool: Pool,
    cast_pattern: Regex,
}

impl PostgreSQLAdapter {
    pub fn new(pool: Pool) -> Result<Self, AppError> {
        let cast_pattern = Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$")
            .map_err(|e| AppError::Internal(e.to_string()))?;
        Ok(Self { pool, cast_pattern })
    }

    async fn client(&self) -> Result<deadpool_postgres::Object, AppError> {
        self.pool
            .get()
            .await
            .map_err(|e| AppError::Connection(format!("Failed to get connection from pool: {}", e)))
    }

    fn db_error(context: &str, e: tokio_postgres::Error) -> AppError {
        let details = match e.as_db_error() {
            Some(db_error) => format!("Code: {}, Message: {}", db_error.code().code(), db_error.message()),
            None => e.to_string(),
        };
        AppError::Database(format!("{}: {}", context, details))
    }

    fn bind(params: &[Option<String>]) -> Vec<&(dyn ToSql + Sync)> {
        params.iter().map(|p| p as &(dyn ToSql + Sync)).collect()
    }

    /// NUMERIC as a JSON number; out-of-range values keep their exact text
    fn numeric_to_json(value: Decimal) -> Value {
        match value.to_f64() {
            Some(f) if f.is_finite() => json!(f),
            _ => json!(value.to_string()),
        }
    }

    fn cell_to_json(row: &Row, idx: usize) -> Value {
        let column = &row.columns()[idx];
        let ty = column.type_();
        let decoded = match *ty {
            Type::BOOL => row.try_get::<_, Option<bool>>(idx).map(|v| v.map(|v| json!(v))),
            Type::INT2 => row.try_get::<_, Option<i16>>(idx).map(|v| v.map(|v| json!(v))),
            Type::INT4 => row.try_get::<_, Option<i32>>(idx).map(|v| v.map(|v| json!(v))),
            Type::INT8 => row.try_get::<_, Option<i64>>(idx).map(|v| v.map(|v| json!(v))),
            Type::OID => row.try_get::<_, Option<u32>>(idx).map(|v| v.map(|v| json!(v))),
            Type::FLOAT4 => row.try_get::<_, Option<f32>>(idx).map(|v| v.map(|v| json!(v))),
            Type::FLOAT8 => row.try_get::<_, Option<f64>>(idx).map(|v| v.map(|v| json!(v))),
            Type::NUMERIC => row
                .try_get::<_, Option<Decimal>>(idx)
                .map(|v| v.map(Self::numeric_to_json)),
            Type::DATE => row
                .try_get::<_, Option<NaiveDate>>(idx)
                .map(|v| v.map(|d| json!(d.format("%Y-%m-%d").to_string()))),
            Type::TIMESTAMP => row
                .try_get::<_, Option<NaiveDateTime>>(idx)
                .map(|v| v.map(|dt| json!(dt.format("%Y-%m-%dT%H:%M:%S").to_string()))),
            Type::TIMESTAMPTZ => row
                .try_get::<_, Option<DateTime<Utc>>>(idx)
                .map(|v| v.map(|dt| json!(dt.to_rfc3339()))),
            Type::TIME => row
                .try_get::<_, Option<NaiveTime>>(idx)
                .map(|v| v.map(|t| json!(t.format("%H:%M:%S").to_string()))),
            Type::TEXT_ARRAY | Type::VARCHAR_ARRAY | Type::BPCHAR_ARRAY => row
                .try_get::<_, Option<Vec<Option<String>>>>(idx)
                .map(|v| v.map(|items| json!(items))),
            _ => row
                .try_get::<_, Option<PgText>>(idx)
                .map(|v| v.map(|t| json!(t.0))),
        };

        match decoded {
            Ok(Some(value)) => value,
            Ok(None) => Value::Null,
            Err(_) => json!(format!("<{}>", ty.name())),
        }
    }
}

/// Text-like values, including enum labels, read as UTF-8
struct PgText(String);

impl<'a> FromSql<'a> for PgText {
    fn from_sql(_ty: &Type, raw: &'a [u8]) -> Result<Self, Box<dyn Error + Sync + Send>> {
        Ok(PgText(std::str::from_utf8(raw)?.to_string()))
    }

    fn accepts(ty: &Type) -> bool {
        matches!(ty.kind(), Kind::Enum(_))
            || matches!(
                *ty,
                Type::TEXT | Type::VARCHAR | Type::BPCHAR | Type::NAME | Type::UNKNOWN | Type::CHAR
            )
            || ty.name() == "citext"
    }
}

#[async_trait::async_trait]
impl DatabaseAdapter for PostgreSQLAdapter {
    fn database_type(&self) -> DbType {
        DbType::Postgres
    }

    async fn test_connection(&self) -> Result<(), AppError> {
        let client = self.client().await?;
        client
            .query_one("SELECT 1", &[])
            .await
            .map_err(|e| Self::db_error("Connection test failed", e))?;
        Ok(())
    }

    async fn list_tables(&self) -> Result<Vec<String>, AppError> {
        let client = self.client().await?;
        let rows = client
            .query(
                r#"
                SELECT table_name::text
                FROM information_schema.tables
                WHERE table_schema = current_schema()
                  AND table_type = 'BASE TABLE'
                ORDER BY table_name
                "#,
                &[],
            )
            .await
            .map_err(|e| Self::db_error("Failed to get tables", e))?;

        Ok(rows.iter().map(|row| row.get::<_, String>(0)).collect())
    }

    async fn get_columns(&self, table: &str) -> Result<Vec<Column>, AppError> {
        let client = self.client().await?;
        let rows = client
            .query(
                r#"
                SELECT
                    c.column_name::text,
                    c.data_type::text,
                    c.udt_name::text,
                    c.is_nullable::text,
                    c.column_default::text,
                    EXISTS (
                        SELECT 1
                        FROM information_schema.table_constraints tc
                        JOIN information_schema.key_column_usage ku
                            ON tc.constraint_name = ku.constraint_name
                            AND tc.table_schema = ku.table_schema
                            AND tc.table_name = ku.table_name
                        WHERE tc.constraint_type = 'PRIMARY KEY'
                            AND tc.table_schema = c.table_schema
                            AND tc.table_name = c.table_name
                            AND ku.column_name = c.column_name
                    ) AS is_primary_key,
                    col_description(
                        format('%I.%I', c.table_schema, c.table_name)::regclass::oid,
                        c.ordinal_position::int
                    ) AS comment
                FROM information_schema.columns c
                WHERE c.table_schema = current_schema()
                  AND c.table_name::text = $1
                ORDER BY c.ordinal_position
                "#,
                &[&table],
            )
            .await
            .map_err(|e| Self::db_error("Failed to get columns", e))?;

        Ok(rows
            .iter()
            .map(|row| Column {
                name: row.get(0),
                data_type: row.get(1),
                native_type: row.get(2),
                is_nullable: row.get::<_, String>(3) == "YES",
                default_value: row.get(4),
                is_primary_key: row.try_get(5).unwrap_or(false),
                comment: row.get(6),
            })
            .collect())
    }

    async fn query(
        &self,
        sql: &str,
        params: &[Option<String>],
        timeout_secs: u64,
    ) -> Result<QueryResult, AppError> {
        let client = self.client().await?;
        let start_time = Instant::now();

        let work = async {
            let statement = client.prepare(sql).await?;
            let rows = client.query(&statement, &Self::bind(params)).await?;
            Ok::<_, tokio_postgres::Error>((statement, rows))
        };

        let (statement, rows) = tokio::time::timeout(Duration::from_secs(timeout_secs), work)
            .await
            .map_err(|_| AppError::Database(format!("Query timeout after {} seconds", timeout_secs)))?
            .map_err(|e| Self::db_error("Query execution failed", e))?;

        let columns = statement
            .columns()
            .iter()
            .map(|c| c.name().to_string())
            .collect::<Vec<_>>();

        let json_rows = rows
            .iter()
            .map(|row| (0..row.len()).map(|idx| Self::cell_to_json(row, idx)).collect())
            .collect();

        Ok(QueryResult::new(
            columns,
            json_rows,
            start_time.elapsed().as_millis() as u64,
        ))
    }

    async fn execute(&self, sql: &str, params: &[Option<String>]) -> Result<u64, AppError> {
        let client = self.client().await?;
        client
            .execute(sql, &Self::bind(params))
            .await
            .map_err(|e| Self::db_error("Statement failed", e))
    }

    /// `$n`, cast from text to the column's type when it is known
    fn placeholder(&self, index: usize, column: Option<&Column>) -> String {
        match column {
            Some(col) if self.cast_pattern.is_match(&col.native_type) => {
                format!("${}::text::\"{}\"", index, col.native_type)
            }
            _ => format!("${}", index),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numeric_to_json() {
        assert_eq!(PostgreSQLAdapter::numeric_to_json(Decimal::new(12345, 2)), json!(123.45));
        assert_eq!(PostgreSQLAdapter::numeric_to_json(Decimal::new(-100005, 1)), json!(-10000.5));
        assert_eq!(PostgreSQLAdapter::numeric_to_json(Decimal::ZERO), json!(0.0));
    }

    #[test]
    fn test_numeric_from_wire() {
        // 4.99 as sent by the server: ndigits 2, weight 0, positive, dscale 2, digits [4, 9900]
        let raw = [0u8, 2, 0, 0, 0, 0, 0, 2, 0, 4, 0x26, 0xAC];
        let value = Decimal::from_sql(&Type::NUMERIC, &raw).unwrap();
        assert_eq!(value, Decimal::new(499, 2));
        assert_eq!(PostgreSQLAdapter::numeric_to_json(value), json!(4.99));
    }

    #[tokio::test]
    async fn test_placeholder_casts() {
        let mut cfg = deadpool_postgres::Config::new();
        cfg.url = Some("postgresql://app@127.0.0.1:5432/db".to_string());
        let pool = cfg
            .create_pool(Some(deadpool_postgres::Runtime::Tokio1), tokio_postgres::NoTls)
            .unwrap();
        let adapter = PostgreSQLAdapter::new(pool).unwrap();

        let mut col = crate::services::database::adapter::test_support::column("rental_date", "timestamp without time zone", false);
        col.native_type = "timestamp".to_string();
        assert_eq!(adapter.placeholder(2, Some(&col)), "$2::text::\"timestamp\"");

        col.native_type = "weird type".to_string();
        assert_eq!(adapter.placeholder(3, Some(&col)), "$3");
        assert_eq!(adapter.placeholder(1, None), "$1");
        assert_eq!(adapter.quote_ident("a\"b"), "\"a\"\"b\"");
    }
}
