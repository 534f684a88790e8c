// MySQL adapter using connection pooling for optimal resource management
use mysql_async::consts::ColumnType;
use mysql_async::{prelude::*, Conn, Opts, Params, Pool, Row, Value as MySqlValue};
use serde_json::{json, Value};
use std::time::{Duration, Instant};

use crate::api::middleware::AppError;
use crate::models::{Column, DbType, QueryResult};
use crate::services::database::adapter::DatabaseAdapter;

pub struct MySQLAdapter {
    pool: Pool,
}

impl MySQLAdapter {
    pub fn new(connection_url: &str) -> Result<Self, AppError> {
        // mysql_async only understands the mysql:// scheme
        let normalized = match connection_url.split_once("://") {
            Some((_, rest)) => format!("mysql://{}", rest),
            None => connection_url.to_string(),
        };
        let opts = Opts::from_url(&normalized)
            .map_err(|e| AppError::Validation(format!("Invalid MySQL URL: {}", e)))?;

        Ok(Self {
            pool: Pool::new(opts),
        })
    }

    /// Get a connection from the pool
    async fn get_conn(&self) -> Result<Conn, AppError> {
        self.pool
            .get_conn()
            .await
            .map_err(|e| AppError::Connection(format!("Failed to get MySQL connection from pool: {}", e)))
    }

    fn params(params: &[Option<String>]) -> Params {
        if params.is_empty() {
            Params::Empty
        } else {
            Params::Positional(params.iter().cloned().map(MySqlValue::from).collect())
        }
    }

    /// Convert a MySQL value to JSON using the column type for decimals and dates
    fn mysql_value_to_json(mysql_val: MySqlValue, column_type: ColumnType) -> Value {
        match mysql_val {
            MySqlValue::NULL => Value::Null,
            MySqlValue::Bytes(bytes) => {
                let text = match String::from_utf8(bytes) {
                    Ok(s) => s,
                    Err(e) => return json!(format!("<{} bytes>", e.as_bytes().len())),
                };
                match column_type {
                    ColumnType::MYSQL_TYPE_NEWDECIMAL | ColumnType::MYSQL_TYPE_DECIMAL => text
                        .parse::<f64>()
                        .map(|f| json!(f))
                        .unwrap_or_else(|_| json!(text)),
                    _ => json!(text),
                }
            }
            MySqlValue::Int(i) => json!(i),
            MySqlValue::UInt(u) => json!(u),
            MySqlValue::Float(f) => json!(f),
            MySqlValue::Double(d) => json!(d),
            MySqlValue::Date(y, m, d, h, min, s, _) => {
                if column_type == ColumnType::MYSQL_TYPE_DATE {
                    json!(format!("{:04}-{:02}-{:02}", y, m, d))
                } else {
                    json!(format!("{:04}-{:02}-{:02}T{:02}:{:02}:{:02}", y, m, d, h, min, s))
                }
            }
            MySqlValue::Time(is_neg, d, h, m, s, _) => {
                let sign = if is_neg { "-" } else { "" };
                let total_hours = d * 24 + h as u32;
                json!(format!("{}{}:{:02}:{:02}", sign, total_hours, m, s))
            }
        }
    }
}

#[async_trait::async_trait]
impl DatabaseAdapter for MySQLAdapter {
    fn database_type(&self) -> DbType {
        DbType::Mysql
    }

    async fn test_connection(&self) -> Result<(), AppError> {
        let mut conn = self.get_conn().await?;
        conn.query_drop("SELECT 1")
            .await
            .map_err(|e| AppError::Connection(format!("Connection test failed: {}", e)))
    }

    async fn list_tables(&self) -> Result<Vec<String>, AppError> {
        let mut conn = self.get_conn().await?;
        conn.query(
            r#"
            SELECT TABLE_NAME
            FROM information_schema.TABLES
            WHERE TABLE_SCHEMA = DATABASE() AND TABLE_TYPE = 'BASE TABLE'
            ORDER BY TABLE_NAME
            "#,
        )
        .await
        .map_err(|e| AppError::Database(format!("Failed to get tables: {}", e)))
    }

    async fn get_columns(&self, table: &str) -> Result<Vec<Column>, AppError> {
        let mut conn = self.get_conn().await?;
        let query = r#"
            SELECT
                c.COLUMN_NAME,
                c.DATA_TYPE,
                c.COLUMN_TYPE,
                c.IS_NULLABLE,
                c.COLUMN_DEFAULT,
                CASE WHEN c.COLUMN_KEY = 'PRI' THEN 1 ELSE 0 END as is_primary_key,
                c.COLUMN_COMMENT
            FROM information_schema.COLUMNS c
            WHERE c.TABLE_SCHEMA = DATABASE() AND c.TABLE_NAME = ?
            ORDER BY c.ORDINAL_POSITION
        "#;

        let rows: Vec<(String, String, String, String, Option<String>, i64, Option<String>)> = conn
            .exec(query, (table,))
            .await
            .map_err(|e| AppError::Database(format!("Failed to get columns: {}", e)))?;

        Ok(rows
            .into_iter()
            .map(|(name, data_type, column_type, is_nullable, default_value, is_pk, comment)| Column {
                name,
                data_type,
                native_type: column_type,
                is_nullable: is_nullable == "YES",
                default_value,
                is_primary_key: is_pk == 1,
                comment: comment.filter(|c| !c.is_empty()),
            })
            .collect())
    }

    async fn query(
        &self,
        sql: &str,
        params: &[Option<String>],
        timeout_secs: u64,
    ) -> Result<QueryResult, AppError> {
        let mut conn = self.get_conn().await?;
        let start_time = Instant::now();

        // Prepared statements use the binary protocol, so numbers come back typed
        let work = async {
            let mut result = conn.exec_iter(sql, Self::params(params)).await?;
            let columns = result
                .columns_ref()
                .iter()
                .map(|c| (c.name_str().to_string(), c.column_type()))
                .collect::<Vec<_>>();
            let rows: Vec<Row> = result.collect().await?;
            Ok::<_, mysql_async::Error>((columns, rows))
        };

        let (columns, rows) = tokio::time::timeout(Duration::from_secs(timeout_secs), work)
            .await
            .map_err(|_| AppError::Database(format!("Query timeout after {} seconds", timeout_secs)))?
            .map_err(|e| AppError::Database(format!("Query execution failed: {}", e)))?;

        let json_rows = rows
            .into_iter()
            .map(|row| {
                (0..row.len())
                    .map(|idx| {
                        let val = row.as_ref(idx).cloned().unwrap_or(MySqlValue::NULL);
                        let column_type = columns
                            .get(idx)
                            .map(|(_, t)| *t)
                            .unwrap_or(ColumnType::MYSQL_TYPE_VAR_STRING);
                        Self::mysql_value_to_json(val, column_type)
                    })
                    .collect()
            })
            .collect();

        Ok(QueryResult::new(
            columns.into_iter().map(|(name, _)| name).collect(),
            json_rows,
            start_time.elapsed().as_millis() as u64,
        ))
    }

    async fn execute(&self, sql: &str, params: &[Option<String>]) -> Result<u64, AppError> {
        let mut conn = self.get_conn().await?;
        conn.exec_drop(sql, Self::params(params))
            .await
            .map_err(|e| AppError::Database(format!("Statement failed: {}", e)))?;
        Ok(conn.affected_rows())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decimal_and_date_conversion() {
        let decimal = MySqlValue::Bytes(b"4.99".to_vec());
        assert_eq!(
            MySQLAdapter::mysql_value_to_json(decimal, ColumnType::MYSQL_TYPE_NEWDECIMAL),
            json!(4.99)
        );

        let text = MySqlValue::Bytes(b"4.99".to_vec());
        assert_eq!(
            MySQLAdapter::mysql_value_to_json(text, ColumnType::MYSQL_TYPE_VAR_STRING),
            json!("4.99")
        );

        let date = MySqlValue::Date(2005, 5, 24, 0, 0, 0, 0);
        assert_eq!(
            MySQLAdapter::mysql_value_to_json(date.clone(), ColumnType::MYSQL_TYPE_DATE),
            json!("2005-05-24")
        );
        assert_eq!(
            MySQLAdapter::mysql_value_to_json(date, ColumnType::MYSQL_TYPE_DATETIME),
            json!("2005-05-24T00:00:00")
        );
    }

    #[tokio::test]
    async fn test_rejects_invalid_url() {
        assert!(MySQLAdapter::new("not a url").is_err());
    }

    #[tokio::test]
    async fn test_mariadb_scheme_and_quoting() {
        let adapter = MySQLAdapter::new("mariadb+asyncmy://app:pw@127.0.0.1:3306/sakila").unwrap();
        assert_eq!(adapter.database_type(), DbType::Mysql);
        assert_eq!(adapter.quote_ident("order"), "`order`");
        assert_eq!(adapter.placeholder(1, None), "?");
    }
}
