// SQLite adapter over a single rusqlite connection
use rusqlite::types::ValueRef;
use rusqlite::{params_from_iter, Connection};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

use crate::api::middleware::AppError;
use crate::models::{Column, DbType, QueryResult};
use crate::services::database::adapter::DatabaseAdapter;

pub struct SqliteAdapter {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteAdapter {
    /// Open `sqlite://<path>`; the file must already exist
    pub fn new(connection_url: &str) -> Result<Self, AppError> {
        let path = connection_url
            .split_once("://")
            .map(|(_, rest)| rest)
            .unwrap_or(connection_url);
        if path.is_empty() {
            return Err(AppError::Validation("SQLite URL must include a file path".to_string()));
        }

        let flags = rusqlite::OpenFlags::SQLITE_OPEN_READ_WRITE | rusqlite::OpenFlags::SQLITE_OPEN_URI;
        let conn = Connection::open_with_flags(path, flags)
            .map_err(|e| AppError::Connection(format!("Failed to open SQLite database: {}", e)))?;
        conn.busy_timeout(Duration::from_secs(5))
            .map_err(|e| AppError::Connection(e.to_string()))?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn value_to_json(value: ValueRef<'_>) -> Value {
        match value {
            ValueRef::Null => Value::Null,
            ValueRef::Integer(i) => json!(i),
            ValueRef::Real(f) => json!(f),
            ValueRef::Text(t) => json!(String::from_utf8_lossy(t)),
            ValueRef::Blob(b) => json!(format!("<{} bytes>", b.len())),
        }
    }
}

#[async_trait::async_trait]
impl DatabaseAdapter for SqliteAdapter {
    fn database_type(&self) -> DbType {
        DbType::Sqlite
    }

    async fn test_connection(&self) -> Result<(), AppError> {
        let conn = self.conn.lock().await;
        conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))
            .map_err(|e| AppError::Connection(format!("Connection test failed: {}", e)))?;
        Ok(())
    }

    async fn list_tables(&self) -> Result<Vec<String>, AppError> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
        )?;
        let names = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(names)
    }

    async fn get_columns(&self, table: &str) -> Result<Vec<Column>, AppError> {
        let conn = self.conn.lock().await;
        let sql = format!("PRAGMA table_info({})", self.quote_ident(table));
        let mut stmt = conn.prepare(&sql)?;
        let columns = stmt
            .query_map([], |row| {
                let data_type: String = row.get(2)?;
                Ok(Column {
                    name: row.get(1)?,
                    native_type: data_type.clone(),
                    data_type,
                    is_nullable: row.get::<_, i64>(3)? == 0,
                    default_value: row.get(4)?,
                    is_primary_key: row.get::<_, i64>(5)? > 0,
                    comment: None,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(columns)
    }

    async fn query(
        &self,
        sql: &str,
        params: &[Option<String>],
        _timeout_secs: u64,
    ) -> Result<QueryResult, AppError> {
        let conn = self.conn.lock().await;
        let start_time = Instant::now();

        let mut stmt = conn
            .prepare(sql)
            .map_err(|e| AppError::Database(format!("Query execution failed: {}", e)))?;
        let columns: Vec<String> = stmt.column_names().iter().map(|c| c.to_string()).collect();
        let width = columns.len();

        let mut rows = stmt.query(params_from_iter(params.iter()))?;
        let mut json_rows = Vec::new();
        while let Some(row) = rows.next()? {
            let mut cells = Vec::with_capacity(width);
            for idx in 0..width {
                cells.push(Self::value_to_json(row.get_ref(idx)?));
            }
            json_rows.push(cells);
        }

        Ok(QueryResult::new(
            columns,
            json_rows,
            start_time.elapsed().as_millis() as u64,
        ))
    }

    async fn execute(&self, sql: &str, params: &[Option<String>]) -> Result<u64, AppError> {
        let conn = self.conn.lock().await;
        let affected = conn
            .execute(sql, params_from_iter(params.iter()))
            .map_err(|e| AppError::Database(format!("Statement failed: {}", e)))?;
        Ok(affected as u64)
    }
}
