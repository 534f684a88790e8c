// Database adapter trait for multi-database support
use crate::api::middleware::AppError;
use crate::models::{Column, DbType, QueryResult};

/// Database adapter trait - abstraction layer over the supported vendors.
///
/// Parameters are always bound as text (`None` binds NULL); each vendor
/// coerces them to the column type.
#[async_trait::async_trait]
pub trait DatabaseAdapter: Send + Sync {
    fn database_type(&self) -> DbType;

    /// Liveness probe (`SELECT 1`)
    async fn test_connection(&self) -> Result<(), AppError>;

    /// Base tables of the current schema/database, sorted by name
    async fn list_tables(&self) -> Result<Vec<String>, AppError>;

    /// Columns of `table` in ordinal order
    async fn get_columns(&self, table: &str) -> Result<Vec<Column>, AppError>;

    /// Run a row-returning statement
    async fn query(
        &self,
        sql: &str,
        params: &[Option<String>],
        timeout_secs: u64,
    ) -> Result<QueryResult, AppError>;

    /// Run a statement, returning the number of affected rows
    async fn execute(&self, sql: &str, params: &[Option<String>]) -> Result<u64, AppError>;

    fn quote_ident(&self, name: &str) -> String {
        match self.database_type() {
            DbType::Mysql => format!("`{}`", name.replace('`', "``")),
            DbType::Postgres | DbType::Sqlite => format!("\"{}\"", name.replace('"', "\"\"")),
        }
    }

    /// Bind marker for the `index`-th (1-based) parameter written into `column`
    fn placeholder(&self, index: usize, column: Option<&Column>) -> String {
        let _ = (index, column);
        "?".to_string()
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    /// Adapter returning canned results, for code that only needs the trait
    pub struct StaticAdapter {
        pub db_type: DbType,
        pub tables: Vec<(String, Vec<Column>)>,
        pub result: QueryResult,
    }

    pub fn column(name: &str, data_type: &str, is_primary_key: bool) -> Column {
        Column {
            name: name.to_string(),
            data_type: data_type.to_string(),
            native_type: data_type.to_string(),
            is_nullable: !is_primary_key,
            is_primary_key,
            default_value: None,
            comment: None,
        }
    }

    #[async_trait::async_trait]
    impl DatabaseAdapter for StaticAdapter {
        fn database_type(&self) -> DbType {
            self.db_type
        }

        async fn test_connection(&self) -> Result<(), AppError> {
            Ok(())
        }

        async fn list_tables(&self) -> Result<Vec<String>, AppError> {
            Ok(self.tables.iter().map(|(name, _)| name.clone()).collect())
        }

        async fn get_columns(&self, table: &str) -> Result<Vec<Column>, AppError> {
            self.tables
                .iter()
                .find(|(name, _)| name == table)
                .map(|(_, columns)| columns.clone())
                .ok_or_else(|| AppError::NotFound(format!("Table '{}' not found", table)))
        }

        async fn query(
            &self,
            _sql: &str,
            _params: &[Option<String>],
            _timeout_secs: u64,
        ) -> Result<QueryResult, AppError> {
            Ok(self.result.clone())
        }

        async fn execute(&self, _sql: &str, _params: &[Option<String>]) -> Result<u64, AppError> {
            Ok(1)
        }
    }
}
