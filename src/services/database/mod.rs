// Database abstraction layer for multi-database support
pub mod adapter;
pub mod mysql;
pub mod postgresql;
pub mod sqlite;

pub use adapter::DatabaseAdapter;
pub use mysql::MySQLAdapter;
pub use postgresql::PostgreSQLAdapter;
pub use sqlite::SqliteAdapter;

use regex::Regex;

use crate::api::middleware::AppError;
use crate::models::DbType;
use crate::services::connection_string::mask_credentials;
use crate::services::ConnectionPoolManager;

/// Vendor named by the URL scheme; `+driver` suffixes are ignored
pub fn db_type_from_url(connection_url: &str) -> Result<DbType, AppError> {
    let scheme = connection_url
        .split_once("://")
        .map(|(scheme, _)| scheme)
        .ok_or_else(|| AppError::Validation("Invalid connection string format.".to_string()))?;
    let vendor = scheme.split('+').next().unwrap_or(scheme);
    DbType::from_str(vendor)
}

/// Factory function to create appropriate database adapter
/// For PostgreSQL, uses connection pooling for optimal resource management
pub async fn create_adapter(
    connection_url: &str,
    pool_manager: &ConnectionPoolManager,
) -> Result<Box<dyn DatabaseAdapter>, AppError> {
    match db_type_from_url(connection_url)? {
        DbType::Postgres => {
            // tokio-postgres does not accept driver suffixes in the scheme
            let url = match connection_url.split_once("://") {
                Some((_, rest)) => format!("postgresql://{}", rest),
                None => connection_url.to_string(),
            };
            let pool = pool_manager.get_or_create_pool(&url).await?;
            Ok(Box::new(PostgreSQLAdapter::new(pool)?))
        }
        DbType::Mysql => Ok(Box::new(MySQLAdapter::new(connection_url)?)),
        DbType::Sqlite => Ok(Box::new(SqliteAdapter::new(connection_url)?)),
    }
}

/// Validate the connection string, open an adapter and run the liveness probe
pub async fn connect_db(
    connection_url: &str,
    pool_manager: &ConnectionPoolManager,
) -> Result<Box<dyn DatabaseAdapter>, AppError> {
    let format = Regex::new(r"^[a-zA-Z0-9_+\-]+://").map_err(|e| AppError::Internal(e.to_string()))?;
    if !format.is_match(connection_url) {
        return Err(AppError::Validation("Invalid connection string format.".to_string()));
    }

    let connect_error = |e: AppError| AppError::Connection(format!("Failed to connect to database: {}", e.message()));

    let adapter = create_adapter(connection_url, pool_manager)
        .await
        .map_err(connect_error)?;

    if let Err(e) = adapter.test_connection().await {
        tracing::warn!("Connection probe failed for {}: {}", mask_credentials(connection_url), e);
        if adapter.database_type() == DbType::Postgres {
            if let Some((_, rest)) = connection_url.split_once("://") {
                pool_manager.remove_pool(&format!("postgresql://{}", rest)).await;
            }
        }
        return Err(connect_error(e));
    }

    Ok(adapter)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_db_type_from_url() {
        assert_eq!(db_type_from_url("postgresql://u:p@h/db").unwrap(), DbType::Postgres);
        assert_eq!(db_type_from_url("postgresql+psycopg2://u@h/db").unwrap(), DbType::Postgres);
        assert_eq!(db_type_from_url("mysql+pymysql://u@h/db").unwrap(), DbType::Mysql);
        assert_eq!(db_type_from_url("sqlite:///tmp/a.db").unwrap(), DbType::Sqlite);
        assert!(db_type_from_url("oracle://u@h/db").is_err());
        assert!(db_type_from_url("no-scheme").is_err());
    }

    #[tokio::test]
    async fn test_connect_db_rejects_bad_format() {
        let manager = ConnectionPoolManager::new();
        let err = connect_db("localhost:5432/db", &manager).await.err().unwrap();
        assert_eq!(err.message(), "Invalid connection string format.");
    }

    #[tokio::test]
    async fn test_connect_db_reports_failures() {
        let manager = ConnectionPoolManager::new();
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite://{}/missing.db", dir.path().display());
        let err = connect_db(&url, &manager).await.err().unwrap();
        assert!(err.message().starts_with("Failed to connect to database:"));
    }

    #[tokio::test]
    async fn test_connect_db_sqlite() {
        let file = tempfile::NamedTempFile::new().unwrap();
        rusqlite::Connection::open(file.path()).unwrap();
        let manager = ConnectionPoolManager::new();
        let adapter = connect_db(&format!("sqlite://{}", file.path().display()), &manager)
            .await
            .unwrap();
        assert_eq!(adapter.database_type(), DbType::Sqlite);
    }
}
