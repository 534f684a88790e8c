use crate::api::middleware::AppError;
use crate::models::QueryResult;
use crate::services::database::DatabaseAdapter;
use crate::validation::SqlValidator;

/// Runs generated SQL behind the SELECT-only guard
pub struct QueryService {
    timeout_secs: u64,
}

impl QueryService {
    pub fn new(timeout_secs: u64) -> Self {
        Self { timeout_secs }
    }

    /// Validate SELECT-only, cap rows at `limit`, then execute
    pub async fn execute_guarded(
        &self,
        adapter: &dyn DatabaseAdapter,
        sql: &str,
        limit: u64,
    ) -> Result<QueryResult, AppError> {
        let (final_sql, limit_applied) = SqlValidator::validate_and_prepare(sql, limit)?;

        if limit_applied {
            tracing::info!("Applied LIMIT {} to query", limit);
        }
        tracing::debug!("Executing guarded query: {}", final_sql);

        let result = adapter.query(&final_sql, &[], self.timeout_secs).await?;

        tracing::info!(
            "Query returned {} rows in {}ms",
            result.row_count,
            result.execution_time_ms
        );
        Ok(result)
    }
}

impl Default for QueryService {
    fn default() -> Self {
        Self::new(30)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::database::SqliteAdapter;
    use serde_json::json;
    use tempfile::NamedTempFile;

    fn adapter() -> (NamedTempFile, SqliteAdapter) {
        let file = NamedTempFile::new().unwrap();
        let conn = rusqlite::Connection::open(file.path()).unwrap();
        conn.execute_batch(
            "CREATE TABLE category (category_id INTEGER PRIMARY KEY, name TEXT);
             INSERT INTO category (name) VALUES ('Action'), ('Animation'), ('Children');",
        )
        .unwrap();
        let adapter = SqliteAdapter::new(&format!("sqlite://{}", file.path().display())).unwrap();
        (file, adapter)
    }

    #[tokio::test]
    async fn test_row_limit_is_enforced() {
        let (_file, adapter) = adapter();
        let service = QueryService::default();
        let result = service
            .execute_guarded(&adapter, "SELECT name FROM category ORDER BY category_id;", 2)
            .await
            .unwrap();
        assert_eq!(result.row_count, 2);
        assert_eq!(result.rows[1][0], json!("Animation"));
    }

    #[tokio::test]
    async fn test_trailing_comment_after_terminator_runs() {
        let (_file, adapter) = adapter();
        let service = QueryService::default();
        let result = service
            .execute_guarded(&adapter, "SELECT name FROM category; -- all categories", 10)
            .await
            .unwrap();
        assert_eq!(result.row_count, 3);

        let result = service
            .execute_guarded(&adapter, "SELECT name FROM category ORDER BY name -- sorted\n;", 1)
            .await
            .unwrap();
        assert_eq!(result.rows, vec![vec![json!("Action")]]);
    }

    #[tokio::test]
    async fn test_writes_are_rejected() {
        let (_file, adapter) = adapter();
        let service = QueryService::default();
        let err = service
            .execute_guarded(&adapter, "DELETE FROM category", 10)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidSql(_)));

        let err = service
            .execute_guarded(&adapter, "SELECT 1; DELETE FROM category", 10)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidSql(_)));

        let still_there = service
            .execute_guarded(&adapter, "SELECT COUNT(*) AS n FROM category", 10)
            .await
            .unwrap();
        assert_eq!(still_there.rows[0][0], json!(3));
    }
}
