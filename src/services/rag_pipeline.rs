use std::sync::Arc;

use crate::api::middleware::AppError;
use crate::models::QueryResult;
use crate::services::database::DatabaseAdapter;
use crate::services::embedding::Embedder;
use crate::services::llm_service::{build_sql_prompt, LanguageModel};
use crate::services::query_service::QueryService;
use crate::services::schema_introspector::build_schema_documents;
use crate::services::vector_store::SchemaRetriever;
use crate::validation::SqlValidator;

/// Generated SQL together with its rows
#[derive(Debug, Clone)]
pub struct RagAnswer {
    pub sql: String,
    pub result: QueryResult,
}

/// Question → retrieved schema → prompt → model → guarded execution
pub struct RagPipeline {
    llm: Arc<dyn LanguageModel>,
    embedder: Option<Arc<dyn Embedder>>,
    query_service: QueryService,
    top_k: usize,
    max_rows: u64,
}

impl RagPipeline {
    pub fn new(
        llm: Arc<dyn LanguageModel>,
        embedder: Option<Arc<dyn Embedder>>,
        query_service: QueryService,
        top_k: usize,
        max_rows: u64,
    ) -> Self {
        Self {
            llm,
            embedder,
            query_service,
            top_k,
            max_rows,
        }
    }

    pub async fn run(
        &self,
        adapter: &dyn DatabaseAdapter,
        question: &str,
        custom_prompt: &str,
    ) -> Result<RagAnswer, AppError> {
        let question = question.trim();
        if question.is_empty() {
            return Err(AppError::Validation("Question cannot be empty".to_string()));
        }

        let documents = build_schema_documents(adapter).await?;
        let retriever = SchemaRetriever::build(documents, self.embedder.clone(), self.top_k).await?;
        let relevant = retriever.retrieve(question).await?;
        tracing::info!(
            "Retrieved {} schema documents: {:?}",
            relevant.len(),
            relevant.iter().map(|d| d.table.as_str()).collect::<Vec<_>>()
        );

        let context = relevant
            .iter()
            .map(|d| d.content.as_str())
            .collect::<Vec<_>>()
            .join("\n");
        let prompt = build_sql_prompt(&context, question, custom_prompt);

        let raw = self.llm.complete(&prompt).await?;
        let sql = SqlValidator::clean_sql_output(&raw);
        SqlValidator::ensure_sql_present(&sql)?;
        tracing::info!("Generated SQL: {}", sql);

        let result = self
            .query_service
            .execute_guarded(adapter, &sql, self.max_rows)
            .await?;

        Ok(RagAnswer { sql, result })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::database::SqliteAdapter;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex;
    use tempfile::NamedTempFile;

    /// Replies with a fixed text and remembers the prompt it was given
    struct CannedModel {
        reply: String,
        seen: Mutex<Vec<String>>,
    }

    impl CannedModel {
        fn new(reply: &str) -> Arc<Self> {
            Arc::new(Self {
                reply: reply.to_string(),
                seen: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl LanguageModel for CannedModel {
        async fn complete(&self, prompt: &str) -> Result<String, AppError> {
            self.seen.lock().unwrap().push(prompt.to_string());
            Ok(self.reply.clone())
        }
    }

    fn adapter() -> (NamedTempFile, SqliteAdapter) {
        let file = NamedTempFile::new().unwrap();
        let conn = rusqlite::Connection::open(file.path()).unwrap();
        conn.execute_batch(
            "CREATE TABLE film (film_id INTEGER PRIMARY KEY, title TEXT, length INTEGER);
             CREATE TABLE actor (actor_id INTEGER PRIMARY KEY, first_name TEXT);
             INSERT INTO film (title, length) VALUES ('ACADEMY DINOSAUR', 86), ('ACE GOLDFINGER', 48);",
        )
        .unwrap();
        let adapter = SqliteAdapter::new(&format!("sqlite://{}", file.path().display())).unwrap();
        (file, adapter)
    }

    #[tokio::test]
    async fn test_pipeline_runs_generated_sql() {
        let (_file, adapter) = adapter();
        let model = CannedModel::new("```sql\nSELECT title FROM film WHERE length > 60;\n```");
        let pipeline = RagPipeline::new(model.clone(), None, QueryService::default(), 1, 1000);

        let answer = pipeline
            .run(&adapter, "Which film is longer than an hour?", "Titles are uppercase")
            .await
            .unwrap();

        assert_eq!(answer.sql, "SELECT title FROM film WHERE length > 60;");
        assert_eq!(answer.result.rows, vec![vec![json!("ACADEMY DINOSAUR")]]);

        let prompts = model.seen.lock().unwrap();
        assert!(prompts[0].starts_with("Schema:\nTable: film\n"));
        assert!(!prompts[0].contains("Table: actor"));
        assert!(prompts[0].contains("- Titles are uppercase"));
    }

    #[tokio::test]
    async fn test_comment_only_output_is_rejected() {
        let (_file, adapter) = adapter();
        let pipeline = RagPipeline::new(CannedModel::new("-- I cannot answer that"), None, QueryService::default(), 3, 1000);
        let err = pipeline.run(&adapter, "anything", "").await.unwrap_err();
        assert!(matches!(err, AppError::InvalidSql(_)));
    }

    #[tokio::test]
    async fn test_generated_writes_are_rejected() {
        let (_file, adapter) = adapter();
        let pipeline = RagPipeline::new(CannedModel::new("DROP TABLE film"), None, QueryService::default(), 3, 1000);
        assert!(pipeline.run(&adapter, "drop it", "").await.is_err());
        assert_eq!(adapter.list_tables().await.unwrap().len(), 2);
    }
}
