use serde_json::{json, Value};
use std::sync::Arc;

use crate::api::middleware::AppError;
use crate::models::{DetectorInput, RendererInput, ToolDescriptor};
use crate::services::chart::{ChartDetector, ChartRenderer};
use crate::services::database::connect_db;
use crate::services::ConnectionPoolManager;

pub const CHART_DETECTOR: &str = "chart_detector";
pub const CHART_RENDERER: &str = "chart_renderer";

/// The chart tools served over `/call`
pub struct ToolRegistry {
    pool_manager: Arc<ConnectionPoolManager>,
    detector: ChartDetector,
    renderer: ChartRenderer,
}

impl ToolRegistry {
    pub fn new(
        pool_manager: Arc<ConnectionPoolManager>,
        detector: ChartDetector,
        renderer: ChartRenderer,
    ) -> Self {
        Self {
            pool_manager,
            detector,
            renderer,
        }
    }

    pub fn descriptors(&self) -> Vec<ToolDescriptor> {
        vec![
            ToolDescriptor {
                name: CHART_DETECTOR.to_string(),
                title: "Chart Detector".to_string(),
                description: "Decide whether a question should be answered with a chart and suggest SQL for it"
                    .to_string(),
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "conn_str": {"type": "string"},
                        "question": {"type": "string"},
                        "schema_text": {"type": "string"}
                    },
                    "required": ["conn_str", "question"]
                }),
            },
            ToolDescriptor {
                name: CHART_RENDERER.to_string(),
                title: "Chart Renderer".to_string(),
                description: "Run a SELECT query and render the rows as a PNG chart".to_string(),
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "conn_str": {"type": "string"},
                        "sql": {"type": "string"},
                        "plot_type": {"type": "string", "enum": ["bar", "line", "pie", "scatter", "table"], "default": "bar"},
                        "limit_rows": {"type": "integer", "default": 200}
                    },
                    "required": ["conn_str", "sql"]
                }),
            },
        ]
    }

    pub fn has_tool(&self, name: &str) -> bool {
        name == CHART_DETECTOR || name == CHART_RENDERER
    }

    /// Run tool `name` with its JSON `input`
    pub async fn dispatch(&self, name: &str, input: Value) -> Result<Value, AppError> {
        tracing::info!("Tool call: {}", name);
        match name {
            CHART_DETECTOR => {
                let input: DetectorInput = parse_input(input)?;
                let conn_str = required(input.conn_str, "conn_str required")?;
                let adapter = connect_db(&conn_str, &self.pool_manager).await?;
                let decision = self
                    .detector
                    .detect(adapter.as_ref(), &input.question, input.schema_text.as_deref())
                    .await?;
                to_value(&decision)
            }
            CHART_RENDERER => {
                let input: RendererInput = parse_input(input)?;
                let conn_str = required(input.conn_str, "conn_str required")?;
                let sql = required(input.sql, "conn_str and sql required")?;
                let adapter = connect_db(&conn_str, &self.pool_manager).await?;
                let render = self
                    .renderer
                    .render(adapter.as_ref(), &sql, &input.plot_type, input.limit_rows)
                    .await?;
                to_value(&render)
            }
            _ => Err(AppError::NotFound("tool not found".to_string())),
        }
    }
}

fn parse_input<T: serde::de::DeserializeOwned>(input: Value) -> Result<T, AppError> {
    let input = if input.is_null() { json!({}) } else { input };
    serde_json::from_value(input).map_err(|e| AppError::Validation(format!("Invalid tool input: {}", e)))
}

fn required(value: Option<String>, message: &str) -> Result<String, AppError> {
    value
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| AppError::Validation(message.to_string()))
}

fn to_value<T: serde::Serialize>(value: &T) -> Result<Value, AppError> {
    serde_json::to_value(value).map_err(|e| AppError::Internal(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::chart::DetectorMode;
    use crate::services::query_service::QueryService;
    use tempfile::{NamedTempFile, TempDir};

    fn registry(media: &TempDir) -> ToolRegistry {
        ToolRegistry::new(
            Arc::new(ConnectionPoolManager::new()),
            ChartDetector::new(DetectorMode::Heuristic, None),
            ChartRenderer::new(media.path(), "/media/", QueryService::default()),
        )
    }

    fn database() -> NamedTempFile {
        let file = NamedTempFile::new().unwrap();
        let conn = rusqlite::Connection::open(file.path()).unwrap();
        conn.execute_batch(
            "CREATE TABLE payment (payment_id INTEGER PRIMARY KEY, amount NUMERIC, method TEXT);
             INSERT INTO payment (amount, method) VALUES (2.99, 'card'), (4.99, 'cash');",
        )
        .unwrap();
        file
    }

    #[test]
    fn test_descriptors() {
        let media = tempfile::tempdir().unwrap();
        let registry = registry(&media);
        let names: Vec<String> = registry.descriptors().into_iter().map(|d| d.name).collect();
        assert_eq!(names, vec![CHART_DETECTOR, CHART_RENDERER]);
        assert!(registry.has_tool("chart_renderer"));
        assert!(!registry.has_tool("sql_runner"));
    }

    #[tokio::test]
    async fn test_missing_arguments() {
        let media = tempfile::tempdir().unwrap();
        let registry = registry(&media);

        let err = registry
            .dispatch(CHART_DETECTOR, json!({"question": "sales by month"}))
            .await
            .unwrap_err();
        assert_eq!(err.message(), "conn_str required");

        let err = registry
            .dispatch(CHART_RENDERER, json!({"conn_str": "sqlite:///tmp/x.db"}))
            .await
            .unwrap_err();
        assert_eq!(err.message(), "conn_str and sql required");

        let err = registry.dispatch("nope", Value::Null).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_detector_over_sqlite() {
        let media = tempfile::tempdir().unwrap();
        let db = database();
        let result = registry(&media)
            .dispatch(
                CHART_DETECTOR,
                json!({"conn_str": format!("sqlite://{}", db.path().display()), "question": "total amount by method"}),
            )
            .await
            .unwrap();
        assert_eq!(result["plot"], json!(true));
        assert_eq!(result["plot_type"], json!("bar"));
        assert_eq!(
            result["sql"],
            json!("SELECT method as label, SUM(payment_id) as value FROM payment GROUP BY method ORDER BY value DESC;")
        );
    }
}
