use reqwest::Client as HttpClient;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;

use crate::api::middleware::AppError;

#[derive(Debug, Deserialize)]
struct CallResponse {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<String>,
}

/// Calls tools on the tool server's `/call` endpoint
#[derive(Clone, Debug)]
pub struct ToolClient {
    call_url: String,
    http_client: HttpClient,
}

impl ToolClient {
    pub fn new(base_url: &str, timeout_secs: u64) -> Result<Self, AppError> {
        let http_client = HttpClient::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| AppError::Internal(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self {
            call_url: format!("{}/call", base_url.trim_end_matches('/')),
            http_client,
        })
    }

    /// Invoke `tool` with `input`, `conn_str` merged in
    pub async fn call_tool(&self, tool: &str, conn_str: &str, input: Value) -> Result<Value, AppError> {
        let mut input = match input {
            Value::Object(map) => map,
            _ => serde_json::Map::new(),
        };
        input.insert("conn_str".to_string(), Value::String(conn_str.to_string()));

        let response = self
            .http_client
            .post(&self.call_url)
            .json(&json!({"tool": tool, "input": input}))
            .send()
            .await
            .map_err(|e| AppError::ToolCall(format!("Failed to reach tool server: {}", e)))?;

        let status = response.status();
        let body: CallResponse = response
            .json()
            .await
            .map_err(|e| AppError::ToolCall(format!("Invalid tool response ({}): {}", status, e)))?;

        match (body.result, body.error) {
            (_, Some(error)) => Err(AppError::ToolCall(error)),
            (Some(result), None) => Ok(result),
            (None, None) => Err(AppError::ToolCall(format!("Empty tool response ({})", status))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;

    #[tokio::test]
    async fn test_call_tool_merges_conn_str() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST).path("/call").json_body(json!({
                    "tool": "chart_detector",
                    "input": {"question": "sales by month", "conn_str": "sqlite:///tmp/a.db"}
                }));
                then.status(200)
                    .json_body(json!({"result": {"plot": false, "plot_type": null, "sql": null}}));
            })
            .await;

        let client = ToolClient::new(&server.base_url(), 5).unwrap();
        let result = client
            .call_tool("chart_detector", "sqlite:///tmp/a.db", json!({"question": "sales by month"}))
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(result["plot"], json!(false));
    }

    #[tokio::test]
    async fn test_call_tool_error_body() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/call");
                then.status(500).json_body(json!({"error": "Query returned no rows"}));
            })
            .await;

        let client = ToolClient::new(&format!("{}/", server.base_url()), 5).unwrap();
        let err = client
            .call_tool("chart_renderer", "sqlite:///tmp/a.db", json!({"sql": "SELECT 1"}))
            .await
            .unwrap_err();
        assert_eq!(err.message(), "Query returned no rows");
    }
}
