use async_trait::async_trait;
use reqwest::Client as HttpClient;
use serde::{Deserialize, Serialize};

use crate::api::middleware::AppError;
use crate::config::LlmConfig;

/// Anything that answers a single prompt with text
#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String, AppError>;
}

/// Fixed SQL-generation prompt; the custom suffix becomes an extra note
pub fn build_sql_prompt(context: &str, question: &str, custom_prompt: &str) -> String {
    let mut notes = String::from("- Do not reference any non-existent columns.");
    let custom_prompt = custom_prompt.trim();
    if !custom_prompt.is_empty() {
        notes.push_str("\n- ");
        notes.push_str(custom_prompt);
    }

    format!(
        "Schema:\n{context}\n\nNote:\n{notes}\n\nGenerate a SQL query for the following question:\n{question}\n\nOnly output the SQL.",
        context = context,
        notes = notes,
        question = question
    )
}

#[derive(Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    temperature: f32,
    max_tokens: u32,
    stream: bool,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Deserialize, Debug)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize, Debug)]
struct ChatChoice {
    message: ChatMessage,
}

/// Client for an OpenAI-compatible `/chat/completions` endpoint
#[derive(Clone, Debug)]
pub struct LlmService {
    api_url: Option<String>,
    api_key: Option<String>,
    model: String,
    temperature: f32,
    max_tokens: u32,
    http_client: HttpClient,
}

impl LlmService {
    pub fn new(config: &LlmConfig) -> Self {
        let base_url = config.base_url.trim();
        Self {
            api_url: (!base_url.is_empty())
                .then(|| format!("{}/chat/completions", base_url.trim_end_matches('/'))),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            http_client: HttpClient::new(),
        }
    }
}

#[async_trait]
impl LanguageModel for LlmService {
    async fn complete(&self, prompt: &str) -> Result<String, AppError> {
        let api_url = self
            .api_url
            .as_deref()
            .ok_or_else(|| AppError::LlmService("LLM service is not configured".to_string()))?;

        let request_body = ChatCompletionRequest {
            model: &self.model,
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: prompt.to_string(),
            }],
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            stream: false,
        };

        let mut request = self.http_client.post(api_url).json(&request_body);
        if let Some(api_key) = &self.api_key {
            request = request.bearer_auth(api_key);
        }

        tracing::debug!("Sending prompt to model '{}' ({} chars)", self.model, prompt.len());
        let response = request
            .send()
            .await
            .map_err(|e| AppError::LlmService(format!("Failed to call LLM service: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_else(|_| "Unknown error".to_string());
            return Err(AppError::LlmService(format!(
                "LLM service returned error {}: {}",
                status, error_text
            )));
        }

        let result: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| AppError::LlmService(format!("Failed to parse LLM response: {}", e)))?;

        result
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content.trim().to_string())
            .ok_or_else(|| AppError::LlmService("LLM response contained no choices".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use serde_json::json;

    fn config(base_url: &str) -> LlmConfig {
        LlmConfig {
            base_url: base_url.to_string(),
            api_key: Some("sk-test".to_string()),
            model: "gpt-4o-mini".to_string(),
            embed_model: "text-embedding-3-small".to_string(),
            temperature: 0.0,
            max_tokens: 256,
        }
    }

    #[test]
    fn test_build_sql_prompt() {
        let prompt = build_sql_prompt("Table: film\nColumns:\n - title (text)\n", "How many films?", "");
        assert_eq!(
            prompt,
            "Schema:\nTable: film\nColumns:\n - title (text)\n\n\nNote:\n- Do not reference any non-existent columns.\n\nGenerate a SQL query for the following question:\nHow many films?\n\nOnly output the SQL."
        );

        let prompt = build_sql_prompt("ctx", "q", "  Use ILIKE for names ");
        assert!(prompt.contains("- Do not reference any non-existent columns.\n- Use ILIKE for names\n\n"));
    }

    #[tokio::test]
    async fn test_complete_returns_trimmed_content() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/v1/chat/completions")
                    .header("authorization", "Bearer sk-test")
                    .json_body_partial(r#"{"model": "gpt-4o-mini", "stream": false}"#);
                then.status(200).json_body(json!({
                    "choices": [{"message": {"role": "assistant", "content": "  SELECT COUNT(*) FROM film;\n"}}]
                }));
            })
            .await;

        let service = LlmService::new(&config(&server.url("/v1")));
        let sql = service
            .complete(&build_sql_prompt("ctx", "How many films?", ""))
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(sql, "SELECT COUNT(*) FROM film;");
    }

    #[tokio::test]
    async fn test_error_status_is_reported() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/chat/completions");
                then.status(429).body("rate limited");
            })
            .await;

        let service = LlmService::new(&config(&server.base_url()));
        let err = service.complete("hi").await.unwrap_err();
        assert!(err.message().contains("429"));
        assert!(err.message().contains("rate limited"));
    }

    #[tokio::test]
    async fn test_unconfigured() {
        let service = LlmService::new(&config(""));
        let err = service.complete("hi").await.unwrap_err();
        assert_eq!(err.message(), "LLM service is not configured");
    }
}
