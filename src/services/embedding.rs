use async_trait::async_trait;
use reqwest::Client as ReqwestClient;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::api::middleware::AppError;
use crate::config::LlmConfig;

/// Turns text into vectors
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, AppError>;

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>, AppError> {
        self.embed_documents(&[text.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| AppError::LlmService("No embedding data received (empty response)".to_string()))
    }
}

#[derive(Serialize, Debug)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Deserialize, Debug)]
struct EmbeddingResponse {
    #[serde(default)]
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize, Debug)]
struct EmbeddingData {
    #[serde(default)]
    index: usize,
    embedding: Vec<f32>,
}

/// Client for an OpenAI-compatible `/embeddings` endpoint
#[derive(Clone, Debug)]
pub struct EmbeddingClient {
    client: ReqwestClient,
    api_url: String,
    api_key: Option<String>,
    model: String,
}

impl EmbeddingClient {
    pub fn new(base_url: &str, api_key: Option<String>, model: String) -> Self {
        Self {
            client: ReqwestClient::new(),
            api_url: format!("{}/embeddings", base_url.trim_end_matches('/')),
            api_key,
            model,
        }
    }

    /// `None` when no LLM endpoint is configured
    pub fn from_config(config: &LlmConfig) -> Option<Self> {
        if config.base_url.trim().is_empty() {
            return None;
        }
        Some(Self::new(
            &config.base_url,
            config.api_key.clone(),
            config.embed_model.clone(),
        ))
    }
}

#[async_trait]
impl Embedder for EmbeddingClient {
    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, AppError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let request_body = EmbeddingRequest {
            model: &self.model,
            input: texts,
        };
        debug!("--> Embedding {} texts with model '{}'", texts.len(), self.model);

        let mut request_builder = self.client.post(&self.api_url).json(&request_body);
        if let Some(key) = &self.api_key {
            request_builder = request_builder.bearer_auth(key);
        }

        let response = request_builder
            .send()
            .await
            .map_err(|e| AppError::LlmService(format!("Embedding request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(AppError::LlmService(format!(
                "Embedding API error ({}): {}",
                status, error_text
            )));
        }

        let mut body: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| AppError::LlmService(format!("Invalid embedding response: {}", e)))?;

        if body.data.is_empty() {
            return Err(AppError::LlmService(
                "No embedding data received (empty response)".to_string(),
            ));
        }

        body.data.sort_by_key(|d| d.index);
        Ok(body.data.into_iter().map(|d| d.embedding).collect())
    }
}
