use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::Client as HttpClient;
use serde::Deserialize;
use std::path::Path;
use tokio::sync::Mutex;

use crate::api::middleware::AppError;
use crate::config::WhisperConfig;

/// Speech to text for an uploaded audio file
#[async_trait]
pub trait Transcriber: Send + Sync {
    async fn transcribe(&self, audio_path: &Path) -> Result<String, AppError>;
}

#[derive(Deserialize)]
struct TranscriptionResponse {
    #[serde(default)]
    text: String,
}

/// Model the transcriber is bound to, created on first use
#[derive(Debug, Clone)]
struct WhisperSession {
    model: String,
}

/// Client for an OpenAI-compatible `/audio/transcriptions` endpoint
pub struct WhisperTranscriber {
    endpoint: Option<String>,
    api_key: Option<String>,
    primary_model: String,
    fallback_model: String,
    language: String,
    http_client: HttpClient,
    session: Mutex<Option<WhisperSession>>,
}

impl WhisperTranscriber {
    pub fn new(config: &WhisperConfig) -> Self {
        let base_url = config.base_url.trim();
        Self {
            endpoint: (!base_url.is_empty())
                .then(|| format!("{}/audio/transcriptions", base_url.trim_end_matches('/'))),
            api_key: config.api_key.clone(),
            primary_model: config.model.clone(),
            fallback_model: config.fallback_model.clone(),
            language: config
                .language
                .clone()
                .filter(|l| !l.trim().is_empty())
                .unwrap_or_else(|| "en".to_string()),
            http_client: HttpClient::new(),
            session: Mutex::new(None),
        }
    }

    /// Model of the loaded session, loading `model` when the slot is empty
    async fn load(&self, model: &str) -> String {
        let mut slot = self.session.lock().await;
        slot.get_or_insert_with(|| {
            tracing::info!("Loading Whisper model '{}'", model);
            WhisperSession {
                model: model.to_string(),
            }
        })
        .model
        .clone()
    }

    async fn unload(&self) {
        *self.session.lock().await = None;
    }

    async fn request(&self, model: &str, audio_path: &Path) -> Result<String, String> {
        let endpoint = self
            .endpoint
            .as_deref()
            .ok_or_else(|| "transcription endpoint is not configured".to_string())?;

        let audio = tokio::fs::read(audio_path)
            .await
            .map_err(|e| format!("cannot read {}: {}", audio_path.display(), e))?;
        let file_name = audio_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "audio".to_string());

        let form = Form::new()
            .text("model", model.to_string())
            .text("language", self.language.clone())
            .text("response_format", "json")
            .part("file", Part::bytes(audio).file_name(file_name));

        let mut request = self.http_client.post(endpoint).multipart(form);
        if let Some(api_key) = &self.api_key {
            request = request.bearer_auth(api_key);
        }

        let response = request.send().await.map_err(|e| e.to_string())?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(format!("{} {}", status, body));
        }

        let body: TranscriptionResponse = response.json().await.map_err(|e| e.to_string())?;
        Ok(body.text.trim().to_string())
    }
}

#[async_trait]
impl Transcriber for WhisperTranscriber {
    async fn transcribe(&self, audio_path: &Path) -> Result<String, AppError> {
        let model = self.load(&self.primary_model).await;
        let primary_error = match self.request(&model, audio_path).await {
            Ok(text) => return Ok(text),
            Err(e) => e,
        };

        tracing::warn!(
            "Primary model '{}' failed: {}. Trying fallback '{}'",
            model,
            primary_error,
            self.fallback_model
        );
        self.unload().await;

        let fallback = self.load(&self.fallback_model).await;
        self.request(&fallback, audio_path).await.map_err(|fallback_error| {
            tracing::error!("Fallback transcription also failed: {}", fallback_error);
            AppError::Transcription(format!(
                "Local transcription failed (primary error: {}; fallback error: {})",
                primary_error, fallback_error
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use serde_json::json;
    use std::io::Write;

    fn config(base_url: &str) -> WhisperConfig {
        WhisperConfig {
            base_url: base_url.to_string(),
            api_key: None,
            model: "tiny".to_string(),
            fallback_model: "base".to_string(),
            language: None,
        }
    }

    fn audio_file() -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".wav").tempfile().unwrap();
        file.write_all(b"RIFF0000WAVEfmt ").unwrap();
        file
    }

    #[tokio::test]
    async fn test_transcribe_with_primary_model() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/v1/audio/transcriptions")
                    .body_contains("tiny")
                    .body_contains("RIFF0000WAVE");
                then.status(200).json_body(json!({"text": "  How many films are there?  "}));
            })
            .await;

        let transcriber = WhisperTranscriber::new(&config(&server.url("/v1")));
        let audio = audio_file();
        let text = transcriber.transcribe(audio.path()).await.unwrap();

        mock.assert_async().await;
        assert_eq!(text, "How many films are there?");
    }

    #[tokio::test]
    async fn test_fallback_model_stays_loaded() {
        let server = MockServer::start_async().await;
        let primary = server
            .mock_async(|when, then| {
                when.method(POST).path("/audio/transcriptions").body_contains("tiny");
                then.status(500).body("out of memory");
            })
            .await;
        let fallback = server
            .mock_async(|when, then| {
                when.method(POST).path("/audio/transcriptions").body_contains("base");
                then.status(200).json_body(json!({"text": "list actors"}));
            })
            .await;

        let transcriber = WhisperTranscriber::new(&config(&server.base_url()));
        let audio = audio_file();
        assert_eq!(transcriber.transcribe(audio.path()).await.unwrap(), "list actors");
        assert_eq!(transcriber.transcribe(audio.path()).await.unwrap(), "list actors");

        primary.assert_hits_async(1).await;
        fallback.assert_hits_async(2).await;
    }

    #[tokio::test]
    async fn test_both_models_failing() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/audio/transcriptions");
                then.status(503).body("busy");
            })
            .await;

        let transcriber = WhisperTranscriber::new(&config(&server.base_url()));
        let audio = audio_file();
        let err = transcriber.transcribe(audio.path()).await.unwrap_err();
        let message = err.message();
        assert!(message.starts_with("Transcription failed: Local transcription failed (primary error: 503"));
        assert!(message.contains("; fallback error: 503"));
    }
}
