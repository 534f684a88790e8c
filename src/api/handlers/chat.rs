use axum::{
    extract::{Multipart, State},
    Json,
};
use serde_json::{json, Value};
use std::path::PathBuf;

use crate::api::handlers::auth::AuthSession;
use crate::api::handlers::connection::AppState;
use crate::api::middleware::AppError;
use crate::models::{
    AudioQuery, ChartDecision, ChartRender, ChatRequest, ChatResponse, ConnectionConfig, PlotInfo, UpdatePromptRequest,
};
use crate::services::database::DatabaseAdapter;
use crate::services::tools::{CHART_DETECTOR, CHART_RENDERER};

const CHART_LIMIT_ROWS: u64 = 500;

/// Answer a typed question
pub async fn chat(
    State(state): State<AppState>,
    auth: AuthSession,
    Json(payload): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, AppError> {
    let (connection, conn_str, adapter) = state.open_selected(&auth).await?;

    let question = payload.question.trim().to_string();
    let mut response = ChatResponse {
        user_prompt: connection.prompt_suffix().to_string(),
        ..Default::default()
    };

    if !question.is_empty() {
        answer(&state, &connection, &conn_str, adapter.as_ref(), &question, &mut response).await;
        response.transcript = Some(question);
    }

    Ok(Json(response))
}

/// Transcribe an uploaded `audio_file` and answer it like a typed question
pub async fn chat_audio(
    State(state): State<AppState>,
    auth: AuthSession,
    mut multipart: Multipart,
) -> Result<Json<ChatResponse>, AppError> {
    let (connection, conn_str, adapter) = state.open_selected(&auth).await?;

    let mut upload = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::Validation(format!("Invalid upload: {}", e)))?
    {
        if field.name() == Some("audio_file") {
            let file_name = field.file_name().unwrap_or("audio").to_string();
            let data = field
                .bytes()
                .await
                .map_err(|e| AppError::Validation(format!("Invalid upload: {}", e)))?;
            upload = Some((file_name, data));
        }
    }
    let (file_name, data) = upload
        .filter(|(_, data)| !data.is_empty())
        .ok_or_else(|| AppError::Validation("audio_file is required".to_string()))?;

    let mut response = ChatResponse {
        is_voice: true,
        user_prompt: connection.prompt_suffix().to_string(),
        ..Default::default()
    };

    let audio_path = save_upload(&state.config.media.root, &file_name, &data).await?;
    let mut audio_query = AudioQuery::new(auth.user.id.clone(), audio_path.to_string_lossy().into_owned());
    state.storage.save_audio_query(&audio_query).await?;

    match state.transcriber.transcribe(&audio_path).await {
        Ok(transcript) => {
            audio_query.transcript = Some(transcript.clone());
            state.storage.save_audio_query(&audio_query).await?;
            if !transcript.is_empty() {
                answer(&state, &connection, &conn_str, adapter.as_ref(), &transcript, &mut response).await;
            }
            response.transcript = Some(transcript);
        }
        Err(e) => {
            tracing::error!("Transcription failed: {}", e);
            response.error = Some(e.message());
        }
    }

    Ok(Json(response))
}

/// Voice questions of the current user, newest first
pub async fn list_audio_queries(State(state): State<AppState>, auth: AuthSession) -> Result<Json<Value>, AppError> {
    let queries = state.storage.list_audio_queries(&auth.user.id).await?;
    Ok(Json(json!({ "audio_queries": queries })))
}

fn safe_file_name(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name);
    let cleaned: String = base
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') { c } else { '_' })
        .collect();
    if cleaned.trim_matches('.').is_empty() {
        "audio".to_string()
    } else {
        cleaned
    }
}

async fn save_upload(media_root: &str, file_name: &str, data: &[u8]) -> Result<PathBuf, AppError> {
    let dir = PathBuf::from(media_root).join("voice_queries");
    tokio::fs::create_dir_all(&dir)
        .await
        .map_err(|e| AppError::Internal(format!("Failed to create upload directory: {}", e)))?;

    let path = dir.join(format!("{}_{}", uuid::Uuid::new_v4().simple(), safe_file_name(file_name)));
    tokio::fs::write(&path, data)
        .await
        .map_err(|e| AppError::Internal(format!("Failed to store upload: {}", e)))?;
    Ok(path)
}

/// Run the pipeline and the chart tools; failures end up in the response, not the status
async fn answer(
    state: &AppState,
    connection: &ConnectionConfig,
    conn_str: &str,
    adapter: &dyn DatabaseAdapter,
    question: &str,
    response: &mut ChatResponse,
) {
    match state
        .rag_pipeline()
        .run(adapter, question, connection.prompt_suffix())
        .await
    {
        Ok(answer) => {
            response.sql = Some(answer.sql);
            response.rows = Some(answer.result);
        }
        Err(e) => {
            tracing::error!("RAG pipeline failed: {}", e);
            response.sql = None;
            response.rows = None;
            response.error = Some(e.message());
        }
    }

    if let Some(render) = chart_for(state, conn_str, question).await {
        response.plot_url = Some(render.plot_url);
        response.plot_info = Some(PlotInfo {
            cols: render.cols,
            rows: render.rows,
        });
    }
}

async fn chart_for(state: &AppState, conn_str: &str, question: &str) -> Option<ChartRender> {
    let decision = state
        .tool_client
        .call_tool(CHART_DETECTOR, conn_str, json!({ "question": question }))
        .await
        .and_then(|value| {
            serde_json::from_value::<ChartDecision>(value)
                .map_err(|e| AppError::ToolCall(format!("Unexpected detector output: {}", e)))
        });

    let decision = match decision {
        Ok(decision) => decision,
        Err(e) => {
            tracing::warn!("chart_detector call failed: {}", e);
            return None;
        }
    };
    if !decision.plot {
        return None;
    }

    let sql = decision.sql?;
    let plot_type = decision.plot_type.unwrap_or_else(|| "bar".to_string());
    let render = state
        .tool_client
        .call_tool(
            CHART_RENDERER,
            conn_str,
            json!({ "sql": sql, "plot_type": plot_type, "limit_rows": CHART_LIMIT_ROWS }),
        )
        .await
        .and_then(|value| {
            serde_json::from_value::<ChartRender>(value)
                .map_err(|e| AppError::ToolCall(format!("Unexpected renderer output: {}", e)))
        });

    match render {
        Ok(render) => Some(render),
        Err(e) => {
            tracing::warn!("chart_renderer call failed: {}", e);
            None
        }
    }
}

/// Current custom prompt of the selected connection
pub async fn get_prompt(State(state): State<AppState>, auth: AuthSession) -> Result<Json<Value>, AppError> {
    let connection = state.selected_connection(&auth).await?;
    Ok(Json(json!({
        "connection_id": connection.id,
        "custom_prompt": connection.prompt_suffix(),
    })))
}

pub async fn update_prompt(
    State(state): State<AppState>,
    auth: AuthSession,
    Json(payload): Json<UpdatePromptRequest>,
) -> Result<Json<Value>, AppError> {
    let connection = state.selected_connection(&auth).await?;
    let custom_prompt = payload.custom_prompt.unwrap_or_default();

    state
        .storage
        .update_custom_prompt(&connection.id, &auth.user.id, &custom_prompt)
        .await?;
    tracing::info!("Custom prompt updated for connection {}", connection.id);

    Ok(Json(json!({
        "connection_id": connection.id,
        "custom_prompt": custom_prompt,
    })))
}
