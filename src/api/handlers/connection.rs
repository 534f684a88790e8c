use axum::{extract::State, http::StatusCode, Json};
use serde_json::{json, Value};
use std::sync::Arc;

use crate::api::handlers::auth::AuthSession;
use crate::api::middleware::AppError;
use crate::config::Config;
use crate::models::{ConnectionConfig, CreateConnectionRequest, SelectConnectionRequest};
use crate::services::connection_string::conn_str_for;
use crate::services::database::{connect_db, DatabaseAdapter};
use crate::services::embedding::{Embedder, EmbeddingClient};
use crate::services::tools::ToolClient;
use crate::services::{
    AuthService, ConnectionPoolManager, CrudService, LanguageModel, LlmService, QueryService, RagPipeline,
    Transcriber, WhisperTranscriber,
};
use crate::storage::SqliteStorage;

/// Application state
#[derive(Clone)]
pub struct AppState {
    pub storage: Arc<SqliteStorage>,
    pub config: Config,
    pub pool_manager: Arc<ConnectionPoolManager>,
    pub auth: Arc<AuthService>,
    pub llm: Arc<dyn LanguageModel>,
    pub embedder: Option<Arc<dyn Embedder>>,
    pub transcriber: Arc<dyn Transcriber>,
    pub tool_client: ToolClient,
}

impl AppState {
    pub fn new(storage: Arc<SqliteStorage>, config: Config) -> Result<Self, AppError> {
        let embedder = EmbeddingClient::from_config(&config.llm).map(|client| Arc::new(client) as Arc<dyn Embedder>);
        Ok(Self {
            auth: Arc::new(AuthService::new(storage.clone(), &config.auth)),
            llm: Arc::new(LlmService::new(&config.llm)),
            embedder,
            transcriber: Arc::new(WhisperTranscriber::new(&config.whisper)),
            tool_client: ToolClient::new(&config.mcp.url, config.mcp.timeout_secs)?,
            pool_manager: Arc::new(ConnectionPoolManager::new()),
            storage,
            config,
        })
    }

    pub fn rag_pipeline(&self) -> RagPipeline {
        RagPipeline::new(
            self.llm.clone(),
            self.embedder.clone(),
            QueryService::new(self.config.query.timeout_secs),
            self.config.retrieval.top_k,
            self.config.query.max_rows,
        )
    }

    pub fn crud(&self) -> CrudService {
        CrudService::new(self.config.query.timeout_secs)
    }

    /// Connection selected on the caller's session
    pub async fn selected_connection(&self, auth: &AuthSession) -> Result<ConnectionConfig, AppError> {
        let connection_id = auth
            .session
            .connection_id
            .as_deref()
            .ok_or_else(|| AppError::Validation("No database connection selected".to_string()))?;

        self.storage
            .get_connection_for_owner(connection_id, &auth.user.id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Connection '{}' not found", connection_id)))
    }

    /// Selected connection, its URL and a probed adapter for it
    pub async fn open_selected(
        &self,
        auth: &AuthSession,
    ) -> Result<(ConnectionConfig, String, Box<dyn DatabaseAdapter>), AppError> {
        let connection = self.selected_connection(auth).await?;
        let conn_str = conn_str_for(&connection)?;
        let adapter = connect_db(&conn_str, &self.pool_manager).await?;
        Ok((connection, conn_str, adapter))
    }
}

/// List the caller's connections and the selected one
pub async fn list_connections(
    State(state): State<AppState>,
    auth: AuthSession,
) -> Result<Json<Value>, AppError> {
    let connections = state.storage.list_connections(&auth.user.id).await?;

    Ok(Json(json!({
        "connections": connections,
        "selected": auth.session.connection_id,
    })))
}

/// Create a connection and select it
pub async fn create_connection(
    State(state): State<AppState>,
    auth: AuthSession,
    Json(payload): Json<CreateConnectionRequest>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    payload.validate()?;

    let connection = ConnectionConfig::new(auth.user.id.clone(), payload);
    state.storage.save_connection(&connection).await?;
    state
        .storage
        .set_session_connection(&auth.session.id, Some(&connection.id))
        .await?;

    tracing::info!(
        "Created {} connection {} for {}",
        connection.db_type.as_str(),
        connection.id,
        auth.user.username
    );

    Ok((StatusCode::CREATED, Json(json!({ "connection": connection }))))
}

/// Select one of the caller's connections for this session
pub async fn select_connection(
    State(state): State<AppState>,
    auth: AuthSession,
    Json(payload): Json<SelectConnectionRequest>,
) -> Result<Json<Value>, AppError> {
    let connection = state
        .storage
        .get_connection_for_owner(&payload.connection_id, &auth.user.id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Connection '{}' not found", payload.connection_id)))?;

    state
        .storage
        .set_session_connection(&auth.session.id, Some(&connection.id))
        .await?;

    Ok(Json(json!({ "selected": connection.id })))
}
