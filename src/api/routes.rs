use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use tower_http::{cors::CorsLayer, services::ServeDir, trace::TraceLayer};

use crate::api::handlers::connection::AppState;
use crate::api::handlers::tools::ToolState;
use crate::api::handlers::{auth, chat, connection, dashboard, table, tools};

const AUDIO_UPLOAD_LIMIT: usize = 25 * 1024 * 1024;

/// Router of the web service
pub fn create_router_with_state(state: AppState) -> Router {
    // Uploaded audio stays private; only rendered charts are public
    let plots = ServeDir::new(std::path::Path::new(&state.config.media.root).join("plots"));

    Router::new()
        .route("/health", get(health_check))
        .route("/login", post(auth::login))
        .route("/logout", post(auth::logout))
        .route(
            "/connections",
            get(connection::list_connections).post(connection::create_connection),
        )
        .route("/connections/select", post(connection::select_connection))
        .route("/dashboard", get(dashboard::dashboard))
        .route("/chat", get(chat::get_prompt).post(chat::chat))
        .route(
            "/chat/audio",
            get(chat::list_audio_queries)
                .post(chat::chat_audio)
                .layer(DefaultBodyLimit::max(AUDIO_UPLOAD_LIMIT)),
        )
        .route("/chat/prompt", post(chat::update_prompt))
        .route("/tables/{table}", get(table::list_rows).post(table::insert_row))
        .route("/tables/{table}/new", get(table::new_form))
        .route(
            "/tables/{table}/{pk}",
            get(table::edit_form).put(table::update_row).delete(table::delete_row),
        )
        .nest_service("/media/plots", plots)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Router of the chart tool server
pub fn create_tool_router(state: ToolState, media_root: &str) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/tools", get(tools::list_tools))
        .route("/call", post(tools::call_tool))
        .nest_service("/media", ServeDir::new(media_root))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Health check endpoint
async fn health_check() -> &'static str {
    "OK"
}
