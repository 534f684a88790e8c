use axum::Router;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{error, info};

use askdb::api::handlers::connection::AppState;
use askdb::api::routes::create_router_with_state;
use askdb::config::Config;
use askdb::storage::SqliteStorage;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration
    let config = Config::from_env().map_err(|e| {
        eprintln!("Failed to load configuration: {}", e);
        e
    })?;

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.logging.level)),
        )
        .init();

    info!("Starting server on {}", config.server_address());
    if !config.llm_enabled() {
        info!("LLM_BASE_URL is not set; chat questions will report an error");
    }

    // Initialize SQLite storage
    let storage = Arc::new(SqliteStorage::new(&config.database.url).await.map_err(|e| {
        error!("Failed to initialize database: {}", e);
        e
    })?);

    let state = AppState::new(storage, config.clone())?;

    if let (Some(username), Some(password)) = (&config.auth.bootstrap_user, &config.auth.bootstrap_password) {
        state.auth.ensure_user(username, password).await.map_err(|e| {
            error!("Failed to create bootstrap user: {}", e);
            e
        })?;
        info!("Bootstrap user '{}' is available", username);
    }

    let app: Router = create_router_with_state(state);

    // Start server
    let addr: SocketAddr = config.server_address().parse()?;
    info!("Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
