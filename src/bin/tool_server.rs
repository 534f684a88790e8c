use anyhow::Context;
use axum::Router;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::info;

use askdb::api::handlers::tools::ToolState;
use askdb::api::routes::create_tool_router;
use askdb::config::Config;
use askdb::services::chart::{ChartDetector, ChartRenderer, DetectorMode};
use askdb::services::tools::ToolRegistry;
use askdb::services::{ConnectionPoolManager, LanguageModel, LlmService, QueryService};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env().context("Failed to load configuration")?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.logging.level)),
        )
        .init();

    let mode = DetectorMode::parse(&config.chart.detector);
    let llm: Option<Arc<dyn LanguageModel>> = if config.llm_enabled() {
        Some(Arc::new(LlmService::new(&config.llm)))
    } else {
        None
    };
    info!(
        "Chart detector: {:?}{}",
        mode,
        if llm.is_none() { " (no LLM configured, using heuristic)" } else { "" }
    );

    let registry = ToolRegistry::new(
        Arc::new(ConnectionPoolManager::new()),
        ChartDetector::new(mode, llm),
        ChartRenderer::new(
            &config.media.root,
            config.media.url.clone(),
            QueryService::new(config.query.timeout_secs),
        ),
    );

    let app: Router = create_tool_router(
        ToolState {
            registry: Arc::new(registry),
        },
        &config.media.root,
    );

    let addr: SocketAddr = config
        .tool_server_address()
        .parse()
        .with_context(|| format!("Invalid tool server address {}", config.tool_server_address()))?;
    info!("Tool server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    axum::serve(listener, app).await.context("Tool server stopped")?;

    Ok(())
}
