use serde::Deserialize;
use std::env;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub database: DatabaseConfig,
    pub server: ServerConfig,
    pub tool_server: ServerConfig,
    pub llm: LlmConfig,
    pub retrieval: RetrievalConfig,
    pub query: QueryConfig,
    pub media: MediaConfig,
    pub mcp: McpConfig,
    pub chart: ChartConfig,
    pub whisper: WhisperConfig,
    pub auth: AuthConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LlmConfig {
    /// OpenAI-compatible base URL, e.g. `https://api.openai.com/v1`.
    /// Empty disables every LLM-backed feature.
    pub base_url: String,
    pub api_key: Option<String>,
    pub model: String,
    pub embed_model: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RetrievalConfig {
    pub top_k: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct QueryConfig {
    pub max_rows: u64,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MediaConfig {
    pub root: String,
    pub url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct McpConfig {
    pub url: String,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChartConfig {
    /// `llm` or `heuristic`
    pub detector: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WhisperConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub model: String,
    pub fallback_model: String,
    pub language: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub session_hours: i64,
    pub bootstrap_user: Option<String>,
    pub bootstrap_password: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
}

impl Config {
    pub fn from_env() -> Result<Self, config::ConfigError> {
        // Try to load from .env file
        let _ = dotenv::dotenv();

        let mut builder = config::Config::builder()
            .set_default("database.url", "./askdb.db")?
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 3000)?
            .set_default("tool_server.host", "127.0.0.1")?
            .set_default("tool_server.port", 5001)?
            .set_default("llm.base_url", "")?
            .set_default("llm.model", "gpt-4o-mini")?
            .set_default("llm.embed_model", "text-embedding-3-small")?
            .set_default("llm.temperature", 0.0)?
            .set_default("llm.max_tokens", 512)?
            .set_default("retrieval.top_k", 3)?
            .set_default("query.max_rows", 1000)?
            .set_default("query.timeout_secs", 30)?
            .set_default("media.root", "media")?
            .set_default("media.url", "/media/")?
            .set_default("mcp.url", "http://127.0.0.1:5001")?
            .set_default("mcp.timeout_secs", 60)?
            .set_default("chart.detector", "llm")?
            .set_default("whisper.base_url", "")?
            .set_default("whisper.model", "tiny")?
            .set_default("whisper.fallback_model", "base")?
            .set_default("whisper.language", "en")?
            .set_default("auth.jwt_secret", "change-me")?
            .set_default("auth.session_hours", 12)?
            .set_default("logging.level", "info")?;

        let overrides: &[(&str, &str)] = &[
            ("DATABASE_URL", "database.url"),
            ("HOST", "server.host"),
            ("TOOL_SERVER_HOST", "tool_server.host"),
            ("LLM_BASE_URL", "llm.base_url"),
            ("LLM_API_KEY", "llm.api_key"),
            ("LLM_MODEL", "llm.model"),
            ("EMBED_MODEL", "llm.embed_model"),
            ("MCP_MEDIA_ROOT", "media.root"),
            ("MCP_MEDIA_URL", "media.url"),
            ("MCP_URL", "mcp.url"),
            ("CHART_DETECTOR", "chart.detector"),
            ("WHISPER_BASE_URL", "whisper.base_url"),
            ("WHISPER_API_KEY", "whisper.api_key"),
            ("WHISPER_MODEL", "whisper.model"),
            ("WHISPER_FALLBACK_MODEL", "whisper.fallback_model"),
            ("WHISPER_LANGUAGE", "whisper.language"),
            ("JWT_SECRET", "auth.jwt_secret"),
            ("ADMIN_USERNAME", "auth.bootstrap_user"),
            ("ADMIN_PASSWORD", "auth.bootstrap_password"),
            ("RUST_LOG", "logging.level"),
        ];
        for (var, key) in overrides {
            if let Ok(value) = env::var(var) {
                builder = builder.set_override(*key, value)?;
            }
        }

        if let Ok(port) = env::var("PORT") {
            builder = builder.set_override("server.port", port.parse::<u16>().unwrap_or(3000))?;
        }

        if let Ok(port) = env::var("TOOL_SERVER_PORT") {
            builder = builder.set_override("tool_server.port", port.parse::<u16>().unwrap_or(5001))?;
        }

        if let Ok(temperature) = env::var("LLM_TEMPERATURE") {
            builder = builder.set_override("llm.temperature", temperature.parse::<f64>().unwrap_or(0.0))?;
        }

        if let Ok(max_tokens) = env::var("LLM_MAX_TOKENS") {
            builder = builder.set_override("llm.max_tokens", max_tokens.parse::<u32>().unwrap_or(512))?;
        }

        builder.build()?.try_deserialize()
    }

    pub fn server_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    pub fn tool_server_address(&self) -> String {
        format!("{}:{}", self.tool_server.host, self.tool_server.port)
    }

    pub fn llm_enabled(&self) -> bool {
        !self.llm.base_url.trim().is_empty()
    }
}
