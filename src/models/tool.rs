use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Body of `POST /call`
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ToolCallRequest {
    #[serde(default)]
    pub tool: Option<String>,
    #[serde(default)]
    pub input: Value,
}

/// Entry of `GET /tools`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolDescriptor {
    pub name: String,
    pub title: String,
    pub description: String,
    pub input_schema: Value,
}
