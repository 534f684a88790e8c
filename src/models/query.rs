use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Rows returned by a statement, cells in column order
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct QueryResult {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
    pub row_count: usize,
    pub execution_time_ms: u64,
}

impl QueryResult {
    pub fn new(columns: Vec<String>, rows: Vec<Vec<Value>>, execution_time_ms: u64) -> Self {
        let row_count = rows.len();
        Self {
            columns,
            rows,
            row_count,
            execution_time_ms,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Column values, `Value::Null` where a row is short
    pub fn column_values(&self, idx: usize) -> Vec<Value> {
        self.rows
            .iter()
            .map(|r| r.get(idx).cloned().unwrap_or(Value::Null))
            .collect()
    }
}

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub question: String,
}

/// Chart summary shown next to the answer
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlotInfo {
    pub cols: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

/// Everything the chat view renders after one submission
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChatResponse {
    pub sql: Option<String>,
    pub rows: Option<QueryResult>,
    pub error: Option<String>,
    pub transcript: Option<String>,
    pub is_voice: bool,
    pub user_prompt: String,
    pub plot_url: Option<String>,
    pub plot_info: Option<PlotInfo>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_query_result_accessors() {
        let result = QueryResult::new(
            vec!["id".to_string(), "name".to_string()],
            vec![vec![json!(1), json!("a")], vec![json!(2)]],
            3,
        );
        assert_eq!(result.row_count, 2);
        assert!(!result.is_empty());
        assert_eq!(result.column_values(1), vec![json!("a"), Value::Null]);
    }
}
