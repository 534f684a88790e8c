use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PlotType {
    Bar,
    Line,
    Pie,
    Scatter,
    Table,
}

impl PlotType {
    /// Unknown kinds render as a table
    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "bar" => PlotType::Bar,
            "line" => PlotType::Line,
            "pie" => PlotType::Pie,
            "scatter" => PlotType::Scatter,
            _ => PlotType::Table,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PlotType::Bar => "bar",
            PlotType::Line => "line",
            PlotType::Pie => "pie",
            PlotType::Scatter => "scatter",
            PlotType::Table => "table",
        }
    }
}

/// Output of `chart_detector`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChartDecision {
    pub plot: bool,
    pub plot_type: Option<String>,
    pub sql: Option<String>,
}

impl ChartDecision {
    pub fn no_chart() -> Self {
        Self {
            plot: false,
            plot_type: None,
            sql: None,
        }
    }

    pub fn chart(plot_type: impl Into<String>, sql: impl Into<String>) -> Self {
        Self {
            plot: true,
            plot_type: Some(plot_type.into()),
            sql: Some(sql.into()),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DetectorInput {
    pub conn_str: Option<String>,
    #[serde(default)]
    pub question: String,
    #[serde(default)]
    pub schema_text: Option<String>,
}

fn default_plot_type() -> String {
    "bar".to_string()
}

fn default_limit_rows() -> u64 {
    200
}

#[derive(Debug, Clone, Deserialize)]
pub struct RendererInput {
    pub conn_str: Option<String>,
    pub sql: Option<String>,
    #[serde(default = "default_plot_type")]
    pub plot_type: String,
    #[serde(default = "default_limit_rows")]
    pub limit_rows: u64,
}

/// Output of `chart_renderer`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChartRender {
    pub plot_url: String,
    pub cols: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}
