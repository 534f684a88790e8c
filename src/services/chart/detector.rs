//! Decides whether a question is best answered with a chart.
//!
//! Two variants: a keyword heuristic that picks the first table exposing a
//! numeric and a categorical column, and an LLM-backed one that asks the
//! model for a JSON decision.

use regex::Regex;
use serde::Deserialize;
use std::sync::Arc;

use crate::api::middleware::AppError;
use crate::models::{ChartDecision, Table};
use crate::services::database::DatabaseAdapter;
use crate::services::llm_service::LanguageModel;
use crate::services::schema_introspector::{introspect_tables, tables_to_text};

const PLOT_KEYWORDS: &[&str] = &[
    "plot",
    "chart",
    "trend",
    "count",
    "by",
    "distribution",
    "compare",
    "histogram",
    "per",
    "per month",
    "per year",
    "over time",
];

const LISTING_PREFIXES: &[&str] = &["list ", "show ", "give ", "return "];

const NUMERIC_MARKERS: &[&str] = &["int", "numeric", "decimal", "float", "real"];
const CATEGORY_MARKERS: &[&str] = &["char", "text", "varchar", "date", "time"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectorMode {
    Llm,
    Heuristic,
}

impl DetectorMode {
    /// Unknown values select the LLM variant
    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "heuristic" => DetectorMode::Heuristic,
            _ => DetectorMode::Llm,
        }
    }
}

/// Keyword vote on whether the question asks for a chart
pub fn wants_plot(question: &str) -> bool {
    let q = question.to_lowercase();
    let mut wants = PLOT_KEYWORDS.iter().any(|k| q.contains(k));

    // Plain listing requests only plot when they group or trend
    if LISTING_PREFIXES.iter().any(|k| q.contains(k)) && !q.contains("per") {
        wants = wants && (q.contains("per") || q.contains("by") || q.contains("trend"));
    }
    wants
}

/// First table with a numeric and a categorical column, summed per category
pub fn heuristic_decision(question: &str, tables: &[Table]) -> ChartDecision {
    if !wants_plot(question) {
        return ChartDecision::no_chart();
    }

    for table in tables {
        let mut category = None;
        let mut number = None;
        for column in &table.columns {
            let type_name = column.data_type.to_lowercase();
            if number.is_none() && NUMERIC_MARKERS.iter().any(|m| type_name.contains(m)) {
                number = Some(column.name.as_str());
            }
            if category.is_none() && CATEGORY_MARKERS.iter().any(|m| type_name.contains(m)) {
                category = Some(column.name.as_str());
            }
        }

        if let (Some(cat), Some(num)) = (category, number) {
            let sql = format!(
                "SELECT {cat} as label, SUM({num}) as value FROM {table} GROUP BY {cat} ORDER BY value DESC;",
                cat = cat,
                num = num,
                table = table.name
            );
            return ChartDecision::chart("bar", sql);
        }
    }

    ChartDecision::no_chart()
}

pub fn build_detector_prompt(schema_text: &str, question: &str) -> String {
    format!(
        r#"You are a SQL+visualization assistant. Given a user question and database schema, decide:
1) whether the question can/should be answered with a chart (true/false)
2) if true, suggest one of: bar, line, pie, scatter, table
3) provide a single SQL SELECT query that returns the fields needed for the suggested chart.
Output MUST be valid JSON with keys: plot (true/false), plot_type (string or null), sql (string or null).
Use only columns present in the schema below. Don't include comments or markdown.

Schema:
{schema_text}

User question:
{question}

Examples of JSON output:
{{"plot": true, "plot_type":"bar", "sql":"SELECT category, COUNT(*) as cnt FROM sales GROUP BY category;"}}
"#,
        schema_text = schema_text,
        question = question
    )
}

#[derive(Debug, Deserialize)]
struct RawDecision {
    #[serde(default)]
    plot: serde_json::Value,
    #[serde(default)]
    plot_type: Option<String>,
    #[serde(default)]
    sql: Option<String>,
}

fn parse_raw(text: &str) -> Option<RawDecision> {
    let cleaned = text.replace("```json", "").replace("```", "");
    if let Ok(raw) = serde_json::from_str(cleaned.trim()) {
        return Some(raw);
    }

    let braces = Regex::new(r"(?s)\{.*\}").ok()?;
    let span = braces.find(text)?;
    serde_json::from_str(span.as_str()).ok()
}

/// Model output to a decision; anything unusable means no chart
pub fn parse_llm_decision(text: &str) -> ChartDecision {
    let Some(raw) = parse_raw(text.trim()) else {
        tracing::warn!("Chart detector returned non-JSON output: {}", text);
        return ChartDecision::no_chart();
    };

    let plot = match &raw.plot {
        serde_json::Value::Bool(b) => *b,
        serde_json::Value::String(s) => s.eq_ignore_ascii_case("true"),
        _ => false,
    };
    let sql = raw.sql.filter(|s| !s.trim().is_empty());

    match (plot, sql) {
        (true, Some(sql)) => ChartDecision {
            plot: true,
            plot_type: raw.plot_type,
            sql: Some(sql),
        },
        _ => ChartDecision::no_chart(),
    }
}

/// Chart decision for a question against the connected database
pub struct ChartDetector {
    mode: DetectorMode,
    llm: Option<Arc<dyn LanguageModel>>,
}

impl ChartDetector {
    /// Without a model the heuristic variant is used regardless of `mode`
    pub fn new(mode: DetectorMode, llm: Option<Arc<dyn LanguageModel>>) -> Self {
        Self { mode, llm }
    }

    pub async fn detect(
        &self,
        adapter: &dyn DatabaseAdapter,
        question: &str,
        schema_text: Option<&str>,
    ) -> Result<ChartDecision, AppError> {
        let tables = introspect_tables(adapter).await?;

        match (&self.mode, &self.llm) {
            (DetectorMode::Llm, Some(llm)) => {
                let schema_text = match schema_text {
                    Some(text) if !text.trim().is_empty() => text.to_string(),
                    _ => tables_to_text(&tables),
                };
                let prompt = build_detector_prompt(&schema_text, question);
                let output = llm.complete(&prompt).await?;
                Ok(parse_llm_decision(&output))
            }
            _ => Ok(heuristic_decision(question, &tables)),
        }
    }
}
