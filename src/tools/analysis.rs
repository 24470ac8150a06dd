//! Data analysis tools: charts and tabular cleanup.

use std::fmt::Write as _;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use super::str_or;
use crate::error::AgentError;
use crate::registry::{Tool, ToolCategory, ToolContext, ToolModule, ToolRegistration, ToolSpec};

pub struct AnalysisModule;

impl ToolModule for AnalysisModule {
    fn name(&self) -> &'static str {
        "analysis"
    }

    fn tools(&self) -> Vec<ToolRegistration> {
        vec![
            ToolRegistration::new(
                ToolSpec::new(
                    "chartBuilder",
                    "Render a numeric series as an SVG bar chart",
                    ToolCategory::Analysis,
                ),
                Arc::new(ChartBuilder),
            ),
            ToolRegistration::new(
                ToolSpec::new(
                    "dataframeCleaner",
                    "Deduplicate rows and drop null-heavy records from tabular data",
                    ToolCategory::Analysis,
                ),
                Arc::new(DataframeCleaner),
            ),
        ]
    }
}

const CHART_WIDTH: u64 = 320;
const CHART_HEIGHT: u64 = 160;

/// Inline SVG bar chart from a `values` array.
pub struct ChartBuilder;

#[async_trait]
impl Tool for ChartBuilder {
    async fn execute(&self, parameters: &Value, _ctx: &ToolContext) -> anyhow::Result<Value> {
        let title = str_or(parameters, "title", "Chart");
        let values: Vec<f64> = parameters
            .get("values")
            .and_then(Value::as_array)
            .map(|items| items.iter().filter_map(Value::as_f64).collect())
            .unwrap_or_default();
        if values.is_empty() {
            return Err(AgentError::Tool(
                "chartBuilder needs a non-empty numeric 'values' array".to_string(),
            )
            .into());
        }

        let max = values.iter().cloned().fold(f64::MIN, f64::max).max(1.0);
        let bar_width = CHART_WIDTH / values.len() as u64;

        let mut svg = format!(
            "<svg xmlns=\"http://www.w3.org/2000/svg\" width=\"{CHART_WIDTH}\" height=\"{CHART_HEIGHT}\">"
        );
        for (i, value) in values.iter().enumerate() {
            let height = ((value / max) * (CHART_HEIGHT as f64 - 20.0)).round() as u64;
            let x = i as u64 * bar_width;
            let y = CHART_HEIGHT - height;
            let _ = write!(
                svg,
                "<rect x=\"{}\" y=\"{}\" width=\"{}\" height=\"{}\" fill=\"#4a7ebb\"/>",
                x + 2,
                y,
                bar_width.saturating_sub(4),
                height
            );
        }
        svg.push_str("</svg>");

        Ok(json!({
            "title": title,
            "chart_type": "bar",
            "svg": svg,
            "points": values.len(),
        }))
    }
}

/// Cleaned copy of a `rows` array.
pub struct DataframeCleaner;

#[async_trait]
impl Tool for DataframeCleaner {
    async fn execute(&self, parameters: &Value, _ctx: &ToolContext) -> anyhow::Result<Value> {
        let rows = parameters
            .get("rows")
            .and_then(Value::as_array)
            .ok_or_else(|| AgentError::Tool("dataframeCleaner needs a 'rows' array".to_string()))?;

        let mut seen = Vec::new();
        let mut dropped_nulls = 0usize;
        let mut dropped_duplicates = 0usize;

        for row in rows {
            if row.is_null() {
                dropped_nulls += 1;
                continue;
            }
            if let Some(object) = row.as_object() {
                // A row where over half the fields are null carries no signal.
                let nulls = object.values().filter(|v| v.is_null()).count();
                if object.is_empty() || nulls * 2 > object.len() {
                    dropped_nulls += 1;
                    continue;
                }
            }
            if seen.contains(row) {
                dropped_duplicates += 1;
                continue;
            }
            seen.push(row.clone());
        }

        Ok(json!({
            "rows": seen,
            "kept": seen.len(),
            "dropped_nulls": dropped_nulls,
            "dropped_duplicates": dropped_duplicates,
        }))
    }
}
