//! Delivery assembly: artifacts, sources, and run metrics.
//!
//! The deliver stage mines successful step outputs for presentable pieces.
//! Extraction is heuristic over whatever shape the tools returned; nothing in
//! here fails, it just extracts less.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::plan::{Plan, StepResult, Verification};
use crate::pricing::{round2, CostBreakdown};

/// Characters of a string output kept inline in a text artifact.
const TEXT_ARTIFACT_PREVIEW_CHARS: usize = 500;

/// String outputs at or under this length are not worth an artifact.
const TEXT_ARTIFACT_MIN_CHARS: usize = 100;

/// List artifacts keep at most this many items.
const LIST_ARTIFACT_MAX_ITEMS: usize = 20;

/// Final package returned for a completed goal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Delivery {
    pub summary: String,
    pub artifacts: Vec<Artifact>,
    pub metrics: DeliveryMetrics,
    pub sources: Vec<String>,
    pub cost_breakdown: CostBreakdown,
}

/// Run totals surfaced next to the summary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryMetrics {
    pub steps_completed: usize,
    pub total_steps: usize,
    /// Percentage of executed steps that succeeded; 0 for an empty run.
    pub success_rate: f64,
    pub quality_score: u32,
    pub execution_time_ms: u64,
}

impl DeliveryMetrics {
    pub fn from_run(plan: &Plan, results: &[StepResult], verification: &Verification) -> Self {
        let steps_completed = results.iter().filter(|r| r.success).count();
        let success_rate = if results.is_empty() {
            0.0
        } else {
            round2(steps_completed as f64 / results.len() as f64 * 100.0)
        };
        Self {
            steps_completed,
            total_steps: plan.steps.len(),
            success_rate,
            quality_score: verification.quality_score,
            execution_time_ms: results
                .iter()
                .filter_map(|r| r.execution_time_ms)
                .sum(),
        }
    }
}

/// Presentable piece extracted from a step output.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Artifact {
    Text {
        title: String,
        content: String,
        /// Step number holding the untruncated output.
        full_content_ref: u32,
    },
    Html {
        title: String,
        content: String,
    },
    Svg {
        title: String,
        content: String,
    },
    Markdown {
        title: String,
        content: String,
    },
    Link {
        title: String,
        url: String,
    },
    List {
        title: String,
        items: Vec<Value>,
    },
}

/// Mine successful step outputs for artifacts.
pub fn extract_artifacts(results: &[StepResult]) -> Vec<Artifact> {
    let mut artifacts = Vec::new();

    for result in results.iter().filter(|r| r.success) {
        let Some(output) = &result.output else {
            continue;
        };
        let title = format!("Step {} result", result.step_number);

        match output {
            Value::String(text) => {
                if text.chars().count() > TEXT_ARTIFACT_MIN_CHARS {
                    artifacts.push(Artifact::Text {
                        title,
                        content: text.chars().take(TEXT_ARTIFACT_PREVIEW_CHARS).collect(),
                        full_content_ref: result.step_number,
                    });
                }
            }
            Value::Object(fields) => {
                if let Some(html) = fields.get("html").and_then(Value::as_str) {
                    artifacts.push(Artifact::Html {
                        title: title.clone(),
                        content: html.to_string(),
                    });
                }
                if let Some(svg) = fields.get("svg").and_then(Value::as_str) {
                    artifacts.push(Artifact::Svg {
                        title: title.clone(),
                        content: svg.to_string(),
                    });
                }
                if let Some(md) = fields
                    .get("markdown")
                    .or_else(|| fields.get("article"))
                    .and_then(Value::as_str)
                {
                    artifacts.push(Artifact::Markdown {
                        title: title.clone(),
                        content: md.to_string(),
                    });
                }
                if let Some(url) = fields.get("url").and_then(Value::as_str) {
                    if is_web_url(url) {
                        artifacts.push(Artifact::Link {
                            title: title.clone(),
                            url: url.to_string(),
                        });
                    }
                }
                // First list-valued field wins.
                if let Some((key, items)) = fields
                    .iter()
                    .find_map(|(k, v)| v.as_array().map(|items| (k, items)))
                {
                    artifacts.push(Artifact::List {
                        title: format!("{} ({})", title, key),
                        items: items.iter().take(LIST_ARTIFACT_MAX_ITEMS).cloned().collect(),
                    });
                }
            }
            _ => {}
        }
    }

    artifacts
}

/// Collect source URLs from step outputs, deduplicated, order preserved.
///
/// Recognized shapes: `output.sources` as a list of URL strings or `{url}`
/// objects, and a top-level `output.source_url` string.
pub fn extract_sources(results: &[StepResult]) -> Vec<String> {
    let mut sources = Vec::new();
    let mut push = |url: &str| {
        if is_web_url(url) && !sources.iter().any(|s| s == url) {
            sources.push(url.to_string());
        }
    };

    for result in results.iter().filter(|r| r.success) {
        let Some(Value::Object(fields)) = &result.output else {
            continue;
        };
        if let Some(Value::Array(entries)) = fields.get("sources") {
            for entry in entries {
                match entry {
                    Value::String(url) => push(url),
                    Value::Object(obj) => {
                        if let Some(url) = obj.get("url").and_then(Value::as_str) {
                            push(url);
                        }
                    }
                    _ => {}
                }
            }
        }
        if let Some(url) = fields.get("source_url").and_then(Value::as_str) {
            push(url);
        }
    }

    sources
}

fn is_web_url(candidate: &str) -> bool {
    candidate.starts_with("http://") || candidate.starts_with("https://")
}
