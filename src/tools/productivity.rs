//! Productivity tools: code explanation and regex assembly.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use super::require_str;
use crate::registry::{Tool, ToolCategory, ToolContext, ToolModule, ToolRegistration, ToolSpec};

pub struct ProductivityModule;

impl ToolModule for ProductivityModule {
    fn name(&self) -> &'static str {
        "productivity"
    }

    fn tools(&self) -> Vec<ToolRegistration> {
        vec![
            ToolRegistration::new(
                ToolSpec::new(
                    "codeExplainer",
                    "Summarize a code snippet and guess its language",
                    ToolCategory::Productivity,
                ),
                Arc::new(CodeExplainer),
            ),
            ToolRegistration::new(
                ToolSpec::new(
                    "regexBuilder",
                    "Produce a regular expression for a described pattern",
                    ToolCategory::Productivity,
                ),
                Arc::new(RegexBuilder),
            ),
        ]
    }
}

/// Shallow static summary of a snippet.
pub struct CodeExplainer;

#[async_trait]
impl Tool for CodeExplainer {
    async fn execute(&self, parameters: &Value, _ctx: &ToolContext) -> anyhow::Result<Value> {
        let code = require_str(parameters, "code")?;

        let language = guess_language(code);
        let line_count = code.lines().count();
        let first_line = code.lines().next().unwrap_or("").trim();

        Ok(json!({
            "language": language,
            "line_count": line_count,
            "summary": format!(
                "A {} line {} snippet starting with `{}`.",
                line_count, language, first_line
            ),
        }))
    }
}

fn guess_language(code: &str) -> &'static str {
    if code.contains("fn ") && (code.contains("let ") || code.contains("->")) {
        "rust"
    } else if code.contains("def ") || code.contains("import ") {
        "python"
    } else if code.contains("function") || code.contains("=>") || code.contains("const ") {
        "javascript"
    } else {
        "unknown"
    }
}

/// Pattern-library lookup keyed on the description.
pub struct RegexBuilder;

#[async_trait]
impl Tool for RegexBuilder {
    async fn execute(&self, parameters: &Value, _ctx: &ToolContext) -> anyhow::Result<Value> {
        let description = require_str(parameters, "description")?;
        let lowered = description.to_lowercase();

        let (pattern, matched) = if lowered.contains("email") {
            (r"[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}", "email")
        } else if lowered.contains("url") || lowered.contains("link") {
            (r"https?://[^\s/$.?#].[^\s]*", "url")
        } else if lowered.contains("phone") {
            (r"\+?[0-9][0-9 ()-]{6,}[0-9]", "phone")
        } else if lowered.contains("date") {
            (r"\d{4}-\d{2}-\d{2}", "iso date")
        } else if lowered.contains("number") || lowered.contains("digit") {
            (r"-?\d+(\.\d+)?", "number")
        } else {
            (r"\w+", "word")
        };

        Ok(json!({
            "description": description,
            "pattern": pattern,
            "matched_template": matched,
        }))
    }
}
