//! Automation tools: scraping and outbound email drafts.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use super::{require_str, str_or};
use crate::registry::{Tool, ToolCategory, ToolContext, ToolModule, ToolRegistration, ToolSpec};

pub struct AutomationModule;

impl ToolModule for AutomationModule {
    fn name(&self) -> &'static str {
        "automation"
    }

    fn tools(&self) -> Vec<ToolRegistration> {
        vec![
            ToolRegistration::new(
                ToolSpec::new(
                    "scraperBot",
                    "Extract structured records from a page by selector",
                    ToolCategory::Automation,
                )
                .high_risk(),
                Arc::new(ScraperBot),
            ),
            ToolRegistration::new(
                ToolSpec::new(
                    "emailDraftSender",
                    "Compose an outbound email draft ready for review",
                    ToolCategory::Automation,
                )
                .high_risk(),
                Arc::new(EmailDraftSender),
            ),
        ]
    }
}

/// Selector-driven extraction report.
pub struct ScraperBot;

#[async_trait]
impl Tool for ScraperBot {
    async fn execute(&self, parameters: &Value, _ctx: &ToolContext) -> anyhow::Result<Value> {
        let url = require_str(parameters, "url")?;
        let selector = str_or(parameters, "selector", "article");

        let records: Vec<Value> = (1..=4)
            .map(|n| {
                json!({
                    "selector": selector,
                    "index": n,
                    "text": format!("Extracted block {} matching '{}' on {}", n, selector, url),
                })
            })
            .collect();

        Ok(json!({
            "url": url,
            "selector": selector,
            "item_count": records.len(),
            "records": records,
        }))
    }
}

/// Email draft. Drafts only; nothing leaves the machine without review.
pub struct EmailDraftSender;

#[async_trait]
impl Tool for EmailDraftSender {
    async fn execute(&self, parameters: &Value, _ctx: &ToolContext) -> anyhow::Result<Value> {
        let to = require_str(parameters, "to")?;
        let subject = require_str(parameters, "subject")?;
        let body = str_or(parameters, "body", "");

        let preview: String = body.chars().take(120).collect();
        Ok(json!({
            "status": "drafted",
            "to": to,
            "subject": subject,
            "preview": preview,
            "body_chars": body.chars().count(),
        }))
    }
}
