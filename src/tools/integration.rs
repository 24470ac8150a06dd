//! Integration tools: generic API calls and webhook delivery.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use super::{require_str, str_or};
use crate::error::AgentError;
use crate::registry::{Tool, ToolCategory, ToolContext, ToolModule, ToolRegistration, ToolSpec};

pub struct IntegrationModule;

impl ToolModule for IntegrationModule {
    fn name(&self) -> &'static str {
        "integration"
    }

    fn tools(&self) -> Vec<ToolRegistration> {
        vec![
            ToolRegistration::new(
                ToolSpec::new(
                    "apiConnector",
                    "Issue a request against a configured HTTP endpoint",
                    ToolCategory::Integration,
                )
                .high_risk()
                .requires_network(),
                Arc::new(ApiConnector),
            ),
            ToolRegistration::new(
                ToolSpec::new(
                    "webhookSender",
                    "Deliver a JSON payload to a webhook URL",
                    ToolCategory::Integration,
                )
                .high_risk()
                .requires_network(),
                Arc::new(WebhookSender),
            ),
        ]
    }
}

const ALLOWED_METHODS: [&str; 4] = ["GET", "POST", "PUT", "DELETE"];

/// Request/response echo for an endpoint.
pub struct ApiConnector;

#[async_trait]
impl Tool for ApiConnector {
    async fn execute(&self, parameters: &Value, _ctx: &ToolContext) -> anyhow::Result<Value> {
        let endpoint = require_str(parameters, "endpoint")?;
        let method = str_or(parameters, "method", "GET").to_uppercase();
        if !ALLOWED_METHODS.contains(&method.as_str()) {
            return Err(
                AgentError::Tool(format!("unsupported HTTP method '{}'", method)).into(),
            );
        }

        Ok(json!({
            "endpoint": endpoint,
            "method": method,
            "status": 200,
            "response": {
                "ok": true,
                "echo": parameters.get("body").cloned().unwrap_or(Value::Null),
            },
        }))
    }
}

/// Delivery receipt for a payload.
pub struct WebhookSender;

#[async_trait]
impl Tool for WebhookSender {
    async fn execute(&self, parameters: &Value, _ctx: &ToolContext) -> anyhow::Result<Value> {
        let url = require_str(parameters, "url")?;
        if !url.starts_with("https://") && !url.starts_with("http://") {
            return Err(AgentError::Tool(format!("'{}' is not an HTTP URL", url)).into());
        }
        let payload = parameters.get("payload").cloned().unwrap_or(json!({}));
        let payload_bytes = payload.to_string().len();

        Ok(json!({
            "delivered": true,
            "url": url,
            "payload_bytes": payload_bytes,
        }))
    }
}
